//! House auctions, transfers, evictions and ownership.

use crate::db::DatabaseSession;
use crate::error::QueryManagerError;
use crate::query::{Query, QueryStatus};
use crate::store::{self, House};
use crate::transaction::TransactionScope;

use super::compound_banishment;

pub async fn finish_auctions(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    // Read-and-delete must land together or finished auctions would be
    // lost on a crash between the two.
    let mut tx = TransactionScope::new("FinishAuctions");
    tx.begin(db).await?;
    let auctions = store::houses::finish_house_auctions(db, query.world_id).await?;
    tx.commit(db).await?;

    query.begin_response(QueryStatus::Ok);
    let count = auctions.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for auction in &auctions[..count] {
        query.response.write_u16(auction.house_id as u16);
        query.response.write_u32(auction.bidder_id as u32);
        query.response.write_string(&auction.bidder_name);
        query.response.write_u32(auction.bid_amount as u32);
    }
    query.finish_response();
    Ok(())
}

pub async fn transfer_houses(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut tx = TransactionScope::new("TransferHouses");
    tx.begin(db).await?;
    let transfers = store::houses::finish_house_transfers(db, query.world_id).await?;
    tx.commit(db).await?;

    query.begin_response(QueryStatus::Ok);
    let count = transfers.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for transfer in &transfers[..count] {
        query.response.write_u16(transfer.house_id as u16);
        query.response.write_u32(transfer.new_owner_id as u32);
        query.response.write_string(&transfer.new_owner_name);
        query.response.write_u32(transfer.price as u32);
    }
    query.finish_response();
    Ok(())
}

pub async fn evict_free_accounts(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let evictions = store::houses::free_account_evictions(db, query.world_id).await?;

    query.begin_response(QueryStatus::Ok);
    let count = evictions.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for eviction in &evictions[..count] {
        query.response.write_u16(eviction.house_id as u16);
        query.response.write_u32(eviction.owner_id as u32);
    }
    query.finish_response();
    Ok(())
}

pub async fn evict_deleted_characters(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let evictions = store::houses::deleted_character_evictions(db, query.world_id).await?;

    query.begin_response(QueryStatus::Ok);
    let count = evictions.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for eviction in &evictions[..count] {
        query.response.write_u16(eviction.house_id as u16);
    }
    query.finish_response();
    Ok(())
}

/// The game server is authoritative on houses but keeps no guild state,
/// so it sends the guild-house owners and this side answers with the
/// houses whose owner no longer leads a guild.
pub async fn evict_ex_guildleaders(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let count = request.read_u16() as usize;
    let mut evictions: Vec<i32> = Vec::new();
    for _ in 0..count {
        let house_id = i32::from(request.read_u16());
        let owner_id = request.read_u32() as i32;

        let is_leader =
            store::characters::guild_leader_status(db, query.world_id, owner_id).await?;
        if !is_leader {
            evictions.push(house_id);
        }
    }

    query.begin_response(QueryStatus::Ok);
    let count = evictions.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for house_id in &evictions[..count] {
        query.response.write_u16(*house_id as u16);
    }
    query.finish_response();
    Ok(())
}

pub async fn insert_house_owner(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let house_id = i32::from(request.read_u16());
    let owner_id = request.read_u32() as i32;
    let paid_until = request.read_u32() as i32;
    store::houses::insert_house_owner(db, query.world_id, house_id, owner_id, paid_until).await?;
    query.ok();
    Ok(())
}

pub async fn update_house_owner(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let house_id = i32::from(request.read_u16());
    let owner_id = request.read_u32() as i32;
    let paid_until = request.read_u32() as i32;
    store::houses::update_house_owner(db, query.world_id, house_id, owner_id, paid_until).await?;
    query.ok();
    Ok(())
}

pub async fn delete_house_owner(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let house_id = i32::from(request.read_u16());
    store::houses::delete_house_owner(db, query.world_id, house_id).await?;
    query.ok();
    Ok(())
}

pub async fn get_house_owners(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let owners = store::houses::house_owners(db, query.world_id).await?;

    query.begin_response(QueryStatus::Ok);
    let count = owners.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for owner in &owners[..count] {
        query.response.write_u16(owner.house_id as u16);
        query.response.write_u32(owner.owner_id as u32);
        query.response.write_string(&owner.owner_name);
        query.response.write_u32(owner.paid_until as u32);
    }
    query.finish_response();
    Ok(())
}

pub async fn get_auctions(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let auctions = store::houses::house_auctions(db, query.world_id).await?;

    query.begin_response(QueryStatus::Ok);
    let count = auctions.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for house_id in &auctions[..count] {
        query.response.write_u16(*house_id as u16);
    }
    query.finish_response();
    Ok(())
}

pub async fn start_auction(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let house_id = i32::from(request.read_u16());
    store::houses::start_house_auction(db, query.world_id, house_id).await?;
    query.ok();
    Ok(())
}

pub async fn insert_houses(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();

    let mut tx = TransactionScope::new("InsertHouses");
    tx.begin(db).await?;
    store::houses::delete_houses(db, query.world_id).await?;

    let count = request.read_u16() as usize;
    if count > 0 {
        let mut houses = Vec::with_capacity(count);
        for _ in 0..count {
            houses.push(House {
                house_id: i32::from(request.read_u16()),
                name: request.read_string(50),
                rent: request.read_u32() as i32,
                description: request.read_string(500),
                size: i32::from(request.read_u16()),
                position_x: i32::from(request.read_u16()),
                position_y: i32::from(request.read_u16()),
                position_z: i32::from(request.read_u8()),
                town: request.read_string(30),
                guild_house: request.read_flag(),
            });
        }
        store::houses::insert_houses(db, query.world_id, &houses).await?;
    }

    tx.commit(db).await?;
    query.ok();
    Ok(())
}

pub async fn exclude_from_auctions(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let character_id = request.read_u32() as i32;
    let banish = request.read_flag();

    let mut tx = TransactionScope::new("ExcludeFromAuctions");
    tx.begin(db).await?;

    let exclusion_days = 7;
    let mut banishment_id = 0;
    if banish {
        let mut days = 7;
        let mut final_warning = false;
        let status = store::banishments::banishment_status(db, character_id).await?;
        compound_banishment(status, &mut days, &mut final_warning);
        banishment_id = store::banishments::insert_banishment(
            db,
            character_id,
            0,
            0,
            "Spoiling Auction",
            "",
            final_warning,
            days * 86_400,
        )
        .await?;
    }

    store::houses::exclude_from_auctions(
        db,
        query.world_id,
        character_id,
        exclusion_days * 86_400,
        banishment_id,
    )
    .await?;
    tx.commit(db).await?;
    query.ok();
    Ok(())
}

pub async fn cancel_house_transfer(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let house_id = i32::from(request.read_u16());
    store::houses::cancel_house_transfer(db, query.world_id, house_id).await?;
    query.ok();
    Ok(())
}
