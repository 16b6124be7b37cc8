use crate::db::{DatabaseSession, now_unix};
use crate::error::QueryManagerError;
use crate::types::RowValues;

use super::{House, HouseAuction, HouseEviction, HouseOwner, HouseTransfer, row_i32, row_text};

/// Collect auctions whose finish time has passed and remove them. The
/// caller wraps this in a transaction so a crash between the read and
/// the delete loses nothing.
pub async fn finish_house_auctions(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Vec<HouseAuction>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT A.HouseID, A.BidderID, A.BidAmount, A.FinishTime, C.Name\
             FROM HouseAuctions AS A\
             LEFT JOIN Characters AS C ON C.CharacterID = A.BidderID\
             WHERE A.WorldID = $1::INTEGER\
                 AND A.FinishTime IS NOT NULL\
                 AND A.FinishTime <= $2::INTEGER",
            &[RowValues::Int(i64::from(world_id)), RowValues::Int(now_unix())],
        )
        .await?;
    let auctions: Vec<HouseAuction> = result
        .rows
        .iter()
        .map(|row| HouseAuction {
            house_id: row_i32(row, 0),
            bidder_id: row_i32(row, 1),
            bid_amount: row_i32(row, 2),
            finish_time: row_i32(row, 3),
            bidder_name: row_text(row, 4),
        })
        .collect();

    db.execute_dml(
        "DELETE FROM HouseAuctions \
         WHERE WorldID = $1::INTEGER \
             AND FinishTime IS NOT NULL \
             AND FinishTime <= $2::INTEGER",
        &[RowValues::Int(i64::from(world_id)), RowValues::Int(now_unix())],
    )
    .await?;

    Ok(auctions)
}

/// Collect and remove every pending transfer for the world.
pub async fn finish_house_transfers(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Vec<HouseTransfer>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT T.HouseID, T.NewOwnerID, T.Price, C.Name\
             FROM HouseTransfers AS T\
             LEFT JOIN Characters AS C ON C.CharacterID = T.NewOwnerID\
             WHERE T.WorldID = $1::INTEGER",
            &[RowValues::Int(i64::from(world_id))],
        )
        .await?;
    let transfers: Vec<HouseTransfer> = result
        .rows
        .iter()
        .map(|row| HouseTransfer {
            house_id: row_i32(row, 0),
            new_owner_id: row_i32(row, 1),
            price: row_i32(row, 2),
            new_owner_name: row_text(row, 3),
        })
        .collect();

    db.execute_dml(
        "DELETE FROM HouseTransfers WHERE WorldID = $1::INTEGER",
        &[RowValues::Int(i64::from(world_id))],
    )
    .await?;

    Ok(transfers)
}

/// Remove a single pending transfer, if any.
pub async fn cancel_house_transfer(
    db: &mut DatabaseSession,
    world_id: i32,
    house_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "DELETE FROM HouseTransfers \
         WHERE WorldID = $1::INTEGER AND HouseID = $2::INTEGER",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(house_id)),
        ],
    )
    .await?;
    Ok(())
}

/// Houses owned by characters whose account has no premium time left.
pub async fn free_account_evictions(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Vec<HouseEviction>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT O.HouseID, O.OwnerID\
             FROM HouseOwners AS O\
             LEFT JOIN Characters AS C ON C.CharacterID = O.OwnerID\
             LEFT JOIN Accounts AS A ON A.AccountID = C.AccountID\
             WHERE O.WorldID = $1::INTEGER\
                 AND (A.PremiumEnd IS NULL OR A.PremiumEnd < $2::INTEGER)",
            &[RowValues::Int(i64::from(world_id)), RowValues::Int(now_unix())],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| HouseEviction {
            house_id: row_i32(row, 0),
            owner_id: row_i32(row, 1),
        })
        .collect())
}

/// Houses owned by deleted or vanished characters.
pub async fn deleted_character_evictions(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Vec<HouseEviction>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT O.HouseID, O.OwnerID\
             FROM HouseOwners AS O\
             LEFT JOIN Characters AS C ON C.CharacterID = O.OwnerID\
             WHERE O.WorldID = $1::INTEGER\
                 AND (C.CharacterID IS NULL OR C.Deleted != 0)",
            &[RowValues::Int(i64::from(world_id))],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| HouseEviction {
            house_id: row_i32(row, 0),
            owner_id: row_i32(row, 1),
        })
        .collect())
}

pub async fn insert_house_owner(
    db: &mut DatabaseSession,
    world_id: i32,
    house_id: i32,
    owner_id: i32,
    paid_until: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO HouseOwners (WorldID, HouseID, OwnerID, PaidUntil) \
         VALUES ($1::INTEGER, $2::INTEGER, $3::INTEGER, $4::INTEGER)",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(house_id)),
            RowValues::Int(i64::from(owner_id)),
            RowValues::Int(i64::from(paid_until)),
        ],
    )
    .await?;
    Ok(())
}

pub async fn update_house_owner(
    db: &mut DatabaseSession,
    world_id: i32,
    house_id: i32,
    owner_id: i32,
    paid_until: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "UPDATE HouseOwners \
         SET OwnerID = $1::INTEGER, PaidUntil = $2::INTEGER \
         WHERE WorldID = $3::INTEGER AND HouseID = $4::INTEGER",
        &[
            RowValues::Int(i64::from(owner_id)),
            RowValues::Int(i64::from(paid_until)),
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(house_id)),
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete_house_owner(
    db: &mut DatabaseSession,
    world_id: i32,
    house_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "DELETE FROM HouseOwners \
         WHERE WorldID = $1::INTEGER AND HouseID = $2::INTEGER",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(house_id)),
        ],
    )
    .await?;
    Ok(())
}

pub async fn house_owners(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Vec<HouseOwner>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT O.HouseID, O.OwnerID, C.Name, O.PaidUntil\
             FROM HouseOwners AS O\
             LEFT JOIN Characters AS C ON C.CharacterID = O.OwnerID\
             WHERE O.WorldID = $1::INTEGER",
            &[RowValues::Int(i64::from(world_id))],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| HouseOwner {
            house_id: row_i32(row, 0),
            owner_id: row_i32(row, 1),
            owner_name: row_text(row, 2),
            paid_until: row_i32(row, 3),
        })
        .collect())
}

pub async fn house_auctions(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Vec<i32>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT HouseID FROM HouseAuctions WHERE WorldID = $1::INTEGER",
            &[RowValues::Int(i64::from(world_id))],
        )
        .await?;
    Ok(result.rows.iter().map(|row| row_i32(row, 0)).collect())
}

pub async fn start_house_auction(
    db: &mut DatabaseSession,
    world_id: i32,
    house_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO HouseAuctions (WorldID, HouseID) VALUES ($1::INTEGER, $2::INTEGER)",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(house_id)),
        ],
    )
    .await?;
    Ok(())
}

pub async fn delete_houses(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "DELETE FROM Houses WHERE WorldID = $1::INTEGER",
        &[RowValues::Int(i64::from(world_id))],
    )
    .await?;
    Ok(())
}

pub async fn insert_houses(
    db: &mut DatabaseSession,
    world_id: i32,
    houses: &[House],
) -> Result<(), QueryManagerError> {
    for house in houses {
        db.execute_dml(
            "INSERT INTO Houses (WorldID, HouseID, Name, Rent, Description,\
                 Size, PositionX, PositionY, PositionZ, Town, GuildHouse) \
             VALUES ($1::INTEGER, $2::INTEGER, $3::TEXT, $4::INTEGER, $5::TEXT,\
                 $6::INTEGER, $7::INTEGER, $8::INTEGER, $9::INTEGER, $10::TEXT, $11::INTEGER)",
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Int(i64::from(house.house_id)),
                RowValues::Text(house.name.clone()),
                RowValues::Int(i64::from(house.rent)),
                RowValues::Text(house.description.clone()),
                RowValues::Int(i64::from(house.size)),
                RowValues::Int(i64::from(house.position_x)),
                RowValues::Int(i64::from(house.position_y)),
                RowValues::Int(i64::from(house.position_z)),
                RowValues::Text(house.town.clone()),
                RowValues::Int(i64::from(house.guild_house)),
            ],
        )
        .await?;
    }
    Ok(())
}

/// Bar a character from bidding; references the triggering banishment
/// when there is one.
pub async fn exclude_from_auctions(
    db: &mut DatabaseSession,
    world_id: i32,
    character_id: i32,
    duration_secs: i32,
    banishment_id: i32,
) -> Result<(), QueryManagerError> {
    let now = now_unix();
    db.execute_dml(
        "INSERT INTO HouseAuctionExclusions (CharacterID, Issued, Until, BanishmentID) \
         SELECT $1::INTEGER, $2::INTEGER, $3::INTEGER, $4::INTEGER \
             FROM Characters \
             WHERE WorldID = $5::INTEGER AND CharacterID = $6::INTEGER",
        &[
            RowValues::Int(i64::from(character_id)),
            RowValues::Int(now),
            RowValues::Int(now + i64::from(duration_secs)),
            RowValues::Int(i64::from(banishment_id)),
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(character_id)),
        ],
    )
    .await?;
    Ok(())
}
