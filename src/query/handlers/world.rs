//! World state: online lists, kill statistics, the character index and
//! per-world configuration.

use crate::db::DatabaseSession;
use crate::error::QueryManagerError;
use crate::query::worker::SharedHostCache;
use crate::query::{Query, QueryStatus};
use crate::store::{self, KillStatistics, OnlineCharacter};
use crate::transaction::TransactionScope;

/// Hard ceiling the game server expects on character index pages.
const MAX_INDEX_ENTRIES: i32 = 10_000;

pub async fn log_character_death(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let character_id = request.read_u32() as i32;
    let level = i32::from(request.read_u16());
    let offender_id = request.read_u32() as i32;
    let remark = request.read_string(30);
    let unjustified = request.read_flag();
    let timestamp = request.read_u32() as i32;

    store::characters::insert_character_death(
        db,
        query.world_id,
        character_id,
        level,
        offender_id,
        &remark,
        unjustified,
        timestamp,
    )
    .await?;
    query.ok();
    Ok(())
}

pub async fn add_buddy(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let account_id = request.read_u32() as i32;
    let buddy_id = request.read_u32() as i32;
    store::characters::insert_buddy(db, query.world_id, account_id, buddy_id).await?;
    query.ok();
    Ok(())
}

pub async fn remove_buddy(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let account_id = request.read_u32() as i32;
    let buddy_id = request.read_u32() as i32;
    store::characters::delete_buddy(db, query.world_id, account_id, buddy_id).await?;
    query.ok();
    Ok(())
}

pub async fn decrement_is_online(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let character_id = request.read_u32() as i32;
    store::characters::decrement_is_online(db, query.world_id, character_id).await?;
    query.ok();
    Ok(())
}

pub async fn clear_is_online(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let affected = store::characters::clear_is_online(db, query.world_id).await?;
    query.begin_response(QueryStatus::Ok);
    query.response.write_u16(affected as u16);
    query.finish_response();
    Ok(())
}

/// World heartbeat: replace the public online list atomically. A count
/// of 0xFFFF announces the world going offline and only clears the
/// list; the online record is only checked against real counts.
pub async fn create_playerlist(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();

    let mut tx = TransactionScope::new("OnlineList");
    tx.begin(db).await?;
    store::info::delete_online_characters(db, query.world_id).await?;

    let mut new_record = false;
    let count = request.read_u16();
    if count != 0xFFFF && count > 0 {
        let mut characters = Vec::with_capacity(count as usize);
        for _ in 0..count {
            characters.push(OnlineCharacter {
                name: request.read_string(30),
                level: i32::from(request.read_u16()),
                profession: request.read_string(30),
            });
        }
        store::info::insert_online_characters(db, query.world_id, &characters).await?;
        new_record =
            store::info::check_online_record(db, query.world_id, i32::from(count)).await?;
    }

    tx.commit(db).await?;

    query.begin_response(QueryStatus::Ok);
    query.response.write_flag(new_record);
    query.finish_response();
    Ok(())
}

pub async fn log_killed_creatures(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let count = request.read_u16() as usize;
    let mut stats = Vec::with_capacity(count);
    for _ in 0..count {
        let race_name = request.read_string(30);
        let players_killed = request.read_u32() as i32;
        let times_killed = request.read_u32() as i32;
        stats.push(KillStatistics {
            race_name,
            times_killed,
            players_killed,
        });
    }

    if !stats.is_empty() {
        let mut tx = TransactionScope::new("LogKilledCreatures");
        tx.begin(db).await?;
        store::info::merge_kill_statistics(db, query.world_id, &stats).await?;
        tx.commit(db).await?;
    }

    query.ok();
    Ok(())
}

pub async fn load_players(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let minimum_character_id = request.read_u32() as i32;

    let entries = store::characters::character_index_entries(
        db,
        query.world_id,
        minimum_character_id,
        MAX_INDEX_ENTRIES,
    )
    .await?;

    query.begin_response(QueryStatus::Ok);
    query.response.write_u32(entries.len() as u32);
    for entry in &entries {
        query.response.write_string(&entry.name);
        query.response.write_u32(entry.character_id as u32);
    }
    query.finish_response();
    Ok(())
}

pub async fn load_world_config(
    db: &mut DatabaseSession,
    hosts: &SharedHostCache,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let config = store::worlds::world_config(db, query.world_id).await?;
    let Some(config) = config else {
        query.failed();
        return Ok(());
    };

    let Some(address) = hosts.lock().await.resolve(&config.host).await else {
        query.failed();
        return Ok(());
    };

    query.begin_response(QueryStatus::Ok);
    query.response.write_u8(config.kind as u8);
    query.response.write_u8(config.reboot_time as u8);
    query.response.write_u32_be(u32::from(address));
    query.response.write_u16(config.port as u16);
    query.response.write_u16(config.max_players as u16);
    query.response.write_u16(config.premium_player_buffer as u16);
    query.response.write_u16(config.max_newbies as u16);
    query.response.write_u16(config.premium_newbie_buffer as u16);
    query.finish_response();
    Ok(())
}

pub async fn get_worlds(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let worlds = store::worlds::worlds(db).await?;

    query.begin_response(QueryStatus::Ok);
    let count = worlds.len().min(u8::MAX as usize);
    query.response.write_u8(count as u8);
    for world in &worlds[..count] {
        query.response.write_string(&world.name);
        query.response.write_u8(world.kind as u8);
        query.response.write_u16(world.num_players as u16);
        query.response.write_u16(world.max_players as u16);
        query.response.write_u16(world.online_record as u16);
        query.response.write_u32(world.online_record_timestamp as u32);
    }
    query.finish_response();
    Ok(())
}

pub async fn get_online_characters(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let world_name = request.read_string(30);

    let world_id = store::worlds::world_id(db, &world_name).await?;
    let Some(world_id) = world_id else {
        query.failed();
        return Ok(());
    };

    let characters = store::info::online_characters(db, world_id).await?;

    query.begin_response(QueryStatus::Ok);
    let count = characters.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for character in &characters[..count] {
        query.response.write_string(&character.name);
        query.response.write_u16(character.level as u16);
        query.response.write_string(&character.profession);
    }
    query.finish_response();
    Ok(())
}

pub async fn get_kill_statistics(
    db: &mut DatabaseSession,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    let mut request = query.request();
    let world_name = request.read_string(30);

    let world_id = store::worlds::world_id(db, &world_name).await?;
    let Some(world_id) = world_id else {
        query.failed();
        return Ok(());
    };

    let stats = store::info::kill_statistics(db, world_id).await?;

    query.begin_response(QueryStatus::Ok);
    let count = stats.len().min(u16::MAX as usize);
    query.response.write_u16(count as u16);
    for entry in &stats[..count] {
        query.response.write_string(&entry.race_name);
        query.response.write_u32(entry.players_killed as u32);
        query.response.write_u32(entry.times_killed as u32);
    }
    query.finish_response();
    Ok(())
}
