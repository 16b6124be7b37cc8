use crate::db::DatabaseSession;
use crate::error::QueryManagerError;
use crate::types::RowValues;

use super::{World, WorldConfig, row_i32, row_text};

/// Look up a world id by name. `None` when the world does not exist.
pub async fn world_id(
    db: &mut DatabaseSession,
    name: &str,
) -> Result<Option<i32>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT WorldID FROM Worlds WHERE Name = $1::TEXT",
            &[RowValues::Text(name.to_string())],
        )
        .await?;
    Ok(result.first().map(|row| row_i32(row, 0)))
}

pub async fn worlds(db: &mut DatabaseSession) -> Result<Vec<World>, QueryManagerError> {
    let result = db
        .execute_select(
            "WITH N (WorldID, NumPlayers) AS (\
                 SELECT WorldID, COUNT(*) FROM OnlineCharacters GROUP BY WorldID\
             )\
             SELECT W.Name, W.Type, COALESCE(N.NumPlayers, 0), W.MaxPlayers,\
                 W.OnlineRecord, W.OnlineRecordTimestamp\
             FROM Worlds AS W\
             LEFT JOIN N ON W.WorldID = N.WorldID",
            &[],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| World {
            name: row_text(row, 0),
            kind: row_i32(row, 1),
            num_players: row_i32(row, 2),
            max_players: row_i32(row, 3),
            online_record: row_i32(row, 4),
            online_record_timestamp: row_i32(row, 5),
        })
        .collect())
}

/// Connection parameters a game server needs at boot. `None` when the
/// world does not exist.
pub async fn world_config(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Option<WorldConfig>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT WorldID, Type, RebootTime, Host, Port, MaxPlayers,\
                 PremiumPlayerBuffer, MaxNewbies, PremiumNewbieBuffer\
             FROM Worlds WHERE WorldID = $1::INTEGER",
            &[RowValues::Int(i64::from(world_id))],
        )
        .await?;
    Ok(result.first().map(|row| WorldConfig {
        world_id: row_i32(row, 0),
        kind: row_i32(row, 1),
        reboot_time: row_i32(row, 2),
        host: row_text(row, 3),
        port: row_i32(row, 4),
        max_players: row_i32(row, 5),
        premium_player_buffer: row_i32(row, 6),
        max_newbies: row_i32(row, 7),
        premium_newbie_buffer: row_i32(row, 8),
    }))
}
