use crate::db::{DatabaseSession, SqlDialect, now_unix};
use crate::error::QueryManagerError;
use crate::types::RowValues;

use super::{KillStatistics, OnlineCharacter, row_i32, row_text};

pub async fn kill_statistics(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Vec<KillStatistics>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT RaceName, TimesKilled, PlayersKilled \
             FROM KillStatistics WHERE WorldID = $1::INTEGER",
            &[RowValues::Int(i64::from(world_id))],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| KillStatistics {
            race_name: row_text(row, 0),
            times_killed: row_i32(row, 1),
            players_killed: row_i32(row, 2),
        })
        .collect())
}

/// Add per-race deltas to the accumulated statistics, inserting races
/// seen for the first time.
pub async fn merge_kill_statistics(
    db: &mut DatabaseSession,
    world_id: i32,
    stats: &[KillStatistics],
) -> Result<(), QueryManagerError> {
    let sql = match db.dialect() {
        SqlDialect::Mysql => {
            "INSERT INTO KillStatistics (WorldID, RaceName, TimesKilled, PlayersKilled) \
             VALUES ($1::INTEGER, $2::TEXT, $3::INTEGER, $4::INTEGER) \
             ON DUPLICATE KEY UPDATE \
                 TimesKilled = TimesKilled + VALUES(TimesKilled),\
                 PlayersKilled = PlayersKilled + VALUES(PlayersKilled)"
        }
        SqlDialect::Sqlite | SqlDialect::Postgres => {
            "INSERT INTO KillStatistics (WorldID, RaceName, TimesKilled, PlayersKilled) \
             VALUES ($1::INTEGER, $2::TEXT, $3::INTEGER, $4::INTEGER) \
             ON CONFLICT (WorldID, RaceName) DO UPDATE SET \
                 TimesKilled = KillStatistics.TimesKilled + EXCLUDED.TimesKilled,\
                 PlayersKilled = KillStatistics.PlayersKilled + EXCLUDED.PlayersKilled"
        }
    };

    for entry in stats {
        db.execute_dml(
            sql,
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Text(entry.race_name.clone()),
                RowValues::Int(i64::from(entry.times_killed)),
                RowValues::Int(i64::from(entry.players_killed)),
            ],
        )
        .await?;
    }
    Ok(())
}

pub async fn online_characters(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<Vec<OnlineCharacter>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT Name, Level, Profession \
             FROM OnlineCharacters WHERE WorldID = $1::INTEGER",
            &[RowValues::Int(i64::from(world_id))],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| OnlineCharacter {
            name: row_text(row, 0),
            level: row_i32(row, 1),
            profession: row_text(row, 2),
        })
        .collect())
}

pub async fn delete_online_characters(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "DELETE FROM OnlineCharacters WHERE WorldID = $1::INTEGER",
        &[RowValues::Int(i64::from(world_id))],
    )
    .await?;
    Ok(())
}

pub async fn insert_online_characters(
    db: &mut DatabaseSession,
    world_id: i32,
    characters: &[OnlineCharacter],
) -> Result<(), QueryManagerError> {
    for character in characters {
        db.execute_dml(
            "INSERT INTO OnlineCharacters (WorldID, Name, Level, Profession) \
             VALUES ($1::INTEGER, $2::TEXT, $3::INTEGER, $4::TEXT)",
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Text(character.name.clone()),
                RowValues::Int(i64::from(character.level)),
                RowValues::Text(character.profession.clone()),
            ],
        )
        .await?;
    }
    Ok(())
}

/// Raise the world's online high-water mark when `num_characters` beats
/// it; reports whether a new record was set.
pub async fn check_online_record(
    db: &mut DatabaseSession,
    world_id: i32,
    num_characters: i32,
) -> Result<bool, QueryManagerError> {
    let changes = db
        .execute_dml(
            "UPDATE Worlds SET OnlineRecord = $1::INTEGER,\
                 OnlineRecordTimestamp = $2::INTEGER \
             WHERE WorldID = $3::INTEGER AND OnlineRecord < $4::INTEGER",
            &[
                RowValues::Int(i64::from(num_characters)),
                RowValues::Int(now_unix()),
                RowValues::Int(i64::from(world_id)),
                RowValues::Int(i64::from(num_characters)),
            ],
        )
        .await?;
    Ok(changes > 0)
}
