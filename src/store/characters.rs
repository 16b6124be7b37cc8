use crate::db::{DatabaseSession, now_unix};
use crate::error::QueryManagerError;
use crate::types::RowValues;

use super::{
    AccountBuddy, CharacterEndpoint, CharacterIndexEntry, CharacterLoginData, CharacterProfile,
    CharacterSummary, insert_ignore, round_seconds_to_days, row_bool, row_i32, row_text,
};

pub async fn character_name_exists(
    db: &mut DatabaseSession,
    name: &str,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT 1 FROM Characters WHERE Name = $1::TEXT",
            &[RowValues::Text(name.to_string())],
        )
        .await?;
    Ok(!result.is_empty())
}

pub async fn create_character(
    db: &mut DatabaseSession,
    world_id: i32,
    account_id: i32,
    name: &str,
    sex: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO Characters (WorldID, AccountID, Name, Sex) \
         VALUES ($1::INTEGER, $2::INTEGER, $3::TEXT, $4::INTEGER)",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(account_id)),
            RowValues::Text(name.to_string()),
            RowValues::Int(i64::from(sex)),
        ],
    )
    .await?;
    Ok(())
}

/// Character id by name within a world. `None` when absent.
pub async fn character_id(
    db: &mut DatabaseSession,
    world_id: i32,
    name: &str,
) -> Result<Option<i32>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT CharacterID FROM Characters \
             WHERE WorldID = $1::INTEGER AND Name = $2::TEXT",
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Text(name.to_string()),
            ],
        )
        .await?;
    Ok(result.first().map(|row| row_i32(row, 0)))
}

pub async fn character_login_data(
    db: &mut DatabaseSession,
    name: &str,
) -> Result<Option<CharacterLoginData>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT WorldID, CharacterID, AccountID, Name,\
                 Sex, Guild, Rank, Title, Deleted\
             FROM Characters WHERE Name = $1::TEXT",
            &[RowValues::Text(name.to_string())],
        )
        .await?;
    Ok(result.first().map(|row| CharacterLoginData {
        world_id: row_i32(row, 0),
        character_id: row_i32(row, 1),
        account_id: row_i32(row, 2),
        name: row_text(row, 3),
        sex: row_i32(row, 4),
        guild: row_text(row, 5),
        rank: row_text(row, 6),
        title: row_text(row, 7),
        deleted: row_bool(row, 8),
    }))
}

/// Public profile by name. Characters holding the NO_STATISTICS right
/// are invisible here.
pub async fn character_profile(
    db: &mut DatabaseSession,
    name: &str,
) -> Result<Option<CharacterProfile>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT C.Name, W.Name, C.Sex, C.Guild, C.Rank, C.Title, C.Level,\
                 C.Profession, C.Residence, C.LastLoginTime, C.IsOnline,\
                 C.Deleted, GREATEST(A.PremiumEnd - $1::INTEGER, 0)\
             FROM Characters AS C\
             LEFT JOIN Worlds AS W ON W.WorldID = C.WorldID\
             LEFT JOIN Accounts AS A ON A.AccountID = C.AccountID\
             LEFT JOIN CharacterRights AS R\
                 ON R.CharacterID = C.CharacterID\
                 AND R.RightName = 'NO_STATISTICS'\
             WHERE C.Name = $2::TEXT AND R.RightName IS NULL",
            &[RowValues::Int(now_unix()), RowValues::Text(name.to_string())],
        )
        .await?;
    Ok(result.first().map(|row| CharacterProfile {
        name: row_text(row, 0),
        world: row_text(row, 1),
        sex: row_i32(row, 2),
        guild: row_text(row, 3),
        rank: row_text(row, 4),
        title: row_text(row, 5),
        level: row_i32(row, 6),
        profession: row_text(row, 7),
        residence: row_text(row, 8),
        last_login: row_i32(row, 9),
        online: row_i32(row, 10) != 0,
        deleted: row_bool(row, 11),
        premium_days: round_seconds_to_days(row_i32(row, 12)),
    }))
}

pub async fn character_right(
    db: &mut DatabaseSession,
    character_id: i32,
    right: &str,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT 1 FROM CharacterRights \
             WHERE CharacterID = $1::INTEGER AND RightName = $2::TEXT",
            &[
                RowValues::Int(i64::from(character_id)),
                RowValues::Text(right.to_string()),
            ],
        )
        .await?;
    Ok(!result.is_empty())
}

pub async fn character_rights(
    db: &mut DatabaseSession,
    character_id: i32,
) -> Result<Vec<String>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT RightName FROM CharacterRights WHERE CharacterID = $1::INTEGER",
            &[RowValues::Int(i64::from(character_id))],
        )
        .await?;
    Ok(result.rows.iter().map(|row| row_text(row, 0)).collect())
}

pub async fn character_summaries(
    db: &mut DatabaseSession,
    account_id: i32,
) -> Result<Vec<CharacterSummary>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT C.Name, W.Name, C.Level, C.Profession, C.IsOnline, C.Deleted\
             FROM Characters AS C\
             LEFT JOIN Worlds AS W ON W.WorldID = C.WorldID\
             WHERE C.AccountID = $1::INTEGER",
            &[RowValues::Int(i64::from(account_id))],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| CharacterSummary {
            name: row_text(row, 0),
            world: row_text(row, 1),
            level: row_i32(row, 2),
            profession: row_text(row, 3),
            online: row_i32(row, 4) != 0,
            deleted: row_bool(row, 5),
        })
        .collect())
}

pub async fn character_endpoints(
    db: &mut DatabaseSession,
    account_id: i32,
) -> Result<Vec<CharacterEndpoint>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT C.Name, W.Name, W.Host, W.Port\
             FROM Characters AS C\
             INNER JOIN Worlds AS W ON W.WorldID = C.WorldID\
             WHERE C.AccountID = $1::INTEGER",
            &[RowValues::Int(i64::from(account_id))],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| CharacterEndpoint {
            name: row_text(row, 0),
            world_name: row_text(row, 1),
            world_host: row_text(row, 2),
            world_port: row_i32(row, 3),
        })
        .collect())
}

pub async fn is_character_online(
    db: &mut DatabaseSession,
    character_id: i32,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT IsOnline FROM Characters WHERE CharacterID = $1::INTEGER",
            &[RowValues::Int(i64::from(character_id))],
        )
        .await?;
    Ok(result.first().is_some_and(|row| row_i32(row, 0) != 0))
}

/// Whether the character leads a guild: non-empty guild, rank "Leader".
pub async fn guild_leader_status(
    db: &mut DatabaseSession,
    world_id: i32,
    character_id: i32,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT Guild, Rank FROM Characters \
             WHERE WorldID = $1::INTEGER AND CharacterID = $2::INTEGER",
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Int(i64::from(character_id)),
            ],
        )
        .await?;
    Ok(result.first().is_some_and(|row| {
        let guild = row_text(row, 0);
        let rank = row_text(row, 1);
        !guild.is_empty() && rank.eq_ignore_ascii_case("Leader")
    }))
}

// The world id checks on the online-state updates keep one world from
// touching another world's characters; the character id alone is unique.

pub async fn increment_is_online(
    db: &mut DatabaseSession,
    world_id: i32,
    character_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "UPDATE Characters SET IsOnline = IsOnline + 1 \
         WHERE WorldID = $1::INTEGER AND CharacterID = $2::INTEGER",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(character_id)),
        ],
    )
    .await?;
    Ok(())
}

pub async fn decrement_is_online(
    db: &mut DatabaseSession,
    world_id: i32,
    character_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "UPDATE Characters SET IsOnline = IsOnline - 1 \
         WHERE WorldID = $1::INTEGER AND CharacterID = $2::INTEGER",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(character_id)),
        ],
    )
    .await?;
    Ok(())
}

/// Zero every online counter for a world, returning how many characters
/// were affected.
pub async fn clear_is_online(
    db: &mut DatabaseSession,
    world_id: i32,
) -> Result<i32, QueryManagerError> {
    let changes = db
        .execute_dml(
            "UPDATE Characters SET IsOnline = 0 \
             WHERE WorldID = $1::INTEGER AND IsOnline != 0",
            &[RowValues::Int(i64::from(world_id))],
        )
        .await?;
    Ok(i32::try_from(changes).unwrap_or(i32::MAX))
}

#[allow(clippy::too_many_arguments)]
pub async fn logout_character(
    db: &mut DatabaseSession,
    world_id: i32,
    character_id: i32,
    level: i32,
    profession: &str,
    residence: &str,
    last_login_time: i32,
    tutor_activities: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "UPDATE Characters \
         SET Level = $1::INTEGER,\
             Profession = $2::TEXT,\
             Residence = $3::TEXT,\
             LastLoginTime = $4::INTEGER,\
             TutorActivities = $5::INTEGER,\
             IsOnline = IsOnline - 1 \
         WHERE WorldID = $6::INTEGER AND CharacterID = $7::INTEGER",
        &[
            RowValues::Int(i64::from(level)),
            RowValues::Text(profession.to_string()),
            RowValues::Text(residence.to_string()),
            RowValues::Int(i64::from(last_login_time)),
            RowValues::Int(i64::from(tutor_activities)),
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(character_id)),
        ],
    )
    .await?;
    Ok(())
}

/// Page of the character index starting at `minimum_character_id`.
pub async fn character_index_entries(
    db: &mut DatabaseSession,
    world_id: i32,
    minimum_character_id: i32,
    max_entries: i32,
) -> Result<Vec<CharacterIndexEntry>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT CharacterID, Name FROM Characters \
             WHERE WorldID = $1::INTEGER AND CharacterID >= $2::INTEGER \
             ORDER BY CharacterID ASC LIMIT $3::INTEGER",
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Int(i64::from(minimum_character_id)),
                RowValues::Int(i64::from(max_entries)),
            ],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| CharacterIndexEntry {
            character_id: row_i32(row, 0),
            name: row_text(row, 1),
        })
        .collect())
}

/// The character must belong to the world or nothing is recorded.
#[allow(clippy::too_many_arguments)]
pub async fn insert_character_death(
    db: &mut DatabaseSession,
    world_id: i32,
    character_id: i32,
    level: i32,
    offender_id: i32,
    remark: &str,
    unjustified: bool,
    timestamp: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO CharacterDeaths (CharacterID, Level,\
             OffenderID, Remark, Unjustified, Timestamp) \
         SELECT $1::INTEGER, $2::INTEGER, $3::INTEGER, $4::TEXT, $5::INTEGER, $6::INTEGER \
             FROM Characters \
             WHERE WorldID = $7::INTEGER AND CharacterID = $8::INTEGER",
        &[
            RowValues::Int(i64::from(character_id)),
            RowValues::Int(i64::from(level)),
            RowValues::Int(i64::from(offender_id)),
            RowValues::Text(remark.to_string()),
            RowValues::Int(i64::from(unjustified)),
            RowValues::Int(i64::from(timestamp)),
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(character_id)),
        ],
    )
    .await?;
    Ok(())
}

/// Duplicate additions count as success.
pub async fn insert_buddy(
    db: &mut DatabaseSession,
    world_id: i32,
    account_id: i32,
    buddy_id: i32,
) -> Result<(), QueryManagerError> {
    let (prefix, suffix) = insert_ignore(db.dialect());
    let sql = format!(
        "{prefix} INTO Buddies (WorldID, AccountID, BuddyID) \
         SELECT $1::INTEGER, $2::INTEGER, $3::INTEGER \
             FROM Characters \
             WHERE WorldID = $4::INTEGER AND CharacterID = $5::INTEGER{suffix}"
    );
    db.execute_dml(
        &sql,
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(account_id)),
            RowValues::Int(i64::from(buddy_id)),
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(buddy_id)),
        ],
    )
    .await?;
    Ok(())
}

/// Deleting an absent buddy counts as success.
pub async fn delete_buddy(
    db: &mut DatabaseSession,
    world_id: i32,
    account_id: i32,
    buddy_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "DELETE FROM Buddies \
         WHERE WorldID = $1::INTEGER AND AccountID = $2::INTEGER AND BuddyID = $3::INTEGER",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(account_id)),
            RowValues::Int(i64::from(buddy_id)),
        ],
    )
    .await?;
    Ok(())
}

pub async fn buddies(
    db: &mut DatabaseSession,
    world_id: i32,
    account_id: i32,
) -> Result<Vec<AccountBuddy>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT B.BuddyID, C.Name\
             FROM Buddies AS B\
             INNER JOIN Characters AS C ON C.CharacterID = B.BuddyID\
             WHERE B.WorldID = $1::INTEGER AND B.AccountID = $2::INTEGER",
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Int(i64::from(account_id)),
            ],
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .map(|row| AccountBuddy {
            character_id: row_i32(row, 0),
            name: row_text(row, 1),
        })
        .collect())
}

pub async fn world_invitation(
    db: &mut DatabaseSession,
    world_id: i32,
    character_id: i32,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT 1 FROM WorldInvitations \
             WHERE WorldID = $1::INTEGER AND CharacterID = $2::INTEGER",
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Int(i64::from(character_id)),
            ],
        )
        .await?;
    Ok(!result.is_empty())
}
