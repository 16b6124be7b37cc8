use crate::db::{DatabaseSession, now_unix};
use crate::error::QueryManagerError;
use crate::types::RowValues;

use super::{BanishmentStatus, NamelockStatus, StatementRow, insert_ignore, row_bool, row_i32};

pub async fn namelock_status(
    db: &mut DatabaseSession,
    character_id: i32,
) -> Result<NamelockStatus, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT Approved FROM Namelocks WHERE CharacterID = $1::INTEGER",
            &[RowValues::Int(i64::from(character_id))],
        )
        .await?;
    Ok(match result.first() {
        Some(row) => NamelockStatus {
            namelocked: true,
            approved: row_bool(row, 0),
        },
        None => NamelockStatus::default(),
    })
}

/// A namelock pending approval blocks the character; an approved one is
/// resolved and does not.
pub async fn is_character_namelocked(
    db: &mut DatabaseSession,
    character_id: i32,
) -> Result<bool, QueryManagerError> {
    let status = namelock_status(db, character_id).await?;
    Ok(status.namelocked && !status.approved)
}

pub async fn insert_namelock(
    db: &mut DatabaseSession,
    character_id: i32,
    ip_address: u32,
    gamemaster_id: i32,
    reason: &str,
    comment: &str,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO Namelocks (CharacterID, IPAddress, GamemasterID, Reason, Comment) \
         VALUES ($1::INTEGER, $2::BIGINT, $3::INTEGER, $4::TEXT, $5::TEXT)",
        &[
            RowValues::Int(i64::from(character_id)),
            RowValues::Int(i64::from(ip_address)),
            RowValues::Int(i64::from(gamemaster_id)),
            RowValues::Text(reason.to_string()),
            RowValues::Text(comment.to_string()),
        ],
    )
    .await?;
    Ok(())
}

/// An `Until` equal to `Issued` marks a permanent banishment.
pub async fn is_account_banished(
    db: &mut DatabaseSession,
    account_id: i32,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT 1 FROM Banishments \
             WHERE AccountID = $1::INTEGER \
                 AND (Until = Issued OR Until > $2::INTEGER)",
            &[RowValues::Int(i64::from(account_id)), RowValues::Int(now_unix())],
        )
        .await?;
    Ok(!result.is_empty())
}

/// Banishment history of the character's account: whether any ban is
/// active, whether a final warning was ever issued, and how many bans
/// accumulated. Feeds the compounding policy.
pub async fn banishment_status(
    db: &mut DatabaseSession,
    character_id: i32,
) -> Result<BanishmentStatus, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT B.FinalWarning,\
                 CASE WHEN B.Until = B.Issued OR B.Until > $1::INTEGER THEN 1 ELSE 0 END\
             FROM Banishments AS B\
             INNER JOIN Characters AS C ON C.AccountID = B.AccountID\
             WHERE C.CharacterID = $2::INTEGER",
            &[
                RowValues::Int(now_unix()),
                RowValues::Int(i64::from(character_id)),
            ],
        )
        .await?;

    let mut status = BanishmentStatus::default();
    for row in &result.rows {
        status.times_banished += 1;
        if row_bool(row, 0) {
            status.final_warning = true;
        }
        if row_bool(row, 1) {
            status.banished = true;
        }
    }
    Ok(status)
}

/// Insert a banishment against the character's account and return the
/// new banishment id. Duration zero means permanent (`Until = Issued`).
#[allow(clippy::too_many_arguments)]
pub async fn insert_banishment(
    db: &mut DatabaseSession,
    character_id: i32,
    ip_address: u32,
    gamemaster_id: i32,
    reason: &str,
    comment: &str,
    final_warning: bool,
    duration_secs: i32,
) -> Result<i32, QueryManagerError> {
    let now = now_unix();
    let id = db
        .execute_insert(
            "INSERT INTO Banishments (AccountID, IPAddress, GamemasterID,\
                 Reason, Comment, FinalWarning, Issued, Until) \
             SELECT AccountID, $1::BIGINT, $2::INTEGER, $3::TEXT, $4::TEXT,\
                 $5::INTEGER, $6::INTEGER, $7::INTEGER \
                 FROM Characters WHERE CharacterID = $8::INTEGER",
            &[
                RowValues::Int(i64::from(ip_address)),
                RowValues::Int(i64::from(gamemaster_id)),
                RowValues::Text(reason.to_string()),
                RowValues::Text(comment.to_string()),
                RowValues::Int(i64::from(final_warning)),
                RowValues::Int(now),
                RowValues::Int(now + i64::from(duration_secs)),
                RowValues::Int(i64::from(character_id)),
            ],
            "BanishmentID",
        )
        .await?;
    Ok(i32::try_from(id).unwrap_or(i32::MAX))
}

pub async fn notation_count(
    db: &mut DatabaseSession,
    character_id: i32,
) -> Result<i32, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT COUNT(*) FROM Notations WHERE CharacterID = $1::INTEGER",
            &[RowValues::Int(i64::from(character_id))],
        )
        .await?;
    Ok(result.first().map_or(0, |row| row_i32(row, 0)))
}

pub async fn insert_notation(
    db: &mut DatabaseSession,
    character_id: i32,
    ip_address: u32,
    gamemaster_id: i32,
    reason: &str,
    comment: &str,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO Notations (CharacterID, IPAddress, GamemasterID, Reason, Comment) \
         VALUES ($1::INTEGER, $2::BIGINT, $3::INTEGER, $4::TEXT, $5::TEXT)",
        &[
            RowValues::Int(i64::from(character_id)),
            RowValues::Int(i64::from(ip_address)),
            RowValues::Int(i64::from(gamemaster_id)),
            RowValues::Text(reason.to_string()),
            RowValues::Text(comment.to_string()),
        ],
    )
    .await?;
    Ok(())
}

pub async fn is_ip_banished(
    db: &mut DatabaseSession,
    ip_address: u32,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT 1 FROM IPBanishments \
             WHERE IPAddress = $1::BIGINT \
                 AND (Until = Issued OR Until > $2::INTEGER)",
            &[RowValues::Int(i64::from(ip_address)), RowValues::Int(now_unix())],
        )
        .await?;
    Ok(!result.is_empty())
}

pub async fn insert_ip_banishment(
    db: &mut DatabaseSession,
    character_id: i32,
    ip_address: u32,
    gamemaster_id: i32,
    reason: &str,
    comment: &str,
    duration_secs: i32,
) -> Result<(), QueryManagerError> {
    let now = now_unix();
    db.execute_dml(
        "INSERT INTO IPBanishments (CharacterID, IPAddress,\
             GamemasterID, Reason, Comment, Issued, Until) \
         VALUES ($1::INTEGER, $2::BIGINT, $3::INTEGER, $4::TEXT, $5::TEXT,\
             $6::INTEGER, $7::INTEGER)",
        &[
            RowValues::Int(i64::from(character_id)),
            RowValues::Int(i64::from(ip_address)),
            RowValues::Int(i64::from(gamemaster_id)),
            RowValues::Text(reason.to_string()),
            RowValues::Text(comment.to_string()),
            RowValues::Int(now),
            RowValues::Int(now + i64::from(duration_secs)),
        ],
    )
    .await?;
    Ok(())
}

/// Whether a statement already sits in the context table (and therefore
/// has been reported before).
pub async fn is_statement_reported(
    db: &mut DatabaseSession,
    world_id: i32,
    statement: &StatementRow,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT 1 FROM Statements \
             WHERE WorldID = $1::INTEGER AND Timestamp = $2::INTEGER \
                 AND StatementID = $3::INTEGER",
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Int(i64::from(statement.timestamp)),
                RowValues::Int(i64::from(statement.statement_id)),
            ],
        )
        .await?;
    Ok(!result.is_empty())
}

/// Insert context statements. Different reports frequently overlap in
/// context, so duplicates are ignored rather than rejected.
pub async fn insert_statements(
    db: &mut DatabaseSession,
    world_id: i32,
    statements: &[StatementRow],
) -> Result<(), QueryManagerError> {
    let (prefix, suffix) = insert_ignore(db.dialect());
    let sql = format!(
        "{prefix} INTO Statements (WorldID, Timestamp,\
             StatementID, CharacterID, Channel, Text) \
         VALUES ($1::INTEGER, $2::INTEGER, $3::INTEGER, $4::INTEGER, $5::TEXT, $6::TEXT){suffix}"
    );
    for statement in statements {
        if statement.statement_id == 0 {
            tracing::warn!("skipping statement without id");
            continue;
        }
        db.execute_dml(
            &sql,
            &[
                RowValues::Int(i64::from(world_id)),
                RowValues::Int(i64::from(statement.timestamp)),
                RowValues::Int(i64::from(statement.statement_id)),
                RowValues::Int(i64::from(statement.character_id)),
                RowValues::Text(statement.channel.clone()),
                RowValues::Text(statement.text.clone()),
            ],
        )
        .await?;
    }
    Ok(())
}

pub async fn insert_reported_statement(
    db: &mut DatabaseSession,
    world_id: i32,
    statement: &StatementRow,
    banishment_id: i32,
    reporter_id: i32,
    reason: &str,
    comment: &str,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO ReportedStatements (WorldID, Timestamp,\
             StatementID, CharacterID, BanishmentID, ReporterID, Reason, Comment) \
         VALUES ($1::INTEGER, $2::INTEGER, $3::INTEGER, $4::INTEGER, $5::INTEGER,\
             $6::INTEGER, $7::TEXT, $8::TEXT)",
        &[
            RowValues::Int(i64::from(world_id)),
            RowValues::Int(i64::from(statement.timestamp)),
            RowValues::Int(i64::from(statement.statement_id)),
            RowValues::Int(i64::from(statement.character_id)),
            RowValues::Int(i64::from(banishment_id)),
            RowValues::Int(i64::from(reporter_id)),
            RowValues::Text(reason.to_string()),
            RowValues::Text(comment.to_string()),
        ],
    )
    .await?;
    Ok(())
}
