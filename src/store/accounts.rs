use crate::db::{DatabaseSession, now_unix};
use crate::error::QueryManagerError;
use crate::types::RowValues;

use super::{Account, row_blob, row_bool, row_i32, row_text, round_seconds_to_days};

pub async fn account_number_exists(
    db: &mut DatabaseSession,
    account_id: i32,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT 1 FROM Accounts WHERE AccountID = $1::INTEGER",
            &[RowValues::Int(i64::from(account_id))],
        )
        .await?;
    Ok(!result.is_empty())
}

pub async fn account_email_exists(
    db: &mut DatabaseSession,
    email: &str,
) -> Result<bool, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT 1 FROM Accounts WHERE Email = $1::TEXT",
            &[RowValues::Text(email.to_string())],
        )
        .await?;
    Ok(!result.is_empty())
}

pub async fn create_account(
    db: &mut DatabaseSession,
    account_id: i32,
    email: &str,
    auth: &[u8],
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO Accounts (AccountID, Email, Auth) \
         VALUES ($1::INTEGER, $2::TEXT, $3::BYTEA)",
        &[
            RowValues::Int(i64::from(account_id)),
            RowValues::Text(email.to_string()),
            RowValues::Blob(auth.to_vec()),
        ],
    )
    .await?;
    Ok(())
}

/// Account row with premium time collapsed to remaining whole days.
/// `None` when the account does not exist.
pub async fn account_data(
    db: &mut DatabaseSession,
    account_id: i32,
) -> Result<Option<Account>, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT AccountID, Email, Auth,\
                 GREATEST(PremiumEnd - $1::INTEGER, 0),\
                 PendingPremiumDays, Deleted\
             FROM Accounts WHERE AccountID = $2::INTEGER",
            &[RowValues::Int(now_unix()), RowValues::Int(i64::from(account_id))],
        )
        .await?;
    Ok(result.first().map(|row| Account {
        account_id: row_i32(row, 0),
        email: row_text(row, 1),
        auth: row_blob(row, 2),
        premium_days: round_seconds_to_days(row_i32(row, 3)),
        pending_premium_days: row_i32(row, 4),
        deleted: row_bool(row, 5),
    }))
}

pub async fn account_online_characters(
    db: &mut DatabaseSession,
    account_id: i32,
) -> Result<i32, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT COUNT(*) FROM Characters \
             WHERE AccountID = $1::INTEGER AND IsOnline != 0",
            &[RowValues::Int(i64::from(account_id))],
        )
        .await?;
    Ok(result.first().map_or(0, |row| row_i32(row, 0)))
}

/// Move any pending premium days to the active balance.
pub async fn activate_pending_premium_days(
    db: &mut DatabaseSession,
    account_id: i32,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "UPDATE Accounts \
         SET PremiumEnd = GREATEST(PremiumEnd, $1::INTEGER) + PendingPremiumDays * 86400,\
             PendingPremiumDays = 0 \
         WHERE AccountID = $2::INTEGER AND PendingPremiumDays > 0",
        &[RowValues::Int(now_unix()), RowValues::Int(i64::from(account_id))],
    )
    .await?;
    Ok(())
}

/// Record a login attempt. Runs outside any transaction so the record
/// survives a rollback of the surrounding login operation.
pub async fn insert_login_attempt(
    db: &mut DatabaseSession,
    account_id: i32,
    ip_address: u32,
    failed: bool,
) -> Result<(), QueryManagerError> {
    db.execute_dml(
        "INSERT INTO LoginAttempts (AccountID, IPAddress, Timestamp, Failed) \
         VALUES ($1::INTEGER, $2::BIGINT, $3::INTEGER, $4::INTEGER)",
        &[
            RowValues::Int(i64::from(account_id)),
            RowValues::Int(i64::from(ip_address)),
            RowValues::Int(now_unix()),
            RowValues::Int(i64::from(failed)),
        ],
    )
    .await?;
    Ok(())
}

/// Failed attempts against an account inside a sliding window.
pub async fn account_failed_login_attempts(
    db: &mut DatabaseSession,
    account_id: i32,
    time_window_secs: i64,
) -> Result<i32, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT COUNT(*) FROM LoginAttempts \
             WHERE AccountID = $1::INTEGER \
                 AND Timestamp >= $2::INTEGER \
                 AND Failed != 0",
            &[
                RowValues::Int(i64::from(account_id)),
                RowValues::Int(now_unix() - time_window_secs),
            ],
        )
        .await?;
    Ok(result.first().map_or(0, |row| row_i32(row, 0)))
}

/// Failed attempts from an address inside a sliding window.
pub async fn ip_failed_login_attempts(
    db: &mut DatabaseSession,
    ip_address: u32,
    time_window_secs: i64,
) -> Result<i32, QueryManagerError> {
    let result = db
        .execute_select(
            "SELECT COUNT(*) FROM LoginAttempts \
             WHERE IPAddress = $1::BIGINT \
                 AND Timestamp >= $2::INTEGER \
                 AND Failed != 0",
            &[
                RowValues::Int(i64::from(ip_address)),
                RowValues::Int(now_unix() - time_window_secs),
            ],
        )
        .await?;
    Ok(result.first().map_or(0, |row| row_i32(row, 0)))
}
