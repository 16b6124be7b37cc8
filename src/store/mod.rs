//! Typed accessors over the business tables.
//!
//! Every function takes the worker's session and speaks plain SQL with
//! `$N` placeholders and explicit casts; the session's dialect rewrite
//! adapts it per backend. Time always travels as Unix seconds passed in
//! as a parameter, so the queries stay portable and testable.
//!
//! A `Result::Err` from any of these means the database itself failed
//! and the caller should leave the query PENDING for a retry; "row not
//! found" is an `Ok` carrying `None`, `false` or an empty list.

pub mod accounts;
pub mod banishments;
pub mod characters;
pub mod houses;
pub mod info;
pub mod worlds;

use crate::db::SqlDialect;
use crate::results::DbRow;
use crate::types::RowValues;

#[derive(Debug, Clone, Default)]
pub struct World {
    pub name: String,
    pub kind: i32,
    pub num_players: i32,
    pub max_players: i32,
    pub online_record: i32,
    pub online_record_timestamp: i32,
}

#[derive(Debug, Clone, Default)]
pub struct WorldConfig {
    pub world_id: i32,
    pub kind: i32,
    pub reboot_time: i32,
    pub host: String,
    pub port: i32,
    pub max_players: i32,
    pub premium_player_buffer: i32,
    pub max_newbies: i32,
    pub premium_newbie_buffer: i32,
}

#[derive(Debug, Clone, Default)]
pub struct Account {
    pub account_id: i32,
    pub email: String,
    pub auth: Vec<u8>,
    pub premium_days: i32,
    pub pending_premium_days: i32,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AccountBuddy {
    pub character_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterEndpoint {
    pub name: String,
    pub world_name: String,
    pub world_host: String,
    pub world_port: i32,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterSummary {
    pub name: String,
    pub world: String,
    pub level: i32,
    pub profession: String,
    pub online: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterLoginData {
    pub world_id: i32,
    pub character_id: i32,
    pub account_id: i32,
    pub name: String,
    pub sex: i32,
    pub guild: String,
    pub rank: String,
    pub title: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterProfile {
    pub name: String,
    pub world: String,
    pub sex: i32,
    pub guild: String,
    pub rank: String,
    pub title: String,
    pub level: i32,
    pub profession: String,
    pub residence: String,
    pub last_login: i32,
    pub premium_days: i32,
    pub online: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterIndexEntry {
    pub character_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct HouseAuction {
    pub house_id: i32,
    pub bidder_id: i32,
    pub bidder_name: String,
    pub bid_amount: i32,
    pub finish_time: i32,
}

#[derive(Debug, Clone, Default)]
pub struct HouseTransfer {
    pub house_id: i32,
    pub new_owner_id: i32,
    pub new_owner_name: String,
    pub price: i32,
}

#[derive(Debug, Clone, Default)]
pub struct HouseEviction {
    pub house_id: i32,
    pub owner_id: i32,
}

#[derive(Debug, Clone, Default)]
pub struct HouseOwner {
    pub house_id: i32,
    pub owner_id: i32,
    pub owner_name: String,
    pub paid_until: i32,
}

#[derive(Debug, Clone, Default)]
pub struct House {
    pub house_id: i32,
    pub name: String,
    pub rent: i32,
    pub description: String,
    pub size: i32,
    pub position_x: i32,
    pub position_y: i32,
    pub position_z: i32,
    pub town: String,
    pub guild_house: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NamelockStatus {
    pub namelocked: bool,
    pub approved: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BanishmentStatus {
    pub banished: bool,
    pub final_warning: bool,
    pub times_banished: i32,
}

#[derive(Debug, Clone, Default)]
pub struct StatementRow {
    pub timestamp: i32,
    pub statement_id: i32,
    pub character_id: i32,
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct KillStatistics {
    pub race_name: String,
    pub times_killed: i32,
    pub players_killed: i32,
}

#[derive(Debug, Clone, Default)]
pub struct OnlineCharacter {
    pub name: String,
    pub level: i32,
    pub profession: String,
}

// Row extraction helpers, indexed by column position because unquoted
// identifier case differs across backends. Missing or mistyped columns
// yield the zero value; the adapter has already logged the mismatch.

pub(crate) fn row_i32(row: &DbRow, index: usize) -> i32 {
    row.get_by_index(index)
        .and_then(RowValues::as_i32)
        .unwrap_or(0)
}

pub(crate) fn row_text(row: &DbRow, index: usize) -> String {
    row.get_by_index(index)
        .and_then(RowValues::as_text)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn row_bool(row: &DbRow, index: usize) -> bool {
    row.get_by_index(index)
        .and_then(RowValues::as_bool)
        .unwrap_or(false)
}

pub(crate) fn row_blob(row: &DbRow, index: usize) -> Vec<u8> {
    row.get_by_index(index)
        .and_then(RowValues::as_blob)
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

/// Round a non-negative duration in seconds up to whole days.
#[must_use]
pub fn round_seconds_to_days(seconds: i32) -> i32 {
    (seconds + 86_399) / 86_400
}

/// Duplicate-tolerant INSERT spelling per dialect: prefix and suffix
/// around the normal statement.
#[must_use]
pub(crate) fn insert_ignore(dialect: SqlDialect) -> (&'static str, &'static str) {
    match dialect {
        SqlDialect::Sqlite => ("INSERT OR IGNORE", ""),
        SqlDialect::Mysql => ("INSERT IGNORE", ""),
        SqlDialect::Postgres => ("INSERT", " ON CONFLICT DO NOTHING"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_rounding_rounds_up() {
        assert_eq!(round_seconds_to_days(0), 0);
        assert_eq!(round_seconds_to_days(1), 1);
        assert_eq!(round_seconds_to_days(86_400), 1);
        assert_eq!(round_seconds_to_days(86_401), 2);
    }
}
