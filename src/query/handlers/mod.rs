//! Request handlers.
//!
//! A handler extracts parameters from the request view, runs store
//! calls (inside one transaction scope when the operation is compound)
//! and settles the query status: OK or ERROR with a handler-local code
//! for domain outcomes, FAILED for malformed requests. A database
//! failure propagates as `Err`, which leaves the status PENDING so the
//! worker retries after a checkpoint; for that reason the response is
//! only written after all database work succeeded.
//!
//! Inside a transaction, domain bails roll back explicitly before the
//! response is written; `?` bails rely on the worker's safety-net
//! rollback.

mod account;
mod houses;
mod login;
mod moderation;
mod world;

use tracing::error;

use crate::db::DatabaseSession;
use crate::error::QueryManagerError;
use crate::query::worker::SharedHostCache;
use crate::query::{Query, QueryKind};
use crate::store::BanishmentStatus;

/// Route a query to its handler. Unhandled kinds leave the status
/// PENDING, which the worker's retry loop converts to FAILED.
pub async fn dispatch(
    db: &mut DatabaseSession,
    hosts: &SharedHostCache,
    kind: QueryKind,
    query: &mut Query,
) -> Result<(), QueryManagerError> {
    match kind {
        QueryKind::InternalResolveWorld => login::internal_resolve_world(db, query).await,
        QueryKind::CheckAccountPassword => login::check_account_password(db, query).await,
        QueryKind::LoginAccount => login::login_account(db, hosts, query).await,
        QueryKind::LoginGame => login::login_game(db, query).await,
        QueryKind::LogoutGame => login::logout_game(db, query).await,
        QueryKind::SetNamelock => moderation::set_namelock(db, query).await,
        QueryKind::BanishAccount => moderation::banish_account(db, query).await,
        QueryKind::SetNotation => moderation::set_notation(db, query).await,
        QueryKind::ReportStatement => moderation::report_statement(db, query).await,
        QueryKind::BanishIpAddress => moderation::banish_ip_address(db, query).await,
        QueryKind::LogCharacterDeath => world::log_character_death(db, query).await,
        QueryKind::AddBuddy => world::add_buddy(db, query).await,
        QueryKind::RemoveBuddy => world::remove_buddy(db, query).await,
        QueryKind::DecrementIsOnline => world::decrement_is_online(db, query).await,
        QueryKind::FinishAuctions => houses::finish_auctions(db, query).await,
        QueryKind::TransferHouses => houses::transfer_houses(db, query).await,
        QueryKind::EvictFreeAccounts => houses::evict_free_accounts(db, query).await,
        QueryKind::EvictDeletedCharacters => houses::evict_deleted_characters(db, query).await,
        QueryKind::EvictExGuildleaders => houses::evict_ex_guildleaders(db, query).await,
        QueryKind::InsertHouseOwner => houses::insert_house_owner(db, query).await,
        QueryKind::UpdateHouseOwner => houses::update_house_owner(db, query).await,
        QueryKind::DeleteHouseOwner => houses::delete_house_owner(db, query).await,
        QueryKind::GetHouseOwners => houses::get_house_owners(db, query).await,
        QueryKind::GetAuctions => houses::get_auctions(db, query).await,
        QueryKind::StartAuction => houses::start_auction(db, query).await,
        QueryKind::InsertHouses => houses::insert_houses(db, query).await,
        QueryKind::ClearIsOnline => world::clear_is_online(db, query).await,
        QueryKind::CreatePlayerlist => world::create_playerlist(db, query).await,
        QueryKind::LogKilledCreatures => world::log_killed_creatures(db, query).await,
        QueryKind::LoadPlayers => world::load_players(db, query).await,
        QueryKind::ExcludeFromAuctions => houses::exclude_from_auctions(db, query).await,
        QueryKind::CancelHouseTransfer => houses::cancel_house_transfer(db, query).await,
        QueryKind::LoadWorldConfig => world::load_world_config(db, hosts, query).await,
        QueryKind::CreateAccount => account::create_account(db, query).await,
        QueryKind::CreateCharacter => account::create_character(db, query).await,
        QueryKind::GetAccountSummary => account::get_account_summary(db, query).await,
        QueryKind::GetCharacterProfile => account::get_character_profile(db, query).await,
        QueryKind::GetWorlds => world::get_worlds(db, query).await,
        QueryKind::GetOnlineCharacters => world::get_online_characters(db, query).await,
        QueryKind::GetKillStatistics => world::get_kill_statistics(db, query).await,
        QueryKind::Login | QueryKind::LoginAdmin => {
            // Handled (or rejected) at the connection gate; a worker
            // should never see these.
            error!("query {} reached the worker pool", kind.name());
            Ok(())
        }
    }
}

/// Dotted-quad IPv4 text to host-order integer.
pub(crate) fn parse_ip(text: &str) -> Option<u32> {
    text.parse::<std::net::Ipv4Addr>().ok().map(u32::from)
}

/// Escalation policy for repeated offenses: a standing final warning
/// makes the next banishment permanent; more than five banishments (or
/// a caller-requested final warning) set the final warning and stretch
/// the duration to at least 30 days, doubling it otherwise.
pub(crate) fn compound_banishment(
    status: BanishmentStatus,
    days: &mut i32,
    final_warning: &mut bool,
) {
    if status.final_warning {
        *final_warning = false;
        *days = 0; // permanent
    } else if status.times_banished > 5 || *final_warning {
        *final_warning = true;
        if *days < 30 {
            *days = 30;
        } else {
            *days *= 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_parsing() {
        assert_eq!(parse_ip("127.0.0.1"), Some(0x7F00_0001));
        assert_eq!(parse_ip("255.255.255.255"), Some(u32::MAX));
        assert_eq!(parse_ip(""), None);
        assert_eq!(parse_ip("1.2.3"), None);
        assert_eq!(parse_ip("256.0.0.1"), None);
    }

    #[test]
    fn compounding_standing_final_warning_is_permanent() {
        let status = BanishmentStatus {
            banished: false,
            final_warning: true,
            times_banished: 2,
        };
        let mut days = 7;
        let mut final_warning = false;
        compound_banishment(status, &mut days, &mut final_warning);
        assert_eq!(days, 0);
        assert!(!final_warning);
    }

    #[test]
    fn compounding_repeat_offender_gets_final_warning() {
        let status = BanishmentStatus {
            banished: false,
            final_warning: false,
            times_banished: 6,
        };
        let mut days = 7;
        let mut final_warning = false;
        compound_banishment(status, &mut days, &mut final_warning);
        assert_eq!(days, 30);
        assert!(final_warning);

        // A longer request doubles instead of clamping to 30.
        let mut days = 45;
        let mut final_warning = false;
        compound_banishment(status, &mut days, &mut final_warning);
        assert_eq!(days, 90);
        assert!(final_warning);
    }

    #[test]
    fn compounding_first_offense_keeps_requested_days() {
        let status = BanishmentStatus::default();
        let mut days = 7;
        let mut final_warning = false;
        compound_banishment(status, &mut days, &mut final_warning);
        assert_eq!(days, 7);
        assert!(!final_warning);
    }

    #[test]
    fn compounding_requested_final_warning_stretches_duration() {
        let status = BanishmentStatus::default();
        let mut days = 7;
        let mut final_warning = true;
        compound_banishment(status, &mut days, &mut final_warning);
        assert_eq!(days, 30);
        assert!(final_warning);
    }
}
