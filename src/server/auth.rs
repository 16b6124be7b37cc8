//! Connection roles and the per-role query whitelist.
//!
//! The first request on every connection is a LOGIN carrying the shared
//! password and the client's application type. After that, each request
//! type is checked against the role's whitelist; game worlds get the
//! full business set, the login server only account login, and the web
//! front-end the public read-mostly set.

use crate::query::QueryKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    Game,
    Login,
    Web,
}

impl ApplicationType {
    #[must_use]
    pub fn from_code(code: u8) -> Option<ApplicationType> {
        match code {
            1 => Some(ApplicationType::Game),
            2 => Some(ApplicationType::Login),
            3 => Some(ApplicationType::Web),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ApplicationType::Game => "game server",
            ApplicationType::Login => "login server",
            ApplicationType::Web => "web server",
        }
    }
}

/// Whether an authorized connection of this role may issue the query.
#[must_use]
pub fn allowed(application: ApplicationType, kind: QueryKind) -> bool {
    match application {
        ApplicationType::Game => matches!(
            kind,
            QueryKind::LoginGame
                | QueryKind::LogoutGame
                | QueryKind::SetNamelock
                | QueryKind::BanishAccount
                | QueryKind::SetNotation
                | QueryKind::ReportStatement
                | QueryKind::BanishIpAddress
                | QueryKind::LogCharacterDeath
                | QueryKind::AddBuddy
                | QueryKind::RemoveBuddy
                | QueryKind::DecrementIsOnline
                | QueryKind::FinishAuctions
                | QueryKind::TransferHouses
                | QueryKind::EvictFreeAccounts
                | QueryKind::EvictDeletedCharacters
                | QueryKind::EvictExGuildleaders
                | QueryKind::InsertHouseOwner
                | QueryKind::UpdateHouseOwner
                | QueryKind::DeleteHouseOwner
                | QueryKind::GetHouseOwners
                | QueryKind::GetAuctions
                | QueryKind::StartAuction
                | QueryKind::InsertHouses
                | QueryKind::ClearIsOnline
                | QueryKind::CreatePlayerlist
                | QueryKind::LogKilledCreatures
                | QueryKind::LoadPlayers
                | QueryKind::ExcludeFromAuctions
                | QueryKind::CancelHouseTransfer
                | QueryKind::LoadWorldConfig
        ),
        ApplicationType::Login => matches!(kind, QueryKind::LoginAccount),
        ApplicationType::Web => matches!(
            kind,
            QueryKind::CheckAccountPassword
                | QueryKind::CreateAccount
                | QueryKind::CreateCharacter
                | QueryKind::GetAccountSummary
                | QueryKind::GetCharacterProfile
                | QueryKind::GetWorlds
                | QueryKind::GetOnlineCharacters
                | QueryKind::GetKillStatistics
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_codes() {
        assert_eq!(ApplicationType::from_code(1), Some(ApplicationType::Game));
        assert_eq!(ApplicationType::from_code(2), Some(ApplicationType::Login));
        assert_eq!(ApplicationType::from_code(3), Some(ApplicationType::Web));
        assert_eq!(ApplicationType::from_code(0), None);
        assert_eq!(ApplicationType::from_code(4), None);
    }

    #[test]
    fn login_role_only_gets_account_login() {
        assert!(allowed(ApplicationType::Login, QueryKind::LoginAccount));
        assert!(!allowed(ApplicationType::Login, QueryKind::GetWorlds));
        assert!(!allowed(ApplicationType::Login, QueryKind::LoginGame));
    }

    #[test]
    fn web_role_is_read_mostly() {
        assert!(allowed(ApplicationType::Web, QueryKind::GetWorlds));
        assert!(allowed(ApplicationType::Web, QueryKind::CreateAccount));
        assert!(!allowed(ApplicationType::Web, QueryKind::BanishAccount));
        assert!(!allowed(ApplicationType::Web, QueryKind::LoginAccount));
    }

    #[test]
    fn game_role_excludes_web_and_internal_queries() {
        assert!(allowed(ApplicationType::Game, QueryKind::LoginGame));
        assert!(allowed(ApplicationType::Game, QueryKind::CreatePlayerlist));
        assert!(!allowed(ApplicationType::Game, QueryKind::CreateAccount));
        assert!(!allowed(ApplicationType::Game, QueryKind::InternalResolveWorld));
        assert!(!allowed(ApplicationType::Game, QueryKind::Login));
        assert!(!allowed(ApplicationType::Game, QueryKind::LoginAdmin));
    }
}
