//! The query object and its lifecycle.
//!
//! A [`Query`] is one request/response exchange. The connection task
//! builds it from a received frame, hands it to the worker pool through
//! the [`queue`], and receives it back finished over a oneshot channel.
//! Request bytes stay untouched until a handler commits to a terminal
//! status, so a retried handler replays the original payload; the
//! response is assembled fresh at finalization time.

pub mod handlers;
pub mod queue;
pub mod worker;

use crate::codec::{ReadBuffer, WriteBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Ok,
    Error,
    Failed,
    /// Internal only: the handler has not finished. Converted to
    /// `Failed` before anything reaches the wire.
    Pending,
}

impl QueryStatus {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            QueryStatus::Ok => 0,
            QueryStatus::Error => 1,
            QueryStatus::Failed => 3,
            QueryStatus::Pending => 4,
        }
    }
}

macro_rules! query_kinds {
    ($(($variant:ident, $code:literal, $name:literal),)+) => {
        /// Wire codes of every request the manager understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum QueryKind {
            $($variant,)+
        }

        impl QueryKind {
            #[must_use]
            pub fn from_code(code: u8) -> Option<QueryKind> {
                match code {
                    $($code => Some(QueryKind::$variant),)+
                    _ => None,
                }
            }

            #[must_use]
            pub fn code(self) -> u8 {
                match self {
                    $(QueryKind::$variant => $code,)+
                }
            }

            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(QueryKind::$variant => $name,)+
                }
            }
        }
    };
}

query_kinds! {
    (Login, 0, "LOGIN"),
    (InternalResolveWorld, 1, "INTERNAL_RESOLVE_WORLD"),
    (CheckAccountPassword, 10, "CHECK_ACCOUNT_PASSWORD"),
    (LoginAccount, 11, "LOGIN_ACCOUNT"),
    (LoginAdmin, 12, "LOGIN_ADMIN"),
    (LoginGame, 20, "LOGIN_GAME"),
    (LogoutGame, 21, "LOGOUT_GAME"),
    (SetNamelock, 23, "SET_NAMELOCK"),
    (BanishAccount, 25, "BANISH_ACCOUNT"),
    (SetNotation, 26, "SET_NOTATION"),
    (ReportStatement, 27, "REPORT_STATEMENT"),
    (BanishIpAddress, 28, "BANISH_IP_ADDRESS"),
    (LogCharacterDeath, 29, "LOG_CHARACTER_DEATH"),
    (AddBuddy, 30, "ADD_BUDDY"),
    (RemoveBuddy, 31, "REMOVE_BUDDY"),
    (DecrementIsOnline, 32, "DECREMENT_IS_ONLINE"),
    (FinishAuctions, 33, "FINISH_AUCTIONS"),
    (TransferHouses, 35, "TRANSFER_HOUSES"),
    (EvictFreeAccounts, 36, "EVICT_FREE_ACCOUNTS"),
    (EvictDeletedCharacters, 37, "EVICT_DELETED_CHARACTERS"),
    (EvictExGuildleaders, 38, "EVICT_EX_GUILDLEADERS"),
    (InsertHouseOwner, 39, "INSERT_HOUSE_OWNER"),
    (UpdateHouseOwner, 40, "UPDATE_HOUSE_OWNER"),
    (DeleteHouseOwner, 41, "DELETE_HOUSE_OWNER"),
    (GetHouseOwners, 42, "GET_HOUSE_OWNERS"),
    (GetAuctions, 43, "GET_AUCTIONS"),
    (StartAuction, 44, "START_AUCTION"),
    (InsertHouses, 45, "INSERT_HOUSES"),
    (ClearIsOnline, 46, "CLEAR_IS_ONLINE"),
    (CreatePlayerlist, 47, "CREATE_PLAYERLIST"),
    (LogKilledCreatures, 48, "LOG_KILLED_CREATURES"),
    (LoadPlayers, 50, "LOAD_PLAYERS"),
    (ExcludeFromAuctions, 51, "EXCLUDE_FROM_AUCTIONS"),
    (CancelHouseTransfer, 52, "CANCEL_HOUSE_TRANSFER"),
    (LoadWorldConfig, 53, "LOAD_WORLD_CONFIG"),
    (CreateAccount, 100, "CREATE_ACCOUNT"),
    (CreateCharacter, 101, "CREATE_CHARACTER"),
    (GetAccountSummary, 102, "GET_ACCOUNT_SUMMARY"),
    (GetCharacterProfile, 103, "GET_CHARACTER_PROFILE"),
    (GetWorlds, 150, "GET_WORLDS"),
    (GetOnlineCharacters, 151, "GET_ONLINE_CHARACTERS"),
    (GetKillStatistics, 152, "GET_KILL_STATISTICS"),
}

/// One request/response exchange.
#[derive(Debug)]
pub struct Query {
    payload: Vec<u8>,
    buffer_size: usize,
    pub status: QueryStatus,
    /// World the issuing connection is bound to; 0 until resolved.
    pub world_id: i32,
    pub response: WriteBuffer,
}

impl Query {
    /// Wrap a received payload. The first payload byte is the query
    /// type code.
    #[must_use]
    pub fn new(payload: Vec<u8>, buffer_size: usize) -> Self {
        Self {
            payload,
            buffer_size,
            status: QueryStatus::Pending,
            world_id: 0,
            response: WriteBuffer::default(),
        }
    }

    #[must_use]
    pub fn kind_code(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn kind(&self) -> Option<QueryKind> {
        QueryKind::from_code(self.kind_code())
    }

    /// Read view over the request parameters (everything after the type
    /// code).
    #[must_use]
    pub fn request(&self) -> ReadBuffer<'_> {
        let start = usize::min(1, self.payload.len());
        ReadBuffer::new(&self.payload[start..])
    }

    /// Replace the payload with an INTERNAL_RESOLVE_WORLD request. Used
    /// by the authorization gate to route the world lookup through the
    /// normal worker path.
    #[must_use]
    pub fn rewrite_as_resolve_world(&mut self, world_name: &str) -> bool {
        let mut buffer = WriteBuffer::new(self.buffer_size);
        buffer.write_u8(QueryKind::InternalResolveWorld.code());
        buffer.write_string(world_name);
        if buffer.overflowed() {
            return false;
        }
        self.payload = buffer.into_bytes();
        self.status = QueryStatus::Pending;
        true
    }

    /// Start a response frame: length placeholder, status byte, then
    /// whatever the caller writes. Finish with [`finish_response`].
    ///
    /// [`finish_response`]: Query::finish_response
    pub fn begin_response(&mut self, status: QueryStatus) -> &mut WriteBuffer {
        debug_assert!(status != QueryStatus::Pending);
        self.status = status;
        self.response = WriteBuffer::new(self.buffer_size);
        self.response.write_u16(0);
        self.response.write_u8(status.code());
        &mut self.response
    }

    /// Patch the frame header once the body is complete. Returns false
    /// (and downgrades the status to `Failed`) when the response
    /// overflowed the buffer.
    pub fn finish_response(&mut self) -> bool {
        let position = self.response.position();
        if position <= 2 {
            tracing::error!("invalid response size");
            self.status = QueryStatus::Failed;
            return false;
        }

        let payload_size = position - 2;
        if payload_size < 0xFFFF {
            self.response.rewrite_u16(0, payload_size as u16);
        } else {
            self.response.rewrite_u16(0, 0xFFFF);
            self.response.insert_u32(2, payload_size as u32);
        }

        if self.response.overflowed() {
            self.status = QueryStatus::Failed;
            false
        } else {
            true
        }
    }

    /// Empty OK response.
    pub fn ok(&mut self) {
        self.begin_response(QueryStatus::Ok);
        self.finish_response();
    }

    /// Domain error with its handler-local code.
    pub fn error(&mut self, error_code: u8) {
        self.begin_response(QueryStatus::Error);
        self.response.write_u8(error_code);
        self.finish_response();
    }

    /// Total failure; the payload is always empty.
    pub fn failed(&mut self) {
        self.begin_response(QueryStatus::Failed);
        self.finish_response();
    }

    /// The finished frame, or `None` when it overflowed the buffer.
    #[must_use]
    pub fn response_frame(&self) -> Option<&[u8]> {
        if self.response.overflowed() || self.response.position() <= 2 {
            None
        } else {
            Some(self.response.as_slice())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        assert_eq!(QueryKind::from_code(0), Some(QueryKind::Login));
        assert_eq!(QueryKind::from_code(20), Some(QueryKind::LoginGame));
        assert_eq!(QueryKind::from_code(47), Some(QueryKind::CreatePlayerlist));
        assert_eq!(QueryKind::from_code(150), Some(QueryKind::GetWorlds));
        assert_eq!(QueryKind::from_code(200), None);
        assert_eq!(QueryKind::LoginGame.code(), 20);
        assert_eq!(QueryKind::LoginGame.name(), "LOGIN_GAME");
    }

    #[test]
    fn ok_response_frame_shape() {
        let mut query = Query::new(vec![20], 1024);
        query.ok();
        assert_eq!(query.status, QueryStatus::Ok);
        let frame = query.response_frame().unwrap();
        // [u16 len = 1][u8 status = 0]
        assert_eq!(frame, &[1, 0, 0]);
    }

    #[test]
    fn error_response_carries_code() {
        let mut query = Query::new(vec![20], 1024);
        query.error(7);
        let frame = query.response_frame().unwrap();
        assert_eq!(frame, &[2, 0, 1, 7]);
    }

    #[test]
    fn oversize_response_downgrades_to_failed() {
        let mut query = Query::new(vec![20], 8);
        let response = query.begin_response(QueryStatus::Ok);
        response.write_string("far-too-long-for-an-eight-byte-buffer");
        assert!(!query.finish_response());
        assert_eq!(query.status, QueryStatus::Failed);
        assert!(query.response_frame().is_none());
    }

    #[test]
    fn resolve_world_rewrite_replaces_payload() {
        let mut query = Query::new(vec![0, 1, 2, 3], 1024);
        assert!(query.rewrite_as_resolve_world("WorldOne"));
        assert_eq!(query.kind(), Some(QueryKind::InternalResolveWorld));
        let mut request = query.request();
        assert_eq!(request.read_string(30), "WorldOne");
    }

    #[test]
    fn request_view_skips_the_type_code() {
        let mut payload = vec![21u8];
        payload.extend_from_slice(&42u32.to_le_bytes());
        let query = Query::new(payload, 1024);
        let mut request = query.request();
        assert_eq!(request.read_u32(), 42);
    }
}
