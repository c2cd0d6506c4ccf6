// Wire messages between clients and the synchronization layer.
//
// Requests and responses are JSON with a `type` tag. Push events reuse the
// store's sequence-tagged `SessionEvent` so any transport can implement the
// same subscriber contract.

use serde::{Deserialize, Serialize};

use crate::draft::format::FormatDefinition;
use crate::draft::session::DrafterState;
use crate::draft::store::{BotPickStatus, SessionEvent};
use crate::draft::DraftError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Start a session. A full format definition wins over the standard
    /// packs/cards shorthand; both absent means the server defaults.
    CreateSession {
        seats: usize,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<FormatDefinition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        packs: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cards: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    AssignSeat {
        session: String,
        name: String,
    },
    /// Register this connection for the session's push events.
    Subscribe {
        session: String,
    },
    GetCurrentPack {
        session: String,
        seat: usize,
    },
    SubmitPick {
        session: String,
        seat: usize,
        index: usize,
        sequence: u64,
    },
    SubmitTrash {
        session: String,
        seat: usize,
        index: usize,
        sequence: u64,
    },
    TryBotPicks {
        session: String,
    },
    FinalizeDeck {
        session: String,
        seat: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    SessionCreated {
        session: String,
    },
    SeatAssigned {
        session: String,
        seat: usize,
    },
    Subscribed {
        session: String,
    },
    CurrentPack {
        pack: Vec<usize>,
        state: DrafterState,
    },
    Submitted {
        state: DrafterState,
    },
    BotPicks {
        status: BotPickStatus,
    },
    DeckFinalized {
        deck: i64,
    },
    /// Push notification: the session's sequence number advanced.
    Event {
        event: SessionEvent,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidPickIndex,
    NotYourTurn,
    StaleSession,
    EmptySlotFilter,
    InvalidFilter,
    InvalidFormat,
    UnknownSession,
    UnknownSeat,
    DraftFinished,
    DraftInProgress,
    NoFreeSeat,
    InvalidSeatCount,
    BadRequest,
    Internal,
}

impl From<&DraftError> for ErrorCode {
    fn from(err: &DraftError) -> Self {
        match err {
            DraftError::InvalidPickIndex { .. } => ErrorCode::InvalidPickIndex,
            DraftError::NotYourTurn => ErrorCode::NotYourTurn,
            DraftError::StaleSession { .. } => ErrorCode::StaleSession,
            DraftError::EmptySlotFilter { .. } => ErrorCode::EmptySlotFilter,
            DraftError::InvalidFilter(_) => ErrorCode::InvalidFilter,
            DraftError::Format(_) => ErrorCode::InvalidFormat,
            DraftError::UnknownSession { .. } => ErrorCode::UnknownSession,
            DraftError::UnknownSeat { .. } => ErrorCode::UnknownSeat,
            DraftError::DraftFinished => ErrorCode::DraftFinished,
            DraftError::DraftInProgress => ErrorCode::DraftInProgress,
            DraftError::NoFreeSeat => ErrorCode::NoFreeSeat,
            DraftError::InvalidSeatCount { .. } => ErrorCode::InvalidSeatCount,
            DraftError::BotEvaluationFailure { .. } | DraftError::Persistence(_) => {
                ErrorCode::Internal
            }
        }
    }
}

impl ServerResponse {
    pub fn from_error(err: &DraftError) -> Self {
        ServerResponse::Error {
            code: ErrorCode::from(err),
            message: err.to_string(),
        }
    }

    /// A parse failure for a request we couldn't even read.
    pub fn bad_request(message: impl Into<String>) -> Self {
        ServerResponse::Error {
            code: ErrorCode::BadRequest,
            message: message.into(),
        }
    }
}
