// Draft domain: formats, pack generation, sessions, deck building.

pub mod deckbuild;
pub mod format;
pub mod pack;
pub mod rng;
pub mod session;
pub mod store;

use thiserror::Error;

/// Errors surfaced by draft operations. Validation failures are returned to
/// the caller synchronously; the session is left untouched on rejection.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("pick index {index} out of bounds for pack of {pack_len}")]
    InvalidPickIndex { index: usize, pack_len: usize },

    #[error("seat's active step does not allow this action")]
    NotYourTurn,

    #[error("stale session state: submitted sequence {submitted}, authoritative {authoritative}")]
    StaleSession { submitted: u64, authoritative: u64 },

    #[error("no cards match slot filter `{filter}`")]
    EmptySlotFilter { filter: String },

    #[error(transparent)]
    InvalidFilter(#[from] pack::FilterError),

    #[error(transparent)]
    Format(#[from] format::FormatError),

    #[error("unknown session `{id}`")]
    UnknownSession { id: String },

    #[error("unknown seat {seat}")]
    UnknownSeat { seat: usize },

    #[error("draft is already finished")]
    DraftFinished,

    #[error("draft is still in progress")]
    DraftInProgress,

    #[error("no free seat to assign")]
    NoFreeSeat,

    #[error("invalid seat count: {seats}")]
    InvalidSeatCount { seats: usize },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("oracle `{oracle}` produced a non-finite value")]
    BotEvaluationFailure { oracle: &'static str },
}
