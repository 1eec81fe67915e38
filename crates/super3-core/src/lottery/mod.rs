// Domain model for the Super3 numbers game: tickets, games, winners, history.

pub mod game;
pub mod result;
pub mod ticket;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

pub use game::{find_winning_tickets, is_winning_ticket, FinishedGame, Game, GameType};
pub use result::{
    award_prizes, GameOutcome, HistoryEntry, OpponentWinner, OpponentWinnerData, SecondaryDraw,
    Winner,
};
pub use ticket::{validate_numbers, Ticket, TicketSnapshot, TicketStats};

/// Lowest number that can be drawn or played.
pub const MIN_NUMBER: u8 = 1;
/// Highest number that can be drawn or played.
pub const MAX_NUMBER: u8 = 90;
/// Numbers on a complete ticket.
pub const TICKET_SIZE: usize = 7;

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Input rejected before anything is written to the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("a ticket needs exactly {expected} numbers or none, got {count}")]
    WrongNumberCount { expected: usize, count: usize },

    #[error("number {number} is outside 1-90")]
    NumberOutOfRange { number: u8 },

    #[error("number {number} appears more than once")]
    DuplicateNumber { number: u8 },

    #[error("serial number {serial} is already used by another ticket")]
    DuplicateSerial { serial: String },

    #[error("invalid amount `{input}`")]
    InvalidAmount { input: String },

    #[error("number {number} was already drawn")]
    AlreadyDrawn { number: u8 },

    #[error("a {phase} prize was entered but no ticket won that phase")]
    PrizeWithoutWinner { phase: GameType },
}

pub fn is_valid_number(number: u8) -> bool {
    (MIN_NUMBER..=MAX_NUMBER).contains(&number)
}

/// Parse a user-entered money amount. Must be a finite, non-negative number.
pub fn parse_amount(input: &str) -> Result<f64, ValidationError> {
    let invalid = || ValidationError::InvalidAmount {
        input: input.to_string(),
    };
    let value: f64 = input.trim().parse().map_err(|_| invalid())?;
    check_amount(value).map_err(|_| invalid())
}

pub(crate) fn check_amount(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::InvalidAmount {
            input: value.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Identity and time
// ---------------------------------------------------------------------------

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a new entity id from the current UTC time.
///
/// Format: `YYYYMMDDHHMMSSmmm_<seq>`. The process-wide sequence suffix keeps
/// ids unique when several entities are created within one millisecond.
pub fn new_id() -> String {
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}_{seq}", Utc::now().format("%Y%m%d%H%M%S%3f"))
}

/// Current time truncated to the millisecond precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
