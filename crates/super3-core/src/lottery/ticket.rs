// Live tickets and the frozen copies kept in game history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{is_valid_number, new_id, now, ValidationError, MAX_NUMBER, TICKET_SIZE};

/// A user's ticket as it currently exists. Edited in place, never versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    /// Optional display label (usually a small integer).
    pub custom_id: Option<String>,
    /// Empty until the user enters it.
    pub serial_number: String,
    /// Either empty or exactly seven distinct numbers in 1-90.
    pub numbers: Vec<u8>,
    /// User confirmed this ticket takes part in the next game.
    pub is_checked: bool,
    /// Derived, see [`Ticket::compute_complete`].
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// A fresh, empty ticket.
    pub fn new(custom_id: Option<String>) -> Self {
        Ticket {
            id: new_id(),
            custom_id,
            serial_number: String::new(),
            numbers: Vec::new(),
            is_checked: false,
            is_complete: false,
            created_at: now(),
        }
    }

    /// Exactly seven distinct numbers in range and a non-blank serial.
    pub fn compute_complete(&self) -> bool {
        self.numbers.len() == TICKET_SIZE
            && validate_numbers(&self.numbers).is_ok()
            && !self.serial_number.trim().is_empty()
    }

    /// Re-derive `is_complete` and drop `is_checked` when incomplete.
    pub fn normalize(&mut self) {
        self.is_complete = self.compute_complete();
        if !self.is_complete {
            self.is_checked = false;
        }
    }

    /// Builder-style variant of [`Ticket::normalize`].
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Eligible to be frozen into a new game.
    pub fn is_playable(&self) -> bool {
        self.is_checked && self.is_complete
    }
}

/// Check a ticket's number list: empty, or exactly seven distinct values in
/// range.
pub fn validate_numbers(numbers: &[u8]) -> Result<(), ValidationError> {
    if !numbers.is_empty() && numbers.len() != TICKET_SIZE {
        return Err(ValidationError::WrongNumberCount {
            expected: TICKET_SIZE,
            count: numbers.len(),
        });
    }
    let mut seen = [false; MAX_NUMBER as usize + 1];
    for &number in numbers {
        if !is_valid_number(number) {
            return Err(ValidationError::NumberOutOfRange { number });
        }
        if seen[number as usize] {
            return Err(ValidationError::DuplicateNumber { number });
        }
        seen[number as usize] = true;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A ticket frozen when its game finished.
///
/// Snapshots are a separate entity from live tickets: editing or deleting the
/// live ticket never reaches a snapshot, and snapshots never show up in the
/// live ticket list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    /// `snapshot_<gameId>_<ticketId>`
    pub id: String,
    pub game_id: String,
    pub original_ticket_id: String,
    pub custom_id: Option<String>,
    pub serial_number: String,
    pub numbers: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl TicketSnapshot {
    pub fn snapshot_id(game_id: &str, ticket_id: &str) -> String {
        format!("snapshot_{game_id}_{ticket_id}")
    }

    pub fn capture(game_id: &str, ticket: &Ticket) -> Self {
        TicketSnapshot {
            id: Self::snapshot_id(game_id, &ticket.id),
            game_id: game_id.to_string(),
            original_ticket_id: ticket.id.clone(),
            custom_id: ticket.custom_id.clone(),
            serial_number: ticket.serial_number.clone(),
            numbers: ticket.numbers.clone(),
            created_at: ticket.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Roster summary
// ---------------------------------------------------------------------------

/// Counts over the live ticket roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketStats {
    pub total: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub checked: usize,
    /// Cost of playing every ticket at the configured unit price.
    pub total_cost: f64,
}

impl TicketStats {
    pub fn from_tickets(tickets: &[Ticket], ticket_cost: f64) -> Self {
        let total = tickets.len();
        let complete = tickets.iter().filter(|t| t.is_complete).count();
        let checked = tickets.iter().filter(|t| t.is_checked).count();
        TicketStats {
            total,
            complete,
            incomplete: total - complete,
            checked,
            total_cost: total as f64 * ticket_cost,
        }
    }
}
