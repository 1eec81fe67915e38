// Draw sessions and win detection.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ticket::{Ticket, TicketSnapshot};
use super::{is_valid_number, new_id, now, ValidationError, MAX_NUMBER, TICKET_SIZE};

/// Phase of a game a prize belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    /// The number draw.
    Main,
    /// The serial-number draw that follows the main draw.
    Secondary,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Main => "main",
            GameType::Secondary => "secondary",
        }
    }

    pub fn from_str_type(s: &str) -> Option<Self> {
        match s {
            "main" => Some(GameType::Main),
            "secondary" => Some(GameType::Secondary),
            _ => None,
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Live game
// ---------------------------------------------------------------------------

/// A game as the coordinator holds it while it is being played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    /// Tickets frozen at start; later roster edits do not reach them.
    pub tickets: Vec<Ticket>,
    /// Draw order. Unique values in 1-90.
    pub drawn_numbers: Vec<u8>,
    /// Live ids of the tickets that won, filled in at finish.
    pub winner_ticket_ids: Vec<String>,
    pub game_type: GameType,
    pub is_active: bool,
    /// Only opponent results are tracked; no own tickets are played.
    pub is_opponent_only_mode: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Ticket count frozen at start.
    pub tickets_played: usize,
}

impl Game {
    /// Start a game from the current roster. Only checked, complete tickets
    /// are frozen in, and none at all in opponent-only mode.
    pub fn start(roster: &[Ticket], opponent_only: bool) -> Self {
        let tickets: Vec<Ticket> = if opponent_only {
            Vec::new()
        } else {
            roster.iter().filter(|t| t.is_playable()).cloned().collect()
        };
        let tickets_played = tickets.len();

        Game {
            id: new_id(),
            tickets,
            drawn_numbers: Vec::new(),
            winner_ticket_ids: Vec::new(),
            game_type: GameType::Main,
            is_active: true,
            is_opponent_only_mode: opponent_only,
            started_at: now(),
            finished_at: None,
            tickets_played,
        }
    }

    /// Finished games get their tickets snapshotted when saved.
    pub fn is_finished(&self) -> bool {
        !self.is_active && self.finished_at.is_some()
    }

    pub fn has_drawn(&self, number: u8) -> bool {
        self.drawn_numbers.contains(&number)
    }

    /// Record a drawn number. Out-of-range and repeated numbers are rejected.
    pub fn draw(&mut self, number: u8) -> Result<(), ValidationError> {
        if !is_valid_number(number) {
            return Err(ValidationError::NumberOutOfRange { number });
        }
        if self.has_drawn(number) {
            return Err(ValidationError::AlreadyDrawn { number });
        }
        self.drawn_numbers.push(number);
        Ok(())
    }

    /// Take back a drawn number. Returns false when it was never drawn.
    pub fn undraw(&mut self, number: u8) -> bool {
        let before = self.drawn_numbers.len();
        self.drawn_numbers.retain(|&n| n != number);
        self.drawn_numbers.len() != before
    }

    /// Drawn numbers as an ascending set, the way the board shows them.
    pub fn sorted_drawn(&self) -> Vec<u8> {
        let mut sorted = self.drawn_numbers.clone();
        sorted.sort_unstable();
        sorted
    }

    /// Tickets of this game whose numbers are all drawn.
    pub fn winning_tickets(&self) -> Vec<&Ticket> {
        find_winning_tickets(&self.tickets, &self.drawn_numbers)
    }

    pub fn finish(&mut self, winner_ticket_ids: Vec<String>) {
        self.is_active = false;
        self.finished_at = Some(now());
        self.winner_ticket_ids = winner_ticket_ids;
    }
}

// ---------------------------------------------------------------------------
// Win detection
// ---------------------------------------------------------------------------

/// A ticket wins once every one of its seven numbers has been drawn. Extra
/// drawn numbers do not matter.
pub fn is_winning_ticket(numbers: &[u8], drawn: &[u8]) -> bool {
    if numbers.len() != TICKET_SIZE {
        return false;
    }
    let mut on_board = [false; MAX_NUMBER as usize + 1];
    for &n in drawn {
        if let Some(slot) = on_board.get_mut(n as usize) {
            *slot = true;
        }
    }
    numbers
        .iter()
        .all(|&n| on_board.get(n as usize).copied().unwrap_or(false))
}

/// Subset of `tickets` whose numbers are all contained in `drawn`.
pub fn find_winning_tickets<'a>(tickets: &'a [Ticket], drawn: &[u8]) -> Vec<&'a Ticket> {
    tickets
        .iter()
        .filter(|t| is_winning_ticket(&t.numbers, drawn))
        .collect()
}

// ---------------------------------------------------------------------------
// Finished game, as read back from history
// ---------------------------------------------------------------------------

/// A game reconstructed from history. Its tickets are snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedGame {
    pub id: String,
    pub tickets: Vec<TicketSnapshot>,
    pub drawn_numbers: Vec<u8>,
    pub winner_tickets: Vec<TicketSnapshot>,
    pub game_type: GameType,
    pub is_opponent_only_mode: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tickets_played: usize,
}

impl FinishedGame {
    /// Freeze a game that has just finished.
    pub fn from_game(game: &Game) -> Self {
        let tickets: Vec<TicketSnapshot> = game
            .tickets
            .iter()
            .map(|t| TicketSnapshot::capture(&game.id, t))
            .collect();
        let winner_tickets = tickets
            .iter()
            .filter(|s| game.winner_ticket_ids.contains(&s.original_ticket_id))
            .cloned()
            .collect();

        FinishedGame {
            id: game.id.clone(),
            tickets,
            drawn_numbers: game.drawn_numbers.clone(),
            winner_tickets,
            game_type: game.game_type,
            is_opponent_only_mode: game.is_opponent_only_mode,
            started_at: game.started_at,
            finished_at: game.finished_at,
            tickets_played: game.tickets_played,
        }
    }
}
