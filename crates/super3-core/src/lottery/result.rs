// Winners, opponent results, and the per-game history summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::game::{FinishedGame, Game, GameType};
use super::ticket::TicketSnapshot;
use super::{check_amount, is_valid_number, new_id, now, ValidationError, TICKET_SIZE};

/// One of the user's own tickets that won a prize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub id: String,
    pub game_id: String,
    /// Always the snapshot, never the live ticket.
    pub ticket: TicketSnapshot,
    pub winning_amount: f64,
    pub game_type: GameType,
    pub is_player_winner: bool,
    pub created_at: DateTime<Utc>,
}

/// Opponent result as entered by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentWinnerData {
    pub game_type: GameType,
    /// Informational; not checked against the draw.
    #[serde(default)]
    pub numbers: Vec<u8>,
    #[serde(default)]
    pub serial_number: String,
    pub winning_amount: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OpponentWinnerData {
    /// At most seven numbers in range, and a usable amount.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.numbers.len() > TICKET_SIZE {
            return Err(ValidationError::WrongNumberCount {
                expected: TICKET_SIZE,
                count: self.numbers.len(),
            });
        }
        if let Some(&number) = self.numbers.iter().find(|&&n| !is_valid_number(n)) {
            return Err(ValidationError::NumberOutOfRange { number });
        }
        check_amount(self.winning_amount)?;
        Ok(())
    }
}

/// A competitor's result. Counts toward number/serial statistics but never
/// toward the user's own cost or profit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentWinner {
    pub id: String,
    pub game_id: String,
    pub game_type: GameType,
    pub numbers: Vec<u8>,
    pub serial_number: String,
    pub winning_amount: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OpponentWinner {
    pub fn from_data(game_id: &str, data: &OpponentWinnerData) -> Self {
        OpponentWinner {
            id: new_id(),
            game_id: game_id.to_string(),
            game_type: data.game_type,
            numbers: data.numbers.clone(),
            serial_number: data.serial_number.trim().to_string(),
            winning_amount: data.winning_amount,
            notes: data.notes.clone().filter(|n| !n.trim().is_empty()),
            created_at: now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Finishing a game
// ---------------------------------------------------------------------------

/// Secondary phase result: the drawn serial and the prize paid on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryDraw {
    pub serial_number: String,
    pub prize: f64,
}

/// Everything the user reports when closing a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameOutcome {
    /// Total main-phase prize, shared by every winning ticket. 0 = no win.
    #[serde(default)]
    pub main_prize: f64,
    #[serde(default)]
    pub secondary: Option<SecondaryDraw>,
    #[serde(default)]
    pub opponent_winners: Vec<OpponentWinnerData>,
}

/// Turn an outcome into the player's winners.
///
/// The main prize is split evenly across tickets whose numbers were all
/// drawn; the secondary prize is split evenly across tickets carrying the
/// drawn serial. Opponent-only games never produce player winners.
pub fn award_prizes(game: &Game, outcome: &GameOutcome) -> Result<Vec<Winner>, ValidationError> {
    let main_prize = check_amount(outcome.main_prize)?;
    let secondary_prize = match &outcome.secondary {
        Some(draw) => check_amount(draw.prize)?,
        None => 0.0,
    };

    if game.is_opponent_only_mode {
        return Ok(Vec::new());
    }

    let mut winners = Vec::new();

    if main_prize > 0.0 {
        let main_winners = game.winning_tickets();
        if main_winners.is_empty() {
            return Err(ValidationError::PrizeWithoutWinner {
                phase: GameType::Main,
            });
        }
        let share = main_prize / main_winners.len() as f64;
        for ticket in main_winners {
            winners.push(new_winner(
                game,
                TicketSnapshot::capture(&game.id, ticket),
                share,
                GameType::Main,
            ));
        }
    }

    if let Some(draw) = outcome.secondary.as_ref().filter(|_| secondary_prize > 0.0) {
        let serial = draw.serial_number.trim();
        let serial_winners: Vec<_> = game
            .tickets
            .iter()
            .filter(|t| !serial.is_empty() && t.serial_number.trim() == serial)
            .collect();
        if serial_winners.is_empty() {
            return Err(ValidationError::PrizeWithoutWinner {
                phase: GameType::Secondary,
            });
        }
        let share = secondary_prize / serial_winners.len() as f64;
        for ticket in serial_winners {
            winners.push(new_winner(
                game,
                TicketSnapshot::capture(&game.id, ticket),
                share,
                GameType::Secondary,
            ));
        }
    }

    Ok(winners)
}

fn new_winner(game: &Game, ticket: TicketSnapshot, amount: f64, game_type: GameType) -> Winner {
    Winner {
        id: new_id(),
        game_id: game.id.clone(),
        ticket,
        winning_amount: amount,
        game_type,
        is_player_winner: true,
        created_at: now(),
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Summary of one finished game. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub game: FinishedGame,
    pub winners: Vec<Winner>,
    pub opponent_winners: Vec<OpponentWinner>,
    pub total_cost: f64,
    pub total_winnings: f64,
    pub total_opponent_winnings: f64,
    pub net_profit: f64,
    pub created_at: DateTime<Utc>,
    pub tickets_played: usize,
}

impl HistoryEntry {
    /// Build the summary and its totals. Opponent-only games cost nothing.
    pub fn new(
        game: FinishedGame,
        winners: Vec<Winner>,
        opponent_winners: Vec<OpponentWinner>,
        ticket_cost: f64,
    ) -> Self {
        let total_cost = if game.is_opponent_only_mode {
            0.0
        } else {
            game.tickets.len() as f64 * ticket_cost
        };
        let total_winnings: f64 = winners.iter().map(|w| w.winning_amount).sum();
        let total_opponent_winnings: f64 =
            opponent_winners.iter().map(|o| o.winning_amount).sum();
        let tickets_played = game.tickets_played;

        HistoryEntry {
            id: new_id(),
            game,
            winners,
            opponent_winners,
            total_cost,
            total_winnings,
            total_opponent_winnings,
            net_profit: total_winnings - total_cost,
            created_at: now(),
            tickets_played,
        }
    }
}
