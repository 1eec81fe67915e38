// Aggregate statistics and the money balance over game history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recommend::EARLY_DRAW_WINDOW;
use super::{rank_frequencies, NumberFrequency, SerialMargins, WinningSerials};
use crate::lottery::HistoryEntry;

/// How many entries each ranked list keeps.
const MOST_FREQUENT_LIMIT: usize = 20;
const EARLY_LIMIT: usize = 25;
const WINNING_LIMIT: usize = 10;

/// Everything the statistics view shows. Derived on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    /// Games played with own tickets.
    pub total_games: usize,
    /// All games, opponent-only ones included.
    pub total_registered_games: usize,
    pub total_tickets_played: usize,
    /// Own-ticket games with any winnings.
    pub games_won: usize,
    /// Percentage of own-ticket games won.
    pub win_rate: f64,
    pub average_numbers_drawn: f64,
    pub total_spent: f64,
    pub total_won: f64,
    pub net_profit: f64,
    /// `net_profit / total_spent`, 0 when nothing was spent.
    pub roi: f64,
    pub most_frequent_numbers: Vec<NumberFrequency>,
    pub top_early_numbers: Vec<NumberFrequency>,
    pub top_winning_numbers: Vec<NumberFrequency>,
    pub winning_serials: WinningSerials,
    pub serial_margins: SerialMargins,
}

/// Compute statistics over history entries. Empty input gives zeros.
pub fn compute_stats(history: &[HistoryEntry]) -> GameStats {
    if history.is_empty() {
        return GameStats::default();
    }

    let own_games: Vec<&HistoryEntry> = history
        .iter()
        .filter(|e| !e.game.is_opponent_only_mode)
        .collect();
    let total_games = own_games.len();
    let total_registered_games = history.len();
    let total_tickets_played = own_games.iter().map(|e| e.tickets_played).sum();
    let games_won = own_games.iter().filter(|e| e.total_winnings > 0.0).count();
    let win_rate = if total_games > 0 {
        games_won as f64 / total_games as f64 * 100.0
    } else {
        0.0
    };

    let total_drawn: usize = history.iter().map(|e| e.game.drawn_numbers.len()).sum();
    let average_numbers_drawn = total_drawn as f64 / total_registered_games as f64;

    let total_spent: f64 = history.iter().map(|e| e.total_cost).sum();
    let total_won: f64 = history.iter().map(|e| e.total_winnings).sum();
    let net_profit = total_won - total_spent;
    let roi = if total_spent > 0.0 {
        net_profit / total_spent
    } else {
        0.0
    };

    let most_frequent_numbers = rank_frequencies(
        history
            .iter()
            .flat_map(|e| e.game.drawn_numbers.iter().copied()),
        MOST_FREQUENT_LIMIT,
    );
    let top_early_numbers = rank_frequencies(
        history
            .iter()
            .flat_map(|e| e.game.drawn_numbers.iter().take(EARLY_DRAW_WINDOW).copied()),
        EARLY_LIMIT,
    );
    let top_winning_numbers = rank_frequencies(
        history.iter().flat_map(|e| {
            let own = e.winners.iter().flat_map(|w| w.ticket.numbers.iter().copied());
            let theirs = e.opponent_winners.iter().flat_map(|o| o.numbers.iter().copied());
            own.chain(theirs)
        }),
        WINNING_LIMIT,
    );

    let mut winning_serials = WinningSerials::default();
    for entry in history {
        winning_serials.player.extend(
            entry
                .winners
                .iter()
                .map(|w| w.ticket.serial_number.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        winning_serials.opponent.extend(
            entry
                .opponent_winners
                .iter()
                .map(|o| o.serial_number.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
    let serial_margins = serial_margins(
        winning_serials
            .player
            .iter()
            .chain(winning_serials.opponent.iter())
            .map(String::as_str),
    );

    GameStats {
        total_games,
        total_registered_games,
        total_tickets_played,
        games_won,
        win_rate,
        average_numbers_drawn,
        total_spent,
        total_won,
        net_profit,
        roi,
        most_frequent_numbers,
        top_early_numbers,
        top_winning_numbers,
        winning_serials,
        serial_margins,
    }
}

/// Leading-digit value of a serial ("000123" -> 123, "12A" -> 12). Serials
/// that do not start with a digit have no value.
pub fn serial_value(serial: &str) -> Option<u64> {
    let trimmed = serial.trim();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

/// Min, max and rounded mean over the serials that have a numeric value.
pub fn serial_margins<'a, I>(serials: I) -> SerialMargins
where
    I: IntoIterator<Item = &'a str>,
{
    let values: Vec<u64> = serials.into_iter().filter_map(serial_value).collect();
    let (Some(&min), Some(&max)) = (values.iter().min(), values.iter().max()) else {
        return SerialMargins::default();
    };
    let sum: u128 = values.iter().map(|&v| v as u128).sum();
    let average = (sum as f64 / values.len() as f64).round() as u64;
    SerialMargins { min, max, average }
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// One game as the balance view lists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub history_id: String,
    pub created_at: DateTime<Utc>,
    pub net_profit: f64,
    pub total_cost: f64,
    pub total_winnings: f64,
    pub tickets_played: usize,
    pub winner_count: usize,
}

impl GameSummary {
    fn from_entry(entry: &HistoryEntry) -> Self {
        GameSummary {
            history_id: entry.id.clone(),
            created_at: entry.created_at,
            net_profit: entry.net_profit,
            total_cost: entry.total_cost,
            total_winnings: entry.total_winnings,
            tickets_played: entry.tickets_played,
            winner_count: entry.winners.len(),
        }
    }
}

/// Money spent and won across all games.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub total_games: usize,
    pub winning_games: usize,
    pub total_spent: f64,
    pub total_won: f64,
    pub net_profit: f64,
    pub average_spent_per_game: f64,
    pub average_won_per_game: f64,
    /// Highest net profit; the earliest listed wins ties.
    pub best_game: Option<GameSummary>,
    /// Lowest net profit; the earliest listed wins ties.
    pub worst_game: Option<GameSummary>,
}

pub fn compute_balance(history: &[HistoryEntry]) -> BalanceSummary {
    let total_games = history.len();
    if total_games == 0 {
        return BalanceSummary::default();
    }

    let total_spent: f64 = history.iter().map(|e| e.total_cost).sum();
    let total_won: f64 = history.iter().map(|e| e.total_winnings).sum();
    let winning_games = history.iter().filter(|e| e.total_winnings > 0.0).count();

    let mut best = &history[0];
    let mut worst = &history[0];
    for entry in &history[1..] {
        if entry.net_profit > best.net_profit {
            best = entry;
        }
        if entry.net_profit < worst.net_profit {
            worst = entry;
        }
    }

    BalanceSummary {
        total_games,
        winning_games,
        total_spent,
        total_won,
        net_profit: total_won - total_spent,
        average_spent_per_game: total_spent / total_games as f64,
        average_won_per_game: total_won / total_games as f64,
        best_game: Some(GameSummary::from_entry(best)),
        worst_game: Some(GameSummary::from_entry(worst)),
    }
}
