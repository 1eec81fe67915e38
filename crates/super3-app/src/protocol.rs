// Messages exchanged between a front end and the coordinator.
//
// Commands flow in over one mpsc channel, updates flow out over another.
// Both sides are serde types so the headless binary can speak them as JSON
// lines.

use serde::{Deserialize, Serialize};

use super3_core::analysis::{BalanceSummary, GameStats, NumberRecommendation};
use super3_core::lottery::{
    Game, GameOutcome, HistoryEntry, OpponentWinner, OpponentWinnerData, Ticket, TicketStats,
};

/// Everything a front end can ask the coordinator to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UserCommand {
    /// Re-read tickets and history from the store.
    Reload,
    CreateTicket,
    CreateTickets { count: usize },
    UpdateTicket { ticket: Ticket },
    DeleteTicket { id: String },
    ClearAllTickets,
    /// Fill empty tickets with recommended numbers: every one with `all`,
    /// otherwise at most the configured batch size.
    FillEmptyTickets {
        #[serde(default)]
        all: bool,
    },
    FillAllIdentifiers,
    ClearAllIdentifiers,
    DeleteIncompleteTickets,
    ClearAllNumbers,
    MarkAllChecked,
    UncheckAll,
    StartGame {
        #[serde(default)]
        opponent_only: bool,
    },
    AddDrawnNumber { number: u8 },
    RemoveDrawnNumber { number: u8 },
    RecordOpponentWinner { data: OpponentWinnerData },
    FinishGame { outcome: GameOutcome },
    DeleteHistoryEntry { id: String },
    ClearGameHistory,
    RequestRecommendations { count: usize },
    RequestStatistics,
    Quit,
}

/// Everything the coordinator pushes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UiUpdate {
    /// Full view of the cached state after a command completed.
    Snapshot(Box<AppSnapshot>),
    Recommendations(Vec<NumberRecommendation>),
    Statistics {
        stats: Box<GameStats>,
        balance: Box<BalanceSummary>,
    },
    Error { message: String },
}

/// Read-only view of the coordinator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSnapshot {
    pub tickets: Vec<Ticket>,
    pub ticket_stats: TicketStats,
    pub current_game: Option<GameView>,
    /// Newest first.
    pub history: Vec<HistoryEntry>,
    pub has_statistical_data: bool,
}

/// The active game as a front end shows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    pub game: Game,
    /// Drawn numbers ascending; `game.drawn_numbers` keeps draw order.
    pub drawn_sorted: Vec<u8>,
    pub winning_ticket_ids: Vec<String>,
    /// Opponent results recorded so far for this game.
    pub opponent_winners: Vec<OpponentWinner>,
}
