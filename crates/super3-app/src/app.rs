// Application state coordinator.
//
// Owns the store handle, a cache of live tickets and history, and the game
// lifecycle. Every mutating operation writes through the store first and
// refreshes the cache from it afterwards, so the cache never runs ahead of
// what is persisted.

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super3_core::analysis::{
    compute_balance, compute_stats, recommend_detailed, recommend_numbers, BalanceSummary,
    GameStats, NumberRecommendation,
};
use super3_core::config::GameConfig;
use super3_core::db::Database;
use super3_core::lottery::{
    self, award_prizes, validate_numbers, FinishedGame, Game, GameOutcome, HistoryEntry,
    OpponentWinner, OpponentWinnerData, Ticket, TicketStats, ValidationError, TICKET_SIZE,
};

use crate::protocol::{AppSnapshot, GameView, UiUpdate, UserCommand};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a command was refused.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("maximum of {max} tickets reached")]
    TicketLimitReached { max: usize },

    #[error("ticket {id} not found")]
    TicketNotFound { id: String },

    #[error("history entry {id} not found")]
    HistoryEntryNotFound { id: String },

    #[error("a game is already in progress")]
    GameAlreadyActive,

    #[error("no game in progress")]
    NoActiveGame,

    #[error("no checked, complete tickets to play")]
    NoEligibleTickets,

    #[error("no finished games to recommend numbers from")]
    NoStatisticalData,

    #[error("only {found} numbers could be recommended, a ticket needs 7")]
    NotEnoughRecommendations { found: usize },

    #[error("failed to {operation}: {cause:#}")]
    Persistence {
        operation: &'static str,
        cause: anyhow::Error,
    },
}

/// Map a store failure to `AppError::Persistence`, logging it once here.
fn persist<T>(operation: &'static str, result: anyhow::Result<T>) -> Result<T, AppError> {
    result.map_err(|cause| {
        error!("Failed to {}: {:#}", operation, cause);
        AppError::Persistence { operation, cause }
    })
}

// ---------------------------------------------------------------------------
// Game lifecycle
// ---------------------------------------------------------------------------

/// A game being played. Draws live only here until the game is finished.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveGame {
    pub game: Game,
    /// Live ids of tickets whose numbers are all drawn.
    pub winning_ticket_ids: Vec<String>,
    /// Opponent results already persisted for this game.
    pub opponent_winners: Vec<OpponentWinner>,
}

impl ActiveGame {
    fn new(game: Game) -> Self {
        ActiveGame {
            game,
            winning_ticket_ids: Vec::new(),
            opponent_winners: Vec::new(),
        }
    }

    fn refresh_winners(&mut self) {
        self.winning_ticket_ids = self
            .game
            .winning_tickets()
            .iter()
            .map(|t| t.id.clone())
            .collect();
    }

    fn view(&self) -> GameView {
        GameView {
            game: self.game.clone(),
            drawn_sorted: self.game.sorted_drawn(),
            winning_ticket_ids: self.winning_ticket_ids.clone(),
            opponent_winners: self.opponent_winners.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GamePhase {
    NoGame,
    Active(ActiveGame),
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: GameConfig,
    pub db: Database,
    /// Live tickets, in creation order.
    pub tickets: Vec<Ticket>,
    /// Finished games, newest first.
    pub history: Vec<HistoryEntry>,
    pub phase: GamePhase,
}

impl AppState {
    pub fn new(config: GameConfig, db: Database) -> Self {
        AppState {
            config,
            db,
            tickets: Vec::new(),
            history: Vec::new(),
            phase: GamePhase::NoGame,
        }
    }

    /// Rebuild the cache from the store.
    pub fn load_data(&mut self) -> Result<(), AppError> {
        self.reload_tickets()?;
        self.reload_history()?;
        info!(
            "Loaded {} ticket(s) and {} history entr{}",
            self.tickets.len(),
            self.history.len(),
            if self.history.len() == 1 { "y" } else { "ies" }
        );
        Ok(())
    }

    fn reload_tickets(&mut self) -> Result<(), AppError> {
        self.tickets = persist("load tickets", self.db.get_tickets())?;
        Ok(())
    }

    fn reload_history(&mut self) -> Result<(), AppError> {
        self.history = persist("load game history", self.db.get_game_history())?;
        Ok(())
    }

    pub fn active_game(&self) -> Option<&ActiveGame> {
        match &self.phase {
            GamePhase::Active(active) => Some(active),
            GamePhase::NoGame => None,
        }
    }

    fn active_mut(&mut self) -> Result<&mut ActiveGame, AppError> {
        match &mut self.phase {
            GamePhase::Active(active) => Ok(active),
            GamePhase::NoGame => Err(AppError::NoActiveGame),
        }
    }

    // -----------------------------------------------------------------------
    // Tickets
    // -----------------------------------------------------------------------

    /// Smallest positive integers not already used as a numeric custom id.
    fn next_custom_ids(&self, count: usize) -> Vec<String> {
        let taken: HashSet<u64> = self
            .tickets
            .iter()
            .filter_map(|t| t.custom_id.as_deref())
            .filter_map(|id| id.trim().parse().ok())
            .collect();
        (1u64..)
            .filter(|n| !taken.contains(n))
            .take(count)
            .map(|n| n.to_string())
            .collect()
    }

    pub fn create_ticket(&mut self) -> Result<Ticket, AppError> {
        let max = self.config.max_tickets;
        if self.tickets.len() >= max {
            return Err(AppError::TicketLimitReached { max });
        }
        let ticket = Ticket::new(self.next_custom_ids(1).pop());
        persist("save ticket", self.db.save_ticket(&ticket))?;
        self.reload_tickets()?;
        info!("Created ticket {}", ticket.id);
        Ok(ticket)
    }

    /// Create up to `count` tickets, capped by the free roster slots.
    pub fn create_tickets(&mut self, count: usize) -> Result<Vec<Ticket>, AppError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let max = self.config.max_tickets;
        let to_create = count.min(max.saturating_sub(self.tickets.len()));
        if to_create == 0 {
            return Err(AppError::TicketLimitReached { max });
        }

        let tickets: Vec<Ticket> = self
            .next_custom_ids(to_create)
            .into_iter()
            .map(|id| Ticket::new(Some(id)))
            .collect();
        persist("save tickets", self.db.save_tickets(&tickets))?;
        self.reload_tickets()?;
        if to_create < count {
            warn!(
                "Created {} of {} requested tickets; roster is capped at {}",
                to_create, count, max
            );
        } else {
            info!("Created {} tickets", to_create);
        }
        Ok(tickets)
    }

    /// Replace a ticket's editable fields. Completeness is re-derived and a
    /// serial already carried by another ticket is refused.
    pub fn update_ticket(&mut self, mut ticket: Ticket) -> Result<Ticket, AppError> {
        let existing = self
            .tickets
            .iter()
            .find(|t| t.id == ticket.id)
            .ok_or_else(|| AppError::TicketNotFound {
                id: ticket.id.clone(),
            })?;

        validate_numbers(&ticket.numbers)?;
        if self.check_serial_number_exists(&ticket.serial_number, Some(&ticket.id)) {
            return Err(ValidationError::DuplicateSerial {
                serial: ticket.serial_number.trim().to_string(),
            }
            .into());
        }

        ticket.created_at = existing.created_at;
        ticket.normalize();
        persist("save ticket", self.db.save_ticket(&ticket))?;
        self.reload_tickets()?;
        Ok(ticket)
    }

    pub fn delete_ticket(&mut self, id: &str) -> Result<(), AppError> {
        if !persist("delete ticket", self.db.delete_ticket(id))? {
            return Err(AppError::TicketNotFound { id: id.to_string() });
        }
        self.reload_tickets()
    }

    pub fn clear_all_tickets(&mut self) -> Result<(), AppError> {
        persist("clear tickets", self.db.clear_all_tickets())?;
        info!("Cleared all tickets");
        self.reload_tickets()
    }

    /// Apply `edit` to every cached ticket and save the ones it changed in a
    /// single transaction. `edit` returns whether it touched the ticket.
    fn rewrite_tickets<F>(&mut self, operation: &'static str, mut edit: F) -> Result<usize, AppError>
    where
        F: FnMut(&mut Ticket) -> bool,
    {
        let changed: Vec<Ticket> = self
            .tickets
            .iter()
            .cloned()
            .filter_map(|mut ticket| edit(&mut ticket).then(|| ticket.normalized()))
            .collect();
        if changed.is_empty() {
            return Ok(0);
        }
        persist(operation, self.db.save_tickets(&changed))?;
        self.reload_tickets()?;
        info!("{}: {} ticket(s) updated", operation, changed.len());
        Ok(changed.len())
    }

    /// Give empty tickets the recommended numbers, ascending. Fills every
    /// empty ticket when `all`, otherwise at most the configured batch.
    pub fn fill_empty_tickets_with_recommended(&mut self, all: bool) -> Result<usize, AppError> {
        if !self.has_statistical_data()? {
            return Err(AppError::NoStatisticalData);
        }
        let mut numbers = persist(
            "compute recommendations",
            recommend_numbers(&self.db, TICKET_SIZE),
        )?;
        if numbers.len() < TICKET_SIZE {
            return Err(AppError::NotEnoughRecommendations {
                found: numbers.len(),
            });
        }
        numbers.sort_unstable();

        let mut remaining = if all {
            usize::MAX
        } else {
            self.config.fill_batch_size
        };
        self.rewrite_tickets("fill empty tickets", |ticket| {
            if remaining == 0 || !ticket.numbers.is_empty() {
                return false;
            }
            remaining -= 1;
            ticket.numbers = numbers.clone();
            true
        })
    }

    /// Give every ticket without a custom id the next free numeric one.
    pub fn fill_all_identifiers(&mut self) -> Result<usize, AppError> {
        let missing = self.tickets.iter().filter(|t| t.custom_id.is_none()).count();
        let mut ids = self.next_custom_ids(missing).into_iter();
        self.rewrite_tickets("fill identifiers", |ticket| {
            if ticket.custom_id.is_some() {
                return false;
            }
            ticket.custom_id = ids.next();
            true
        })
    }

    pub fn clear_all_identifiers(&mut self) -> Result<usize, AppError> {
        self.rewrite_tickets("clear identifiers", |ticket| ticket.custom_id.take().is_some())
    }

    /// Delete every incomplete ticket. Returns how many went.
    pub fn delete_incomplete_tickets(&mut self) -> Result<usize, AppError> {
        let ids: Vec<String> = self
            .tickets
            .iter()
            .filter(|t| !t.is_complete)
            .map(|t| t.id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = persist("delete incomplete tickets", self.db.delete_tickets(&ids))?;
        self.reload_tickets()?;
        info!("Deleted {} incomplete ticket(s)", deleted);
        Ok(deleted)
    }

    /// Empty every ticket's numbers, which also unchecks them.
    pub fn clear_all_numbers(&mut self) -> Result<usize, AppError> {
        self.rewrite_tickets("clear numbers", |ticket| {
            if ticket.numbers.is_empty() {
                return false;
            }
            ticket.numbers.clear();
            true
        })
    }

    pub fn mark_all_complete_checked(&mut self) -> Result<usize, AppError> {
        self.rewrite_tickets("check complete tickets", |ticket| {
            if !ticket.is_complete || ticket.is_checked {
                return false;
            }
            ticket.is_checked = true;
            true
        })
    }

    pub fn uncheck_all_tickets(&mut self) -> Result<usize, AppError> {
        self.rewrite_tickets("uncheck tickets", |ticket| {
            std::mem::replace(&mut ticket.is_checked, false)
        })
    }

    pub fn ticket_stats(&self) -> TicketStats {
        TicketStats::from_tickets(&self.tickets, self.config.ticket_cost)
    }

    /// Whether another live ticket already carries `serial`. Blank serials
    /// never collide.
    pub fn check_serial_number_exists(&self, serial: &str, exclude_id: Option<&str>) -> bool {
        let serial = serial.trim();
        !serial.is_empty()
            && self
                .tickets
                .iter()
                .any(|t| t.serial_number.trim() == serial && Some(t.id.as_str()) != exclude_id)
    }

    // -----------------------------------------------------------------------
    // Games
    // -----------------------------------------------------------------------

    /// Freeze the checked, complete tickets into a new game and persist it.
    pub fn start_game(&mut self, opponent_only: bool) -> Result<&Game, AppError> {
        if self.active_game().is_some() {
            return Err(AppError::GameAlreadyActive);
        }
        let game = Game::start(&self.tickets, opponent_only);
        if !opponent_only && game.tickets.is_empty() {
            return Err(AppError::NoEligibleTickets);
        }
        persist("save game", self.db.save_game(&game))?;
        info!(
            "Started game {} with {} ticket(s){}",
            game.id,
            game.tickets_played,
            if opponent_only { " (opponent only)" } else { "" }
        );

        self.phase = GamePhase::Active(ActiveGame::new(game));
        let active = self.active_mut()?;
        Ok(&active.game)
    }

    pub fn add_drawn_number(&mut self, number: u8) -> Result<(), AppError> {
        let active = self.active_mut()?;
        active.game.draw(number)?;
        active.refresh_winners();
        debug!(
            "Drew {} ({} drawn, {} winning ticket(s))",
            number,
            active.game.drawn_numbers.len(),
            active.winning_ticket_ids.len()
        );
        Ok(())
    }

    /// Take back a drawn number. Returns false when it was never drawn.
    pub fn remove_drawn_number(&mut self, number: u8) -> Result<bool, AppError> {
        let active = self.active_mut()?;
        let removed = active.game.undraw(number);
        active.refresh_winners();
        Ok(removed)
    }

    /// Tickets of the active game whose numbers are all in `drawn`.
    pub fn find_winning_tickets(&self, drawn: &[u8]) -> Vec<&Ticket> {
        match self.active_game() {
            Some(active) => lottery::find_winning_tickets(&active.game.tickets, drawn),
            None => Vec::new(),
        }
    }

    /// Persist a competitor's result against the active game right away.
    pub fn record_opponent_winner(
        &mut self,
        data: OpponentWinnerData,
    ) -> Result<OpponentWinner, AppError> {
        data.validate()?;
        let game_id = self.active_mut()?.game.id.clone();
        let opponent = persist(
            "save opponent winner",
            self.db.save_opponent_winner(&game_id, &data),
        )?;
        self.active_mut()?.opponent_winners.push(opponent.clone());
        info!("Recorded opponent winner for game {}", game_id);
        Ok(opponent)
    }

    /// Close the active game: award prizes, snapshot its tickets and store
    /// the history entry in one transaction. The game stays active when
    /// anything fails.
    pub fn finish_game(&mut self, outcome: GameOutcome) -> Result<HistoryEntry, AppError> {
        let active = self.active_game().ok_or(AppError::NoActiveGame)?;
        for data in &outcome.opponent_winners {
            data.validate()?;
        }
        let winners = award_prizes(&active.game, &outcome)?;

        let mut winner_ids: Vec<String> = Vec::new();
        for winner in &winners {
            if !winner_ids.contains(&winner.ticket.original_ticket_id) {
                winner_ids.push(winner.ticket.original_ticket_id.clone());
            }
        }

        let mut game = active.game.clone();
        game.finish(winner_ids);

        let mut opponents = active.opponent_winners.clone();
        opponents.extend(
            outcome
                .opponent_winners
                .iter()
                .map(|data| OpponentWinner::from_data(&game.id, data)),
        );

        let entry = HistoryEntry::new(
            FinishedGame::from_game(&game),
            winners,
            opponents,
            self.config.ticket_cost,
        );
        persist(
            "record finished game",
            self.db.record_finished_game(&game, &entry),
        )?;
        info!(
            "Finished game {}: {} drawn, {} winner(s), net {:.2}",
            game.id,
            game.drawn_numbers.len(),
            entry.winners.len(),
            entry.net_profit
        );

        self.phase = GamePhase::NoGame;
        self.load_data()?;
        Ok(entry)
    }

    // -----------------------------------------------------------------------
    // History and analysis
    // -----------------------------------------------------------------------

    pub fn delete_history_entry(&mut self, id: &str) -> Result<(), AppError> {
        if !persist("delete history entry", self.db.delete_history_entry(id))? {
            return Err(AppError::HistoryEntryNotFound { id: id.to_string() });
        }
        info!("Deleted history entry {}", id);
        self.reload_history()
    }

    pub fn clear_game_history(&mut self) -> Result<(), AppError> {
        persist("clear game history", self.db.clear_game_history())?;
        info!("Cleared game history");
        self.reload_history()
    }

    pub fn recommend_numbers(&self, count: usize) -> Result<Vec<NumberRecommendation>, AppError> {
        persist(
            "compute recommendations",
            recommend_detailed(&self.db, count),
        )
    }

    pub fn has_statistical_data(&self) -> Result<bool, AppError> {
        persist("check statistical data", self.db.has_statistical_data())
    }

    /// Aggregates over the stored history, read fresh.
    pub fn statistics(&self) -> Result<GameStats, AppError> {
        let history = persist("load game history", self.db.get_game_history())?;
        Ok(compute_stats(&history))
    }

    pub fn balance(&self) -> Result<BalanceSummary, AppError> {
        let history = persist("load game history", self.db.get_game_history())?;
        Ok(compute_balance(&history))
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let has_statistical_data = self.db.has_statistical_data().unwrap_or_else(|e| {
            warn!("Could not check for statistical data: {:#}", e);
            false
        });
        AppSnapshot {
            tickets: self.tickets.clone(),
            ticket_stats: self.ticket_stats(),
            current_game: self.active_game().map(ActiveGame::view),
            history: self.history.clone(),
            has_statistical_data,
        }
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Process commands one at a time until `Quit` or the command channel
/// closes. Each command answers with exactly one update.
pub async fn run(
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");
    let _ = ui_tx
        .send(UiUpdate::Snapshot(Box::new(state.build_snapshot())))
        .await;

    loop {
        match cmd_rx.recv().await {
            Some(UserCommand::Quit) => {
                info!("Quit command received, shutting down");
                break;
            }
            Some(cmd) => {
                let update = match handle_user_command(&mut state, cmd) {
                    Ok(Some(update)) => update,
                    Ok(None) => UiUpdate::Snapshot(Box::new(state.build_snapshot())),
                    Err(e) => {
                        if !matches!(e, AppError::Persistence { .. }) {
                            debug!("Command rejected: {}", e);
                        }
                        UiUpdate::Error {
                            message: e.to_string(),
                        }
                    }
                };
                if ui_tx.send(update).await.is_err() {
                    info!("UI channel closed, shutting down");
                    break;
                }
            }
            None => {
                info!("Command channel closed, shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Run one command. `Ok(None)` means "send a fresh snapshot".
fn handle_user_command(
    state: &mut AppState,
    cmd: UserCommand,
) -> Result<Option<UiUpdate>, AppError> {
    match cmd {
        UserCommand::Reload => state.load_data()?,
        UserCommand::CreateTicket => {
            state.create_ticket()?;
        }
        UserCommand::CreateTickets { count } => {
            state.create_tickets(count)?;
        }
        UserCommand::UpdateTicket { ticket } => {
            state.update_ticket(ticket)?;
        }
        UserCommand::DeleteTicket { id } => state.delete_ticket(&id)?,
        UserCommand::ClearAllTickets => state.clear_all_tickets()?,
        UserCommand::FillEmptyTickets { all } => {
            state.fill_empty_tickets_with_recommended(all)?;
        }
        UserCommand::FillAllIdentifiers => {
            state.fill_all_identifiers()?;
        }
        UserCommand::ClearAllIdentifiers => {
            state.clear_all_identifiers()?;
        }
        UserCommand::DeleteIncompleteTickets => {
            state.delete_incomplete_tickets()?;
        }
        UserCommand::ClearAllNumbers => {
            state.clear_all_numbers()?;
        }
        UserCommand::MarkAllChecked => {
            state.mark_all_complete_checked()?;
        }
        UserCommand::UncheckAll => {
            state.uncheck_all_tickets()?;
        }
        UserCommand::StartGame { opponent_only } => {
            state.start_game(opponent_only)?;
        }
        UserCommand::AddDrawnNumber { number } => state.add_drawn_number(number)?,
        UserCommand::RemoveDrawnNumber { number } => {
            state.remove_drawn_number(number)?;
        }
        UserCommand::RecordOpponentWinner { data } => {
            state.record_opponent_winner(data)?;
        }
        UserCommand::FinishGame { outcome } => {
            state.finish_game(outcome)?;
        }
        UserCommand::DeleteHistoryEntry { id } => state.delete_history_entry(&id)?,
        UserCommand::ClearGameHistory => state.clear_game_history()?,
        UserCommand::RequestRecommendations { count } => {
            return Ok(Some(UiUpdate::Recommendations(
                state.recommend_numbers(count)?,
            )));
        }
        UserCommand::RequestStatistics => {
            return Ok(Some(UiUpdate::Statistics {
                stats: Box::new(state.statistics()?),
                balance: Box::new(state.balance()?),
            }));
        }
        // The loop stops before dispatching Quit.
        UserCommand::Quit => {}
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super3_core::lottery::{GameType, SecondaryDraw};

    fn create_test_app_state() -> AppState {
        let db = Database::open(":memory:").expect("in-memory db");
        let mut state = AppState::new(GameConfig::default(), db);
        state.load_data().unwrap();
        state
    }

    /// Turn an existing cached ticket into a checked, complete one.
    fn fill_ticket(state: &mut AppState, index: usize, numbers: [u8; 7], serial: &str) -> Ticket {
        let mut ticket = state.tickets[index].clone();
        ticket.numbers = numbers.to_vec();
        ticket.serial_number = serial.to_string();
        ticket.is_checked = true;
        state.update_ticket(ticket).unwrap()
    }

    fn opponent(amount: f64) -> OpponentWinnerData {
        OpponentWinnerData {
            game_type: GameType::Main,
            numbers: vec![1, 2, 3, 4, 5, 6, 7],
            serial_number: "555".into(),
            winning_amount: amount,
            notes: None,
        }
    }

    // -----------------------------------------------------------------------
    // Tests: Tickets
    // -----------------------------------------------------------------------

    #[test]
    fn create_ticket_assigns_next_free_custom_id() {
        let mut state = create_test_app_state();
        state.create_tickets(3).unwrap();
        let second = state.tickets[1].id.clone();
        state.delete_ticket(&second).unwrap();

        let ticket = state.create_ticket().unwrap();
        assert_eq!(ticket.custom_id.as_deref(), Some("2"));

        let more = state.create_tickets(2).unwrap();
        let ids: Vec<_> = more.iter().filter_map(|t| t.custom_id.clone()).collect();
        assert_eq!(ids, vec!["4", "5"]);
        assert_eq!(state.tickets.len(), 5);
    }

    #[test]
    fn ticket_limit_caps_creation() {
        let mut state = create_test_app_state();
        state.config.max_tickets = 3;

        let created = state.create_tickets(5).unwrap();
        assert_eq!(created.len(), 3);
        assert!(matches!(
            state.create_ticket(),
            Err(AppError::TicketLimitReached { max: 3 })
        ));
        assert!(matches!(
            state.create_tickets(1),
            Err(AppError::TicketLimitReached { .. })
        ));
        assert!(state.create_tickets(0).unwrap().is_empty());
    }

    #[test]
    fn update_ticket_normalizes_and_persists() {
        let mut state = create_test_app_state();
        state.create_ticket().unwrap();

        let complete = fill_ticket(&mut state, 0, [3, 7, 15, 22, 40, 61, 90], "000123");
        assert!(complete.is_complete);
        assert!(complete.is_checked);

        // Dropping the serial makes it incomplete and clears the check.
        let mut edited = complete.clone();
        edited.serial_number = "  ".into();
        let edited = state.update_ticket(edited).unwrap();
        assert!(!edited.is_complete);
        assert!(!edited.is_checked);

        let stored = state.db.get_tickets().unwrap();
        assert_eq!(stored, state.tickets);
        assert_eq!(stored[0].created_at, complete.created_at);
    }

    #[test]
    fn update_ticket_rejects_bad_input() {
        let mut state = create_test_app_state();
        state.create_tickets(2).unwrap();
        fill_ticket(&mut state, 0, [1, 2, 3, 4, 5, 6, 7], "000123");

        let mut ticket = state.tickets[1].clone();
        ticket.numbers = vec![1, 2, 3];
        assert!(matches!(
            state.update_ticket(ticket.clone()),
            Err(AppError::Validation(ValidationError::WrongNumberCount { .. }))
        ));

        ticket.numbers = vec![];
        ticket.serial_number = " 000123 ".into();
        assert!(matches!(
            state.update_ticket(ticket.clone()),
            Err(AppError::Validation(ValidationError::DuplicateSerial { .. }))
        ));

        ticket.id = "missing".into();
        assert!(matches!(
            state.update_ticket(ticket),
            Err(AppError::TicketNotFound { .. })
        ));
    }

    #[test]
    fn serial_check_honours_exclusion() {
        let mut state = create_test_app_state();
        state.create_tickets(2).unwrap();
        let owner = fill_ticket(&mut state, 0, [1, 2, 3, 4, 5, 6, 7], "000123");
        let other = state.tickets[1].id.clone();

        assert!(state.check_serial_number_exists("000123", None));
        assert!(state.check_serial_number_exists("000123", Some(&other)));
        assert!(!state.check_serial_number_exists("000123", Some(&owner.id)));
        assert!(!state.check_serial_number_exists("999999", None));
        assert!(!state.check_serial_number_exists("", None));
    }

    #[test]
    fn delete_missing_ticket_is_an_error() {
        let mut state = create_test_app_state();
        assert!(matches!(
            state.delete_ticket("nope"),
            Err(AppError::TicketNotFound { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Tests: Bulk ticket operations
    // -----------------------------------------------------------------------

    #[test]
    fn delete_incomplete_keeps_complete_tickets() {
        let mut state = create_test_app_state();
        state.create_tickets(4).unwrap();
        fill_ticket(&mut state, 0, [1, 2, 3, 4, 5, 6, 7], "1");
        fill_ticket(&mut state, 2, [8, 9, 10, 11, 12, 13, 14], "2");

        assert_eq!(state.delete_incomplete_tickets().unwrap(), 2);
        assert_eq!(state.tickets.len(), 2);
        assert!(state.tickets.iter().all(|t| t.is_complete));
        assert_eq!(state.delete_incomplete_tickets().unwrap(), 0);
    }

    #[test]
    fn identifiers_fill_and_clear() {
        let mut state = create_test_app_state();
        state.create_tickets(3).unwrap();
        assert_eq!(state.clear_all_identifiers().unwrap(), 3);
        assert!(state.tickets.iter().all(|t| t.custom_id.is_none()));

        let mut keep = state.tickets[1].clone();
        keep.custom_id = Some("2".into());
        state.update_ticket(keep).unwrap();

        assert_eq!(state.fill_all_identifiers().unwrap(), 2);
        let ids: Vec<_> = state
            .tickets
            .iter()
            .map(|t| t.custom_id.clone().unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn check_flags_follow_completeness() {
        let mut state = create_test_app_state();
        state.create_tickets(3).unwrap();
        let mut ticket = state.tickets[0].clone();
        ticket.numbers = vec![1, 2, 3, 4, 5, 6, 7];
        ticket.serial_number = "10".into();
        state.update_ticket(ticket).unwrap();

        assert_eq!(state.mark_all_complete_checked().unwrap(), 1);
        assert_eq!(state.ticket_stats().checked, 1);
        assert_eq!(state.mark_all_complete_checked().unwrap(), 0);

        assert_eq!(state.uncheck_all_tickets().unwrap(), 1);
        assert_eq!(state.ticket_stats().checked, 0);
    }

    #[test]
    fn clear_numbers_unchecks_tickets() {
        let mut state = create_test_app_state();
        state.create_tickets(2).unwrap();
        fill_ticket(&mut state, 0, [1, 2, 3, 4, 5, 6, 7], "1");

        assert_eq!(state.clear_all_numbers().unwrap(), 1);
        let stats = state.ticket_stats();
        assert_eq!(stats.complete, 0);
        assert_eq!(stats.checked, 0);
        assert!(state.tickets.iter().all(|t| t.numbers.is_empty()));
    }

    #[test]
    fn ticket_stats_use_configured_cost() {
        let mut state = create_test_app_state();
        state.create_tickets(4).unwrap();
        fill_ticket(&mut state, 0, [1, 2, 3, 4, 5, 6, 7], "1");

        let stats = state.ticket_stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.incomplete, 3);
        assert_eq!(stats.checked, 1);
        assert!((stats.total_cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fill_requires_history() {
        let mut state = create_test_app_state();
        state.create_ticket().unwrap();
        assert!(matches!(
            state.fill_empty_tickets_with_recommended(true),
            Err(AppError::NoStatisticalData)
        ));
    }

    #[test]
    fn fill_uses_recommendations_up_to_batch_size() {
        let mut state = create_test_app_state();
        state.start_game(true).unwrap();
        for n in 1..=10 {
            state.add_drawn_number(n).unwrap();
        }
        state.finish_game(GameOutcome::default()).unwrap();

        state.config.fill_batch_size = 2;
        state.create_tickets(3).unwrap();
        assert_eq!(state.fill_empty_tickets_with_recommended(false).unwrap(), 2);
        assert_eq!(
            state.tickets.iter().filter(|t| t.numbers.is_empty()).count(),
            1
        );
        let filled = &state.tickets[0].numbers;
        assert_eq!(filled.len(), TICKET_SIZE);
        assert!(filled.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(state.fill_empty_tickets_with_recommended(true).unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Tests: Game lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn start_game_freezes_playable_tickets() {
        let mut state = create_test_app_state();
        state.create_tickets(3).unwrap();
        fill_ticket(&mut state, 0, [3, 7, 15, 22, 40, 61, 90], "100");
        let mut unchecked = state.tickets[1].clone();
        unchecked.numbers = vec![1, 2, 3, 4, 5, 6, 7];
        unchecked.serial_number = "200".into();
        state.update_ticket(unchecked).unwrap();

        let game = state.start_game(false).unwrap();
        assert_eq!(game.tickets.len(), 1);
        assert_eq!(game.tickets_played, 1);

        assert!(matches!(
            state.start_game(false),
            Err(AppError::GameAlreadyActive)
        ));
    }

    #[test]
    fn start_game_without_eligible_tickets_fails() {
        let mut state = create_test_app_state();
        state.create_ticket().unwrap();
        assert!(matches!(
            state.start_game(false),
            Err(AppError::NoEligibleTickets)
        ));
        assert_eq!(state.phase, GamePhase::NoGame);

        // Opponent-only games need no tickets.
        assert!(state.start_game(true).unwrap().tickets.is_empty());
    }

    #[test]
    fn draws_track_winners() {
        let mut state = create_test_app_state();
        state.create_ticket().unwrap();
        let ticket = fill_ticket(&mut state, 0, [3, 7, 15, 22, 40, 61, 90], "100");
        state.start_game(false).unwrap();

        for n in [90, 3, 7, 15, 22, 40, 5] {
            state.add_drawn_number(n).unwrap();
        }
        assert!(state.active_game().unwrap().winning_ticket_ids.is_empty());

        state.add_drawn_number(61).unwrap();
        assert_eq!(
            state.active_game().unwrap().winning_ticket_ids,
            vec![ticket.id.clone()]
        );
        let view = state.active_game().unwrap().view();
        assert_eq!(view.drawn_sorted, vec![3, 5, 7, 15, 22, 40, 61, 90]);
        assert_eq!(view.game.drawn_numbers[0], 90);

        assert!(state.remove_drawn_number(61).unwrap());
        assert!(!state.remove_drawn_number(61).unwrap());
        assert!(state.active_game().unwrap().winning_ticket_ids.is_empty());
    }

    #[test]
    fn bad_draws_are_rejected() {
        let mut state = create_test_app_state();
        assert!(matches!(
            state.add_drawn_number(5),
            Err(AppError::NoActiveGame)
        ));

        state.start_game(true).unwrap();
        state.add_drawn_number(5).unwrap();
        assert!(matches!(
            state.add_drawn_number(5),
            Err(AppError::Validation(ValidationError::AlreadyDrawn { number: 5 }))
        ));
        assert!(matches!(
            state.add_drawn_number(91),
            Err(AppError::Validation(ValidationError::NumberOutOfRange { number: 91 }))
        ));
        assert!(matches!(
            state.add_drawn_number(0),
            Err(AppError::Validation(ValidationError::NumberOutOfRange { number: 0 }))
        ));
    }

    #[test]
    fn find_winning_tickets_matches_subset() {
        let mut state = create_test_app_state();
        assert!(state.find_winning_tickets(&[1, 2, 3]).is_empty());

        state.create_ticket().unwrap();
        fill_ticket(&mut state, 0, [3, 7, 15, 22, 40, 61, 90], "100");
        state.start_game(false).unwrap();

        let drawn = [1, 3, 7, 15, 22, 40, 61, 90, 44];
        assert_eq!(state.find_winning_tickets(&drawn).len(), 1);
        assert!(state.find_winning_tickets(&drawn[..7]).is_empty());
    }

    #[test]
    fn finish_game_records_history_and_resets_phase() {
        let mut state = create_test_app_state();
        state.create_tickets(2).unwrap();
        let winner = fill_ticket(&mut state, 0, [3, 7, 15, 22, 40, 61, 90], "100");
        fill_ticket(&mut state, 1, [1, 2, 4, 5, 6, 8, 9], "200");
        state.start_game(false).unwrap();
        for n in [3, 7, 15, 22, 40, 61, 90] {
            state.add_drawn_number(n).unwrap();
        }
        state.record_opponent_winner(opponent(30.0)).unwrap();

        let entry = state
            .finish_game(GameOutcome {
                main_prize: 100.0,
                secondary: Some(SecondaryDraw {
                    serial_number: "200".into(),
                    prize: 10.0,
                }),
                opponent_winners: vec![opponent(20.0)],
            })
            .unwrap();

        assert_eq!(state.phase, GamePhase::NoGame);
        assert!((entry.total_cost - 0.5).abs() < 1e-9);
        assert!((entry.total_winnings - 110.0).abs() < 1e-9);
        assert!((entry.total_opponent_winnings - 50.0).abs() < 1e-9);
        assert!((entry.net_profit - (entry.total_winnings - entry.total_cost)).abs() < 1e-9);
        assert_eq!(entry.game.winner_tickets.len(), 2);

        assert_eq!(state.history.len(), 1);
        let stored = &state.history[0];
        assert_eq!(stored.id, entry.id);
        assert_eq!(stored.winners.len(), 2);
        assert_eq!(stored.opponent_winners.len(), 2);
        assert!(stored
            .game
            .winner_tickets
            .iter()
            .any(|s| s.original_ticket_id == winner.id));
        assert!(state.has_statistical_data().unwrap());
    }

    #[test]
    fn prize_without_winner_keeps_game_active() {
        let mut state = create_test_app_state();
        state.create_ticket().unwrap();
        fill_ticket(&mut state, 0, [3, 7, 15, 22, 40, 61, 90], "100");
        state.start_game(false).unwrap();
        state.add_drawn_number(3).unwrap();

        let outcome = GameOutcome {
            main_prize: 50.0,
            ..GameOutcome::default()
        };
        assert!(matches!(
            state.finish_game(outcome),
            Err(AppError::Validation(ValidationError::PrizeWithoutWinner {
                phase: GameType::Main
            }))
        ));
        assert!(state.active_game().is_some());
        assert!(state.history.is_empty());
    }

    #[test]
    fn opponent_only_game_costs_nothing() {
        let mut state = create_test_app_state();
        state.create_ticket().unwrap();
        fill_ticket(&mut state, 0, [3, 7, 15, 22, 40, 61, 90], "100");

        state.start_game(true).unwrap();
        state.add_drawn_number(3).unwrap();
        let entry = state.finish_game(GameOutcome::default()).unwrap();

        assert_eq!(entry.total_cost, 0.0);
        assert_eq!(entry.net_profit, 0.0);
        assert!(entry.winners.is_empty());
        assert_eq!(entry.tickets_played, 0);
    }

    #[test]
    fn history_survives_live_ticket_edits() {
        let mut state = create_test_app_state();
        state.create_ticket().unwrap();
        let ticket = fill_ticket(&mut state, 0, [3, 7, 15, 22, 40, 61, 90], "100");
        state.start_game(false).unwrap();
        state.finish_game(GameOutcome::default()).unwrap();

        let mut edited = state.tickets[0].clone();
        edited.numbers = vec![10, 11, 12, 13, 14, 15, 16];
        state.update_ticket(edited).unwrap();
        state.delete_ticket(&ticket.id).unwrap();

        state.load_data().unwrap();
        let snapshot = &state.history[0].game.tickets[0];
        assert_eq!(snapshot.original_ticket_id, ticket.id);
        assert_eq!(snapshot.numbers, vec![3, 7, 15, 22, 40, 61, 90]);
        assert!(state.tickets.is_empty());
    }

    #[test]
    fn record_opponent_winner_requires_active_game() {
        let mut state = create_test_app_state();
        assert!(matches!(
            state.record_opponent_winner(opponent(5.0)),
            Err(AppError::NoActiveGame)
        ));

        state.start_game(true).unwrap();
        let mut bad = opponent(5.0);
        bad.winning_amount = -1.0;
        assert!(matches!(
            state.record_opponent_winner(bad),
            Err(AppError::Validation(_))
        ));
        assert!(state.active_game().unwrap().opponent_winners.is_empty());
    }

    #[test]
    fn delete_and_clear_history() {
        let mut state = create_test_app_state();
        for _ in 0..2 {
            state.start_game(true).unwrap();
            state.add_drawn_number(9).unwrap();
            state.finish_game(GameOutcome::default()).unwrap();
        }
        assert_eq!(state.history.len(), 2);

        let id = state.history[0].id.clone();
        state.delete_history_entry(&id).unwrap();
        assert_eq!(state.history.len(), 1);
        assert!(matches!(
            state.delete_history_entry(&id),
            Err(AppError::HistoryEntryNotFound { .. })
        ));

        state.clear_game_history().unwrap();
        assert!(state.history.is_empty());
        assert!(!state.has_statistical_data().unwrap());
    }

    #[test]
    fn statistics_read_the_store() {
        let mut state = create_test_app_state();
        assert_eq!(state.statistics().unwrap(), GameStats::default());

        state.start_game(true).unwrap();
        state.add_drawn_number(12).unwrap();
        state.add_drawn_number(34).unwrap();
        state.finish_game(GameOutcome::default()).unwrap();

        let stats = state.statistics().unwrap();
        assert_eq!(stats.total_registered_games, 1);
        assert_eq!(stats.total_games, 0);
        assert_eq!(state.balance().unwrap().total_games, 1);
    }

    // -----------------------------------------------------------------------
    // Tests: Async event loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn event_loop_handles_quit_command() {
        let state = create_test_app_state();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, mut ui_rx) = mpsc::channel(16);

        let handle = tokio::spawn(run(cmd_rx, ui_tx, state));
        assert!(matches!(ui_rx.recv().await, Some(UiUpdate::Snapshot(_))));

        cmd_tx.send(UserCommand::Quit).await.unwrap();
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn event_loop_reports_errors_and_snapshots() {
        let state = create_test_app_state();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        let handle = tokio::spawn(run(cmd_rx, ui_tx, state));
        let _initial = ui_rx.recv().await;

        cmd_tx
            .send(UserCommand::AddDrawnNumber { number: 4 })
            .await
            .unwrap();
        match ui_rx.recv().await {
            Some(UiUpdate::Error { message }) => assert_eq!(message, "no game in progress"),
            other => panic!("expected error, got {other:?}"),
        }

        cmd_tx
            .send(UserCommand::CreateTickets { count: 2 })
            .await
            .unwrap();
        match ui_rx.recv().await {
            Some(UiUpdate::Snapshot(snapshot)) => {
                assert_eq!(snapshot.tickets.len(), 2);
                assert_eq!(snapshot.ticket_stats.total, 2);
                assert!(snapshot.current_game.is_none());
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        drop(cmd_tx);
        assert!(handle.await.unwrap().is_ok());
    }
}
