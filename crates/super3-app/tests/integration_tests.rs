// Integration tests for the Super3 tracker.
//
// These tests drive the library crates through their public API: the
// coordinator over an on-disk database, the message loop over real channels,
// and the configuration loader against the shipped defaults.

use std::path::PathBuf;

use super3_app::app::{self, AppState, GamePhase};
use super3_app::protocol::*;
use super3_core::config::{self, GameConfig};
use super3_core::db::Database;
use super3_core::lottery::{GameOutcome, GameType, OpponentWinnerData, SecondaryDraw, Ticket};

use tokio::sync::mpsc;

// ===========================================================================
// Test helpers
// ===========================================================================

/// A scratch directory under the system temp dir, removed on drop.
struct TempDir(PathBuf);

impl TempDir {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "super3_it_{}_{}_{}",
            name,
            std::process::id(),
            super3_core::lottery::new_id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }

    fn db_path(&self) -> String {
        self.0.join("super3.db").to_string_lossy().into_owned()
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn open_state(path: &str) -> AppState {
    let db = Database::open(path).expect("database should open");
    let mut state = AppState::new(GameConfig::default(), db);
    state.load_data().expect("cache should load");
    state
}

fn complete(mut ticket: Ticket, numbers: [u8; 7], serial: &str) -> Ticket {
    ticket.numbers = numbers.to_vec();
    ticket.serial_number = serial.to_string();
    ticket.is_checked = true;
    ticket
}

async fn next_update(ui_rx: &mut mpsc::Receiver<UiUpdate>) -> UiUpdate {
    ui_rx.recv().await.expect("update channel closed early")
}

async fn next_snapshot(ui_rx: &mut mpsc::Receiver<UiUpdate>) -> Box<AppSnapshot> {
    match next_update(ui_rx).await {
        UiUpdate::Snapshot(snapshot) => snapshot,
        other => panic!("expected snapshot, got {other:?}"),
    }
}

// ===========================================================================
// Full game flow
// ===========================================================================

#[test]
fn full_game_flow_persists_across_reopen() {
    let dir = TempDir::new("flow");
    let path = dir.db_path();

    let winner_id;
    {
        let mut state = open_state(&path);
        state.create_tickets(3).unwrap();
        let first = complete(state.tickets[0].clone(), [3, 7, 15, 22, 40, 61, 90], "000123");
        winner_id = state.update_ticket(first).unwrap().id;
        let second = complete(state.tickets[1].clone(), [1, 2, 4, 5, 6, 8, 9], "000456");
        state.update_ticket(second).unwrap();

        state.start_game(false).unwrap();
        for n in [61, 3, 7, 15, 22, 40, 90, 11] {
            state.add_drawn_number(n).unwrap();
        }
        state
            .record_opponent_winner(OpponentWinnerData {
                game_type: GameType::Secondary,
                numbers: vec![],
                serial_number: "000789".into(),
                winning_amount: 25.0,
                notes: Some("neighbour".into()),
            })
            .unwrap();

        let entry = state
            .finish_game(GameOutcome {
                main_prize: 100.0,
                secondary: Some(SecondaryDraw {
                    serial_number: "000456".into(),
                    prize: 20.0,
                }),
                opponent_winners: vec![],
            })
            .unwrap();
        assert!((entry.total_cost - 0.5).abs() < 1e-9);
        assert!((entry.net_profit - 119.5).abs() < 1e-9);
        assert_eq!(state.phase, GamePhase::NoGame);
    }

    // A fresh process sees the same tickets and history.
    let state = open_state(&path);
    assert_eq!(state.tickets.len(), 3);
    assert_eq!(state.history.len(), 1);

    let entry = &state.history[0];
    assert_eq!(entry.game.tickets.len(), 2);
    assert_eq!(entry.game.drawn_numbers, vec![61, 3, 7, 15, 22, 40, 90, 11]);
    assert_eq!(entry.winners.len(), 2);
    assert_eq!(entry.opponent_winners.len(), 1);
    assert_eq!(entry.opponent_winners[0].notes.as_deref(), Some("neighbour"));
    assert!(entry
        .game
        .winner_tickets
        .iter()
        .any(|s| s.original_ticket_id == winner_id));

    let stats = state.statistics().unwrap();
    assert_eq!(stats.total_games, 1);
    assert_eq!(stats.games_won, 1);
    assert_eq!(stats.winning_serials.opponent, vec!["000789".to_string()]);
    assert_eq!(stats.top_winning_numbers.len(), 10);

    let balance = state.balance().unwrap();
    assert_eq!(balance.winning_games, 1);
    assert!((balance.total_won - 120.0).abs() < 1e-9);

    let recommendations = state.recommend_numbers(7).unwrap();
    assert_eq!(recommendations.len(), 7);
    assert!(recommendations[0].score >= recommendations[6].score);
}

#[test]
fn opponent_only_games_feed_recommendations() {
    let dir = TempDir::new("opponent");
    let mut state = open_state(&dir.db_path());

    state.start_game(true).unwrap();
    for n in [5, 10, 15, 20, 25, 30, 35, 40] {
        state.add_drawn_number(n).unwrap();
    }
    let entry = state
        .finish_game(GameOutcome {
            opponent_winners: vec![OpponentWinnerData {
                game_type: GameType::Main,
                numbers: vec![5, 10, 15, 20, 25, 30, 35],
                serial_number: "123".into(),
                winning_amount: 500.0,
                notes: None,
            }],
            ..GameOutcome::default()
        })
        .unwrap();

    assert_eq!(entry.total_cost, 0.0);
    assert!((entry.total_opponent_winnings - 500.0).abs() < 1e-9);

    let numbers: Vec<u8> = state
        .recommend_numbers(7)
        .unwrap()
        .into_iter()
        .map(|r| r.number)
        .collect();
    assert_eq!(numbers, vec![5, 10, 15, 20, 25, 30, 35]);

    state.create_tickets(2).unwrap();
    assert_eq!(state.fill_empty_tickets_with_recommended(true).unwrap(), 2);
    assert!(state
        .tickets
        .iter()
        .all(|t| t.numbers == vec![5, 10, 15, 20, 25, 30, 35]));
}

// ===========================================================================
// Message loop
// ===========================================================================

#[tokio::test]
async fn command_loop_plays_a_game() {
    let dir = TempDir::new("loop");
    let state = open_state(&dir.db_path());
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ui_tx, mut ui_rx) = mpsc::channel(16);
    let handle = tokio::spawn(app::run(cmd_rx, ui_tx, state));

    let initial = next_snapshot(&mut ui_rx).await;
    assert!(initial.tickets.is_empty());
    assert!(!initial.has_statistical_data);

    cmd_tx.send(UserCommand::CreateTicket).await.unwrap();
    let snapshot = next_snapshot(&mut ui_rx).await;
    let ticket = complete(snapshot.tickets[0].clone(), [3, 7, 15, 22, 40, 61, 90], "42");

    cmd_tx
        .send(UserCommand::UpdateTicket { ticket })
        .await
        .unwrap();
    let snapshot = next_snapshot(&mut ui_rx).await;
    assert_eq!(snapshot.ticket_stats.checked, 1);

    cmd_tx
        .send(UserCommand::StartGame {
            opponent_only: false,
        })
        .await
        .unwrap();
    let snapshot = next_snapshot(&mut ui_rx).await;
    assert_eq!(
        snapshot.current_game.as_ref().map(|g| g.game.tickets_played),
        Some(1)
    );

    for number in [90, 61, 40, 22, 15, 7, 3] {
        cmd_tx
            .send(UserCommand::AddDrawnNumber { number })
            .await
            .unwrap();
        let _ = next_snapshot(&mut ui_rx).await;
    }
    cmd_tx
        .send(UserCommand::AddDrawnNumber { number: 3 })
        .await
        .unwrap();
    assert!(matches!(
        next_update(&mut ui_rx).await,
        UiUpdate::Error { .. }
    ));

    cmd_tx.send(UserCommand::Reload).await.unwrap();
    let snapshot = next_snapshot(&mut ui_rx).await;
    let view = snapshot.current_game.as_ref().unwrap();
    assert_eq!(view.drawn_sorted, vec![3, 7, 15, 22, 40, 61, 90]);
    assert_eq!(view.winning_ticket_ids.len(), 1);

    cmd_tx
        .send(UserCommand::FinishGame {
            outcome: GameOutcome {
                main_prize: 10.0,
                ..GameOutcome::default()
            },
        })
        .await
        .unwrap();
    let snapshot = next_snapshot(&mut ui_rx).await;
    assert!(snapshot.current_game.is_none());
    assert_eq!(snapshot.history.len(), 1);
    assert!(snapshot.has_statistical_data);

    cmd_tx.send(UserCommand::RequestStatistics).await.unwrap();
    match next_update(&mut ui_rx).await {
        UiUpdate::Statistics { stats, balance } => {
            assert_eq!(stats.total_games, 1);
            assert!((balance.net_profit - 9.75).abs() < 1e-9);
        }
        other => panic!("expected statistics, got {other:?}"),
    }

    cmd_tx
        .send(UserCommand::RequestRecommendations { count: 3 })
        .await
        .unwrap();
    match next_update(&mut ui_rx).await {
        UiUpdate::Recommendations(list) => assert_eq!(list.len(), 3),
        other => panic!("expected recommendations, got {other:?}"),
    }

    cmd_tx.send(UserCommand::Quit).await.unwrap();
    assert!(handle.await.unwrap().is_ok());
}

// ===========================================================================
// Configuration
// ===========================================================================

#[test]
fn shipped_defaults_load() {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    let dir = TempDir::new("config");
    std::fs::create_dir_all(dir.0.join("defaults")).unwrap();
    std::fs::copy(
        root.join("defaults").join(config::CONFIG_FILE),
        dir.0.join("defaults").join(config::CONFIG_FILE),
    )
    .unwrap();

    let copied = config::ensure_config_files(&dir.0).unwrap();
    assert_eq!(copied.len(), 1);

    let loaded = config::load_config_from(&dir.0).unwrap();
    assert_eq!(loaded.game, GameConfig::default());
    assert_eq!(loaded.db_path, "super3.db");
}
