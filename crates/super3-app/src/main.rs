// Super3 tracker entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout carries the protocol)
// 2. Load config
// 3. Open database (runs schema migrations) and load the cache
// 4. Create mpsc channels
// 5. Spawn app logic task and the update printer
// 6. Feed JSON commands from stdin until EOF
// 7. Cleanup on exit

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super3_app::app;
use super3_app::protocol::{UiUpdate, UserCommand};
use super3_core::config;
use super3_core::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Super3 tracker starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: ticket cost {}, max {} tickets",
        config.game.ticket_cost, config.game.max_tickets
    );

    let db = db::Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    let mut app_state = app::AppState::new(config.game.clone(), db);
    app_state
        .load_data()
        .context("failed to load tickets and history")?;

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });
    let printer_handle = tokio::spawn(print_updates(ui_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<UserCommand>(line) {
            Ok(cmd) => {
                let quit = cmd == UserCommand::Quit;
                if cmd_tx.send(cmd).await.is_err() || quit {
                    break;
                }
            }
            Err(e) => {
                warn!("Ignoring malformed command: {}", e);
                eprintln!("invalid command: {e}");
            }
        }
    }
    drop(cmd_tx);

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
        let _ = printer_handle.await;
    })
    .await;

    info!("Super3 tracker shut down cleanly");
    Ok(())
}

/// Write every update as one JSON line on stdout.
async fn print_updates(mut ui_rx: mpsc::Receiver<UiUpdate>) {
    let mut stdout = tokio::io::stdout();
    while let Some(update) = ui_rx.recv().await {
        let mut line = match serde_json::to_string(&update) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode update: {}", e);
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            error!("Failed to write update: {}", e);
            break;
        }
        let _ = stdout.flush().await;
    }
}

/// Initialize tracing to log to a file (stdout is reserved for updates).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("super3.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("super3_core=info,super3_app=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
