// Table definitions and the versioned migration list.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

/// Every table in its latest shape. Older files gain missing columns through
/// [`MIGRATIONS`].
const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS tickets (
        id            TEXT PRIMARY KEY,
        custom_id     TEXT,
        serial_number TEXT NOT NULL DEFAULT '',
        numbers       TEXT NOT NULL DEFAULT '[]',
        is_checked    INTEGER NOT NULL DEFAULT 0,
        is_complete   INTEGER NOT NULL DEFAULT 0,
        created_at    TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS ticket_snapshots (
        id                 TEXT PRIMARY KEY,
        game_id            TEXT NOT NULL,
        original_ticket_id TEXT NOT NULL,
        custom_id          TEXT,
        serial_number      TEXT NOT NULL DEFAULT '',
        numbers            TEXT NOT NULL DEFAULT '[]',
        created_at         TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS games (
        id                    TEXT PRIMARY KEY,
        drawn_numbers         TEXT NOT NULL DEFAULT '[]',
        winner_ticket_ids     TEXT NOT NULL DEFAULT '[]',
        game_type             TEXT NOT NULL,
        is_active             INTEGER NOT NULL DEFAULT 0,
        is_opponent_only_mode INTEGER NOT NULL DEFAULT 0,
        started_at            TEXT NOT NULL,
        finished_at           TEXT,
        tickets_played        INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS game_tickets (
        game_id   TEXT NOT NULL REFERENCES games(id),
        ticket_id TEXT NOT NULL,
        position  INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (game_id, ticket_id)
    );

    CREATE TABLE IF NOT EXISTS winners (
        id               TEXT PRIMARY KEY,
        game_id          TEXT,
        ticket_id        TEXT NOT NULL,
        winning_amount   REAL NOT NULL,
        game_type        TEXT NOT NULL,
        is_player_winner INTEGER NOT NULL DEFAULT 1,
        created_at       TEXT NOT NULL,
        custom_id        TEXT,
        serial_number    TEXT,
        numbers          TEXT
    );

    CREATE TABLE IF NOT EXISTS opponent_winners (
        id             TEXT PRIMARY KEY,
        game_id        TEXT,
        game_type      TEXT NOT NULL,
        numbers        TEXT,
        serial_number  TEXT,
        winning_amount REAL NOT NULL,
        notes          TEXT,
        created_at     TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS history (
        id                      TEXT PRIMARY KEY,
        game_id                 TEXT,
        total_cost              REAL NOT NULL,
        total_winnings          REAL NOT NULL,
        total_opponent_winnings REAL NOT NULL DEFAULT 0,
        net_profit              REAL NOT NULL,
        created_at              TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS winning_numbers (
        id               TEXT PRIMARY KEY,
        game_id          TEXT,
        number           INTEGER NOT NULL,
        is_player_winner INTEGER NOT NULL DEFAULT 1,
        game_type        TEXT NOT NULL,
        position         INTEGER,
        created_at       TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS winning_serials (
        id               TEXT PRIMARY KEY,
        game_id          TEXT,
        serial_number    TEXT NOT NULL,
        is_player_winner INTEGER NOT NULL DEFAULT 1,
        game_type        TEXT NOT NULL,
        created_at       TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS schema_version (
        version    INTEGER PRIMARY KEY,
        name       TEXT NOT NULL DEFAULT '',
        applied_at TEXT
    );
";

/// One schema change. `apply` must be safe to run against a file that
/// already has the change.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub apply: fn(&Connection) -> Result<()>,
}

/// Ordered by version. Append only.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "games.is_opponent_only_mode",
        apply: |conn| {
            add_column_if_missing(
                conn,
                "games",
                "is_opponent_only_mode",
                "INTEGER NOT NULL DEFAULT 0",
            )
        },
    },
    Migration {
        version: 2,
        name: "game_id on result tables",
        apply: backfill_game_ids,
    },
    Migration {
        version: 3,
        name: "history.total_opponent_winnings",
        apply: |conn| {
            add_column_if_missing(
                conn,
                "history",
                "total_opponent_winnings",
                "REAL NOT NULL DEFAULT 0",
            )
        },
    },
    Migration {
        version: 4,
        name: "winners ticket columns",
        apply: |conn| {
            add_column_if_missing(conn, "winners", "custom_id", "TEXT")?;
            add_column_if_missing(conn, "winners", "serial_number", "TEXT")?;
            add_column_if_missing(conn, "winners", "numbers", "TEXT")
        },
    },
    Migration {
        version: 5,
        name: "games.winner_ticket_ids",
        apply: |conn| {
            add_column_if_missing(conn, "games", "winner_ticket_ids", "TEXT NOT NULL DEFAULT '[]'")
        },
    },
    Migration {
        version: 6,
        name: "games.tickets_played",
        apply: |conn| {
            add_column_if_missing(conn, "games", "tickets_played", "INTEGER NOT NULL DEFAULT 0")
        },
    },
    Migration {
        version: 7,
        name: "game_id indexes",
        apply: |conn| {
            conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_winners_game_id ON winners(game_id);
                 CREATE INDEX IF NOT EXISTS idx_opponent_winners_game_id ON opponent_winners(game_id);
                 CREATE INDEX IF NOT EXISTS idx_history_game_id ON history(game_id);
                 CREATE INDEX IF NOT EXISTS idx_winning_numbers_game_id ON winning_numbers(game_id);
                 CREATE INDEX IF NOT EXISTS idx_winning_serials_game_id ON winning_serials(game_id);",
            )
            .context("failed to create game_id indexes")
        },
    },
];

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<u32>,
    pub failed: Vec<u32>,
    /// Recorded version after the run.
    pub version: u32,
}

/// Create missing tables, then run every pending migration.
pub fn initialize_schema(conn: &Connection) -> Result<MigrationReport> {
    conn.execute_batch(CREATE_TABLES)
        .context("failed to create database schema")?;

    // Files written before the version table carried names.
    add_column_if_missing(conn, "schema_version", "name", "TEXT NOT NULL DEFAULT ''")?;
    add_column_if_missing(conn, "schema_version", "applied_at", "TEXT")?;

    run_migrations(conn, MIGRATIONS)
}

/// `MAX(version)` from `schema_version`, 0 for a fresh file.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .context("failed to read schema version")?;
    Ok(version as u32)
}

/// Apply every migration newer than the recorded version, in order.
///
/// A failing migration is logged and skipped; its version is not recorded
/// and the run carries on with the next one.
pub fn run_migrations(conn: &Connection, migrations: &[Migration]) -> Result<MigrationReport> {
    let current = current_version(conn)?;
    let mut report = MigrationReport {
        version: current,
        ..MigrationReport::default()
    };

    for migration in migrations.iter().filter(|m| m.version > current) {
        match (migration.apply)(conn).and_then(|()| record_version(conn, migration)) {
            Ok(()) => {
                debug!("applied migration {} ({})", migration.version, migration.name);
                report.applied.push(migration.version);
                report.version = report.version.max(migration.version);
            }
            Err(e) => {
                warn!(
                    "migration {} ({}) failed, skipping: {e:#}",
                    migration.version, migration.name
                );
                report.failed.push(migration.version);
            }
        }
    }

    if !report.applied.is_empty() {
        info!(
            "schema migrated from version {current} to {}",
            report.version
        );
    }
    Ok(report)
}

fn record_version(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version, name, applied_at)
         VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        params![migration.version, migration.name],
    )
    .with_context(|| format!("failed to record schema version {}", migration.version))?;
    Ok(())
}

fn backfill_game_ids(conn: &Connection) -> Result<()> {
    for table in [
        "winning_numbers",
        "winning_serials",
        "opponent_winners",
        "winners",
        "history",
    ] {
        if !table_exists(conn, table)? {
            debug!("table {table} missing, skipping game_id backfill");
            continue;
        }
        add_column_if_missing(conn, table, "game_id", "TEXT")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

/// True when `table.column` can be selected.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    conn.prepare(&format!("SELECT {column} FROM {table} LIMIT 0"))
        .is_ok()
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to look up table {table}"))?;
    Ok(exists)
}

/// `ALTER TABLE ... ADD COLUMN` unless the column is already there.
pub fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    if column_exists(conn, table, column) {
        return Ok(());
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {table} ADD COLUMN {column} {definition};"
    ))
    .with_context(|| format!("failed to add column {table}.{column}"))?;
    debug!("added column {table}.{column}");
    Ok(())
}
