// Winners, opponent winners, history entries and the lookup tables they feed.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::games::{snapshots_for_game, write_game};
use super::schema::column_exists;
use super::{
    decode_ids, decode_numbers, encode_numbers, encode_time, opt_time_at, time_at, Database,
};
use crate::lottery::{
    FinishedGame, Game, GameType, HistoryEntry, OpponentWinner, OpponentWinnerData, TicketSnapshot,
    Winner,
};

fn game_type_from(text: String) -> GameType {
    GameType::from_str_type(&text).unwrap_or(GameType::Main)
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Winner row plus one `winning_numbers` row per ticket number and one
/// `winning_serials` row.
pub(crate) fn write_winner(conn: &Connection, winner: &Winner) -> Result<()> {
    let created_at = encode_time(&winner.created_at);
    conn.execute(
        "INSERT INTO winners
            (id, game_id, ticket_id, winning_amount, game_type, is_player_winner, created_at,
             custom_id, serial_number, numbers)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            winner.id,
            winner.game_id,
            winner.ticket.id,
            winner.winning_amount,
            winner.game_type.as_str(),
            winner.is_player_winner,
            created_at,
            winner.ticket.custom_id,
            winner.ticket.serial_number,
            encode_numbers(&winner.ticket.numbers)?,
        ],
    )
    .with_context(|| format!("failed to save winner {}", winner.id))?;

    write_lookups(
        conn,
        &winner.id,
        &winner.game_id,
        &winner.ticket.numbers,
        &winner.ticket.serial_number,
        winner.is_player_winner,
        winner.game_type,
        &created_at,
    )
}

/// Idempotent: recording the same opponent winner twice is a no-op.
pub(crate) fn write_opponent_winner(conn: &Connection, opponent: &OpponentWinner) -> Result<()> {
    let created_at = encode_time(&opponent.created_at);
    conn.execute(
        "INSERT OR IGNORE INTO opponent_winners
            (id, game_id, game_type, numbers, serial_number, winning_amount, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            opponent.id,
            opponent.game_id,
            opponent.game_type.as_str(),
            encode_numbers(&opponent.numbers)?,
            opponent.serial_number,
            opponent.winning_amount,
            opponent.notes,
            created_at,
        ],
    )
    .with_context(|| format!("failed to save opponent winner {}", opponent.id))?;

    write_lookups(
        conn,
        &opponent.id,
        &opponent.game_id,
        &opponent.numbers,
        &opponent.serial_number,
        false,
        opponent.game_type,
        &created_at,
    )
}

#[allow(clippy::too_many_arguments)]
fn write_lookups(
    conn: &Connection,
    owner_id: &str,
    game_id: &str,
    numbers: &[u8],
    serial: &str,
    is_player_winner: bool,
    game_type: GameType,
    created_at: &str,
) -> Result<()> {
    for (i, number) in numbers.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO winning_numbers
                (id, game_id, number, is_player_winner, game_type, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                format!("{owner_id}_{i}"),
                game_id,
                number,
                is_player_winner,
                game_type.as_str(),
                i as i64,
                created_at,
            ],
        )
        .context("failed to save winning number")?;
    }

    if !serial.trim().is_empty() {
        conn.execute(
            "INSERT OR IGNORE INTO winning_serials
                (id, game_id, serial_number, is_player_winner, game_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                format!("{owner_id}_serial"),
                game_id,
                serial.trim(),
                is_player_winner,
                game_type.as_str(),
                created_at,
            ],
        )
        .context("failed to save winning serial")?;
    }
    Ok(())
}

pub(crate) fn write_history(conn: &Connection, entry: &HistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO history
            (id, game_id, total_cost, total_winnings, total_opponent_winnings, net_profit, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id,
            entry.game.id,
            entry.total_cost,
            entry.total_winnings,
            entry.total_opponent_winnings,
            entry.net_profit,
            encode_time(&entry.created_at),
        ],
    )
    .with_context(|| format!("failed to save history entry {}", entry.id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// History row joined with its game, before tickets and winners are attached.
struct HistoryRow {
    id: String,
    game_id: String,
    total_cost: f64,
    total_winnings: f64,
    total_opponent_winnings: f64,
    net_profit: f64,
    created_at: chrono::DateTime<chrono::Utc>,
    drawn_numbers: Vec<u8>,
    winner_ticket_ids: Vec<String>,
    game_type: GameType,
    is_opponent_only_mode: bool,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    tickets_played: i64,
}

fn read_history_row(row: &Row<'_>) -> rusqlite::Result<HistoryRow> {
    Ok(HistoryRow {
        id: row.get(0)?,
        game_id: row.get(1)?,
        total_cost: row.get(2)?,
        total_winnings: row.get(3)?,
        total_opponent_winnings: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        net_profit: row.get(5)?,
        created_at: time_at(row, 6)?,
        drawn_numbers: decode_numbers(row.get(7)?),
        winner_ticket_ids: decode_ids(row.get(8)?),
        game_type: game_type_from(row.get(9)?),
        is_opponent_only_mode: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
        started_at: time_at(row, 11)?,
        finished_at: opt_time_at(row, 12)?,
        tickets_played: row.get::<_, Option<i64>>(13)?.unwrap_or(0),
    })
}

fn winners_for_game(conn: &Connection, game_id: &str) -> Result<Vec<Winner>> {
    // Files that missed the denormalized-columns migration fall back to the
    // snapshot row alone.
    let denormalized = column_exists(conn, "winners", "custom_id")
        && column_exists(conn, "winners", "serial_number")
        && column_exists(conn, "winners", "numbers");
    let ticket_columns = if denormalized {
        "w.custom_id, w.serial_number, w.numbers"
    } else {
        "NULL, NULL, NULL"
    };

    let mut stmt = conn
        .prepare(&format!(
            "SELECT w.id, w.game_id, w.ticket_id, w.winning_amount, w.game_type,
                    w.is_player_winner, w.created_at, {ticket_columns},
                    s.original_ticket_id, s.custom_id, s.serial_number, s.numbers, s.created_at
             FROM winners w
             LEFT JOIN ticket_snapshots s ON s.id = w.ticket_id
             WHERE w.game_id = ?1
             ORDER BY w.rowid"
        ))
        .context("failed to prepare winners query")?;

    let winners = stmt
        .query_map(params![game_id], |row| {
            let id: String = row.get(0)?;
            let game_id: String = row.get(1)?;
            let ticket_id: String = row.get(2)?;
            let created_at = time_at(row, 6)?;

            let own_numbers: Option<String> = row.get(9)?;
            let numbers = match own_numbers {
                Some(json) => decode_numbers(Some(json)),
                None => decode_numbers(row.get(13)?),
            };
            let prefix = format!("snapshot_{game_id}_");
            let original_ticket_id = row.get::<_, Option<String>>(10)?.unwrap_or_else(|| {
                ticket_id
                    .strip_prefix(&prefix)
                    .unwrap_or(&ticket_id)
                    .to_string()
            });

            let ticket = TicketSnapshot {
                id: ticket_id.clone(),
                game_id: game_id.clone(),
                original_ticket_id,
                custom_id: row
                    .get::<_, Option<String>>(7)?
                    .or(row.get::<_, Option<String>>(11)?),
                serial_number: row
                    .get::<_, Option<String>>(8)?
                    .or(row.get::<_, Option<String>>(12)?)
                    .unwrap_or_default(),
                numbers,
                created_at: opt_time_at(row, 14)?.unwrap_or(created_at),
            };

            Ok(Winner {
                id,
                game_id,
                ticket,
                winning_amount: row.get(3)?,
                game_type: game_type_from(row.get(4)?),
                is_player_winner: row.get(5)?,
                created_at,
            })
        })
        .context("failed to query winners")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map winner rows")?;
    Ok(winners)
}

fn opponent_winners_for_game(conn: &Connection, game_id: &str) -> Result<Vec<OpponentWinner>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, game_id, game_type, numbers, serial_number, winning_amount, notes, created_at
             FROM opponent_winners WHERE game_id = ?1 ORDER BY created_at, rowid",
        )
        .context("failed to prepare opponent winners query")?;

    let opponents = stmt
        .query_map(params![game_id], |row| {
            Ok(OpponentWinner {
                id: row.get(0)?,
                game_id: row.get(1)?,
                game_type: game_type_from(row.get(2)?),
                numbers: decode_numbers(row.get(3)?),
                serial_number: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                winning_amount: row.get(5)?,
                notes: row.get(6)?,
                created_at: time_at(row, 7)?,
            })
        })
        .context("failed to query opponent winners")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map opponent winner rows")?;
    Ok(opponents)
}

const CASCADE_TABLES: [&str; 4] = [
    "winning_numbers",
    "winning_serials",
    "opponent_winners",
    "winners",
];

impl Database {
    /// Persist a player winner and fan its numbers and serial out to the
    /// lookup tables.
    pub fn save_winner(&self, winner: &Winner) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        write_winner(&tx, winner)?;
        tx.commit().context("failed to commit save_winner")?;
        Ok(())
    }

    /// Record a competitor's win against `game_id`. Returns the stored entity.
    pub fn save_opponent_winner(
        &self,
        game_id: &str,
        data: &OpponentWinnerData,
    ) -> Result<OpponentWinner> {
        let opponent = OpponentWinner::from_data(game_id, data);
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        write_opponent_winner(&tx, &opponent)?;
        tx.commit().context("failed to commit save_opponent_winner")?;
        Ok(opponent)
    }

    /// Summary row only; the game, winners and opponents are saved separately.
    pub fn save_history_entry(&self, entry: &HistoryEntry) -> Result<()> {
        write_history(&self.conn(), entry)
    }

    /// Write a finished game, its snapshots, winners, opponent winners and
    /// history summary in one transaction.
    pub fn record_finished_game(&self, game: &Game, entry: &HistoryEntry) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        write_game(&tx, game)?;
        for winner in &entry.winners {
            write_winner(&tx, winner)?;
        }
        for opponent in &entry.opponent_winners {
            write_opponent_winner(&tx, opponent)?;
        }
        write_history(&tx, entry)?;
        tx.commit().context("failed to commit finished game")?;
        Ok(())
    }

    /// Every history entry, newest first, with its game rebuilt from
    /// snapshots.
    pub fn get_game_history(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn();
        let opponent_total = if column_exists(&conn, "history", "total_opponent_winnings") {
            "h.total_opponent_winnings"
        } else {
            "0"
        };

        let rows = {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT h.id, h.game_id, h.total_cost, h.total_winnings, {opponent_total},
                            h.net_profit, h.created_at,
                            g.drawn_numbers, g.winner_ticket_ids, g.game_type,
                            g.is_opponent_only_mode, g.started_at, g.finished_at, g.tickets_played
                     FROM history h
                     JOIN games g ON g.id = h.game_id
                     ORDER BY h.created_at DESC, h.rowid DESC"
                ))
                .context("failed to prepare history query")?;
            let rows = stmt
                .query_map([], read_history_row)
                .context("failed to query history")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map history rows")?;
            rows
        };

        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            let tickets = snapshots_for_game(&conn, &row.game_id)?;
            let winners = winners_for_game(&conn, &row.game_id)?;
            let opponent_winners = opponent_winners_for_game(&conn, &row.game_id)?;

            let winner_tickets = tickets
                .iter()
                .filter(|s| row.winner_ticket_ids.contains(&s.original_ticket_id))
                .cloned()
                .collect();
            let tickets_played = match row.tickets_played {
                n if n > 0 => n as usize,
                _ => tickets.len(),
            };

            history.push(HistoryEntry {
                id: row.id,
                game: FinishedGame {
                    id: row.game_id,
                    tickets,
                    drawn_numbers: row.drawn_numbers,
                    winner_tickets,
                    game_type: row.game_type,
                    is_opponent_only_mode: row.is_opponent_only_mode,
                    started_at: row.started_at,
                    finished_at: row.finished_at,
                    tickets_played,
                },
                winners,
                opponent_winners,
                total_cost: row.total_cost,
                total_winnings: row.total_winnings,
                total_opponent_winnings: row.total_opponent_winnings,
                net_profit: row.net_profit,
                created_at: row.created_at,
                tickets_played,
            });
        }
        Ok(history)
    }

    /// Remove a history entry and everything recorded for its game. Snapshot
    /// rows stay behind. Returns false when the entry does not exist.
    pub fn delete_history_entry(&self, history_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        let game_id: Option<Option<String>> = tx
            .query_row(
                "SELECT game_id FROM history WHERE id = ?1",
                params![history_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up history entry")?;
        let Some(game_id) = game_id else {
            return Ok(false);
        };

        if let Some(game_id) = game_id.as_deref() {
            for table in CASCADE_TABLES {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE game_id = ?1"),
                    params![game_id],
                )
                .with_context(|| format!("failed to delete from {table}"))?;
            }
            tx.execute("DELETE FROM game_tickets WHERE game_id = ?1", params![game_id])
                .context("failed to delete game ticket links")?;
        }
        tx.execute("DELETE FROM history WHERE id = ?1", params![history_id])
            .context("failed to delete history entry")?;
        if let Some(game_id) = game_id.as_deref() {
            tx.execute("DELETE FROM games WHERE id = ?1", params![game_id])
                .context("failed to delete game")?;
        }

        tx.commit().context("failed to commit delete_history_entry")?;
        Ok(true)
    }

    /// Wipe every game and result. Live tickets and snapshots are kept.
    pub fn clear_game_history(&self) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        for table in CASCADE_TABLES {
            tx.execute(&format!("DELETE FROM {table}"), [])
                .with_context(|| format!("failed to clear {table}"))?;
        }
        tx.execute_batch(
            "DELETE FROM history;
             DELETE FROM game_tickets;
             DELETE FROM games;",
        )
        .context("failed to clear games")?;
        tx.commit().context("failed to commit clear_game_history")?;
        Ok(())
    }
}
