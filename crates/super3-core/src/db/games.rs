// Game rows, their ticket links and the snapshots of finished games.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use super::{decode_numbers, encode_ids, encode_numbers, encode_time, time_at, Database};
use crate::lottery::{Game, TicketSnapshot};

/// Upsert the game row and rebuild its ticket links.
///
/// A finished game links to snapshots of its tickets, written here; an
/// active game links to the live ticket ids.
pub(crate) fn write_game(conn: &Connection, game: &Game) -> Result<()> {
    conn.execute(
        "INSERT INTO games
            (id, drawn_numbers, winner_ticket_ids, game_type, is_active, is_opponent_only_mode,
             started_at, finished_at, tickets_played)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            drawn_numbers         = excluded.drawn_numbers,
            winner_ticket_ids     = excluded.winner_ticket_ids,
            game_type             = excluded.game_type,
            is_active             = excluded.is_active,
            is_opponent_only_mode = excluded.is_opponent_only_mode,
            started_at            = excluded.started_at,
            finished_at           = excluded.finished_at,
            tickets_played        = excluded.tickets_played",
        params![
            game.id,
            encode_numbers(&game.drawn_numbers)?,
            encode_ids(&game.winner_ticket_ids)?,
            game.game_type.as_str(),
            game.is_active,
            game.is_opponent_only_mode,
            encode_time(&game.started_at),
            game.finished_at.as_ref().map(encode_time),
            game.tickets_played as i64,
        ],
    )
    .with_context(|| format!("failed to save game {}", game.id))?;

    conn.execute("DELETE FROM game_tickets WHERE game_id = ?1", params![game.id])
        .context("failed to clear game ticket links")?;

    let finished = game.is_finished();
    for (position, ticket) in game.tickets.iter().enumerate() {
        let linked_id = if finished {
            let snapshot = TicketSnapshot::capture(&game.id, ticket);
            write_snapshot(conn, &snapshot)?;
            snapshot.id
        } else {
            ticket.id.clone()
        };
        conn.execute(
            "INSERT INTO game_tickets (game_id, ticket_id, position) VALUES (?1, ?2, ?3)",
            params![game.id, linked_id, position as i64],
        )
        .context("failed to link ticket to game")?;
    }
    Ok(())
}

fn write_snapshot(conn: &Connection, snapshot: &TicketSnapshot) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ticket_snapshots
            (id, game_id, original_ticket_id, custom_id, serial_number, numbers, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            snapshot.id,
            snapshot.game_id,
            snapshot.original_ticket_id,
            snapshot.custom_id,
            snapshot.serial_number,
            encode_numbers(&snapshot.numbers)?,
            encode_time(&snapshot.created_at),
        ],
    )
    .with_context(|| format!("failed to save ticket snapshot {}", snapshot.id))?;
    Ok(())
}

fn read_snapshot(row: &Row<'_>) -> rusqlite::Result<TicketSnapshot> {
    Ok(TicketSnapshot {
        id: row.get(0)?,
        game_id: row.get(1)?,
        original_ticket_id: row.get(2)?,
        custom_id: row.get(3)?,
        serial_number: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        numbers: decode_numbers(row.get(5)?),
        created_at: time_at(row, 6)?,
    })
}

/// Snapshots linked to a finished game, in the order they were played.
pub(crate) fn snapshots_for_game(conn: &Connection, game_id: &str) -> Result<Vec<TicketSnapshot>> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.game_id, s.original_ticket_id, s.custom_id, s.serial_number,
                    s.numbers, s.created_at
             FROM ticket_snapshots s
             JOIN game_tickets gt ON gt.ticket_id = s.id
             WHERE gt.game_id = ?1
             ORDER BY gt.position",
        )
        .context("failed to prepare snapshot query")?;

    let snapshots = stmt
        .query_map(params![game_id], read_snapshot)
        .context("failed to query ticket snapshots")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map ticket snapshot rows")?;
    Ok(snapshots)
}

impl Database {
    /// Persist a game. Saving a finished game freezes its tickets into
    /// snapshots; saving it again rewrites the same snapshots.
    pub fn save_game(&self, game: &Game) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        write_game(&tx, game)?;
        tx.commit().context("failed to commit save_game")?;
        Ok(())
    }

    /// Ticket ids linked to a game: live ids while active, snapshot ids once
    /// finished.
    pub fn linked_ticket_ids(&self, game_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT ticket_id FROM game_tickets WHERE game_id = ?1 ORDER BY position")
            .context("failed to prepare linked_ticket_ids query")?;
        let ids = stmt
            .query_map(params![game_id], |row| row.get(0))
            .context("failed to query game ticket links")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to map game ticket links")?;
        Ok(ids)
    }

    /// Snapshots stored for a finished game.
    pub fn game_snapshots(&self, game_id: &str) -> Result<Vec<TicketSnapshot>> {
        snapshots_for_game(&self.conn(), game_id)
    }

    /// True once at least one game has finished.
    pub fn has_statistical_data(&self) -> Result<bool> {
        let conn = self.conn();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM games WHERE finished_at IS NOT NULL)",
                [],
                |row| row.get(0),
            )
            .context("failed to check for finished games")?;
        Ok(exists)
    }
}
