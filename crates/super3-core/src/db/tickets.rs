// Live ticket rows.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use super::{decode_numbers, encode_numbers, encode_time, time_at, Database};
use crate::lottery::Ticket;

const TICKET_COLUMNS: &str =
    "id, custom_id, serial_number, numbers, is_checked, is_complete, created_at";

/// Upsert by id. The row keeps its rowid so list order stays stable.
pub(crate) fn write_ticket(conn: &Connection, ticket: &Ticket) -> Result<()> {
    let numbers = encode_numbers(&ticket.numbers)?;
    conn.execute(
        "INSERT INTO tickets (id, custom_id, serial_number, numbers, is_checked, is_complete, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            custom_id     = excluded.custom_id,
            serial_number = excluded.serial_number,
            numbers       = excluded.numbers,
            is_checked    = excluded.is_checked,
            is_complete   = excluded.is_complete,
            created_at    = excluded.created_at",
        params![
            ticket.id,
            ticket.custom_id,
            ticket.serial_number,
            numbers,
            ticket.is_checked,
            ticket.is_complete,
            encode_time(&ticket.created_at),
        ],
    )
    .with_context(|| format!("failed to save ticket {}", ticket.id))?;
    Ok(())
}

fn read_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        custom_id: row.get(1)?,
        serial_number: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        numbers: decode_numbers(row.get(3)?),
        is_checked: row.get(4)?,
        is_complete: row.get(5)?,
        created_at: time_at(row, 6)?,
    })
}

impl Database {
    /// Insert or overwrite a ticket. Serial uniqueness is not enforced here.
    pub fn save_ticket(&self, ticket: &Ticket) -> Result<()> {
        write_ticket(&self.conn(), ticket)
    }

    /// Save many tickets in one transaction. Either all land or none do.
    pub fn save_tickets(&self, tickets: &[Ticket]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        for ticket in tickets {
            write_ticket(&tx, ticket)?;
        }
        tx.commit().context("failed to commit save_tickets")?;
        Ok(())
    }

    /// All live tickets, oldest first.
    pub fn get_tickets(&self) -> Result<Vec<Ticket>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets ORDER BY created_at ASC, rowid ASC"
            ))
            .context("failed to prepare get_tickets query")?;

        let tickets = stmt
            .query_map([], read_ticket)
            .context("failed to query tickets")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map ticket rows")?;

        Ok(tickets)
    }

    /// Hard delete. Games, winners and snapshots that reference the ticket
    /// are left alone. Returns whether a row was removed.
    pub fn delete_ticket(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute("DELETE FROM tickets WHERE id = ?1", params![id])
            .with_context(|| format!("failed to delete ticket {id}"))?;
        Ok(n > 0)
    }

    /// Delete a batch of tickets in one transaction. Returns the number of
    /// rows removed.
    pub fn delete_tickets(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let mut removed = 0;
        for id in ids {
            removed += tx
                .execute("DELETE FROM tickets WHERE id = ?1", params![id])
                .with_context(|| format!("failed to delete ticket {id}"))?;
        }
        tx.commit().context("failed to commit delete_tickets")?;
        Ok(removed)
    }

    pub fn clear_all_tickets(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM tickets", [])
            .context("failed to clear tickets")?;
        Ok(())
    }
}
