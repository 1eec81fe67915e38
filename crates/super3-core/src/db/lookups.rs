// Aggregate reads over finished games and the winning lookup tables.

use anyhow::{Context, Result};
use rusqlite::params;

use super::{decode_numbers, Database};
use crate::analysis::stats::serial_margins;
use crate::analysis::{rank_frequencies, NumberFrequency, SerialMargins, WinningSerials};

impl Database {
    /// Numbers on winning tickets (own and opponent), most frequent first.
    pub fn winning_number_frequencies(&self, limit: usize) -> Result<Vec<NumberFrequency>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT number, COUNT(*) AS frequency
                 FROM winning_numbers
                 WHERE number BETWEEN 1 AND 90
                 GROUP BY number
                 ORDER BY frequency DESC, number ASC
                 LIMIT ?1",
            )
            .context("failed to prepare winning number query")?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(NumberFrequency {
                    number: row.get(0)?,
                    frequency: row.get(1)?,
                })
            })
            .context("failed to query winning numbers")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map winning number rows")?;
        Ok(rows)
    }

    /// Draw sequences of every finished game, oldest game first. Each
    /// sequence is in draw order.
    pub fn finished_draws(&self) -> Result<Vec<Vec<u8>>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT drawn_numbers FROM games
                 WHERE finished_at IS NOT NULL
                 ORDER BY started_at, rowid",
            )
            .context("failed to prepare finished draws query")?;

        let draws = stmt
            .query_map([], |row| Ok(decode_numbers(row.get(0)?)))
            .context("failed to query finished draws")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map finished draw rows")?;
        Ok(draws)
    }

    /// Frequency of drawn numbers across finished games. With `window`, only
    /// the first `window` draws of each game count.
    pub fn drawn_number_frequencies(
        &self,
        window: Option<usize>,
        limit: usize,
    ) -> Result<Vec<NumberFrequency>> {
        let draws = self.finished_draws()?;
        let numbers = draws.iter().flat_map(|draw| {
            let take = window.unwrap_or(draw.len());
            draw.iter().take(take).copied()
        });
        Ok(rank_frequencies(numbers, limit))
    }

    /// Winning serials split by owner, most recent first.
    pub fn winning_serials(&self) -> Result<WinningSerials> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT serial_number FROM winning_serials
                 WHERE is_player_winner = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )
            .context("failed to prepare winning serials query")?;

        let mut load = |player: bool| -> Result<Vec<String>> {
            stmt.query_map(params![player], |row| row.get(0))
                .context("failed to query winning serials")?
                .collect::<std::result::Result<Vec<String>, _>>()
                .context("failed to map winning serial rows")
        };

        let player = load(true)?;
        let opponent = load(false)?;
        Ok(WinningSerials { player, opponent })
    }

    /// Min, max and rounded average over every numeric winning serial.
    pub fn serial_number_margins(&self) -> Result<SerialMargins> {
        let serials = self.winning_serials()?;
        Ok(serial_margins(
            serials
                .player
                .iter()
                .chain(serials.opponent.iter())
                .map(String::as_str),
        ))
    }
}
