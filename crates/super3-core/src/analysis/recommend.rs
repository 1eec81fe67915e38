// Weighted number recommendations from past results.
//
// Three ranked signals feed one score per number. A number at rank `i`
// (0-based) in a signal of length `limit` earns `(limit - i) * weight`
// points; points from every signal add up.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::NumberFrequency;
use crate::db::Database;
use crate::lottery::MAX_NUMBER;

/// One ranked source of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub name: &'static str,
    /// How many top entries count.
    pub limit: usize,
    pub weight: u32,
}

/// Numbers on winning tickets, own and opponent.
pub const WINNING: Signal = Signal {
    name: "winning",
    limit: 20,
    weight: 3,
};

/// Numbers among the first draws of finished games.
pub const EARLY: Signal = Signal {
    name: "early",
    limit: 25,
    weight: 2,
};

/// All drawn numbers of finished games.
pub const FREQUENT: Signal = Signal {
    name: "frequent",
    limit: 20,
    weight: 1,
};

/// Draws per game that count as "early".
pub const EARLY_DRAW_WINDOW: usize = 25;

/// A recommended number with its score and the signals that contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRecommendation {
    pub number: u8,
    pub score: u32,
    pub sources: Vec<String>,
}

/// Combine ranked signals into scored numbers, best first. Score ties go to
/// the lower number. Numbers no signal mentions are left out.
pub fn score_signals(signals: &[(Signal, &[NumberFrequency])]) -> Vec<NumberRecommendation> {
    let mut scores = [0u32; MAX_NUMBER as usize + 1];
    let mut sources: Vec<Vec<String>> = vec![Vec::new(); MAX_NUMBER as usize + 1];

    for (signal, ranked) in signals {
        for (rank, entry) in ranked.iter().take(signal.limit).enumerate() {
            let slot = entry.number as usize;
            if slot >= scores.len() {
                continue;
            }
            scores[slot] += (signal.limit - rank) as u32 * signal.weight;
            sources[slot].push(signal.name.to_string());
        }
    }

    let mut recommendations: Vec<NumberRecommendation> = scores
        .iter()
        .zip(sources)
        .enumerate()
        .filter(|(_, (&score, _))| score > 0)
        .map(|(number, (&score, sources))| NumberRecommendation {
            number: number as u8,
            score,
            sources,
        })
        .collect();
    recommendations.sort_by(|a, b| b.score.cmp(&a.score).then(a.number.cmp(&b.number)));
    recommendations
}

/// Top `count` recommendations with scores and sources.
pub fn recommend_detailed(db: &Database, count: usize) -> Result<Vec<NumberRecommendation>> {
    let winning = db.winning_number_frequencies(WINNING.limit)?;
    let early = db.drawn_number_frequencies(Some(EARLY_DRAW_WINDOW), EARLY.limit)?;
    let frequent = db.drawn_number_frequencies(None, FREQUENT.limit)?;

    let mut ranked = score_signals(&[
        (WINNING, &winning[..]),
        (EARLY, &early[..]),
        (FREQUENT, &frequent[..]),
    ]);
    ranked.truncate(count);
    debug!(
        "recommended {} number(s) from {} winning, {} early, {} frequent",
        ranked.len(),
        winning.len(),
        early.len(),
        frequent.len()
    );
    Ok(ranked)
}

/// Top `count` numbers by score. Fewer come back when history is thin.
pub fn recommend_numbers(db: &Database, count: usize) -> Result<Vec<u8>> {
    Ok(recommend_detailed(db, count)?
        .into_iter()
        .map(|r| r.number)
        .collect())
}
