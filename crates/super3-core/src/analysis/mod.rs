// Number recommendations and historical statistics.

pub mod recommend;
pub mod stats;

use serde::{Deserialize, Serialize};

use crate::lottery::{is_valid_number, MAX_NUMBER};

pub use recommend::{recommend_detailed, recommend_numbers, NumberRecommendation};
pub use stats::{compute_balance, compute_stats, BalanceSummary, GameStats, GameSummary};

/// How often a number showed up in some source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFrequency {
    pub number: u8,
    pub frequency: u32,
}

/// Serials of winning tickets, split by who held them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningSerials {
    pub player: Vec<String>,
    pub opponent: Vec<String>,
}

/// Spread of the numeric winning serials. All zero when there are none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialMargins {
    pub min: u64,
    pub max: u64,
    pub average: u64,
}

/// Count occurrences and rank them: most frequent first, ties by ascending
/// number. Numbers outside 1-90 are ignored.
pub fn rank_frequencies<I>(numbers: I, limit: usize) -> Vec<NumberFrequency>
where
    I: IntoIterator<Item = u8>,
{
    let mut counts = [0u32; MAX_NUMBER as usize + 1];
    for n in numbers {
        if is_valid_number(n) {
            counts[n as usize] += 1;
        }
    }

    let mut ranked: Vec<NumberFrequency> = counts
        .iter()
        .enumerate()
        .filter(|&(_, &frequency)| frequency > 0)
        .map(|(number, &frequency)| NumberFrequency {
            number: number as u8,
            frequency,
        })
        .collect();
    ranked.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.number.cmp(&b.number)));
    ranked.truncate(limit);
    ranked
}
