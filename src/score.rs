//! Transparency score: how many of a paper's assessed indicators are true.

use serde::{Deserialize, Serialize};

/// Boolean transparency indicators for one paper.
///
/// The five core indicators are always assessed. Replication and novelty
/// only count toward the denominator when the source row supplied a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicators {
    pub coi_disclosed: bool,
    pub funding_disclosed: bool,
    pub registered: bool,
    pub open_data: bool,
    pub open_code: bool,
    pub replication: Option<bool>,
    pub novelty: Option<bool>,
}

impl Indicators {
    fn assessed(&self) -> impl Iterator<Item = bool> {
        [
            Some(self.coi_disclosed),
            Some(self.funding_disclosed),
            Some(self.registered),
            Some(self.open_data),
            Some(self.open_code),
            self.replication,
            self.novelty,
        ]
        .into_iter()
        .flatten()
    }

    /// Number of indicators that were assessed for this paper
    pub fn present_count(&self) -> u32 {
        self.assessed().count() as u32
    }

    pub fn true_count(&self) -> u32 {
        self.assessed().filter(|v| *v).count() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransparencyScore {
    pub score: u32,
    /// score / assessed * 100, one decimal place
    pub percentage: f64,
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn compute_score(indicators: &Indicators) -> TransparencyScore {
    let score = indicators.true_count();
    let present = indicators.present_count();
    let percentage = if present == 0 {
        0.0
    } else {
        round_one_decimal(score as f64 / present as f64 * 100.0)
    };
    TransparencyScore { score, percentage }
}
