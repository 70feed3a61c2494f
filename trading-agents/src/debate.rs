//! Structured bull/bear/neutral debate and conviction scoring
//!
//! Each candidate symbol gets three competing cases. The bull and bear
//! success probabilities are folded into a signed conviction score, the
//! amount of supporting evidence into a capped confidence, and the score is
//! classified against a symmetric threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Mutex;

/// Upper bound on report confidence
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Catalyst and risk counts are measured against this many items
const EVIDENCE_SCALE: f64 = 5.0;

const CONVICTION_PRECISION: f64 = 1e9;

const BULLISH_CATALYSTS: [&str; 5] = [
    "Strong earnings growth trajectory",
    "Expanding market share in growing sector",
    "Technical breakout with volume confirmation",
    "Options flow showing institutional accumulation",
    "Undervalued relative to peers",
];

const BEARISH_RISKS: [&str; 5] = [
    "Margin compression from competition",
    "Cyclical downturn exposure",
    "High debt load in rising rate environment",
    "Technical breakdown below key support",
    "Insider selling and bearish options flow",
];

const CATALYSTS_NEEDED: [&str; 3] = ["Earnings beat", "Guidance raise", "Sector rotation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BullishLevels {
    pub support: f64,
    pub resistance: f64,
    pub breakout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BullishCase {
    pub thesis: String,
    pub catalysts: Vec<String>,
    pub probability: f64,
    pub price_target: f64,
    pub timeframe: String,
    pub key_levels: BullishLevels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearishLevels {
    pub support: f64,
    pub stop_loss: f64,
    pub breakdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearishCase {
    pub thesis: String,
    pub risks: Vec<String>,
    pub probability: f64,
    pub price_target: f64,
    pub timeframe: String,
    pub key_levels: BearishLevels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutralCase {
    pub thesis: String,
    pub expected_return: f64,
    pub fair_value: f64,
    pub range: (f64, f64),
    pub catalysts_needed: Vec<String>,
}

/// The three competing cases for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct DebateCases {
    pub bullish: BullishCase,
    pub bearish: BearishCase,
    pub neutral: NeutralCase,
}

/// Outcome of debating one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub symbol: String,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub conviction_score: f64,
    pub bullish_case: BullishCase,
    pub bearish_case: BearishCase,
    pub neutral_case: NeutralCase,
    pub catalysts: Vec<String>,
    pub risks: Vec<String>,
    /// (bear target, bull target)
    pub price_target_range: (f64, f64),
    pub timestamp: DateTime<Utc>,
}

/// Signed conviction: (bull - bear) x 2, clamped to [-1, 1].
///
/// Rounded to nine decimals so that classification at the threshold is not
/// decided by binary float noise (0.5 - 0.65 must score exactly -0.3).
pub fn conviction_score(bull_probability: f64, bear_probability: f64) -> f64 {
    let raw = (bull_probability - bear_probability) * 2.0;
    ((raw * CONVICTION_PRECISION).round() / CONVICTION_PRECISION).clamp(-1.0, 1.0)
}

/// Evidence density of the two cases, capped at `MAX_CONFIDENCE`
pub fn confidence(catalyst_count: usize, risk_count: usize) -> f64 {
    let bull_strength = catalyst_count as f64 / EVIDENCE_SCALE;
    let bear_strength = risk_count as f64 / EVIDENCE_SCALE;
    (((bull_strength + bear_strength) / 2.0) * 1.5).min(MAX_CONFIDENCE)
}

/// Strictly above `threshold` is bullish, strictly below `-threshold` is
/// bearish, everything else neutral.
pub fn classify(conviction: f64, threshold: f64) -> Recommendation {
    if conviction > threshold {
        Recommendation::Bullish
    } else if conviction < -threshold {
        Recommendation::Bearish
    } else {
        Recommendation::Neutral
    }
}

/// Sort by |conviction| descending. Stable: ties keep discovery order.
pub fn rank_reports(reports: &mut [ResearchReport]) {
    reports.sort_by(|a, b| {
        b.conviction_score
            .abs()
            .partial_cmp(&a.conviction_score.abs())
            .unwrap_or(Ordering::Equal)
    });
}

/// Score a set of cases into a report
pub fn build_report(symbol: &str, cases: DebateCases, threshold: f64) -> ResearchReport {
    let DebateCases { bullish, bearish, neutral } = cases;
    let conviction = conviction_score(bullish.probability, bearish.probability);

    ResearchReport {
        symbol: symbol.to_string(),
        recommendation: classify(conviction, threshold),
        confidence: confidence(bullish.catalysts.len(), bearish.risks.len()),
        conviction_score: conviction,
        catalysts: bullish.catalysts.clone(),
        risks: bearish.risks.clone(),
        price_target_range: (bearish.price_target, bullish.price_target),
        bullish_case: bullish,
        bearish_case: bearish,
        neutral_case: neutral,
        timestamp: Utc::now(),
    }
}

/// Source of debate cases for a symbol
pub trait CaseGenerator: Send + Sync {
    fn generate(&self, symbol: &str) -> DebateCases;
}

/// Draws cases from fixed vocabularies and sub-ranges
///
/// One base price is drawn per symbol and shared by all three cases.
pub struct RandomCaseGenerator {
    rng: Mutex<fastrand::Rng>,
}

impl RandomCaseGenerator {
    pub fn new() -> Self {
        Self { rng: Mutex::new(fastrand::Rng::new()) }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(fastrand::Rng::with_seed(seed)) }
    }
}

impl Default for RandomCaseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn uniform(rng: &mut fastrand::Rng, low: f64, high: f64) -> f64 {
    low + rng.f64() * (high - low)
}

fn pick(rng: &mut fastrand::Rng, vocabulary: &[&str]) -> Vec<String> {
    let mut items: Vec<String> = vocabulary.iter().map(|s| s.to_string()).collect();
    rng.shuffle(&mut items);
    items.truncate(rng.usize(2..=3));
    items
}

impl CaseGenerator for RandomCaseGenerator {
    fn generate(&self, symbol: &str) -> DebateCases {
        let mut rng = self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let base = uniform(&mut rng, 20.0, 45.0);

        let bullish = BullishCase {
            thesis: format!("{} positioned for upside due to operational momentum", symbol),
            catalysts: pick(&mut rng, &BULLISH_CATALYSTS),
            probability: uniform(&mut rng, 0.35, 0.65),
            price_target: base * (1.0 + uniform(&mut rng, 0.15, 0.40)),
            timeframe: format!("{} months", rng.u32(1..=5)),
            key_levels: BullishLevels {
                support: base * 0.95,
                resistance: base * 1.15,
                breakout: base * 1.08,
            },
        };

        let bearish = BearishCase {
            thesis: format!("{} faces headwinds that could pressure valuation", symbol),
            risks: pick(&mut rng, &BEARISH_RISKS),
            probability: uniform(&mut rng, 0.25, 0.55),
            price_target: base * (1.0 - uniform(&mut rng, 0.10, 0.30)),
            timeframe: format!("{} months", rng.u32(1..=5)),
            key_levels: BearishLevels {
                support: base * 0.90,
                stop_loss: base * 0.93,
                breakdown: base * 0.95,
            },
        };

        let neutral = NeutralCase {
            thesis: format!("{} fairly valued with balanced risk/reward", symbol),
            expected_return: uniform(&mut rng, -0.05, 0.10),
            fair_value: base,
            range: (base * 0.90, base * 1.10),
            catalysts_needed: CATALYSTS_NEEDED.iter().map(|s| s.to_string()).collect(),
        };

        DebateCases { bullish, bearish, neutral }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Cases with chosen probabilities and evidence counts around a base of 100
    pub fn cases(bull: f64, bear: f64, catalysts: usize, risks: usize) -> DebateCases {
        DebateCases {
            bullish: BullishCase {
                thesis: "up".to_string(),
                catalysts: BULLISH_CATALYSTS.iter().take(catalysts).map(|s| s.to_string()).collect(),
                probability: bull,
                price_target: 120.0,
                timeframe: "3 months".to_string(),
                key_levels: BullishLevels { support: 95.0, resistance: 115.0, breakout: 108.0 },
            },
            bearish: BearishCase {
                thesis: "down".to_string(),
                risks: BEARISH_RISKS.iter().take(risks).map(|s| s.to_string()).collect(),
                probability: bear,
                price_target: 80.0,
                timeframe: "2 months".to_string(),
                key_levels: BearishLevels { support: 90.0, stop_loss: 93.0, breakdown: 95.0 },
            },
            neutral: NeutralCase {
                thesis: "flat".to_string(),
                expected_return: 0.02,
                fair_value: 100.0,
                range: (90.0, 110.0),
                catalysts_needed: vec![],
            },
        }
    }
}
