// The oracle registry: the named heuristics the bot ensemble sums over.
//
// Each oracle is a typed scoring function plus a weight lattice indexed by
// (pack number, pick number) and interpolated between lattice points, so an
// oracle's influence can shift over the course of the draft. Adding an
// oracle means adding a row to REGISTRY; the evaluation loop never changes.

use serde::{Deserialize, Serialize};

use crate::bot::engine::BotState;
use crate::cards::CardPool;

/// Maximum value a single oracle contributes before weighting.
pub const MAX_SCORE: f64 = 10.0;

/// Cosine similarities below this are treated as no synergy.
const SIMILARITY_CLIP: f64 = 0.7;
const SIMILARITY_MULTIPLIER: f64 = 1.0 / (1.0 - SIMILARITY_CLIP);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleId {
    Rating,
    PickSynergy,
    InternalSynergy,
    ColorCommitment,
    Openness,
    CurveNeed,
}

impl OracleId {
    pub fn name(self) -> &'static str {
        match self {
            OracleId::Rating => "rating",
            OracleId::PickSynergy => "pick_synergy",
            OracleId::InternalSynergy => "internal_synergy",
            OracleId::ColorCommitment => "color_commitment",
            OracleId::Openness => "openness",
            OracleId::CurveNeed => "curve_need",
        }
    }
}

/// One registered heuristic.
pub struct Oracle {
    pub id: OracleId,
    /// Per-card oracles score each candidate; global oracles score the
    /// seat's position and contribute the same value to every candidate.
    pub per_card: bool,
    weights: [[f64; 15]; 3],
    compute: fn(&BotState, Option<usize>) -> f64,
}

impl Oracle {
    /// The interpolated weight for the current draft position.
    pub fn weight(&self, state: &BotState) -> f64 {
        let pack_frac = state.pack_num as f64 / state.num_packs.max(1) as f64;
        let pick_frac = state.pick_num.saturating_sub(1) as f64 / state.pack_size.max(1) as f64;
        interpolate2(&self.weights, pack_frac, pick_frac)
    }

    pub fn value(&self, state: &BotState, card: Option<usize>) -> f64 {
        (self.compute)(state, card)
    }
}

/// Linear interpolation over a lattice row; `coord` in [0, 1].
fn interpolate1(values: &[f64], coord: f64) -> f64 {
    let coord = coord.clamp(0.0, 1.0);
    let index = values.len() as f64 * coord;
    let floor = (index.floor() as usize).min(values.len() - 1);
    let ceil = index.ceil() as usize;
    if ceil >= values.len() || index == index.floor() {
        return values[floor];
    }
    let frac = index - floor as f64;
    frac * values[ceil] + (1.0 - frac) * values[floor]
}

fn interpolate2(weights: &[[f64; 15]; 3], pack_frac: f64, pick_frac: f64) -> f64 {
    let rows: Vec<f64> = weights
        .iter()
        .map(|row| interpolate1(row, pick_frac))
        .collect();
    interpolate1(&rows, pack_frac)
}

// ---------------------------------------------------------------------------
// Shared scoring helpers
// ---------------------------------------------------------------------------

/// Elo to an absolute value on the oracle scale.
pub fn elo_to_value(elo: f64) -> f64 {
    (10f64.powf(elo / 400.0 - 4.0)).sqrt()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += *x as f64 * *y as f64;
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Synergy between two pool cards on the [0, MAX_SCORE] scale. Identical
/// names are maximal; similarities below the clip contribute nothing.
pub fn synergy(pool: &CardPool, a: usize, b: usize) -> f64 {
    let card_a = pool.card(a);
    let card_b = pool.card(b);
    if card_a.embedding.is_empty() || card_b.embedding.is_empty() {
        return 0.0;
    }
    if card_a.name == card_b.name {
        return MAX_SCORE;
    }
    let similarity = cosine_similarity(&card_a.embedding, &card_b.embedding);
    if !similarity.is_finite() {
        return if similarity > 0.0 { MAX_SCORE } else { 0.0 };
    }
    let scaled = SIMILARITY_MULTIPLIER * (similarity - SIMILARITY_CLIP).max(0.0);
    if scaled >= 1.0 {
        return MAX_SCORE;
    }
    (1.0 / (1.0 - scaled) - 1.0).min(MAX_SCORE)
}

/// Average castability-scaled rating over a set of cards.
fn sum_weighted_ratings(state: &BotState, indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices
        .iter()
        .map(|&i| MAX_SCORE.min(state.probability(i) * elo_to_value(state.pool.card(i).elo)))
        .sum::<f64>()
        / indices.len() as f64
}

/// Castability-scaled synergy of `card` with every card in `others`.
fn sum_synergy(state: &BotState, card: usize, others: &[usize]) -> f64 {
    state.probability(card)
        * others
            .iter()
            .map(|&o| state.probability(o) * synergy(state.pool, card, o))
            .sum::<f64>()
}

// ---------------------------------------------------------------------------
// Oracle implementations
// ---------------------------------------------------------------------------

fn rating(state: &BotState, card: Option<usize>) -> f64 {
    let card = match card {
        Some(c) => c,
        None => return 0.0,
    };
    sum_weighted_ratings(state, &[card])
}

fn pick_synergy(state: &BotState, card: Option<usize>) -> f64 {
    let card = match card {
        Some(c) => c,
        None => return 0.0,
    };
    if state.picked.is_empty() {
        return 0.0;
    }
    sum_synergy(state, card, state.picked) / state.picked.len() as f64
}

fn internal_synergy(state: &BotState, _card: Option<usize>) -> f64 {
    let total_probability: f64 = state.picked.iter().map(|&i| state.probability(i)).sum();
    if total_probability <= 1.0 || state.picked.is_empty() {
        return 0.0;
    }
    // Weighted average of each pick's synergy with the picks before it; two
    // ordered pairs per unordered pair, hence the factor of two.
    let total: f64 = state
        .picked
        .iter()
        .enumerate()
        .map(|(i, &c)| sum_synergy(state, c, &state.picked[..i]))
        .sum();
    2.0 * total / state.picked.len() as f64 / (total_probability - 1.0)
}

fn color_commitment(state: &BotState, _card: Option<usize>) -> f64 {
    sum_weighted_ratings(state, state.picked)
}

fn openness(state: &BotState, _card: Option<usize>) -> f64 {
    sum_weighted_ratings(state, state.seen)
}

/// How many nonland picks the pool wants at each mana value column.
const DESIRED_CURVE: [f64; 8] = [1.0, 4.0, 6.0, 5.0, 4.0, 2.0, 1.0, 1.0];

fn curve_need(state: &BotState, card: Option<usize>) -> f64 {
    let card_index = match card {
        Some(c) => c,
        None => return 0.0,
    };
    let record = state.pool.card(card_index);
    if record.is_land() {
        return 0.0;
    }
    let col = (record.mana_value as usize).min(7);
    let have = state
        .picked
        .iter()
        .filter(|&&i| {
            let c = state.pool.card(i);
            !c.is_land() && (c.mana_value as usize).min(7) == col
        })
        .count() as f64;
    let gap = (DESIRED_CURVE[col] - have).max(0.0) / DESIRED_CURVE[col];
    gap * MAX_SCORE * state.probability(card_index)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

const FLAT_5_4_3: [[f64; 15]; 3] = [[5.0; 15], [4.0; 15], [3.0; 15]];
const FLAT_3_4_5: [[f64; 15]; 3] = [[3.0; 15], [4.0; 15], [5.0; 15]];
const FLAT_20_40_60: [[f64; 15]; 3] = [[20.0; 15], [40.0; 15], [60.0; 15]];
const FLAT_2_4_3: [[f64; 15]; 3] = [[2.0; 15], [4.0; 15], [3.0; 15]];

/// Openness matters most early in each pack and fades as the draft locks in.
const OPENNESS_WEIGHTS: [[f64; 15]; 3] = [
    [
        4.0, 12.0, 12.3, 12.6, 13.0, 13.4, 13.7, 14.0, 15.0, 14.6, 14.2, 13.8, 13.4, 13.0, 12.6,
    ],
    [
        13.0, 12.6, 12.2, 11.8, 11.4, 11.0, 10.6, 10.2, 9.8, 9.4, 9.0, 8.6, 8.2, 7.8, 7.0,
    ],
    [
        8.0, 7.5, 7.0, 6.5, 6.0, 5.5, 5.0, 4.5, 4.0, 3.5, 3.0, 2.5, 2.0, 1.5, 1.0,
    ],
];

static REGISTRY: [Oracle; 6] = [
    Oracle {
        id: OracleId::Rating,
        per_card: true,
        weights: FLAT_5_4_3,
        compute: rating,
    },
    Oracle {
        id: OracleId::PickSynergy,
        per_card: true,
        weights: FLAT_3_4_5,
        compute: pick_synergy,
    },
    Oracle {
        id: OracleId::InternalSynergy,
        per_card: false,
        weights: FLAT_3_4_5,
        compute: internal_synergy,
    },
    Oracle {
        id: OracleId::ColorCommitment,
        per_card: false,
        weights: FLAT_20_40_60,
        compute: color_commitment,
    },
    Oracle {
        id: OracleId::Openness,
        per_card: false,
        weights: OPENNESS_WEIGHTS,
        compute: openness,
    },
    Oracle {
        id: OracleId::CurveNeed,
        per_card: true,
        weights: FLAT_2_4_3,
        compute: curve_need,
    },
];

pub fn registry() -> &'static [Oracle] {
    &REGISTRY
}
