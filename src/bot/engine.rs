// Bot evaluation: score every card in the current pack and select one.
//
// The land tally is optimized once per evaluation for the seat's whole pool
// (first-ascent hill climb in fixed color order), and the resulting casting
// probabilities scale the power and synergy oracles for every candidate.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::bot::colors::{
    casting_probability, combination_for_lands, initial_lands, LandTally,
};
use crate::bot::oracles::{registry, OracleId};
use crate::cards::{CardPool, Color, ColorSet};
use crate::draft::format::StepAction;
use crate::draft::rng::SessionRng;
use crate::draft::session::DrafterState;
use crate::draft::DraftError;

/// Optional per-oracle weight multipliers from configuration.
#[derive(Debug, Clone, Default)]
pub struct WeightOverrides {
    multipliers: HashMap<OracleId, f64>,
}

impl WeightOverrides {
    pub fn new(multipliers: HashMap<OracleId, f64>) -> Self {
        WeightOverrides { multipliers }
    }

    pub fn multiplier(&self, id: OracleId) -> f64 {
        self.multipliers.get(&id).copied().unwrap_or(1.0)
    }
}

/// Everything an oracle may look at while scoring.
pub struct BotState<'a> {
    pub pool: &'a CardPool,
    pub picked: &'a [usize],
    pub seen: &'a [usize],
    pub cards_in_pack: &'a [usize],
    pub pack_num: usize,
    pub num_packs: usize,
    pub pick_num: u32,
    pub pack_size: u32,
    pub lands: LandTally,
    /// Casting probabilities under `lands` for every relevant card index.
    pub probabilities: HashMap<usize, f64>,
}

impl BotState<'_> {
    pub fn probability(&self, card: usize) -> f64 {
        self.probabilities.get(&card).copied().unwrap_or(0.0)
    }
}

/// One oracle's contribution to a card's score.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleResult {
    pub oracle: OracleId,
    pub value: f64,
    pub weight: f64,
}

/// The full evaluation of a pack for one bot seat.
#[derive(Debug, Clone)]
pub struct BotEvaluation {
    /// Total score per candidate, aligned with the pack's card order.
    pub scores: Vec<f64>,
    /// Oracle breakdown per candidate, same alignment.
    pub per_card: Vec<Vec<OracleResult>>,
    /// The optimized land tally the probabilities were computed under.
    pub lands: LandTally,
    /// The color combination the tally commits to.
    pub colors: ColorSet,
}

fn compute_probabilities(
    pool: &CardPool,
    relevant: &HashSet<usize>,
    lands: &LandTally,
) -> HashMap<usize, f64> {
    relevant
        .iter()
        .map(|&i| (i, casting_probability(pool.card(i), lands)))
        .collect()
}

/// Objective for the land hill climb: how castable the picked pool is,
/// scaled by its quality under the global oracles.
fn pool_score(state: &BotState, overrides: &WeightOverrides) -> f64 {
    let nonland_probability: f64 = state
        .picked
        .iter()
        .filter(|&&i| !state.pool.card(i).is_land())
        .map(|&i| state.probability(i))
        .sum();

    let global: f64 = registry()
        .iter()
        .filter(|o| !o.per_card)
        .map(|o| o.weight(state) * overrides.multiplier(o.id) * o.value(state, None))
        .sum();

    nonland_probability * global
}

/// First-ascent hill climb over basic-land swaps, in fixed color order so
/// evaluation is reproducible. Mutates `state.lands` and
/// `state.probabilities` toward the best tally found.
fn improve_lands(state: &mut BotState, relevant: &HashSet<usize>, overrides: &WeightOverrides) {
    let mut current = pool_score(state, overrides);
    loop {
        let mut improved = false;
        'swap: for increase in Color::ALL {
            for decrease in Color::ALL {
                if increase == decrease {
                    continue;
                }
                let dec_key = ColorSet::from_colors(&[decrease]);
                if state.lands.get(&dec_key).copied().unwrap_or(0) == 0 {
                    continue;
                }
                let inc_key = ColorSet::from_colors(&[increase]);

                let mut candidate = state.lands.clone();
                *candidate.entry(inc_key).or_insert(0) += 1;
                *candidate.entry(dec_key).or_insert(0) -= 1;

                let probabilities = compute_probabilities(state.pool, relevant, &candidate);
                let saved_lands = std::mem::replace(&mut state.lands, candidate);
                let saved_probs = std::mem::replace(&mut state.probabilities, probabilities);

                let score = pool_score(state, overrides);
                if score > current {
                    current = score;
                    improved = true;
                    break 'swap;
                }
                state.lands = saved_lands;
                state.probabilities = saved_probs;
            }
        }
        if !improved {
            break;
        }
    }
}

/// Score every card in the bot's current pack. Deterministic given the pool,
/// the drafter state, and the weight overrides.
pub fn evaluate(
    pool: &CardPool,
    drafter: &DrafterState,
    overrides: &WeightOverrides,
) -> BotEvaluation {
    let relevant: HashSet<usize> = drafter
        .picked
        .iter()
        .chain(drafter.seen.iter())
        .chain(drafter.cards_in_pack.iter())
        .copied()
        .collect();

    let lands = initial_lands(pool, &drafter.picked);
    let probabilities = compute_probabilities(pool, &relevant, &lands);

    let mut state = BotState {
        pool,
        picked: &drafter.picked,
        seen: &drafter.seen,
        cards_in_pack: &drafter.cards_in_pack,
        pack_num: drafter.pack_num,
        num_packs: drafter.num_packs,
        pick_num: drafter.pick_num,
        pack_size: drafter.pack_size,
        lands,
        probabilities,
    };

    improve_lands(&mut state, &relevant, overrides);

    // Global oracles contribute the same amount to every candidate; compute
    // them once.
    let global: Vec<OracleResult> = registry()
        .iter()
        .filter(|o| !o.per_card)
        .map(|o| OracleResult {
            oracle: o.id,
            value: o.value(&state, None),
            weight: o.weight(&state) * overrides.multiplier(o.id),
        })
        .collect();

    let mut scores = Vec::with_capacity(state.cards_in_pack.len());
    let mut per_card = Vec::with_capacity(state.cards_in_pack.len());

    for &card in state.cards_in_pack {
        let mut results = global.clone();
        for oracle in registry().iter().filter(|o| o.per_card) {
            results.push(OracleResult {
                oracle: oracle.id,
                value: oracle.value(&state, Some(card)),
                weight: oracle.weight(&state) * overrides.multiplier(oracle.id),
            });
        }

        let mut total = 0.0;
        let mut failed = false;
        for result in &results {
            let contribution = result.weight * result.value;
            if !contribution.is_finite() {
                let err = DraftError::BotEvaluationFailure {
                    oracle: result.oracle.name(),
                };
                warn!(card, %err, "scoring card at minimum value");
                failed = true;
                break;
            }
            total += contribution;
        }

        scores.push(if failed { f64::MIN } else { total });
        per_card.push(results);
    }

    BotEvaluation {
        colors: combination_for_lands(&state.lands),
        lands: state.lands,
        scores,
        per_card,
    }
}

/// Choose a position in the pack for the given step. Returns `None` for
/// pass steps or an empty pack.
pub fn select(
    evaluation: &BotEvaluation,
    action: StepAction,
    rng: &mut SessionRng,
) -> Option<usize> {
    let len = evaluation.scores.len();
    if len == 0 {
        return None;
    }
    match action {
        StepAction::Pick => Some(argbest(&evaluation.scores, |a, b| a > b)),
        StepAction::Trash => Some(argbest(&evaluation.scores, |a, b| a < b)),
        StepAction::PickRandom | StepAction::TrashRandom => Some(rng.gen_range(0..len)),
        StepAction::Pass => None,
    }
}

/// Index of the best score; ties go to the first card encountered.
fn argbest(scores: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if better(score, scores[best]) {
            best = i;
        }
    }
    best
}
