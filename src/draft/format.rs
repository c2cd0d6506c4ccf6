// Draft format definitions and the derived per-seat position.
//
// A format is a declarative list of packs; each pack has a list of slot
// filter strings (resolved by the pack generator) and a step sequence
// gating what a seat may do. Everything about "where a seat currently is"
// is recomputed from the format plus a cumulative pick count, never stored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("format has no packs")]
    NoPacks,

    #[error("pack {pack} has no slots")]
    EmptySlots { pack: usize },

    #[error("pack {pack} steps select {selected} cards but the pack only has {slots}")]
    StepsExceedPack {
        pack: usize,
        selected: u32,
        slots: usize,
    },

    #[error("pack {pack} has a pass step with an amount")]
    PassWithAmount { pack: usize },
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Pick,
    Trash,
    Pass,
    #[serde(rename = "pickrandom")]
    PickRandom,
    #[serde(rename = "trashrandom")]
    TrashRandom,
}

impl StepAction {
    /// Whether this step removes a card from the pack (everything but pass).
    pub fn is_selection(self) -> bool {
        !matches!(self, StepAction::Pass)
    }

    /// Whether the selected card goes to the pick log (vs. the trash log).
    pub fn is_pick(self) -> bool {
        matches!(self, StepAction::Pick | StepAction::PickRandom)
    }

    /// Whether the seat chooses, or the engine selects uniformly at random.
    pub fn is_random(self) -> bool {
        matches!(self, StepAction::PickRandom | StepAction::TrashRandom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub action: StepAction,
    /// How many cards this step selects. `None` means 1 for selection steps
    /// and is required for pass steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

impl Step {
    pub fn pick(amount: u32) -> Self {
        Step {
            action: StepAction::Pick,
            amount: Some(amount),
        }
    }

    pub fn trash(amount: u32) -> Self {
        Step {
            action: StepAction::Trash,
            amount: Some(amount),
        }
    }

    pub fn pass() -> Self {
        Step {
            action: StepAction::Pass,
            amount: None,
        }
    }
}

/// The standard step sequence for a pack of `len` cards: pick one, pass,
/// repeated, with the final pass removed.
pub fn default_steps(len: usize) -> Vec<Step> {
    let mut steps = Vec::with_capacity(len * 2);
    for i in 0..len {
        steps.push(Step::pick(1));
        if i + 1 < len {
            steps.push(Step::pass());
        }
    }
    steps
}

// ---------------------------------------------------------------------------
// Format definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackSpec {
    /// One filter string per card slot; see `draft::pack` for the grammar.
    pub slots: Vec<String>,
    /// `None` means the standard pick/pass sequence for the slot count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Step>>,
}

impl PackSpec {
    pub fn effective_steps(&self) -> Vec<Step> {
        match &self.steps {
            Some(steps) => steps.clone(),
            None => default_steps(self.slots.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDefinition {
    #[serde(default)]
    pub title: String,
    pub packs: Vec<PackSpec>,
    /// Whether one card may be selected into multiple packs.
    #[serde(default)]
    pub multiples: bool,
}

impl FormatDefinition {
    /// The standard format: `packs` packs of `cards` wildcard slots each.
    pub fn standard(packs: usize, cards: usize) -> Self {
        FormatDefinition {
            title: format!("Standard draft {packs}x{cards}"),
            packs: (0..packs)
                .map(|_| PackSpec {
                    slots: vec!["*".to_string(); cards],
                    steps: None,
                })
                .collect(),
            multiples: false,
        }
    }

    pub fn num_packs(&self) -> usize {
        self.packs.len()
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        if self.packs.is_empty() {
            return Err(FormatError::NoPacks);
        }
        for (pack, spec) in self.packs.iter().enumerate() {
            if spec.slots.is_empty() {
                return Err(FormatError::EmptySlots { pack });
            }
            if let Some(steps) = &spec.steps {
                let mut selected = 0u32;
                for step in steps {
                    if step.action == StepAction::Pass {
                        if step.amount.is_some() {
                            return Err(FormatError::PassWithAmount { pack });
                        }
                    } else {
                        selected += step.amount.unwrap_or(1);
                    }
                }
                if selected as usize > spec.slots.len() {
                    return Err(FormatError::StepsExceedPack {
                        pack,
                        selected,
                        slots: spec.slots.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Flattened step walk
// ---------------------------------------------------------------------------

/// One unit of action from a pack's step sequence, with its position context.
/// Multi-card steps are expanded into units so the session can consume them
/// one selection at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatStep {
    /// 0-based pack index.
    pub pack: usize,
    /// 1-based pick number within the pack (passes repeat the prior number).
    pub pick: u32,
    pub action: StepAction,
    /// Cards left in the pack when this unit applies.
    pub cards_in_pack: u32,
    /// Units remaining in the originating step, this one included.
    pub amount: u32,
}

/// Expand a pack's steps into unit actions with running pick numbers and
/// pack-size countdown.
pub fn flatten_steps(pack: usize, steps: &[Step]) -> Vec<FlatStep> {
    let mut flat = Vec::new();
    let mut pick = 0u32;
    let mut cards_in_pack: u32 = steps
        .iter()
        .filter(|s| s.action.is_selection())
        .map(|s| s.amount.unwrap_or(1))
        .sum::<u32>()
        + 1;

    for step in steps {
        let amount = step.amount.unwrap_or(1);
        for i in 0..amount {
            if step.action.is_selection() {
                pick += 1;
                cards_in_pack -= 1;
                flat.push(FlatStep {
                    pack,
                    pick,
                    action: step.action,
                    cards_in_pack,
                    amount: amount - i,
                });
            } else {
                flat.push(FlatStep {
                    pack,
                    pick,
                    action: step.action,
                    cards_in_pack: cards_in_pack - 1,
                    amount: 1,
                });
            }
        }
    }
    flat
}

/// The full unit-step list for a format, across all packs in order.
pub fn step_list(format: &FormatDefinition) -> Vec<FlatStep> {
    format
        .packs
        .iter()
        .enumerate()
        .flat_map(|(pack, spec)| flatten_steps(pack, &spec.effective_steps()))
        .collect()
}

// ---------------------------------------------------------------------------
// Drafter position projection
// ---------------------------------------------------------------------------

/// Where a seat stands in the format after `selections_made` picks+trashes.
/// Derived on demand; nothing here is authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPosition {
    /// 0-based index of the pack the next action belongs to.
    pub pack_num: usize,
    /// 1-based pick number within that pack.
    pub pick_num: u32,
    pub num_packs: usize,
    /// Size of the current pack when it was opened.
    pub pack_size: u32,
    /// The action the seat is gated on; `None` once the format is exhausted.
    pub action: Option<StepAction>,
    /// Units remaining in the current step, the due one included.
    pub amount: u32,
}

/// Project a seat's position from its cumulative selection count.
pub fn position_after(format: &FormatDefinition, selections_made: usize) -> StepPosition {
    let steps = step_list(format);
    let num_packs = format.num_packs();

    let mut selections = 0usize;
    for step in &steps {
        if selections >= selections_made {
            let pack_size = steps
                .iter()
                .filter(|s| s.pack == step.pack && s.action.is_selection())
                .count() as u32;
            return StepPosition {
                pack_num: step.pack,
                pick_num: step.pick.max(1),
                num_packs,
                pack_size,
                action: Some(step.action),
                amount: step.amount,
            };
        }
        if step.action.is_selection() {
            selections += 1;
        }
    }

    // Format exhausted: report the position past the final pack.
    let last_pack = num_packs.saturating_sub(1);
    let pack_size = steps
        .iter()
        .filter(|s| s.pack == last_pack && s.action.is_selection())
        .count() as u32;
    StepPosition {
        pack_num: last_pack,
        pick_num: pack_size,
        num_packs,
        pack_size,
        action: None,
        amount: 0,
    }
}

/// Human-readable description of the upcoming actions, for clients.
pub fn step_title(upcoming: &[StepAction]) -> String {
    match upcoming.first() {
        Some(StepAction::Pick) => {
            let count = upcoming
                .iter()
                .take_while(|a| **a == StepAction::Pick)
                .count();
            if count > 1 {
                format!("Pick {count} more cards")
            } else {
                "Pick one more card".to_string()
            }
        }
        Some(StepAction::Trash) => {
            let count = upcoming
                .iter()
                .take_while(|a| **a == StepAction::Trash)
                .count();
            if count > 1 {
                format!("Trash {count} more cards")
            } else {
                "Trash one more card".to_string()
            }
        }
        Some(StepAction::PickRandom) | Some(StepAction::TrashRandom) => {
            "Making random selection...".to_string()
        }
        Some(StepAction::Pass) | None => "Waiting for cards...".to_string(),
    }
}
