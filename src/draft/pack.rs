// Pack generation: resolving slot filters against the card pool.
//
// Filter grammar, one slot string per card:
//   `*`                 any card
//   `tag:<t>`           cube tag match (bare words are treated as tags)
//   `rarity:<r>`        rarity match
//   `color:<WUBRG..>`   color identity is a subset of the given colors
//   `type:<substring>`  type-line substring match
// A slot may list comma-separated alternatives; one is chosen at random.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cards::{CardPool, CardRecord, ColorSet, Rarity};
use crate::draft::format::FormatDefinition;
use crate::draft::rng::SessionRng;
use crate::draft::DraftError;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid slot filter `{text}`: {message}")]
    Invalid { text: String, message: String },
}

// ---------------------------------------------------------------------------
// Slot filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlotFilter {
    Any,
    Tag(String),
    Rarity(Rarity),
    Colors(ColorSet),
    TypeLine(String),
}

impl SlotFilter {
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(SlotFilter::Any);
        }

        match trimmed.split_once(':') {
            Some(("tag", value)) => Ok(SlotFilter::Tag(value.trim().to_string())),
            Some(("rarity", value)) => {
                let rarity = Rarity::parse(value.trim()).ok_or_else(|| FilterError::Invalid {
                    text: trimmed.to_string(),
                    message: format!("unknown rarity `{}`", value.trim()),
                })?;
                Ok(SlotFilter::Rarity(rarity))
            }
            Some(("color", value)) | Some(("c", value)) => {
                let colors =
                    ColorSet::parse(value.trim()).ok_or_else(|| FilterError::Invalid {
                        text: trimmed.to_string(),
                        message: format!("unknown color string `{}`", value.trim()),
                    })?;
                Ok(SlotFilter::Colors(colors))
            }
            Some(("type", value)) => Ok(SlotFilter::TypeLine(value.trim().to_lowercase())),
            Some((op, _)) => Err(FilterError::Invalid {
                text: trimmed.to_string(),
                message: format!("unknown filter operator `{op}`"),
            }),
            // Backwards compatibility: a bare word is a tag filter.
            None => Ok(SlotFilter::Tag(trimmed.to_string())),
        }
    }

    pub fn matches(&self, card: &CardRecord) -> bool {
        match self {
            SlotFilter::Any => true,
            SlotFilter::Tag(tag) => card.has_tag(tag),
            SlotFilter::Rarity(rarity) => card.rarity == *rarity,
            SlotFilter::Colors(colors) => card.colors.is_subset_of(*colors),
            SlotFilter::TypeLine(fragment) => card.type_line.to_lowercase().contains(fragment),
        }
    }
}

impl std::fmt::Display for SlotFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotFilter::Any => write!(f, "*"),
            SlotFilter::Tag(tag) => write!(f, "tag:{tag}"),
            SlotFilter::Rarity(r) => write!(f, "rarity:{r:?}"),
            SlotFilter::Colors(c) => write!(f, "color:{c}"),
            SlotFilter::TypeLine(t) => write!(f, "type:{t}"),
        }
    }
}

/// Parse a slot string into its comma-separated alternatives.
fn parse_alternatives(slot: &str) -> Result<Vec<SlotFilter>, FilterError> {
    slot.split(',').map(SlotFilter::parse).collect()
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generated pack contents: `rows[pack_index][seat_index]` is the ordered
/// list of pool indices dealt to that seat for that round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPacks {
    pub rows: Vec<Vec<Vec<usize>>>,
}

impl GeneratedPacks {
    /// Total cards dealt across all packs and seats.
    pub fn total_cards(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .map(|pack| pack.len())
            .sum()
    }
}

/// Resolve one slot against the remaining pool. `available` holds the pool
/// indices still drawable; `in_pack` holds indices already dealt into the
/// pack being built (never duplicated within a pack, even with multiples).
fn resolve_slot(
    pool: &CardPool,
    available: &[usize],
    in_pack: &[usize],
    slot: &str,
    rng: &mut SessionRng,
) -> Result<usize, DraftError> {
    let mut alternatives = parse_alternatives(slot)?;

    while !alternatives.is_empty() {
        let alt_index = if alternatives.len() == 1 {
            0
        } else {
            rng.gen_range(0..alternatives.len())
        };
        let filter = &alternatives[alt_index];

        let valid: Vec<usize> = available
            .iter()
            .copied()
            .filter(|i| !in_pack.contains(i))
            .filter(|i| filter.matches(pool.card(*i)))
            .collect();

        if valid.is_empty() {
            warn!("no cards matching filter `{filter}`, trying remaining alternatives");
            alternatives.remove(alt_index);
            continue;
        }

        return Ok(valid[rng.gen_range(0..valid.len())]);
    }

    Err(DraftError::EmptySlotFilter {
        filter: slot.to_string(),
    })
}

/// Generate one pack per seat per round by resolving every slot filter.
/// Pure given the RNG: the same (pool, format, seats, seed) deals the same
/// packs. A slot whose alternatives all match zero remaining cards fails
/// the whole generation.
pub fn generate(
    pool: &CardPool,
    format: &FormatDefinition,
    seats: usize,
    rng: &mut SessionRng,
) -> Result<GeneratedPacks, DraftError> {
    format.validate()?;

    let mut available: Vec<usize> = (0..pool.len()).collect();
    let mut rows: Vec<Vec<Vec<usize>>> = vec![Vec::with_capacity(seats); format.num_packs()];

    // Deal seat-major so one seat's packs are drawn consecutively, matching
    // the order a paper cube would be stacked.
    for _seat in 0..seats {
        for (pack_num, spec) in format.packs.iter().enumerate() {
            let mut pack: Vec<usize> = Vec::with_capacity(spec.slots.len());
            for slot in &spec.slots {
                let chosen = resolve_slot(pool, &available, &pack, slot, rng)?;
                pack.push(chosen);
                if !format.multiples {
                    available.retain(|i| *i != chosen);
                }
            }
            rows[pack_num].push(pack);
        }
    }

    Ok(GeneratedPacks { rows })
}

/// Dry-run every filter in the format against the full pool so a hopeless
/// filter fails at session creation, not mid-draft.
pub fn check_format(format: &FormatDefinition, pool: &CardPool) -> Result<(), DraftError> {
    format.validate()?;
    for spec in &format.packs {
        for slot in &spec.slots {
            let alternatives = parse_alternatives(slot)?;
            let any_match = alternatives
                .iter()
                .any(|filter| pool.iter().any(|(_, card)| filter.matches(card)));
            if !any_match {
                return Err(DraftError::EmptySlotFilter {
                    filter: slot.to_string(),
                });
            }
        }
    }
    Ok(())
}
