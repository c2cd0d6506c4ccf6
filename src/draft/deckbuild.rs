// Deck building: partition a finished pick log into a deck skeleton.
//
// Best-effort heuristic, not an optimizer: creatures in the top row,
// everything else in the bottom row, columns by mana value clamped to
// [0, 7]. Picks past the configured mainboard size land in the sideboard.

use serde::{Deserialize, Serialize};

use crate::cards::CardPool;

/// Number of mana value columns; the last column holds everything >= 7.
pub const CURVE_COLUMNS: usize = 8;

/// `rows x cols` empty stacks.
pub fn setup_stacks(rows: usize, cols: usize) -> Vec<Vec<Vec<usize>>> {
    (0..rows).map(|_| vec![Vec::new(); cols]).collect()
}

/// Column for a card: mana value clamped to the curve width.
pub fn curve_column(pool: &CardPool, card: usize) -> usize {
    (pool.card(card).mana_value as usize).min(CURVE_COLUMNS - 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckPartition {
    /// Two rows (creatures, noncreatures) of eight mana-value columns.
    pub mainboard: Vec<Vec<Vec<usize>>>,
    /// One row of eight mana-value columns.
    pub sideboard: Vec<Vec<Vec<usize>>>,
}

impl DeckPartition {
    /// Every card index in the partition, mainboard rows first, in stack
    /// order. The multiset of indices always equals the input pick log.
    pub fn flatten(&self) -> Vec<usize> {
        self.mainboard
            .iter()
            .chain(self.sideboard.iter())
            .flat_map(|row| row.iter())
            .flat_map(|stack| stack.iter().copied())
            .collect()
    }

    pub fn mainboard_count(&self) -> usize {
        self.mainboard
            .iter()
            .flat_map(|row| row.iter())
            .map(|stack| stack.len())
            .sum()
    }

    pub fn sideboard_count(&self) -> usize {
        self.sideboard
            .iter()
            .flat_map(|row| row.iter())
            .map(|stack| stack.len())
            .sum()
    }
}

/// Partition a pick log. Deterministic and idempotent: the output depends
/// only on the pick log order, and cards are neither dropped nor duplicated.
pub fn partition(pool: &CardPool, pick_log: &[usize], mainboard_size: usize) -> DeckPartition {
    let mut mainboard = setup_stacks(2, CURVE_COLUMNS);
    let mut sideboard = setup_stacks(1, CURVE_COLUMNS);

    for (position, &card) in pick_log.iter().enumerate() {
        let col = curve_column(pool, card);
        if position < mainboard_size {
            let row = if pool.card(card).is_creature() { 0 } else { 1 };
            mainboard[row][col].push(card);
        } else {
            sideboard[0][col].push(card);
        }
    }

    DeckPartition {
        mainboard,
        sideboard,
    }
}
