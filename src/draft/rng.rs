// Seeded randomness for draft sessions.
//
// Every random decision in a session (pack generation, random-selection
// steps) flows through one of these handles, so a draft reproduces
// bit-for-bit from its seed. The ChaCha word position makes snapshots O(1)
// regardless of how many values have been drawn.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct SessionRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl SessionRng {
    pub fn from_seed(seed: u64) -> Self {
        SessionRng {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn gen_range(&mut self, range: std::ops::Range<usize>) -> usize {
        self.inner.gen_range(range)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        use rand::seq::SliceRandom;
        items.shuffle(&mut self.inner);
    }

    /// Capture the state for a session snapshot.
    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            word_pos: self.inner.get_word_pos(),
        }
    }

    /// Rebuild from a snapshot, resuming the sequence exactly where the
    /// capture left it.
    pub fn from_state(state: &RngState) -> Self {
        let mut inner = ChaCha8Rng::seed_from_u64(state.seed);
        inner.set_word_pos(state.word_pos);
        SessionRng {
            seed: state.seed,
            inner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub word_pos: u128,
}
