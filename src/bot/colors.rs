// Color commitment and casting probability for bot evaluation.
//
// The bot models its mana base as a tally of land counts keyed by color
// combination. Basics start from a fixed 17-land prior; picked lands swap
// in for basics. The casting probability of a card is looked up from a
// devotion-by-sources table under the current tally.

use std::collections::BTreeMap;

use crate::cards::{CardPool, CardRecord, Color, ColorSet};

/// Land counts keyed by the combination of colors the land produces.
/// BTreeMap so iteration order (and therefore every downstream computation)
/// is deterministic.
pub type LandTally = BTreeMap<ColorSet, u32>;

/// The starting mana base before any picked lands are considered.
const BASE_LANDS: [(Color, u32); 5] = [
    (Color::White, 4),
    (Color::Blue, 4),
    (Color::Black, 3),
    (Color::Red, 3),
    (Color::Green, 3),
];

/// Total lands the tally always sums to.
pub const LAND_COUNT: u32 = 17;

/// Build the initial land tally for a pool of picked cards: the fixed basic
/// prior, with each picked land swapped in for a basic of one of its colors
/// (or any basic if none of its colors have basics left).
pub fn initial_lands(pool: &CardPool, picked: &[usize]) -> LandTally {
    let mut lands: LandTally = BASE_LANDS
        .iter()
        .map(|(color, count)| (ColorSet::from_colors(&[*color]), *count))
        .collect();

    for &index in picked {
        let card = pool.card(index);
        if !card.is_land() {
            continue;
        }
        *lands.entry(card.colors).or_insert(0) += 1;

        let mut removed = false;
        for color in card.colors.colors() {
            let key = ColorSet::from_colors(&[color]);
            if let Some(count) = lands.get_mut(&key) {
                if *count > 0 {
                    *count -= 1;
                    removed = true;
                    break;
                }
            }
        }
        if !removed {
            for color in Color::ALL {
                let key = ColorSet::from_colors(&[color]);
                if let Some(count) = lands.get_mut(&key) {
                    if *count > 0 {
                        *count -= 1;
                        break;
                    }
                }
            }
        }
    }

    lands
}

/// Number of lands in the tally that can produce `color`.
pub fn sources_for(lands: &LandTally, color: Color) -> u32 {
    lands
        .iter()
        .filter(|(combo, _)| combo.contains(color))
        .map(|(_, count)| *count)
        .sum()
}

/// The color combination a tally commits to: every color with at least
/// three sources.
pub fn combination_for_lands(lands: &LandTally) -> ColorSet {
    let committed: Vec<Color> = Color::ALL
        .into_iter()
        .filter(|c| sources_for(lands, *c) >= 3)
        .collect();
    ColorSet::from_colors(&committed)
}

// ---------------------------------------------------------------------------
// Casting probability
// ---------------------------------------------------------------------------

/// Probability of having `sources` usable lands cover a devotion of 1..=3
/// by the time the card is castable. Monotone in sources; rows are devotion.
const PROB_BY_DEVOTION: [[f64; 18]; 3] = [
    [
        0.0, 0.28, 0.45, 0.58, 0.68, 0.76, 0.82, 0.86, 0.90, 0.92, 0.94, 0.96, 0.97, 0.98, 0.985,
        0.99, 0.995, 1.0,
    ],
    [
        0.0, 0.08, 0.22, 0.36, 0.48, 0.58, 0.67, 0.74, 0.80, 0.85, 0.89, 0.92, 0.94, 0.96, 0.97,
        0.98, 0.99, 1.0,
    ],
    [
        0.0, 0.02, 0.09, 0.19, 0.30, 0.41, 0.51, 0.60, 0.68, 0.75, 0.81, 0.86, 0.90, 0.93, 0.95,
        0.97, 0.98, 1.0,
    ],
];

/// Colored-pip devotion per identity color. Color identity does not carry
/// pip counts, so this approximates: one pip per color, two for expensive
/// mono-colored cards (which usually carry double pips).
fn devotion_per_color(card: &CardRecord) -> u32 {
    if card.colors.len() == 1 && card.mana_value >= 4 {
        2
    } else {
        1
    }
}

/// Probability the bot can cast `card` on curve under the given land tally.
/// Lands and colorless cards are always castable; multicolor cards take the
/// product over their per-color probabilities, treating sources as
/// independent.
pub fn casting_probability(card: &CardRecord, lands: &LandTally) -> f64 {
    if card.is_land() || card.colors.is_empty() {
        return 1.0;
    }
    let devotion = devotion_per_color(card);
    let row = &PROB_BY_DEVOTION[(devotion as usize - 1).min(2)];
    card.colors
        .colors()
        .map(|color| {
            let sources = sources_for(lands, color).min(17) as usize;
            row[sources]
        })
        .product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CardPool, CardRecord, Rarity, DEFAULT_ELO};

    fn card(name: &str, type_line: &str, mana_value: u32, colors: &str) -> CardRecord {
        CardRecord {
            name: name.into(),
            type_line: type_line.into(),
            mana_value,
            colors: ColorSet::parse(colors).unwrap(),
            rarity: Rarity::Common,
            tags: Vec::new(),
            elo: DEFAULT_ELO,
            embedding: Vec::new(),
        }
    }

    fn mono(color: Color) -> ColorSet {
        ColorSet::from_colors(&[color])
    }

    #[test]
    fn initial_lands_match_base_prior() {
        let pool = CardPool::new(vec![card("A", "Instant", 1, "W")]).unwrap();
        let lands = initial_lands(&pool, &[]);
        assert_eq!(lands[&mono(Color::White)], 4);
        assert_eq!(lands[&mono(Color::Green)], 3);
        assert_eq!(lands.values().sum::<u32>(), LAND_COUNT);
    }

    #[test]
    fn picked_land_swaps_in_for_a_basic() {
        let pool = CardPool::new(vec![
            card("Tundra", "Land - Plains Island", 0, "WU"),
            card("Bolt", "Instant", 1, "R"),
        ])
        .unwrap();
        let lands = initial_lands(&pool, &[0, 1]);
        assert_eq!(lands[&ColorSet::parse("WU").unwrap()], 1);
        // One of the WU basics paid for it.
        assert_eq!(lands[&mono(Color::White)], 3);
        assert_eq!(lands.values().sum::<u32>(), LAND_COUNT);
    }

    #[test]
    fn sources_count_multicolor_lands() {
        let pool = CardPool::new(vec![card("Tundra", "Land - Plains Island", 0, "WU")]).unwrap();
        let lands = initial_lands(&pool, &[0]);
        // 3 white basics + the dual.
        assert_eq!(sources_for(&lands, Color::White), 4);
        assert_eq!(sources_for(&lands, Color::Blue), 5);
        assert_eq!(sources_for(&lands, Color::Red), 3);
    }

    #[test]
    fn combination_requires_three_sources() {
        let pool = CardPool::new(vec![card("A", "Instant", 1, "W")]).unwrap();
        let lands = initial_lands(&pool, &[]);
        // All five colors start at 3+.
        assert_eq!(combination_for_lands(&lands).len(), 5);

        let mut two_color: LandTally = BTreeMap::new();
        two_color.insert(mono(Color::White), 9);
        two_color.insert(mono(Color::Blue), 8);
        let combo = combination_for_lands(&two_color);
        assert_eq!(combo, ColorSet::parse("WU").unwrap());
    }

    #[test]
    fn casting_probability_free_for_lands_and_colorless() {
        let lands: LandTally = BTreeMap::new();
        assert_eq!(
            casting_probability(&card("Wastes", "Basic Land", 0, ""), &lands),
            1.0
        );
        assert_eq!(
            casting_probability(&card("Golem", "Artifact Creature", 3, ""), &lands),
            1.0
        );
    }

    #[test]
    fn casting_probability_monotone_in_sources() {
        let bolt = card("Bolt", "Instant", 1, "R");
        let mut few: LandTally = BTreeMap::new();
        few.insert(mono(Color::Red), 2);
        let mut many: LandTally = BTreeMap::new();
        many.insert(mono(Color::Red), 10);
        assert!(casting_probability(&bolt, &few) < casting_probability(&bolt, &many));
    }

    #[test]
    fn multicolor_takes_product() {
        let mut lands: LandTally = BTreeMap::new();
        lands.insert(mono(Color::White), 8);
        lands.insert(mono(Color::Blue), 8);
        let gold = card("Gold", "Creature", 2, "WU");
        let white = card("White", "Creature", 2, "W");
        assert!(casting_probability(&gold, &lands) < casting_probability(&white, &lands));
    }

    #[test]
    fn expensive_mono_cards_need_deeper_sources() {
        let mut lands: LandTally = BTreeMap::new();
        lands.insert(mono(Color::Green), 6);
        let cheap = card("Elf", "Creature", 1, "G");
        let fat = card("Wurm", "Creature", 6, "G");
        assert!(casting_probability(&fat, &lands) < casting_probability(&cheap, &lands));
    }

    #[test]
    fn out_of_color_card_scores_zero_probability() {
        let mut lands: LandTally = BTreeMap::new();
        lands.insert(mono(Color::White), 17);
        let bolt = card("Bolt", "Instant", 1, "R");
        assert_eq!(casting_probability(&bolt, &lands), 0.0);
    }
}
