// Card records and the read-only pool a draft runs against.
//
// All draft state refers to cards as indices into a `CardPool`; card data is
// never copied into packs or pick logs. The pool is loaded once (CSV or JSON)
// and is immutable for the lifetime of every session that references it.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Elo for cards without rating data.
pub const DEFAULT_ELO: f64 = 1200.0;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to read card pool file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse card pool {path}: {message}")]
    Parse { path: String, message: String },

    #[error("card pool is empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// The five colors, in canonical WUBRG order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Blue,
    Black,
    Red,
    Green,
}

impl Color {
    pub const ALL: [Color; 5] = [
        Color::White,
        Color::Blue,
        Color::Black,
        Color::Red,
        Color::Green,
    ];

    pub fn symbol(self) -> char {
        match self {
            Color::White => 'W',
            Color::Blue => 'U',
            Color::Black => 'B',
            Color::Red => 'R',
            Color::Green => 'G',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'W' => Some(Color::White),
            'U' => Some(Color::Blue),
            'B' => Some(Color::Black),
            'R' => Some(Color::Red),
            'G' => Some(Color::Green),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Color::White => 1 << 0,
            Color::Blue => 1 << 1,
            Color::Black => 1 << 2,
            Color::Red => 1 << 3,
            Color::Green => 1 << 4,
        }
    }
}

/// A set of colors packed into a bitmask. Used for color identities and for
/// the land-combination keys in bot evaluation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ColorSet(u8);

impl ColorSet {
    pub const COLORLESS: ColorSet = ColorSet(0);

    pub fn from_colors(colors: &[Color]) -> Self {
        ColorSet(colors.iter().fold(0, |acc, c| acc | c.bit()))
    }

    /// Parse a color string such as "WU" or "g". Unknown characters are
    /// rejected so a typo in a slot filter fails loudly rather than matching
    /// nothing.
    pub fn parse(s: &str) -> Option<Self> {
        let mut set = ColorSet::COLORLESS;
        for ch in s.chars() {
            set = set.with(Color::from_symbol(ch)?);
        }
        Some(set)
    }

    pub fn with(self, color: Color) -> Self {
        ColorSet(self.0 | color.bit())
    }

    pub fn contains(self, color: Color) -> bool {
        self.0 & color.bit() != 0
    }

    pub fn is_subset_of(self, other: ColorSet) -> bool {
        self.0 & other.0 == self.0
    }

    pub fn intersects(self, other: ColorSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn colors(self) -> impl Iterator<Item = Color> {
        Color::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// All 32 color combinations ordered by size then canonical color order,
    /// so iteration is deterministic.
    pub fn all_combinations() -> Vec<ColorSet> {
        let mut combos: Vec<ColorSet> = (0u8..32).map(ColorSet).collect();
        combos.sort_by_key(|c| (c.len(), c.0));
        combos
    }
}

impl fmt::Display for ColorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "C");
        }
        for color in self.colors() {
            write!(f, "{}", color.symbol())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rarity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Mythic,
    Special,
}

impl Rarity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "common" | "c" => Some(Rarity::Common),
            "uncommon" | "u" => Some(Rarity::Uncommon),
            "rare" | "r" => Some(Rarity::Rare),
            "mythic" | "m" => Some(Rarity::Mythic),
            "special" | "s" => Some(Rarity::Special),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Card records
// ---------------------------------------------------------------------------

/// A single card in the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRecord {
    pub name: String,
    pub type_line: String,
    pub mana_value: u32,
    /// Color identity (not just the printed cost colors).
    pub colors: ColorSet,
    pub rarity: Rarity,
    /// Cube tags; slot filters match against these.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Elo rating used by the bot's power oracle.
    #[serde(default = "default_elo")]
    pub elo: f64,
    /// Dense similarity embedding; empty when unavailable, in which case the
    /// synergy oracles contribute zero for this card.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

fn default_elo() -> f64 {
    DEFAULT_ELO
}

impl CardRecord {
    pub fn is_creature(&self) -> bool {
        self.type_line.to_lowercase().contains("creature")
    }

    pub fn is_land(&self) -> bool {
        self.type_line.to_lowercase().contains("land")
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

// ---------------------------------------------------------------------------
// Card pool
// ---------------------------------------------------------------------------

/// Read-only, index-addressed view over the cards a draft is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardPool {
    cards: Vec<CardRecord>,
}

impl CardPool {
    pub fn new(cards: Vec<CardRecord>) -> Result<Self, PoolError> {
        if cards.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(CardPool { cards })
    }

    pub fn get(&self, index: usize) -> Option<&CardRecord> {
        self.cards.get(index)
    }

    /// Panic-free callers should prefer `get`; this is for contexts where the
    /// index has already been validated against the pool (pack contents,
    /// pick logs).
    pub fn card(&self, index: usize) -> &CardRecord {
        &self.cards[index]
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &CardRecord)> {
        self.cards.iter().enumerate()
    }

    /// Load a pool from a CSV file with the columns
    /// `name,type_line,mana_value,colors,rarity,tags,elo`. Tags are
    /// semicolon-separated; elo may be blank.
    pub fn from_csv_path(path: &Path) -> Result<Self, PoolError> {
        let display = path.display().to_string();
        let mut reader = csv::Reader::from_path(path).map_err(|e| PoolError::Parse {
            path: display.clone(),
            message: e.to_string(),
        })?;

        let mut cards = Vec::new();
        for record in reader.deserialize::<CsvCardRow>() {
            let row = record.map_err(|e| PoolError::Parse {
                path: display.clone(),
                message: e.to_string(),
            })?;
            cards.push(row.into_card(&display)?);
        }

        CardPool::new(cards)
    }

    /// Load a pool from a JSON array of card records.
    pub fn from_json_path(path: &Path) -> Result<Self, PoolError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| PoolError::Io {
            path: display.clone(),
            source: e,
        })?;
        let cards: Vec<CardRecord> =
            serde_json::from_str(&contents).map_err(|e| PoolError::Parse {
                path: display,
                message: e.to_string(),
            })?;
        CardPool::new(cards)
    }
}

/// Raw CSV row; colors/rarity/tags are parsed after deserialization so the
/// error can name the file.
#[derive(Debug, Deserialize)]
struct CsvCardRow {
    name: String,
    type_line: String,
    mana_value: u32,
    #[serde(default)]
    colors: String,
    rarity: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    elo: Option<f64>,
}

impl CsvCardRow {
    fn into_card(self, path: &str) -> Result<CardRecord, PoolError> {
        let colors = ColorSet::parse(&self.colors).ok_or_else(|| PoolError::Parse {
            path: path.to_string(),
            message: format!("invalid colors `{}` for card `{}`", self.colors, self.name),
        })?;
        let rarity = Rarity::parse(&self.rarity).ok_or_else(|| PoolError::Parse {
            path: path.to_string(),
            message: format!("invalid rarity `{}` for card `{}`", self.rarity, self.name),
        })?;
        let tags = self
            .tags
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Ok(CardRecord {
            name: self.name,
            type_line: self.type_line,
            mana_value: self.mana_value,
            colors,
            rarity,
            tags,
            elo: self.elo.unwrap_or(DEFAULT_ELO),
            embedding: Vec::new(),
        })
    }
}
