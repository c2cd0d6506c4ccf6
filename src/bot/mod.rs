// Bot evaluation: the oracle ensemble that scores cards for automated seats.

pub mod colors;
pub mod engine;
pub mod oracles;
