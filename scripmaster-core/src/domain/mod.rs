//! Domain types shared by every stage.

pub mod instrument;

pub use instrument::{normalize_symbol, CommonInstrument, InstrumentColumn, NormalizedInstrument};
