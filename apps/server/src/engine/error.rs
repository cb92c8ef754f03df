use thiserror::Error;

/// Failures surfaced by the scheduling engine.
///
/// Only caller input (time strings) and genuinely inverted ranges produce
/// errors. Recoverable data problems — a closed day, a stylist fully on
/// leave, an unknown stylist — are normal empty results, not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Input was not a zero-padded 24-hour `HH:MM` string.
    #[error("invalid time {input:?}: expected HH:MM")]
    InvalidTimeFormat { input: String },

    /// Interval with `end <= start` (after clamping to day bounds).
    #[error("invalid time range: {start}..{end}")]
    InvalidRange { start: u16, end: u16 },
}
