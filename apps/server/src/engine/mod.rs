//! Availability and slot-allocation engine.
//!
//! Pure and synchronous: callers read settings, schedules and bookings per
//! request and pass them in as values. Nothing in here touches the database,
//! the clock or any cross-request state, so concurrent availability queries
//! cannot interfere with each other.

mod conflict;
mod error;
mod schedule;
mod slots;
mod timerange;

pub use conflict::{BookingSpan, ConflictIndex};
pub use error::EngineError;
pub use schedule::{
    resolve_window, DayHoursConfig, DayOverride, DayWindow, StylistSchedule, StylistWeek,
    WeekHours, WeekHoursConfig,
};
pub use slots::{generate, SlotRequest, StylistQuery, TimeSlot};
pub use timerange::{
    clamp_to_day, format_hhmm, merge_windows, overlaps, parse_hhmm, Minutes, MINUTES_PER_DAY,
};
