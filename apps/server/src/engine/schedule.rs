use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::timerange::{clamp_to_day, parse_hhmm, Minutes};

const WEEKDAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

// ── Stored JSON shape ──

/// One weekday entry as stored in `business_hours` / `working_hours` JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayHoursConfig {
    pub start: String,
    pub end: String,
    pub is_open: bool,
}

/// Weekday → hours map as stored in the database. A missing weekday means
/// "closed" for the salon and "inherit salon hours" for a stylist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekHoursConfig {
    pub monday: Option<DayHoursConfig>,
    pub tuesday: Option<DayHoursConfig>,
    pub wednesday: Option<DayHoursConfig>,
    pub thursday: Option<DayHoursConfig>,
    pub friday: Option<DayHoursConfig>,
    pub saturday: Option<DayHoursConfig>,
    pub sunday: Option<DayHoursConfig>,
}

impl WeekHoursConfig {
    fn day(&self, idx: usize) -> Option<&DayHoursConfig> {
        match idx {
            0 => self.monday.as_ref(),
            1 => self.tuesday.as_ref(),
            2 => self.wednesday.as_ref(),
            3 => self.thursday.as_ref(),
            4 => self.friday.as_ref(),
            5 => self.saturday.as_ref(),
            _ => self.sunday.as_ref(),
        }
    }

    /// True when no day is configured at all.
    pub fn is_empty(&self) -> bool {
        (0..7).all(|idx| self.day(idx).is_none())
    }

    /// Check that every open day carries a well-formed `start < end` window.
    /// Used by admin writes so malformed hours never enter the database;
    /// reads still demote bad entries instead of failing (see `from_config`).
    pub fn validate(&self) -> Result<(), EngineError> {
        for idx in 0..7 {
            if let Some(day) = self.day(idx) {
                if day.is_open {
                    window_from_config(day)?;
                }
            }
        }
        Ok(())
    }
}

fn window_from_config(day: &DayHoursConfig) -> Result<DayWindow, EngineError> {
    let start = parse_hhmm(&day.start)?;
    let end = parse_hhmm(&day.end)?;
    let (start, end) = clamp_to_day(start, end)?;
    Ok(DayWindow { start, end })
}

// ── Resolved schedules ──

/// Open wall-clock interval for one day, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: Minutes,
    pub end: Minutes,
}

impl DayWindow {
    /// Whether `[start, end)` fits entirely inside this window.
    pub fn contains_span(&self, start: Minutes, end: Minutes) -> bool {
        self.start <= start && end <= self.end
    }
}

/// Salon-wide weekly hours, resolved. `None` = closed that weekday.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekHours {
    days: [Option<DayWindow>; 7],
}

impl WeekHours {
    /// Resolve stored salon hours. Malformed or inverted entries do not fail
    /// the request: the day is demoted to closed and a warning is logged.
    pub fn from_config(cfg: &WeekHoursConfig) -> WeekHours {
        let mut days = [None; 7];
        for (idx, name) in WEEKDAY_NAMES.iter().enumerate() {
            let Some(day) = cfg.day(idx) else { continue };
            if !day.is_open {
                continue;
            }
            match window_from_config(day) {
                Ok(window) => days[idx] = Some(window),
                Err(e) => {
                    tracing::warn!("invalid salon hours for {}: {}; treating day as closed", name, e);
                }
            }
        }
        WeekHours { days }
    }

    pub fn day(&self, weekday: Weekday) -> Option<DayWindow> {
        self.days[weekday.num_days_from_monday() as usize]
    }
}

/// Per-weekday stylist override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOverride {
    /// No entry for this weekday: the stylist follows salon hours.
    Inherit,
    /// Explicitly not working this weekday, even if the salon is open.
    Closed,
    /// Explicit personal window. Stands alone: it is not intersected with
    /// salon hours, so a stylist may work a day the salon is otherwise closed.
    Open(DayWindow),
}

/// A stylist's weekly overrides, resolved from `working_hours` JSON.
#[derive(Debug, Clone, Copy)]
pub struct StylistWeek {
    days: [DayOverride; 7],
}

impl StylistWeek {
    /// Resolve stored stylist hours. A present-but-invalid entry closes the
    /// day (with a warning) rather than silently falling back to salon hours.
    pub fn from_config(cfg: &WeekHoursConfig) -> StylistWeek {
        let mut days = [DayOverride::Inherit; 7];
        for (idx, name) in WEEKDAY_NAMES.iter().enumerate() {
            let Some(day) = cfg.day(idx) else { continue };
            if !day.is_open {
                days[idx] = DayOverride::Closed;
                continue;
            }
            match window_from_config(day) {
                Ok(window) => days[idx] = DayOverride::Open(window),
                Err(e) => {
                    tracing::warn!("invalid stylist hours for {}: {}; treating day as closed", name, e);
                    days[idx] = DayOverride::Closed;
                }
            }
        }
        StylistWeek { days }
    }

    pub fn day(&self, weekday: Weekday) -> DayOverride {
        self.days[weekday.num_days_from_monday() as usize]
    }
}

/// Everything the engine needs to know about one stylist's calendar.
#[derive(Debug, Clone)]
pub struct StylistSchedule {
    pub stylist_id: i64,
    /// `None` when the stylist has no personal `working_hours` at all.
    pub week: Option<StylistWeek>,
    /// Approved leave as inclusive date ranges.
    pub leaves: Vec<(NaiveDate, NaiveDate)>,
}

impl StylistSchedule {
    pub fn on_leave(&self, date: NaiveDate) -> bool {
        self.leaves.iter().any(|(from, to)| *from <= date && date <= *to)
    }
}

/// Resolve the bookable window for one date.
///
/// Precedence: leave blocks the whole day unconditionally; otherwise a
/// stylist weekday override (open or closed) wins; otherwise salon hours
/// for that weekday apply. With no stylist given, salon hours are the answer.
pub fn resolve_window(
    salon: &WeekHours,
    stylist: Option<&StylistSchedule>,
    date: NaiveDate,
) -> Option<DayWindow> {
    let weekday = date.weekday();
    let Some(schedule) = stylist else {
        return salon.day(weekday);
    };
    if schedule.on_leave(date) {
        return None;
    }
    match schedule.week.as_ref().map(|week| week.day(weekday)) {
        Some(DayOverride::Open(window)) => Some(window),
        Some(DayOverride::Closed) => None,
        Some(DayOverride::Inherit) | None => salon.day(weekday),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_day(start: &str, end: &str) -> Option<DayHoursConfig> {
        Some(DayHoursConfig {
            start: start.to_string(),
            end: end.to_string(),
            is_open: true,
        })
    }

    fn closed_day() -> Option<DayHoursConfig> {
        Some(DayHoursConfig {
            start: "00:00".to_string(),
            end: "00:00".to_string(),
            is_open: false,
        })
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    /// Mon–Sat 09:00–19:00, Sunday closed.
    fn salon() -> WeekHours {
        WeekHours::from_config(&WeekHoursConfig {
            monday: open_day("09:00", "19:00"),
            tuesday: open_day("09:00", "19:00"),
            wednesday: open_day("09:00", "19:00"),
            thursday: open_day("09:00", "19:00"),
            friday: open_day("09:00", "19:00"),
            saturday: open_day("09:00", "19:00"),
            sunday: None,
        })
    }

    fn no_overrides(stylist_id: i64) -> StylistSchedule {
        StylistSchedule {
            stylist_id,
            week: None,
            leaves: vec![],
        }
    }

    // ── salon hours parsing ──

    #[test]
    fn test_missing_weekday_is_closed() {
        // 2024-06-02 is a Sunday.
        assert_eq!(resolve_window(&salon(), None, d("2024-06-02")), None);
    }

    #[test]
    fn test_open_weekday_resolves() {
        // 2024-06-03 is a Monday.
        assert_eq!(
            resolve_window(&salon(), None, d("2024-06-03")),
            Some(DayWindow { start: 540, end: 1140 })
        );
    }

    #[test]
    fn test_is_open_false_means_closed() {
        let hours = WeekHours::from_config(&WeekHoursConfig {
            monday: closed_day(),
            ..Default::default()
        });
        assert_eq!(hours.day(Weekday::Mon), None);
    }

    #[test]
    fn test_inverted_salon_hours_demoted_to_closed() {
        let hours = WeekHours::from_config(&WeekHoursConfig {
            monday: open_day("19:00", "09:00"),
            tuesday: open_day("09:00", "19:00"),
            ..Default::default()
        });
        assert_eq!(hours.day(Weekday::Mon), None);
        assert!(hours.day(Weekday::Tue).is_some());
    }

    #[test]
    fn test_malformed_salon_hours_demoted_to_closed() {
        let hours = WeekHours::from_config(&WeekHoursConfig {
            monday: open_day("9am", "19:00"),
            ..Default::default()
        });
        assert_eq!(hours.day(Weekday::Mon), None);
    }

    #[test]
    fn test_validate_flags_bad_open_day() {
        let cfg = WeekHoursConfig {
            monday: open_day("19:00", "09:00"),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        // Closed days are not required to carry sensible times.
        let cfg = WeekHoursConfig {
            monday: Some(DayHoursConfig {
                start: "whenever".to_string(),
                end: "".to_string(),
                is_open: false,
            }),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    // ── precedence: stylist override vs salon ──

    #[test]
    fn test_stylist_without_overrides_inherits_salon() {
        let stylist = no_overrides(1);
        assert_eq!(
            resolve_window(&salon(), Some(&stylist), d("2024-06-03")),
            Some(DayWindow { start: 540, end: 1140 })
        );
    }

    #[test]
    fn test_stylist_override_replaces_salon_hours() {
        let week = StylistWeek::from_config(&WeekHoursConfig {
            monday: open_day("12:00", "21:00"),
            ..Default::default()
        });
        let stylist = StylistSchedule {
            stylist_id: 1,
            week: Some(week),
            leaves: vec![],
        };
        // Monday: personal window stands alone, later than salon close.
        assert_eq!(
            resolve_window(&salon(), Some(&stylist), d("2024-06-03")),
            Some(DayWindow { start: 720, end: 1260 })
        );
        // Tuesday has no override: salon hours apply.
        assert_eq!(
            resolve_window(&salon(), Some(&stylist), d("2024-06-04")),
            Some(DayWindow { start: 540, end: 1140 })
        );
    }

    #[test]
    fn test_stylist_override_opens_salon_closed_day() {
        let week = StylistWeek::from_config(&WeekHoursConfig {
            sunday: open_day("10:00", "16:00"),
            ..Default::default()
        });
        let stylist = StylistSchedule {
            stylist_id: 1,
            week: Some(week),
            leaves: vec![],
        };
        assert_eq!(
            resolve_window(&salon(), Some(&stylist), d("2024-06-02")),
            Some(DayWindow { start: 600, end: 960 })
        );
    }

    #[test]
    fn test_stylist_closed_override_closes_open_day() {
        let week = StylistWeek::from_config(&WeekHoursConfig {
            monday: closed_day(),
            ..Default::default()
        });
        let stylist = StylistSchedule {
            stylist_id: 1,
            week: Some(week),
            leaves: vec![],
        };
        assert_eq!(resolve_window(&salon(), Some(&stylist), d("2024-06-03")), None);
    }

    #[test]
    fn test_invalid_stylist_override_closes_day() {
        let week = StylistWeek::from_config(&WeekHoursConfig {
            monday: open_day("18:00", "09:00"),
            ..Default::default()
        });
        let stylist = StylistSchedule {
            stylist_id: 1,
            week: Some(week),
            leaves: vec![],
        };
        // Bad personal hours close the day rather than fall back to salon.
        assert_eq!(resolve_window(&salon(), Some(&stylist), d("2024-06-03")), None);
    }

    // ── precedence: leave beats everything ──

    #[test]
    fn test_leave_blocks_salon_hours() {
        let mut stylist = no_overrides(1);
        stylist.leaves.push((d("2024-06-03"), d("2024-06-05")));
        assert_eq!(resolve_window(&salon(), Some(&stylist), d("2024-06-04")), None);
    }

    #[test]
    fn test_leave_blocks_personal_override() {
        let week = StylistWeek::from_config(&WeekHoursConfig {
            monday: open_day("08:00", "22:00"),
            ..Default::default()
        });
        let stylist = StylistSchedule {
            stylist_id: 1,
            week: Some(week),
            leaves: vec![(d("2024-06-03"), d("2024-06-03"))],
        };
        assert_eq!(resolve_window(&salon(), Some(&stylist), d("2024-06-03")), None);
    }

    #[test]
    fn test_leave_range_is_inclusive_on_both_ends() {
        let mut stylist = no_overrides(1);
        stylist.leaves.push((d("2024-06-04"), d("2024-06-06")));
        assert_eq!(resolve_window(&salon(), Some(&stylist), d("2024-06-04")), None);
        assert_eq!(resolve_window(&salon(), Some(&stylist), d("2024-06-06")), None);
        // The day after leave ends is bookable again.
        assert!(resolve_window(&salon(), Some(&stylist), d("2024-06-07")).is_some());
    }

    #[test]
    fn test_single_day_leave() {
        let mut stylist = no_overrides(1);
        stylist.leaves.push((d("2024-06-03"), d("2024-06-03")));
        assert_eq!(resolve_window(&salon(), Some(&stylist), d("2024-06-03")), None);
        assert!(resolve_window(&salon(), Some(&stylist), d("2024-06-04")).is_some());
    }
}
