use chrono::NaiveDate;
use serde::Serialize;

use super::conflict::{BookingSpan, ConflictIndex};
use super::schedule::{resolve_window, DayWindow, StylistSchedule, WeekHours};
use super::timerange::{format_hhmm, merge_windows, Minutes};

/// One grid entry in an availability response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    /// Slot start, `"HH:MM"`.
    pub time: String,
    pub available: bool,
    /// How many stylists could take this slot. 0/1 for a specific stylist.
    pub spots: u32,
}

/// Which stylists an availability query is about.
#[derive(Debug, Clone)]
pub enum StylistQuery {
    /// A named stylist: the grid covers their window, `spots` is 0 or 1.
    Specific(StylistSchedule),
    /// "Any available": the grid covers the union of the candidates'
    /// windows, `spots` counts how many of them could take each slot.
    Any(Vec<StylistSchedule>),
}

/// Everything needed to compute one date's slot grid. Assembled by the
/// caller from per-request reads; the generator itself touches no clock,
/// no database and no shared state.
#[derive(Debug, Clone)]
pub struct SlotRequest {
    pub date: NaiveDate,
    pub duration_min: Minutes,
    /// Grid granularity; slots start every `step_min` from the window start.
    pub step_min: Minutes,
    pub salon: WeekHours,
    pub stylist: StylistQuery,
    /// Non-cancelled bookings for `date`.
    pub bookings: Vec<BookingSpan>,
    /// Booking to ignore when rechecking a reschedule target.
    pub exclude_booking_id: Option<i64>,
    /// Salon-local "now", set only when `date` is today. Slots starting at
    /// or before it are emitted but not bookable.
    pub now_min: Option<Minutes>,
}

/// Generate the slot grid for one date.
///
/// Deterministic: the same request always yields the same grid, so repeated
/// polling cannot disagree with itself.
pub fn generate(req: &SlotRequest) -> Vec<TimeSlot> {
    if req.duration_min == 0 || req.step_min == 0 {
        return Vec::new();
    }

    let candidates: Vec<&StylistSchedule> = match &req.stylist {
        StylistQuery::Specific(one) => vec![one],
        StylistQuery::Any(many) => many.iter().collect(),
    };

    let mut resolved: Vec<(i64, DayWindow)> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if let Some(window) = resolve_window(&req.salon, Some(candidate), req.date) {
            resolved.push((candidate.stylist_id, window));
        }
    }
    if resolved.is_empty() {
        return Vec::new();
    }

    let index = ConflictIndex::new(req.bookings.clone(), req.exclude_booking_id);
    let grid = merge_windows(resolved.iter().map(|(_, w)| (w.start, w.end)).collect());

    let mut slots = Vec::new();
    for (grid_start, grid_end) in grid {
        let mut start = grid_start;
        while start + req.duration_min <= grid_end {
            let end = start + req.duration_min;
            let spots = resolved
                .iter()
                .filter(|(stylist_id, window)| {
                    window.contains_span(start, end) && index.is_free(*stylist_id, start, end)
                })
                .count() as u32;
            let started_already = req.now_min.is_some_and(|now| start <= now);
            if started_already {
                slots.push(TimeSlot {
                    time: format_hhmm(start),
                    available: false,
                    spots: 0,
                });
            } else {
                slots.push(TimeSlot {
                    time: format_hhmm(start),
                    available: spots > 0,
                    spots,
                });
            }
            start += req.step_min;
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::schedule::{DayHoursConfig, StylistWeek, WeekHoursConfig};

    fn open_day(start: &str, end: &str) -> Option<DayHoursConfig> {
        Some(DayHoursConfig {
            start: start.to_string(),
            end: end.to_string(),
            is_open: true,
        })
    }

    /// Salon open Monday–Saturday with the given hours, Sunday closed.
    fn salon(start: &str, end: &str) -> WeekHours {
        WeekHours::from_config(&WeekHoursConfig {
            monday: open_day(start, end),
            tuesday: open_day(start, end),
            wednesday: open_day(start, end),
            thursday: open_day(start, end),
            friday: open_day(start, end),
            saturday: open_day(start, end),
            sunday: None,
        })
    }

    fn stylist(id: i64) -> StylistSchedule {
        StylistSchedule {
            stylist_id: id,
            week: None,
            leaves: vec![],
        }
    }

    fn booking(id: i64, stylist_id: i64, start: Minutes, end: Minutes) -> BookingSpan {
        BookingSpan {
            id,
            stylist_id: Some(stylist_id),
            start,
            end,
        }
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    /// A Monday request with sensible defaults; tests override fields.
    fn monday_request(salon_hours: WeekHours, query: StylistQuery) -> SlotRequest {
        SlotRequest {
            date: d("2024-06-03"),
            duration_min: 60,
            step_min: 30,
            salon: salon_hours,
            stylist: query,
            bookings: vec![],
            exclude_booking_id: None,
            now_min: None,
        }
    }

    fn slot<'a>(slots: &'a [TimeSlot], time: &str) -> &'a TimeSlot {
        slots
            .iter()
            .find(|s| s.time == time)
            .unwrap_or_else(|| panic!("no slot at {time}"))
    }

    // ── grid shape ──

    #[test]
    fn test_closed_day_yields_no_slots() {
        // 2024-06-02 is a Sunday; the salon map has no entry for it.
        let mut req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(stylist(1)));
        req.date = d("2024-06-02");
        assert!(generate(&req).is_empty());
    }

    #[test]
    fn test_last_slot_fits_duration_exactly() {
        let req = monday_request(salon("09:00", "22:00"), StylistQuery::Specific(stylist(1)));
        let slots = generate(&req);
        // 60-minute service in 09:00–22:00: first slot 09:00, last 21:00.
        assert_eq!(slots.first().map(|s| s.time.as_str()), Some("09:00"));
        assert_eq!(slots.last().map(|s| s.time.as_str()), Some("21:00"));
        assert_eq!(slots.len(), 25);
    }

    #[test]
    fn test_grid_anchors_at_window_start() {
        let req = monday_request(salon("09:15", "12:00"), StylistQuery::Specific(stylist(1)));
        let slots = generate(&req);
        let times: Vec<&str> = slots.iter().map(|s| s.time.as_str()).collect();
        assert_eq!(times, vec!["09:15", "09:45", "10:15", "10:45"]);
    }

    #[test]
    fn test_duration_longer_than_window() {
        let mut req = monday_request(salon("09:00", "10:00"), StylistQuery::Specific(stylist(1)));
        req.duration_min = 120;
        assert!(generate(&req).is_empty());
    }

    #[test]
    fn test_degenerate_step_or_duration() {
        let mut req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(stylist(1)));
        req.step_min = 0;
        assert!(generate(&req).is_empty());
        let mut req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(stylist(1)));
        req.duration_min = 0;
        assert!(generate(&req).is_empty());
    }

    // ── conflicts ──

    #[test]
    fn test_booked_hour_blocks_only_overlapping_slots() {
        // Salon open Monday 09:00–22:00, one booking 14:00–15:00.
        let mut req = monday_request(salon("09:00", "22:00"), StylistQuery::Specific(stylist(1)));
        req.bookings = vec![booking(10, 1, 840, 900)];
        let slots = generate(&req);
        assert!(!slot(&slots, "14:00").available);
        assert!(!slot(&slots, "13:30").available);
        assert!(!slot(&slots, "14:30").available);
        assert!(slot(&slots, "13:00").available);
        assert!(slot(&slots, "15:00").available);
    }

    #[test]
    fn test_half_open_boundary_frees_adjacent_slot() {
        // Booking [10:00, 11:00): 11:00 is free, 10:30 is blocked.
        let mut req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(stylist(1)));
        req.bookings = vec![booking(10, 1, 600, 660)];
        let slots = generate(&req);
        assert!(slot(&slots, "11:00").available);
        assert!(!slot(&slots, "10:30").available);
        assert!(slot(&slots, "09:00").available);
    }

    #[test]
    fn test_other_stylists_booking_does_not_block() {
        let mut req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(stylist(1)));
        req.bookings = vec![booking(10, 2, 600, 660)];
        let slots = generate(&req);
        assert!(slot(&slots, "10:00").available);
    }

    #[test]
    fn test_exclude_booking_frees_its_own_slot() {
        let mut req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(stylist(1)));
        req.bookings = vec![booking(10, 1, 600, 660)];
        req.exclude_booking_id = Some(10);
        let slots = generate(&req);
        // Rescheduling booking 10: its current slot reads as available.
        assert!(slot(&slots, "10:00").available);
    }

    // ── leave ──

    #[test]
    fn test_stylist_on_leave_has_no_slots() {
        let mut on_leave = stylist(1);
        on_leave.leaves.push((d("2024-06-03"), d("2024-06-05")));
        let req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(on_leave));
        assert!(generate(&req).is_empty());
    }

    #[test]
    fn test_any_mode_uses_the_stylist_not_on_leave() {
        let mut away = stylist(1);
        away.leaves.push((d("2024-06-03"), d("2024-06-03")));
        let req = monday_request(
            salon("09:00", "19:00"),
            StylistQuery::Any(vec![away, stylist(2)]),
        );
        let slots = generate(&req);
        let first = slot(&slots, "09:00");
        assert!(first.available);
        assert_eq!(first.spots, 1);
    }

    // ── any-mode capacity ──

    #[test]
    fn test_spots_counts_free_stylists() {
        let mut req = monday_request(
            salon("09:00", "19:00"),
            StylistQuery::Any(vec![stylist(1), stylist(2)]),
        );
        req.bookings = vec![booking(10, 1, 600, 660)];
        let slots = generate(&req);
        assert_eq!(slot(&slots, "09:00").spots, 2);
        // 10:00 only stylist 2 is free.
        let ten = slot(&slots, "10:00");
        assert!(ten.available);
        assert_eq!(ten.spots, 1);
        // 09:30 overlaps the booking for stylist 1 as well.
        assert_eq!(slot(&slots, "09:30").spots, 1);
    }

    #[test]
    fn test_slot_unavailable_when_every_stylist_is_booked() {
        let mut req = monday_request(
            salon("09:00", "19:00"),
            StylistQuery::Any(vec![stylist(1), stylist(2)]),
        );
        req.bookings = vec![booking(10, 1, 600, 660), booking(11, 2, 600, 660)];
        let slots = generate(&req);
        let ten = slot(&slots, "10:00");
        assert!(!ten.available);
        assert_eq!(ten.spots, 0);
    }

    #[test]
    fn test_any_mode_unions_personal_windows() {
        // Stylist 1 works 09:00–13:00, stylist 2 works 12:00–18:00.
        let early = StylistSchedule {
            stylist_id: 1,
            week: Some(StylistWeek::from_config(&WeekHoursConfig {
                monday: open_day("09:00", "13:00"),
                ..Default::default()
            })),
            leaves: vec![],
        };
        let late = StylistSchedule {
            stylist_id: 2,
            week: Some(StylistWeek::from_config(&WeekHoursConfig {
                monday: open_day("12:00", "18:00"),
                ..Default::default()
            })),
            leaves: vec![],
        };
        let req = monday_request(salon("09:00", "19:00"), StylistQuery::Any(vec![early, late]));
        let slots = generate(&req);
        // Grid spans the union 09:00–18:00.
        assert_eq!(slots.first().map(|s| s.time.as_str()), Some("09:00"));
        assert_eq!(slots.last().map(|s| s.time.as_str()), Some("17:00"));
        // 09:00 only the early stylist fits; 12:00 both do.
        assert_eq!(slot(&slots, "09:00").spots, 1);
        assert_eq!(slot(&slots, "12:00").spots, 2);
        // 12:30 + 60min runs past the early stylist's 13:00 close.
        assert_eq!(slot(&slots, "12:30").spots, 1);
    }

    #[test]
    fn test_any_mode_with_no_candidates() {
        let req = monday_request(salon("09:00", "19:00"), StylistQuery::Any(vec![]));
        assert!(generate(&req).is_empty());
    }

    // ── same-day cutoff ──

    #[test]
    fn test_past_slots_today_are_not_bookable() {
        let mut req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(stylist(1)));
        req.now_min = Some(850); // 14:10
        let slots = generate(&req);
        let two_pm = slot(&slots, "14:00");
        assert!(!two_pm.available);
        assert_eq!(two_pm.spots, 0);
        assert!(!slot(&slots, "09:00").available);
        assert!(slot(&slots, "14:30").available);
    }

    #[test]
    fn test_slot_starting_exactly_now_is_not_bookable() {
        let mut req = monday_request(salon("09:00", "19:00"), StylistQuery::Specific(stylist(1)));
        req.now_min = Some(870); // 14:30 sharp
        let slots = generate(&req);
        assert!(!slot(&slots, "14:30").available);
        assert!(slot(&slots, "15:00").available);
    }

    // ── determinism ──

    #[test]
    fn test_generate_is_idempotent() {
        let mut req = monday_request(
            salon("09:00", "19:00"),
            StylistQuery::Any(vec![stylist(1), stylist(2)]),
        );
        req.bookings = vec![booking(10, 1, 600, 660)];
        assert_eq!(generate(&req), generate(&req));
    }
}
