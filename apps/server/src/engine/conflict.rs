use super::timerange::{overlaps, Minutes};

/// One non-cancelled booking's occupied interval on a single date.
/// Cancelled bookings must be filtered out before building the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSpan {
    pub id: i64,
    /// `None` for "no preference" bookings that were never assigned. Those
    /// reserve no specific stylist's time and never collide here.
    pub stylist_id: Option<i64>,
    pub start: Minutes,
    pub end: Minutes,
}

/// In-memory conflict index over one date's bookings.
///
/// Rebuilt per request from freshly-read rows; never cached across requests.
#[derive(Debug, Default)]
pub struct ConflictIndex {
    spans: Vec<BookingSpan>,
}

impl ConflictIndex {
    /// Build the index, dropping `exclude_booking_id` so a reschedule check
    /// does not collide with the booking being moved.
    pub fn new(mut spans: Vec<BookingSpan>, exclude_booking_id: Option<i64>) -> Self {
        if let Some(excluded) = exclude_booking_id {
            spans.retain(|span| span.id != excluded);
        }
        ConflictIndex { spans }
    }

    /// Whether the stylist is free for the whole half-open `[start, end)`.
    pub fn is_free(&self, stylist_id: i64, start: Minutes, end: Minutes) -> bool {
        !self.spans.iter().any(|span| {
            span.stylist_id == Some(stylist_id) && overlaps(span.start, span.end, start, end)
        })
    }

    /// All indexed bookings overlapping `[start, end)`, any stylist.
    /// Write-path diagnostics use this to name the colliding booking.
    pub fn overlapping(&self, start: Minutes, end: Minutes) -> impl Iterator<Item = &BookingSpan> {
        self.spans
            .iter()
            .filter(move |span| overlaps(span.start, span.end, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: i64, stylist_id: Option<i64>, start: Minutes, end: Minutes) -> BookingSpan {
        BookingSpan {
            id,
            stylist_id,
            start,
            end,
        }
    }

    #[test]
    fn test_overlapping_booking_blocks_stylist() {
        let index = ConflictIndex::new(vec![span(1, Some(7), 600, 660)], None);
        assert!(!index.is_free(7, 630, 690));
        assert!(!index.is_free(7, 570, 630));
        assert!(!index.is_free(7, 600, 660));
    }

    #[test]
    fn test_back_to_back_is_free() {
        // Booking [10:00, 11:00): the 11:00 slot is free, 09:00–10:00 too.
        let index = ConflictIndex::new(vec![span(1, Some(7), 600, 660)], None);
        assert!(index.is_free(7, 660, 720));
        assert!(index.is_free(7, 540, 600));
    }

    #[test]
    fn test_other_stylists_unaffected() {
        let index = ConflictIndex::new(vec![span(1, Some(7), 600, 660)], None);
        assert!(index.is_free(8, 600, 660));
    }

    #[test]
    fn test_unassigned_booking_blocks_nobody() {
        let index = ConflictIndex::new(vec![span(1, None, 600, 660)], None);
        assert!(index.is_free(7, 600, 660));
        assert!(index.is_free(8, 600, 660));
    }

    #[test]
    fn test_exclusion_removes_own_booking() {
        let spans = vec![span(1, Some(7), 600, 660), span(2, Some(7), 720, 780)];
        let index = ConflictIndex::new(spans, Some(1));
        // Booking 1's old slot no longer blocks its own reschedule...
        assert!(index.is_free(7, 600, 660));
        // ...but booking 2 still does.
        assert!(!index.is_free(7, 720, 780));
    }

    #[test]
    fn test_overlapping_iterates_all_stylists() {
        let spans = vec![
            span(1, Some(7), 600, 660),
            span(2, Some(8), 630, 690),
            span(3, Some(9), 720, 780),
        ];
        let index = ConflictIndex::new(spans, None);
        let hits: Vec<i64> = index.overlapping(610, 640).map(|s| s.id).collect();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn test_empty_index_is_always_free() {
        let index = ConflictIndex::new(vec![], None);
        assert!(index.is_free(7, 0, 1440));
    }
}
