use super::error::EngineError;

/// Minutes since midnight. Valid wall-clock values are `0..MINUTES_PER_DAY`.
pub type Minutes = u16;

/// Exclusive upper bound for a time-of-day in minutes (24:00).
pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Parse a strict zero-padded 24-hour `"HH:MM"` string into minutes since
/// midnight. Anything else — wrong length, missing colon, hour 24+ — is an
/// `InvalidTimeFormat` error.
pub fn parse_hhmm(input: &str) -> Result<Minutes, EngineError> {
    let b = input.as_bytes();
    let shaped = b.len() == 5
        && b[0].is_ascii_digit()
        && b[1].is_ascii_digit()
        && b[2] == b':'
        && b[3].is_ascii_digit()
        && b[4].is_ascii_digit();
    if !shaped {
        return Err(EngineError::InvalidTimeFormat {
            input: input.to_string(),
        });
    }
    let hours = (b[0] - b'0') as Minutes * 10 + (b[1] - b'0') as Minutes;
    let minutes = (b[3] - b'0') as Minutes * 10 + (b[4] - b'0') as Minutes;
    if hours > 23 || minutes > 59 {
        return Err(EngineError::InvalidTimeFormat {
            input: input.to_string(),
        });
    }
    Ok(hours * 60 + minutes)
}

/// Format minutes since midnight as zero-padded `"HH:MM"`.
pub fn format_hhmm(minutes: Minutes) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`
/// share at least one minute. Back-to-back appointments (one ends exactly
/// where the other starts) do not overlap.
pub fn overlaps(a_start: Minutes, a_end: Minutes, b_start: Minutes, b_end: Minutes) -> bool {
    a_start < b_end && b_start < a_end
}

/// Clamp an interval to day bounds `[0, 1440)`. Errors when nothing remains,
/// i.e. `end <= start` after clamping — intervals never cross midnight here.
pub fn clamp_to_day(start: Minutes, end: Minutes) -> Result<(Minutes, Minutes), EngineError> {
    let end = end.min(MINUTES_PER_DAY);
    let start = start.min(MINUTES_PER_DAY);
    if start >= end {
        return Err(EngineError::InvalidRange { start, end });
    }
    Ok((start, end))
}

/// Merge overlapping or touching windows into a minimal sorted set.
/// Used when the open hours of several stylists are unioned into one grid.
pub fn merge_windows(mut windows: Vec<(Minutes, Minutes)>) -> Vec<(Minutes, Minutes)> {
    if windows.is_empty() {
        return windows;
    }
    windows.sort_unstable();
    let mut merged: Vec<(Minutes, Minutes)> = Vec::with_capacity(windows.len());
    for (start, end) in windows {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_hhmm / format_hhmm ──

    #[test]
    fn test_parse_valid_times() {
        assert_eq!(parse_hhmm("00:00"), Ok(0));
        assert_eq!(parse_hhmm("09:00"), Ok(540));
        assert_eq!(parse_hhmm("14:30"), Ok(870));
        assert_eq!(parse_hhmm("23:59"), Ok(1439));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["9:00", "09:0", "0900", "09-00", "24:00", "12:60", "", "ab:cd", "09:00 "] {
            assert!(parse_hhmm(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_format_round_trip() {
        assert_eq!(format_hhmm(0), "00:00");
        assert_eq!(format_hhmm(570), "09:30");
        assert_eq!(format_hhmm(1439), "23:59");
        assert_eq!(parse_hhmm(&format_hhmm(870)), Ok(870));
    }

    // ── overlaps ──

    #[test]
    fn test_overlap_partial() {
        assert!(overlaps(600, 660, 630, 690));
        assert!(overlaps(630, 690, 600, 660));
    }

    #[test]
    fn test_overlap_containment() {
        assert!(overlaps(600, 720, 630, 660));
        assert!(overlaps(630, 660, 600, 720));
    }

    #[test]
    fn test_overlap_half_open_boundary() {
        // [10:00, 11:00) then [11:00, 12:00) — touching, not overlapping.
        assert!(!overlaps(600, 660, 660, 720));
        assert!(!overlaps(660, 720, 600, 660));
        // [10:30, 11:30) does overlap [10:00, 11:00).
        assert!(overlaps(630, 690, 600, 660));
    }

    #[test]
    fn test_overlap_disjoint() {
        assert!(!overlaps(540, 600, 720, 780));
    }

    // ── clamp_to_day ──

    #[test]
    fn test_clamp_passes_valid_range() {
        assert_eq!(clamp_to_day(540, 1140), Ok((540, 1140)));
    }

    #[test]
    fn test_clamp_trims_past_midnight() {
        assert_eq!(clamp_to_day(1380, 1500), Ok((1380, 1440)));
    }

    #[test]
    fn test_clamp_rejects_inverted() {
        assert!(clamp_to_day(600, 600).is_err());
        assert!(clamp_to_day(700, 600).is_err());
    }

    #[test]
    fn test_clamp_rejects_fully_out_of_day() {
        assert!(clamp_to_day(1440, 1500).is_err());
    }

    // ── merge_windows ──

    #[test]
    fn test_merge_empty() {
        assert!(merge_windows(vec![]).is_empty());
    }

    #[test]
    fn test_merge_disjoint_stay_separate() {
        assert_eq!(
            merge_windows(vec![(540, 600), (720, 780)]),
            vec![(540, 600), (720, 780)]
        );
    }

    #[test]
    fn test_merge_overlapping_combine() {
        assert_eq!(merge_windows(vec![(540, 660), (600, 720)]), vec![(540, 720)]);
    }

    #[test]
    fn test_merge_touching_combine() {
        assert_eq!(merge_windows(vec![(540, 600), (600, 660)]), vec![(540, 660)]);
    }

    #[test]
    fn test_merge_unsorted_input() {
        assert_eq!(
            merge_windows(vec![(720, 780), (540, 600), (560, 640)]),
            vec![(540, 640), (720, 780)]
        );
    }

    #[test]
    fn test_merge_contained_window() {
        assert_eq!(merge_windows(vec![(540, 720), (600, 660)]), vec![(540, 720)]);
    }
}
