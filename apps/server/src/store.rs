use chrono::NaiveDate;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::engine::{
    self, format_hhmm, resolve_window, BookingSpan, ConflictIndex, Minutes, StylistSchedule,
    StylistWeek, WeekHours, WeekHoursConfig,
};
use crate::models::{Booking, LeavePeriod, SettingsRow, Stylist};

/// Duration assumed when a style/category pair has no pricing row.
pub const DEFAULT_DURATION_MIN: Minutes = 60;

const BOOKING_COLUMNS: &str =
    "id, stylist_id, style_id, category_id, client_name, client_phone,
     date, start_time, end_time, duration_min, status, created_at, cancelled_at";

// ── Settings ──

/// Salon settings with the hours JSON parsed. Fetched fresh per request;
/// admin edits are visible to the next availability query.
#[derive(Debug, Clone)]
pub struct SalonSettings {
    pub hours: WeekHoursConfig,
    pub slot_step_min: Minutes,
    pub tz_offset_min: i32,
}

pub async fn settings(pool: &SqlitePool) -> sqlx::Result<SalonSettings> {
    let row = sqlx::query_as::<_, SettingsRow>(
        "SELECT id, business_hours, slot_step_min, tz_offset_min, updated_at
         FROM salon_settings WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;

    let hours = match serde_json::from_str::<WeekHoursConfig>(&row.business_hours) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("business_hours JSON is corrupt: {}; treating all days as closed", e);
            WeekHoursConfig::default()
        }
    };
    let slot_step_min = if (5..=240).contains(&row.slot_step_min) {
        row.slot_step_min as Minutes
    } else {
        tracing::warn!("slot_step_min {} out of range; using 30", row.slot_step_min);
        30
    };
    let tz_offset_min = if (-840..=840).contains(&row.tz_offset_min) {
        row.tz_offset_min as i32
    } else {
        tracing::warn!("tz_offset_min {} out of range; using UTC", row.tz_offset_min);
        0
    };
    Ok(SalonSettings {
        hours,
        slot_step_min,
        tz_offset_min,
    })
}

// ── Stylists & schedules ──

/// Active stylists, narrowed to those capable of a style when one is given.
pub async fn candidate_stylists(
    pool: &SqlitePool,
    style_id: Option<i64>,
) -> sqlx::Result<Vec<Stylist>> {
    match style_id {
        Some(style_id) => {
            sqlx::query_as::<_, Stylist>(
                "SELECT s.id, s.name, s.is_active, s.skill_level, s.surcharge,
                        s.working_hours, s.created_at
                 FROM stylists s
                 JOIN stylist_styles ss ON ss.stylist_id = s.id
                 WHERE s.is_active = 1 AND ss.style_id = ?
                 ORDER BY s.id",
            )
            .bind(style_id)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Stylist>(
                "SELECT id, name, is_active, skill_level, surcharge, working_hours, created_at
                 FROM stylists WHERE is_active = 1 ORDER BY id",
            )
            .fetch_all(pool)
            .await
        }
    }
}

pub async fn active_stylist(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Stylist>> {
    sqlx::query_as::<_, Stylist>(
        "SELECT id, name, is_active, skill_level, surcharge, working_hours, created_at
         FROM stylists WHERE id = ? AND is_active = 1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Leave periods overlapping the inclusive `[from, to]` date range,
/// for all stylists. ISO dates compare correctly as text.
pub async fn leaves_in_range(
    pool: &SqlitePool,
    from: &str,
    to: &str,
) -> sqlx::Result<Vec<LeavePeriod>> {
    sqlx::query_as::<_, LeavePeriod>(
        "SELECT id, stylist_id, start_date, end_date, reason, created_at
         FROM leave_periods WHERE start_date <= ? AND end_date >= ?",
    )
    .bind(to)
    .bind(from)
    .fetch_all(pool)
    .await
}

/// Assemble the engine-facing schedule for one stylist. Corrupt
/// `working_hours` JSON falls back to salon hours; malformed leave rows
/// are skipped. Both are logged, neither fails the request.
pub fn schedule_for(stylist: &Stylist, leaves: &[LeavePeriod]) -> StylistSchedule {
    let week = stylist.working_hours.as_deref().and_then(|raw| {
        match serde_json::from_str::<WeekHoursConfig>(raw) {
            Ok(cfg) => Some(StylistWeek::from_config(&cfg)),
            Err(e) => {
                tracing::warn!(
                    "stylist {} working_hours JSON is corrupt: {}; using salon hours",
                    stylist.id,
                    e
                );
                None
            }
        }
    });

    let mut ranges = Vec::new();
    for leave in leaves.iter().filter(|l| l.stylist_id == stylist.id) {
        match (parse_date(&leave.start_date), parse_date(&leave.end_date)) {
            (Some(from), Some(to)) => ranges.push((from, to)),
            _ => tracing::warn!("leave {} has malformed dates; skipping", leave.id),
        }
    }

    StylistSchedule {
        stylist_id: stylist.id,
        week,
        leaves: ranges,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

// ── Pricing ──

/// Appointment duration for a style (and category, when given). A missing
/// pricing row is a data problem, not a request failure: fall back to
/// `DEFAULT_DURATION_MIN` and log.
pub async fn service_duration(
    pool: &SqlitePool,
    style_id: i64,
    category_id: Option<i64>,
) -> sqlx::Result<Minutes> {
    let found: Option<i64> = match category_id {
        Some(category_id) => {
            sqlx::query_scalar(
                "SELECT duration_min FROM style_pricing WHERE style_id = ? AND category_id = ?",
            )
            .bind(style_id)
            .bind(category_id)
            .fetch_optional(pool)
            .await?
        }
        None => sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MIN(duration_min) FROM style_pricing WHERE style_id = ?",
        )
        .bind(style_id)
        .fetch_optional(pool)
        .await?
        .flatten(),
    };

    match found {
        Some(minutes) if (1..=1440).contains(&minutes) => Ok(minutes as Minutes),
        Some(minutes) => {
            tracing::warn!(
                "pricing for style {} has duration {}; using {}",
                style_id,
                minutes,
                DEFAULT_DURATION_MIN
            );
            Ok(DEFAULT_DURATION_MIN)
        }
        None => {
            tracing::warn!(
                "no pricing for style {} (category {:?}); assuming {} minutes",
                style_id,
                category_id,
                DEFAULT_DURATION_MIN
            );
            Ok(DEFAULT_DURATION_MIN)
        }
    }
}

// ── Bookings (reads) ──

/// Non-cancelled bookings for one date.
pub async fn bookings_for_date(pool: &SqlitePool, date: &str) -> sqlx::Result<Vec<Booking>> {
    sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE date = ? AND status != 'cancelled'"
    ))
    .bind(date)
    .fetch_all(pool)
    .await
}

/// Non-cancelled bookings in the inclusive `[from, to]` date range.
pub async fn bookings_in_range(
    pool: &SqlitePool,
    from: &str,
    to: &str,
) -> sqlx::Result<Vec<Booking>> {
    sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE date >= ? AND date <= ? AND status != 'cancelled'"
    ))
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Convert rows to engine spans. Rows with malformed or inverted times are
/// skipped with a warning rather than poisoning the whole grid.
pub fn spans_from(rows: &[Booking]) -> Vec<BookingSpan> {
    let mut spans = Vec::with_capacity(rows.len());
    for row in rows {
        match (engine::parse_hhmm(&row.start_time), engine::parse_hhmm(&row.end_time)) {
            (Ok(start), Ok(end)) if start < end => spans.push(BookingSpan {
                id: row.id,
                stylist_id: row.stylist_id,
                start,
                end,
            }),
            _ => tracing::warn!(
                "booking {} has malformed times {}..{}; skipping",
                row.id,
                row.start_time,
                row.end_time
            ),
        }
    }
    spans
}

// ── Bookings (guarded writes) ──

/// Inputs for a guarded insert. Times are already validated and resolved.
#[derive(Debug)]
pub struct NewBooking {
    pub stylist_id: Option<i64>,
    pub style_id: i64,
    pub category_id: Option<i64>,
    pub client_name: String,
    pub client_phone: String,
    pub date: String,
    pub start_min: Minutes,
    pub duration_min: Minutes,
    pub created_at: String,
}

/// Target of a reschedule. `stylist_id` is the final assignment.
#[derive(Debug)]
pub struct BookingMove {
    pub date: String,
    pub start_min: Minutes,
    pub duration_min: Minutes,
    pub stylist_id: Option<i64>,
}

/// Schedule context for the in-transaction re-check. For a specific stylist
/// `candidates` holds exactly that stylist's schedule; for "no preference"
/// it holds every capable stylist.
#[derive(Debug)]
pub struct SlotCheck {
    pub salon: WeekHours,
    pub candidates: Vec<StylistSchedule>,
    pub date: NaiveDate,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BookingWrite {
    /// The write landed; payload is the booking id.
    Committed(i64),
    /// The interval was taken (or fell outside working hours) by the time
    /// the transaction re-checked it.
    Conflict,
}

/// Re-derive the availability verdict from rows read inside the transaction:
/// at least one candidate whose resolved window contains the interval and
/// who has no overlapping booking.
async fn slot_still_free(
    tx: &mut Transaction<'_, Sqlite>,
    date: &str,
    start: Minutes,
    end: Minutes,
    exclude_booking_id: Option<i64>,
    check: &SlotCheck,
) -> sqlx::Result<bool> {
    let rows = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE date = ? AND status != 'cancelled'"
    ))
    .bind(date)
    .fetch_all(&mut **tx)
    .await?;

    let index = ConflictIndex::new(spans_from(&rows), exclude_booking_id);
    let free = check.candidates.iter().any(|candidate| {
        resolve_window(&check.salon, Some(candidate), check.date)
            .is_some_and(|window| window.contains_span(start, end))
            && index.is_free(candidate.stylist_id, start, end)
    });
    if !free {
        let colliding: Vec<i64> = index.overlapping(start, end).map(|span| span.id).collect();
        tracing::debug!(
            "slot {} {}..{} rejected in-transaction; overlapping bookings: {:?}",
            date,
            start,
            end,
            colliding
        );
    }
    Ok(free)
}

/// Insert a booking, re-checking the slot inside the same transaction.
///
/// The INSERT carries its own NOT EXISTS overlap guard, so the conflict test
/// and the write are one atomic statement for an assigned stylist. A NULL
/// `stylist_id` never matches the guard's equality, which is exactly the
/// unassigned model: such bookings reserve no one's time.
pub async fn create_booking(
    pool: &SqlitePool,
    new: &NewBooking,
    check: &SlotCheck,
) -> sqlx::Result<BookingWrite> {
    let end_min = new.start_min + new.duration_min;
    let start_time = format_hhmm(new.start_min);
    let end_time = format_hhmm(end_min);

    let mut tx = pool.begin().await?;

    if !slot_still_free(&mut tx, &new.date, new.start_min, end_min, None, check).await? {
        return Ok(BookingWrite::Conflict);
    }

    let result = sqlx::query(
        "INSERT INTO bookings (stylist_id, style_id, category_id, client_name, client_phone,
                               date, start_time, end_time, duration_min, status, created_at)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'booked', ?10
         WHERE NOT EXISTS (
             SELECT 1 FROM bookings b
              WHERE b.date = ?6 AND b.status != 'cancelled'
                AND b.stylist_id = ?1
                AND b.start_time < ?8 AND ?7 < b.end_time
         )",
    )
    .bind(new.stylist_id)
    .bind(new.style_id)
    .bind(new.category_id)
    .bind(&new.client_name)
    .bind(&new.client_phone)
    .bind(&new.date)
    .bind(&start_time)
    .bind(&end_time)
    .bind(new.duration_min as i64)
    .bind(&new.created_at)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(BookingWrite::Conflict);
    }
    let id = result.last_insert_rowid();
    tx.commit().await?;
    Ok(BookingWrite::Committed(id))
}

/// Move a booking to a new date/time (and possibly stylist). The booking's
/// own current interval is excluded from the re-check, so landing on or
/// around it succeeds.
pub async fn reschedule_booking(
    pool: &SqlitePool,
    booking_id: i64,
    mv: &BookingMove,
    check: &SlotCheck,
) -> sqlx::Result<BookingWrite> {
    let end_min = mv.start_min + mv.duration_min;
    let start_time = format_hhmm(mv.start_min);
    let end_time = format_hhmm(end_min);

    let mut tx = pool.begin().await?;

    if !slot_still_free(&mut tx, &mv.date, mv.start_min, end_min, Some(booking_id), check).await? {
        return Ok(BookingWrite::Conflict);
    }

    let result = sqlx::query(
        "UPDATE bookings
            SET stylist_id = ?1, date = ?2, start_time = ?3, end_time = ?4, duration_min = ?5
          WHERE id = ?6
            AND NOT EXISTS (
                SELECT 1 FROM bookings b
                 WHERE b.date = ?2 AND b.status != 'cancelled'
                   AND b.id != ?6
                   AND b.stylist_id = ?1
                   AND b.start_time < ?4 AND ?3 < b.end_time
            )",
    )
    .bind(mv.stylist_id)
    .bind(&mv.date)
    .bind(&start_time)
    .bind(&end_time)
    .bind(mv.duration_min as i64)
    .bind(booking_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(BookingWrite::Conflict);
    }
    tx.commit().await?;
    Ok(BookingWrite::Committed(booking_id))
}
