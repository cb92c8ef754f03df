use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::engine::{generate, Minutes, SlotRequest, StylistQuery, TimeSlot, WeekHours};
use crate::models::*;
use crate::store::{self, SlotCheck};
use crate::AppState;

// ── Constants ──

/// Hard cap on the week-availability range, inclusive of both endpoints.
const MAX_RANGE_DAYS: i64 = 31;

// ── Shared booking query (eliminates duplication across client/admin) ──

/// The shared SELECT for booking detail responses. Joins in style, category
/// and stylist names plus the effective price (base + surcharge) when a
/// pricing row exists for the booked combination.
pub const BOOKING_DETAIL_SELECT: &str = r#"
SELECT
    b.id, b.stylist_id, b.style_id, b.category_id,
    b.client_name, b.client_phone,
    b.date, b.start_time, b.end_time, b.duration_min,
    b.status, b.created_at, b.cancelled_at,
    s.name AS style_name,
    c.name AS category_name,
    st.name AS stylist_name,
    CASE
        WHEN p.price IS NOT NULL THEN p.price + COALESCE(ss.surcharge, st.surcharge, 0)
        ELSE NULL
    END AS total_price
FROM bookings b
JOIN styles s ON s.id = b.style_id
LEFT JOIN categories c ON c.id = b.category_id
LEFT JOIN stylists st ON st.id = b.stylist_id
LEFT JOIN style_pricing p ON p.style_id = b.style_id AND p.category_id = b.category_id
LEFT JOIN stylist_styles ss ON ss.stylist_id = b.stylist_id AND ss.style_id = b.style_id
"#;

// ── Salon-local clock ──

/// Current wall-clock time in the salon's configured UTC offset.
pub fn salon_now(tz_offset_min: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(tz_offset_min * 60).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset)
}

pub(crate) fn minutes_of_day(now: &DateTime<FixedOffset>) -> Minutes {
    (now.hour() * 60 + now.minute()) as Minutes
}

// ── Stylist resolution ──

/// Build the stylist side of a slot request from query parameters.
///
/// Returns `Ok(None)` when the request names a stylist that does not exist,
/// is inactive, or does not offer the requested style — callers should answer
/// with an empty slot list rather than an error.
async fn resolve_stylist_query(
    db: &sqlx::SqlitePool,
    stylist_id: Option<i64>,
    style_id: Option<i64>,
    from: &str,
    to: &str,
) -> sqlx::Result<Option<StylistQuery>> {
    match stylist_id {
        Some(id) => {
            let Some(stylist) = store::active_stylist(db, id).await? else {
                return Ok(None);
            };
            if let Some(style_id) = style_id {
                let capable: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM stylist_styles WHERE stylist_id = ? AND style_id = ?",
                )
                .bind(id)
                .bind(style_id)
                .fetch_optional(db)
                .await?;
                if capable.is_none() {
                    return Ok(None);
                }
            }
            let leaves = store::leaves_in_range(db, from, to).await?;
            Ok(Some(StylistQuery::Specific(store::schedule_for(
                &stylist, &leaves,
            ))))
        }
        None => {
            let stylists = store::candidate_stylists(db, style_id).await?;
            if stylists.is_empty() {
                return Ok(Some(StylistQuery::Any(vec![])));
            }
            let leaves = store::leaves_in_range(db, from, to).await?;
            let schedules = stylists
                .iter()
                .map(|s| store::schedule_for(s, &leaves))
                .collect();
            Ok(Some(StylistQuery::Any(schedules)))
        }
    }
}

// ── Catalog ──

/// GET /api/styles — active styles with their per-category pricing.
pub async fn list_styles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<StyleView>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let styles = sqlx::query_as::<_, Style>(
        "SELECT * FROM styles WHERE is_active = 1 ORDER BY sort_order, id",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("list_styles: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let pricing = sqlx::query_as::<_, PricingView>(
        r#"
        SELECT p.style_id, p.category_id, c.name AS category_name, p.price, p.duration_min
        FROM style_pricing p
        JOIN categories c ON c.id = p.category_id
        ORDER BY c.sort_order, c.id
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("list_styles pricing: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let mut by_style: HashMap<i64, Vec<PricingView>> = HashMap::new();
    for row in pricing {
        by_style.entry(row.style_id).or_default().push(row);
    }

    let views = styles
        .into_iter()
        .map(|style| StyleView {
            pricing: by_style.remove(&style.id).unwrap_or_default(),
            id: style.id,
            name: style.name,
            description: style.description,
            sort_order: style.sort_order,
        })
        .collect();

    Ok(Json(ApiResponse::success(views)))
}

/// GET /api/stylists?style_id= — active stylists, optionally filtered to
/// those offering a given style.
pub async fn list_stylists(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StylistsQuery>,
) -> Result<Json<ApiResponse<Vec<StylistPublic>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let stylists = match query.style_id {
        Some(style_id) => {
            sqlx::query_as::<_, StylistPublic>(
                r#"
                SELECT s.id, s.name, s.skill_level,
                       COALESCE(ss.surcharge, s.surcharge) AS surcharge
                FROM stylists s
                JOIN stylist_styles ss ON ss.stylist_id = s.id
                WHERE s.is_active = 1 AND ss.style_id = ?
                ORDER BY s.name
                "#,
            )
            .bind(style_id)
            .fetch_all(&state.db)
            .await
        }
        None => {
            sqlx::query_as::<_, StylistPublic>(
                "SELECT id, name, skill_level, surcharge FROM stylists WHERE is_active = 1 ORDER BY name",
            )
            .fetch_all(&state.db)
            .await
        }
    }
    .map_err(|e| {
        tracing::error!("list_stylists: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(stylists)))
}

// ── Availability ──

/// Resolve the slot duration for an availability request: explicit override
/// first, then the pricing table, then the default.
async fn resolve_duration(
    db: &sqlx::SqlitePool,
    duration_min: Option<i64>,
    style_id: Option<i64>,
    category_id: Option<i64>,
) -> sqlx::Result<Minutes> {
    match duration_min {
        Some(d) => Ok(d as Minutes),
        None => match style_id {
            Some(style_id) => store::service_duration(db, style_id, category_id).await,
            None => Ok(store::DEFAULT_DURATION_MIN),
        },
    }
}

/// Parse and bound a week-availability range. Both endpoints are inclusive;
/// a range longer than `MAX_RANGE_DAYS` days is caller error.
fn validate_week_range(from: &str, to: &str) -> Result<(NaiveDate, NaiveDate), &'static str> {
    let from = NaiveDate::parse_from_str(from, "%Y-%m-%d").map_err(|_| "Invalid date format")?;
    let to = NaiveDate::parse_from_str(to, "%Y-%m-%d").map_err(|_| "Invalid date format")?;
    if to < from {
        return Err("Invalid date range");
    }
    if (to - from).num_days() + 1 > MAX_RANGE_DAYS {
        return Err("Date range too long (max 31 days)");
    }
    Ok((from, to))
}

/// GET /api/availability — bookable slots for one date.
///
/// Past dates answer with an empty list; a date the salon is closed on
/// answers with an empty list; today's slots that have already started are
/// included but marked unavailable.
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ApiResponse<Vec<TimeSlot>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d").map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid date format")),
        )
    })?;
    if let Some(d) = query.duration_min {
        if !(1..=1439).contains(&d) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Invalid duration")),
            ));
        }
    }

    let settings = store::settings(&state.db).await.map_err(|e| {
        tracing::error!("availability: settings: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let now = salon_now(settings.tz_offset_min);
    let today = now.date_naive();
    if date < today {
        return Ok(Json(ApiResponse::success(vec![])));
    }

    let duration = resolve_duration(
        &state.db,
        query.duration_min,
        query.style_id,
        query.category_id,
    )
    .await
    .map_err(|e| {
        tracing::error!("availability: duration: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let stylist = match resolve_stylist_query(
        &state.db,
        query.stylist_id,
        query.style_id,
        &query.date,
        &query.date,
    )
    .await
    .map_err(|e| {
        tracing::error!("availability: stylists: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })? {
        Some(stylist) => stylist,
        None => return Ok(Json(ApiResponse::success(vec![]))),
    };

    let rows = store::bookings_for_date(&state.db, &query.date)
        .await
        .map_err(|e| {
            tracing::error!("availability: bookings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;

    let request = SlotRequest {
        date,
        duration_min: duration,
        step_min: settings.slot_step_min,
        salon: WeekHours::from_config(&settings.hours),
        stylist,
        bookings: store::spans_from(&rows),
        exclude_booking_id: query.exclude_booking_id,
        now_min: (date == today).then(|| minutes_of_day(&now)),
    };

    Ok(Json(ApiResponse::success(generate(&request))))
}

/// GET /api/availability/week — slots for a date range, keyed by date.
///
/// The range is inclusive and capped at 31 days. Dates already in the past
/// are omitted from the response entirely.
pub async fn week_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WeekAvailabilityQuery>,
) -> Result<Json<ApiResponse<BTreeMap<String, Vec<TimeSlot>>>>, (StatusCode, Json<ApiResponse<()>>)>
{
    let (from, to) = validate_week_range(&query.from, &query.to)
        .map_err(|msg| (StatusCode::BAD_REQUEST, Json(ApiResponse::error(msg))))?;
    let total_days = (to - from).num_days();
    if let Some(d) = query.duration_min {
        if !(1..=1439).contains(&d) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Invalid duration")),
            ));
        }
    }

    let settings = store::settings(&state.db).await.map_err(|e| {
        tracing::error!("week_availability: settings: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let duration = resolve_duration(
        &state.db,
        query.duration_min,
        query.style_id,
        query.category_id,
    )
    .await
    .map_err(|e| {
        tracing::error!("week_availability: duration: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let stylist = match resolve_stylist_query(
        &state.db,
        query.stylist_id,
        query.style_id,
        &query.from,
        &query.to,
    )
    .await
    .map_err(|e| {
        tracing::error!("week_availability: stylists: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })? {
        Some(stylist) => stylist,
        None => return Ok(Json(ApiResponse::success(BTreeMap::new()))),
    };

    let rows = store::bookings_in_range(&state.db, &query.from, &query.to)
        .await
        .map_err(|e| {
            tracing::error!("week_availability: bookings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    let mut by_date: HashMap<String, Vec<Booking>> = HashMap::new();
    for row in rows {
        by_date.entry(row.date.clone()).or_default().push(row);
    }

    let now = salon_now(settings.tz_offset_min);
    let today = now.date_naive();
    let salon = WeekHours::from_config(&settings.hours);

    let mut days = BTreeMap::new();
    for offset in 0..=total_days {
        let Some(date) = from.checked_add_days(Days::new(offset as u64)) else {
            break;
        };
        if date < today {
            continue;
        }
        let date_str = date.format("%Y-%m-%d").to_string();
        let bookings = by_date
            .get(&date_str)
            .map(|rows| store::spans_from(rows))
            .unwrap_or_default();

        let request = SlotRequest {
            date,
            duration_min: duration,
            step_min: settings.slot_step_min,
            salon,
            stylist: stylist.clone(),
            bookings,
            exclude_booking_id: query.exclude_booking_id,
            now_min: (date == today).then(|| minutes_of_day(&now)),
        };
        days.insert(date_str, generate(&request));
    }

    Ok(Json(ApiResponse::success(days)))
}

// ── Booking ──

/// POST /api/bookings — book a slot.
///
/// Validates the payload, re-derives the duration from the pricing table,
/// and hands the write to the store, which re-checks the slot inside the
/// transaction. A lost race answers 409.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<BookingDetail>>, (StatusCode, Json<ApiResponse<()>>)> {
    let date = NaiveDate::parse_from_str(&req.date, "%Y-%m-%d").map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid date format")),
        )
    })?;
    let start_min = crate::engine::parse_hhmm(&req.start_time).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid time format")),
        )
    })?;
    let client_name = req.client_name.trim();
    let client_phone = req.client_phone.trim();
    if client_name.is_empty() || client_phone.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Name and phone are required")),
        ));
    }

    let style: Option<Style> =
        sqlx::query_as("SELECT * FROM styles WHERE id = ? AND is_active = 1")
            .bind(req.style_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| {
                tracing::error!("create_booking: style: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?;
    if style.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Style not found")),
        ));
    }

    let settings = store::settings(&state.db).await.map_err(|e| {
        tracing::error!("create_booking: settings: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;
    let now = salon_now(settings.tz_offset_min);
    let today = now.date_naive();
    if date < today || (date == today && start_min <= minutes_of_day(&now)) {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Slot is no longer available")),
        ));
    }

    let duration = store::service_duration(&state.db, req.style_id, req.category_id)
        .await
        .map_err(|e| {
            tracing::error!("create_booking: duration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;

    // Resolve candidate stylists. An explicit stylist must exist, be active,
    // and offer the style; otherwise any capable stylist may take the slot.
    let candidates = match req.stylist_id {
        Some(id) => {
            let Some(stylist) = store::active_stylist(&state.db, id).await.map_err(|e| {
                tracing::error!("create_booking: stylist: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?
            else {
                return Err((
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error("Stylist not found")),
                ));
            };
            let capable: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM stylist_styles WHERE stylist_id = ? AND style_id = ?",
            )
            .bind(id)
            .bind(req.style_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| {
                tracing::error!("create_booking: capability: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?;
            if capable.is_none() {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error("Stylist does not offer this style")),
                ));
            }
            vec![stylist]
        }
        None => store::candidate_stylists(&state.db, Some(req.style_id))
            .await
            .map_err(|e| {
                tracing::error!("create_booking: stylists: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?,
    };

    let leaves = store::leaves_in_range(&state.db, &req.date, &req.date)
        .await
        .map_err(|e| {
            tracing::error!("create_booking: leaves: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    let schedules: Vec<_> = candidates
        .iter()
        .map(|s| store::schedule_for(s, &leaves))
        .collect();

    let check = SlotCheck {
        salon: WeekHours::from_config(&settings.hours),
        candidates: schedules,
        date,
    };
    let new = store::NewBooking {
        stylist_id: req.stylist_id,
        style_id: req.style_id,
        category_id: req.category_id,
        client_name: client_name.to_string(),
        client_phone: client_phone.to_string(),
        date: req.date.clone(),
        start_min,
        duration_min: duration,
        created_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    let booking_id = match store::create_booking(&state.db, &new, &check).await.map_err(|e| {
        tracing::error!("create_booking: write: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })? {
        store::BookingWrite::Committed(id) => id,
        store::BookingWrite::Conflict => {
            return Err((
                StatusCode::CONFLICT,
                Json(ApiResponse::error("Slot is no longer available")),
            ));
        }
    };

    tracing::info!(
        "New booking #{}: {} on {} at {}",
        booking_id,
        client_name,
        req.date,
        req.start_time
    );

    let detail =
        sqlx::query_as::<_, BookingDetail>(&format!("{} WHERE b.id = ?", BOOKING_DETAIL_SELECT))
            .bind(booking_id)
            .fetch_one(&state.db)
            .await
            .map_err(|e| {
                tracing::error!("create_booking: fetch: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?;

    Ok(Json(ApiResponse::success(detail)))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_state() -> AppState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        AppState {
            db: pool,
            admin_token: "secret".to_string(),
            started_at: std::time::Instant::now(),
        }
    }

    // ── validate_week_range ──

    #[test]
    fn test_week_range_accepts_full_31_days() {
        // 2024-06-01 through 2024-07-01 is exactly 31 days inclusive.
        let (from, to) = validate_week_range("2024-06-01", "2024-07-01").unwrap();
        assert_eq!((to - from).num_days(), 30);
    }

    #[test]
    fn test_week_range_rejects_32_days() {
        assert_eq!(
            validate_week_range("2024-06-01", "2024-07-02"),
            Err("Date range too long (max 31 days)")
        );
    }

    #[test]
    fn test_week_range_accepts_single_day() {
        let (from, to) = validate_week_range("2024-06-03", "2024-06-03").unwrap();
        assert_eq!(from, to);
    }

    #[test]
    fn test_week_range_rejects_inverted() {
        assert_eq!(
            validate_week_range("2024-06-10", "2024-06-09"),
            Err("Invalid date range")
        );
    }

    #[test]
    fn test_week_range_rejects_malformed_dates() {
        assert_eq!(
            validate_week_range("2024-13-01", "2024-06-10"),
            Err("Invalid date format")
        );
        assert_eq!(
            validate_week_range("2024-06-01", "10.06.2024"),
            Err("Invalid date format")
        );
    }

    // ── Past-date handling ──

    #[tokio::test]
    async fn test_availability_for_past_date_is_empty() {
        let state = test_state().await;
        let query = AvailabilityQuery {
            date: "2020-01-06".to_string(),
            style_id: None,
            category_id: None,
            stylist_id: None,
            duration_min: None,
            exclude_booking_id: None,
        };
        let Json(resp) = availability(State(Arc::new(state)), Query(query))
            .await
            .unwrap();
        assert!(resp.ok);
        assert!(resp.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_week_availability_omits_past_days() {
        let state = test_state().await;
        let query = WeekAvailabilityQuery {
            from: "2020-01-06".to_string(),
            to: "2020-01-08".to_string(),
            style_id: None,
            category_id: None,
            stylist_id: None,
            duration_min: None,
            exclude_booking_id: None,
        };
        let Json(resp) = week_availability(State(Arc::new(state)), Query(query))
            .await
            .unwrap();
        assert!(resp.ok);
        assert!(resp.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_week_availability_rejects_long_range() {
        let state = test_state().await;
        let query = WeekAvailabilityQuery {
            from: "2099-01-01".to_string(),
            to: "2099-02-01".to_string(),
            style_id: None,
            category_id: None,
            stylist_id: None,
            duration_min: None,
            exclude_booking_id: None,
        };
        let err = week_availability(State(Arc::new(state)), Query(query))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
