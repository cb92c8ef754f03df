use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    Json,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{parse_hhmm, Minutes, WeekHours, WeekHoursConfig};
use crate::handlers::client::{minutes_of_day, salon_now, BOOKING_DETAIL_SELECT};
use crate::models::*;
use crate::store::{self, BookingWrite, SlotCheck};
use crate::AppState;

// ── Auth ──

/// Helper: check the bearer token against the configured admin token.
fn extract_admin(
    auth_header: Option<&str>,
    state: &AppState,
) -> Result<(), (StatusCode, Json<ApiResponse<()>>)> {
    let header = auth_header.ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Missing Authorization header")),
        )
    })?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    if token != state.admin_token {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("Invalid admin token")),
        ));
    }
    Ok(())
}

// ── Settings ──

async fn settings_view(db: &sqlx::SqlitePool) -> sqlx::Result<SettingsView> {
    let row = sqlx::query_as::<_, SettingsRow>(
        "SELECT id, business_hours, slot_step_min, tz_offset_min, updated_at
         FROM salon_settings WHERE id = 1",
    )
    .fetch_one(db)
    .await?;

    let business_hours = match serde_json::from_str(&row.business_hours) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("business_hours JSON is corrupt: {}; showing empty config", e);
            WeekHoursConfig::default()
        }
    };

    Ok(SettingsView {
        business_hours,
        slot_step_min: row.slot_step_min,
        tz_offset_min: row.tz_offset_min,
        updated_at: row.updated_at,
    })
}

/// GET /api/admin/settings — current salon configuration.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<SettingsView>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let view = settings_view(&state.db).await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(view)))
}

/// PUT /api/admin/settings — update salon hours, slot step and/or timezone.
/// All fields are optional; absent ones are left untouched.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<ApiResponse<SettingsView>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    // Validate everything before the first write.
    let hours_json = match &req.business_hours {
        Some(hours) => {
            if hours.validate().is_err() {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error("Invalid business hours")),
                ));
            }
            Some(serde_json::to_string(hours).map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("Serialization error")),
                )
            })?)
        }
        None => None,
    };
    if let Some(step) = req.slot_step_min {
        if !(5..=240).contains(&step) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Invalid slot step")),
            ));
        }
    }
    if let Some(tz) = req.tz_offset_min {
        if !(-840..=840).contains(&tz) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Invalid timezone offset")),
            ));
        }
    }

    if let Some(json) = hours_json {
        sqlx::query("UPDATE salon_settings SET business_hours = ? WHERE id = 1")
            .bind(json)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(step) = req.slot_step_min {
        sqlx::query("UPDATE salon_settings SET slot_step_min = ? WHERE id = 1")
            .bind(step)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(tz) = req.tz_offset_min {
        sqlx::query("UPDATE salon_settings SET tz_offset_min = ? WHERE id = 1")
            .bind(tz)
            .execute(&state.db)
            .await
            .ok();
    }
    sqlx::query("UPDATE salon_settings SET updated_at = datetime('now') WHERE id = 1")
        .execute(&state.db)
        .await
        .ok();

    let view = settings_view(&state.db).await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(view)))
}

// ── Stylists ──

fn stylist_view(stylist: Stylist, capabilities: Vec<CapabilityView>) -> StylistView {
    let working_hours = stylist.working_hours.as_deref().and_then(|raw| {
        match serde_json::from_str(raw) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                tracing::warn!("stylist {} working_hours JSON is corrupt: {}", stylist.id, e);
                None
            }
        }
    });

    StylistView {
        id: stylist.id,
        name: stylist.name,
        is_active: stylist.is_active,
        skill_level: stylist.skill_level,
        surcharge: stylist.surcharge,
        working_hours,
        capabilities,
    }
}

async fn fetch_stylist_view(db: &sqlx::SqlitePool, id: i64) -> sqlx::Result<Option<StylistView>> {
    let Some(stylist) = sqlx::query_as::<_, Stylist>(
        "SELECT id, name, is_active, skill_level, surcharge, working_hours, created_at
         FROM stylists WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    else {
        return Ok(None);
    };

    let capabilities = sqlx::query_as::<_, CapabilityView>(
        "SELECT ss.stylist_id, ss.style_id, s.name AS style_name, ss.surcharge
         FROM stylist_styles ss
         JOIN styles s ON s.id = ss.style_id
         WHERE ss.stylist_id = ?
         ORDER BY s.sort_order, s.id",
    )
    .bind(id)
    .fetch_all(db)
    .await?;

    Ok(Some(stylist_view(stylist, capabilities)))
}

/// GET /api/admin/stylists — every stylist, active or not, with capabilities.
pub async fn list_stylists(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<Vec<StylistView>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let stylists = sqlx::query_as::<_, Stylist>(
        "SELECT id, name, is_active, skill_level, surcharge, working_hours, created_at
         FROM stylists ORDER BY name",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let capabilities = sqlx::query_as::<_, CapabilityView>(
        "SELECT ss.stylist_id, ss.style_id, s.name AS style_name, ss.surcharge
         FROM stylist_styles ss
         JOIN styles s ON s.id = ss.style_id
         ORDER BY s.sort_order, s.id",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let mut by_stylist: HashMap<i64, Vec<CapabilityView>> = HashMap::new();
    for cap in capabilities {
        by_stylist.entry(cap.stylist_id).or_default().push(cap);
    }

    let views = stylists
        .into_iter()
        .map(|s| {
            let caps = by_stylist.remove(&s.id).unwrap_or_default();
            stylist_view(s, caps)
        })
        .collect();

    Ok(Json(ApiResponse::success(views)))
}

/// POST /api/admin/stylists — create a stylist.
pub async fn create_stylist(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateStylistRequest>,
) -> Result<Json<ApiResponse<StylistView>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Name is required")),
        ));
    }
    let working_hours = match &req.working_hours {
        Some(hours) => {
            if hours.validate().is_err() {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error("Invalid working hours")),
                ));
            }
            Some(serde_json::to_string(hours).map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("Serialization error")),
                )
            })?)
        }
        None => None,
    };

    let result = sqlx::query(
        "INSERT INTO stylists (name, skill_level, surcharge, working_hours) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(req.skill_level.as_deref().unwrap_or("standard"))
    .bind(req.surcharge.unwrap_or(0))
    .bind(&working_hours)
    .execute(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;
    let id = result.last_insert_rowid();

    if let Some(style_ids) = &req.style_ids {
        for style_id in style_ids {
            sqlx::query("INSERT OR IGNORE INTO stylist_styles (stylist_id, style_id) VALUES (?, ?)")
                .bind(id)
                .bind(style_id)
                .execute(&state.db)
                .await
                .ok();
        }
    }

    let view = fetch_stylist_view(&state.db, id)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;

    tracing::info!("Created stylist #{}: {}", id, view.name);
    Ok(Json(ApiResponse::success(view)))
}

/// PUT /api/admin/stylists/{id} — partial update; only provided fields change.
/// `working_hours: {}` clears personal hours; `capabilities` replaces the set.
pub async fn update_stylist(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStylistRequest>,
) -> Result<Json<ApiResponse<StylistView>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM stylists WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    if exists.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Stylist not found")),
        ));
    }

    // Outer None = untouched, inner None = cleared back to salon hours.
    let hours_change: Option<Option<String>> = match &req.working_hours {
        Some(hours) if hours.is_empty() => Some(None),
        Some(hours) => {
            if hours.validate().is_err() {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error("Invalid working hours")),
                ));
            }
            Some(Some(serde_json::to_string(hours).map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("Serialization error")),
                )
            })?))
        }
        None => None,
    };

    if let Some(name) = &req.name {
        sqlx::query("UPDATE stylists SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(active) = req.is_active {
        sqlx::query("UPDATE stylists SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(level) = &req.skill_level {
        sqlx::query("UPDATE stylists SET skill_level = ? WHERE id = ?")
            .bind(level)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(surcharge) = req.surcharge {
        sqlx::query("UPDATE stylists SET surcharge = ? WHERE id = ?")
            .bind(surcharge)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(change) = hours_change {
        sqlx::query("UPDATE stylists SET working_hours = ? WHERE id = ?")
            .bind(change)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(capabilities) = &req.capabilities {
        sqlx::query("DELETE FROM stylist_styles WHERE stylist_id = ?")
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
        for cap in capabilities {
            sqlx::query(
                "INSERT OR IGNORE INTO stylist_styles (stylist_id, style_id, surcharge) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(cap.style_id)
            .bind(cap.surcharge)
            .execute(&state.db)
            .await
            .ok();
        }
    }

    let view = fetch_stylist_view(&state.db, id)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Stylist not found")),
            )
        })?;

    Ok(Json(ApiResponse::success(view)))
}

// ── Leave ──

/// GET /api/admin/stylists/{id}/leave — leave periods for one stylist.
pub async fn list_leave(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<LeavePeriod>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let periods = sqlx::query_as::<_, LeavePeriod>(
        "SELECT id, stylist_id, start_date, end_date, reason, created_at
         FROM leave_periods WHERE stylist_id = ? ORDER BY start_date",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(periods)))
}

/// POST /api/admin/stylists/{id}/leave — add a leave period (inclusive dates).
pub async fn create_leave(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<CreateLeaveRequest>,
) -> Result<Json<ApiResponse<LeavePeriod>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let start = NaiveDate::parse_from_str(&req.start_date, "%Y-%m-%d").map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid date format")),
        )
    })?;
    let end = NaiveDate::parse_from_str(&req.end_date, "%Y-%m-%d").map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid date format")),
        )
    })?;
    if end < start {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid date range")),
        ));
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM stylists WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    if exists.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Stylist not found")),
        ));
    }

    let result = sqlx::query(
        "INSERT INTO leave_periods (stylist_id, start_date, end_date, reason) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&req.start_date)
    .bind(&req.end_date)
    .bind(&req.reason)
    .execute(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let period = sqlx::query_as::<_, LeavePeriod>(
        "SELECT id, stylist_id, start_date, end_date, reason, created_at
         FROM leave_periods WHERE id = ?",
    )
    .bind(result.last_insert_rowid())
    .fetch_one(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(period)))
}

/// DELETE /api/admin/leave/{id} — remove a leave period.
pub async fn delete_leave(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let result = sqlx::query("DELETE FROM leave_periods WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    if result.rows_affected() == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Leave period not found")),
        ));
    }

    Ok(Json(ApiResponse::success("Leave period deleted")))
}

// ── Styles and categories ──

/// GET /api/admin/styles — every style, active or not.
pub async fn list_styles(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<Vec<Style>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let styles = sqlx::query_as::<_, Style>("SELECT * FROM styles ORDER BY sort_order, id")
        .fetch_all(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;

    Ok(Json(ApiResponse::success(styles)))
}

/// POST /api/admin/styles — create a style.
pub async fn create_style(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateStyleRequest>,
) -> Result<Json<ApiResponse<Style>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Name is required")),
        ));
    }

    let result = sqlx::query("INSERT INTO styles (name, description, sort_order) VALUES (?, ?, ?)")
        .bind(name)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(req.sort_order.unwrap_or(0))
        .execute(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;

    let style = sqlx::query_as::<_, Style>("SELECT * FROM styles WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;

    Ok(Json(ApiResponse::success(style)))
}

/// PUT /api/admin/styles/{id} — partial update of a style.
pub async fn update_style(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStyleRequest>,
) -> Result<Json<ApiResponse<Style>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    if let Some(name) = &req.name {
        sqlx::query("UPDATE styles SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(description) = &req.description {
        sqlx::query("UPDATE styles SET description = ? WHERE id = ?")
            .bind(description)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(active) = req.is_active {
        sqlx::query("UPDATE styles SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(sort_order) = req.sort_order {
        sqlx::query("UPDATE styles SET sort_order = ? WHERE id = ?")
            .bind(sort_order)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }

    let style = sqlx::query_as::<_, Style>("SELECT * FROM styles WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Style not found")),
            )
        })?;

    Ok(Json(ApiResponse::success(style)))
}

/// GET /api/admin/categories — all categories.
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<Vec<Category>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let categories =
        sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY sort_order, id")
            .fetch_all(&state.db)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?;

    Ok(Json(ApiResponse::success(categories)))
}

/// POST /api/admin/categories — create a length/complexity category.
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<Json<ApiResponse<Category>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Name is required")),
        ));
    }

    let result = sqlx::query("INSERT INTO categories (name, sort_order) VALUES (?, ?)")
        .bind(name)
        .bind(req.sort_order.unwrap_or(0))
        .execute(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;

    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;

    Ok(Json(ApiResponse::success(category)))
}

/// PUT /api/admin/styles/{id}/pricing — upsert price/duration rows for a
/// style, one per category. Rows for categories not in the payload are kept.
pub async fn update_pricing(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePricingRequest>,
) -> Result<Json<ApiResponse<Vec<PricingRow>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let style: Option<i64> = sqlx::query_scalar("SELECT id FROM styles WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|_| {
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

    for entry in &req.pricing {
        if entry.price < 0 || !(1..=1440).contains(&entry.duration_min) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Invalid pricing entry")),
            ));
        }
        let known: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ?")
            .bind(entry.category_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?;
        if known.is_none() {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Unknown category")),
            ));
        }
    }

    for entry in &req.pricing {
        sqlx::query(
            "INSERT INTO style_pricing (style_id, category_id, price, duration_min)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(style_id, category_id)
             DO UPDATE SET price = excluded.price, duration_min = excluded.duration_min",
        )
        .bind(id)
        .bind(entry.category_id)
        .bind(entry.price)
        .bind(entry.duration_min)
        .execute(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    }

    let rows = sqlx::query_as::<_, PricingRow>(
        "SELECT * FROM style_pricing WHERE style_id = ? ORDER BY category_id",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(rows)))
}

// ── Bookings ──

/// GET /api/admin/bookings — list bookings: one date, a range, or upcoming.
/// Date and range views include cancelled bookings; the default upcoming
/// view hides them.
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<ApiResponse<Vec<BookingDetail>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let settings = store::settings(&state.db).await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;
    let today = salon_now(settings.tz_offset_min)
        .date_naive()
        .format("%Y-%m-%d")
        .to_string();

    let bookings = if let Some(date) = &query.date {
        sqlx::query_as::<_, BookingDetail>(&format!(
            "{} WHERE b.date = ? ORDER BY b.start_time",
            BOOKING_DETAIL_SELECT
        ))
        .bind(date)
        .fetch_all(&state.db)
        .await
    } else if let (Some(from), Some(to)) = (&query.from, &query.to) {
        sqlx::query_as::<_, BookingDetail>(&format!(
            "{} WHERE b.date BETWEEN ? AND ? ORDER BY b.date, b.start_time",
            BOOKING_DETAIL_SELECT
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&state.db)
        .await
    } else {
        sqlx::query_as::<_, BookingDetail>(&format!(
            "{} WHERE b.date >= ? AND b.status != 'cancelled' ORDER BY b.date, b.start_time",
            BOOKING_DETAIL_SELECT
        ))
        .bind(&today)
        .fetch_all(&state.db)
        .await
    }
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(bookings)))
}

/// POST /api/admin/bookings/{id}/cancel — cancel a booking, freeing its slot.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<BookingDetail>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Booking not found")),
            )
        })?;
    if booking.status == "cancelled" {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Booking is already cancelled")),
        ));
    }

    sqlx::query(
        "UPDATE bookings SET status = 'cancelled', cancelled_at = datetime('now') WHERE id = ?",
    )
    .bind(id)
    .execute(&state.db)
    .await
    .ok();

    tracing::info!("Booking #{} cancelled", id);

    let detail =
        sqlx::query_as::<_, BookingDetail>(&format!("{} WHERE b.id = ?", BOOKING_DETAIL_SELECT))
            .bind(id)
            .fetch_one(&state.db)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?;

    Ok(Json(ApiResponse::success(detail)))
}

/// PUT /api/admin/bookings/{id}/reschedule — move a booking to a new
/// date/time (and optionally a new stylist), keeping its duration. The
/// booking's own interval does not count as a conflict.
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<ApiResponse<BookingDetail>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    let date = NaiveDate::parse_from_str(&req.date, "%Y-%m-%d").map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid date format")),
        )
    })?;
    let start_min = parse_hhmm(&req.start_time).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid time format")),
        )
    })?;

    let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Booking not found")),
            )
        })?;
    if !matches!(booking.status.as_str(), "booked" | "checked_in") {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Booking cannot be rescheduled")),
        ));
    }
    // Write paths validate durations; a row that fails this conversion is corrupt.
    let duration_min = Minutes::try_from(booking.duration_min).map_err(|_| {
        tracing::error!("booking {} duration {} is out of range", id, booking.duration_min);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    let settings = store::settings(&state.db).await.map_err(|_| {
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

    // Final assignment: an explicit stylist wins, otherwise the current one
    // (which may be none) is kept.
    let stylist_id = req.stylist_id.or(booking.stylist_id);
    let candidates = match stylist_id {
        Some(sid) => {
            let Some(stylist) = store::active_stylist(&state.db, sid).await.map_err(|_| {
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
            .bind(sid)
            .bind(booking.style_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|_| {
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
        None => store::candidate_stylists(&state.db, Some(booking.style_id))
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?,
    };

    let leaves = store::leaves_in_range(&state.db, &req.date, &req.date)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    let schedules = candidates
        .iter()
        .map(|s| store::schedule_for(s, &leaves))
        .collect();

    let check = SlotCheck {
        salon: WeekHours::from_config(&settings.hours),
        candidates: schedules,
        date,
    };
    let mv = store::BookingMove {
        date: req.date.clone(),
        start_min,
        duration_min,
        stylist_id,
    };

    match store::reschedule_booking(&state.db, id, &mv, &check)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })? {
        BookingWrite::Committed(_) => {}
        BookingWrite::Conflict => {
            return Err((
                StatusCode::CONFLICT,
                Json(ApiResponse::error("Slot is no longer available")),
            ));
        }
    }

    tracing::info!("Booking #{} moved to {} {}", id, req.date, req.start_time);

    let detail =
        sqlx::query_as::<_, BookingDetail>(&format!("{} WHERE b.id = ?", BOOKING_DETAIL_SELECT))
            .bind(id)
            .fetch_one(&state.db)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?;

    Ok(Json(ApiResponse::success(detail)))
}

/// PUT /api/admin/bookings/{id}/status — move a booking through its
/// lifecycle. Cancelled bookings stay cancelled; their slot has already
/// been given back.
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateBookingStatusRequest>,
) -> Result<Json<ApiResponse<BookingDetail>>, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    extract_admin(auth_header, &state)?;

    if !BOOKING_STATUSES.contains(&req.status.as_str()) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Unknown status")),
        ));
    }

    let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Booking not found")),
            )
        })?;
    if booking.status == "cancelled" && req.status != "cancelled" {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Cancelled bookings cannot be reinstated")),
        ));
    }

    if req.status == "cancelled" {
        sqlx::query(
            "UPDATE bookings SET status = 'cancelled', cancelled_at = datetime('now') WHERE id = ?",
        )
        .bind(id)
        .execute(&state.db)
        .await
        .ok();
    } else {
        sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
            .bind(&req.status)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }

    let detail =
        sqlx::query_as::<_, BookingDetail>(&format!("{} WHERE b.id = ?", BOOKING_DETAIL_SELECT))
            .bind(id)
            .fetch_one(&state.db)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("DB error")),
                )
            })?;

    Ok(Json(ApiResponse::success(detail)))
}

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
        AppState {
            db: pool,
            admin_token: "secret".to_string(),
            started_at: std::time::Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_admin_auth_missing_header() {
        let state = test_state().await;
        let err = extract_admin(None, &state).unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_auth_wrong_token() {
        let state = test_state().await;
        let err = extract_admin(Some("Bearer nope"), &state).unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_auth_accepts_token() {
        let state = test_state().await;
        assert!(extract_admin(Some("Bearer secret"), &state).is_ok());
        assert!(extract_admin(Some("secret"), &state).is_ok());
    }

    #[tokio::test]
    async fn test_reschedule_rejects_out_of_range_duration() {
        let state = test_state().await;
        crate::db::run_migrations(&state.db).await.unwrap();
        sqlx::query("INSERT INTO styles (name) VALUES ('Box braids')")
            .execute(&state.db)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO bookings (style_id, client_name, client_phone, date, start_time, end_time, duration_min)
             VALUES (1, 'Ada', '+15550100', '2099-01-04', '10:00', '11:00', 100000)",
        )
        .execute(&state.db)
        .await
        .unwrap();

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        let req = RescheduleRequest {
            date: "2099-01-05".to_string(),
            start_time: "10:00".to_string(),
            stylist_id: None,
        };
        let err = reschedule_booking(State(Arc::new(state)), headers, Path(1), Json(req))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
