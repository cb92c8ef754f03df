use serde::{Deserialize, Serialize};

use crate::engine::WeekHoursConfig;

// ── Database models ──

/// Singleton settings row (id = 1). `business_hours` holds weekday → window
/// JSON; it is parsed into `engine::WeekHoursConfig` at the edges.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SettingsRow {
    pub id: i64,
    pub business_hours: String,
    pub slot_step_min: i64,
    pub tz_offset_min: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stylist {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub skill_level: String,
    /// Base surcharge on top of style pricing, in minor currency units.
    pub surcharge: i64,
    /// Personal weekly hours JSON; NULL means the stylist follows salon hours.
    pub working_hours: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeavePeriod {
    pub id: i64,
    pub stylist_id: i64,
    pub start_date: String,
    pub end_date: String,
    pub reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Style {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PricingRow {
    pub id: i64,
    pub style_id: i64,
    pub category_id: i64,
    pub price: i64,
    pub duration_min: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: i64,
    /// NULL for "no preference" bookings that were never assigned a stylist.
    pub stylist_id: Option<i64>,
    pub style_id: i64,
    pub category_id: Option<i64>,
    pub client_name: String,
    pub client_phone: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_min: i64,
    pub status: String,
    pub created_at: String,
    pub cancelled_at: Option<String>,
}

/// Statuses a booking can carry. Bookings are never deleted; `cancelled`
/// frees the time slot implicitly.
pub const BOOKING_STATUSES: [&str; 5] =
    ["booked", "checked_in", "in_progress", "completed", "cancelled"];

// ── API request/response types ──

#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub business_hours: WeekHoursConfig,
    pub slot_step_min: i64,
    pub tz_offset_min: i64,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub business_hours: Option<WeekHoursConfig>,
    pub slot_step_min: Option<i64>,
    pub tz_offset_min: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    pub style_id: Option<i64>,
    pub category_id: Option<i64>,
    pub stylist_id: Option<i64>,
    pub duration_min: Option<i64>,
    pub exclude_booking_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WeekAvailabilityQuery {
    pub from: String,
    pub to: String,
    pub style_id: Option<i64>,
    pub category_id: Option<i64>,
    pub stylist_id: Option<i64>,
    pub duration_min: Option<i64>,
    pub exclude_booking_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StylistsQuery {
    pub style_id: Option<i64>,
}

/// Client-facing stylist card. `surcharge` is the effective one: the
/// per-style override when a style filter is given, the base otherwise.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StylistPublic {
    pub id: i64,
    pub name: String,
    pub skill_level: String,
    pub surcharge: i64,
}

#[derive(Debug, Serialize)]
pub struct StyleView {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub sort_order: i64,
    pub pricing: Vec<PricingView>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PricingView {
    #[serde(skip_serializing)]
    pub style_id: i64,
    pub category_id: i64,
    pub category_name: String,
    pub price: i64,
    pub duration_min: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub style_id: i64,
    pub category_id: Option<i64>,
    /// Omit for "any available stylist".
    pub stylist_id: Option<i64>,
    pub date: String,
    pub start_time: String,
    pub client_name: String,
    pub client_phone: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BookingDetail {
    pub id: i64,
    pub style_name: String,
    pub category_name: Option<String>,
    pub stylist_name: Option<String>,
    pub client_name: String,
    pub client_phone: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_min: i64,
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub start_time: String,
    /// When present, the booking is reassigned to this stylist as well.
    pub stylist_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateStylistRequest {
    pub name: String,
    pub skill_level: Option<String>,
    pub surcharge: Option<i64>,
    pub working_hours: Option<WeekHoursConfig>,
    pub style_ids: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStylistRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub skill_level: Option<String>,
    pub surcharge: Option<i64>,
    /// An empty map (`{}`) clears personal hours back to salon hours.
    pub working_hours: Option<WeekHoursConfig>,
    /// Replaces the whole capability set when present.
    pub capabilities: Option<Vec<CapabilityEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct CapabilityEntry {
    pub style_id: i64,
    pub surcharge: Option<i64>,
}

/// Admin-facing stylist with parsed hours and capability list.
#[derive(Debug, Serialize)]
pub struct StylistView {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub skill_level: String,
    pub surcharge: i64,
    pub working_hours: Option<WeekHoursConfig>,
    pub capabilities: Vec<CapabilityView>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CapabilityView {
    #[serde(skip_serializing)]
    pub stylist_id: i64,
    pub style_id: i64,
    pub style_name: String,
    pub surcharge: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeaveRequest {
    pub start_date: String,
    pub end_date: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStyleRequest {
    pub name: String,
    pub description: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStyleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    pub pricing: Vec<PricingEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PricingEntry {
    pub category_id: i64,
    pub price: i64,
    pub duration_min: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
