// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use serde::Deserialize;
use chrono::NaiveDate;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AddSlotRequest, BulkAddSlotsRequest, CreateHolidayRequest, HolidayRangeQuery,
    ScheduleError, UpdateHolidayRequest,
};
use crate::services::holidays::HolidayCalendarService;
use crate::services::slots::SlotCatalogService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotListParams {
    pub branch_id: Uuid,
    pub appointment_type_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct HolidayCheckParams {
    pub date: NaiveDate,
    pub branch_id: Uuid,
}

fn map_schedule_error(e: ScheduleError) -> AppError {
    match e {
        ScheduleError::InvalidTimeFormat(_) => AppError::ValidationError(e.to_string()),
        ScheduleError::DuplicateSlot | ScheduleError::DuplicateHoliday => {
            AppError::Conflict(e.to_string())
        }
        ScheduleError::SlotNotFound
        | ScheduleError::BranchNotFound
        | ScheduleError::AppointmentTypeNotFound
        | ScheduleError::HolidayNotFound => AppError::NotFound(e.to_string()),
        ScheduleError::AlreadyInactive
        | ScheduleError::DateInPast
        | ScheduleError::InvalidRange => AppError::BadRequest(e.to_string()),
        ScheduleError::DatabaseError(_) => AppError::Internal("Internal storage error".to_string()),
    }
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if user.role.as_deref() != Some("admin") {
        return Err(AppError::Auth("Administrator role required".to_string()));
    }
    Ok(())
}

// ==============================================================================
// SLOT CATALOG HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn add_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AddSlotRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = SlotCatalogService::new(&state);
    let slot = service.add_slot(request, Some(auth.token())).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot configuration created"
    })))
}

#[axum::debug_handler]
pub async fn bulk_add_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BulkAddSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = SlotCatalogService::new(&state);
    let result = service.bulk_add_slots(request, Some(auth.token())).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "result": result
    })))
}

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<SlotListParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = SlotCatalogService::new(&state);
    let slots = service
        .list_slots(params.branch_id, params.appointment_type_id, Some(auth.token()))
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "branch_id": params.branch_id,
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn deactivate_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = SlotCatalogService::new(&state);
    let slot = service.deactivate_slot(slot_id, Some(auth.token())).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot configuration deactivated"
    })))
}

// ==============================================================================
// HOLIDAY CALENDAR HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_national_holiday(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateHolidayRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = HolidayCalendarService::new(&state);
    let holiday = service
        .create_national_holiday(request.date, &request.name, Some(auth.token()))
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({ "success": true, "holiday": holiday })))
}

#[axum::debug_handler]
pub async fn create_company_holiday(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateHolidayRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = HolidayCalendarService::new(&state);
    let holiday = service
        .create_company_holiday(request.date, &request.name, Some(auth.token()))
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({ "success": true, "holiday": holiday })))
}

#[axum::debug_handler]
pub async fn create_local_holiday(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateHolidayRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let branch_id = request.branch_id
        .ok_or_else(|| AppError::BadRequest("branch_id is required for local holidays".to_string()))?;

    let service = HolidayCalendarService::new(&state);
    let holiday = service
        .create_local_holiday(request.date, &request.name, branch_id, Some(auth.token()))
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({ "success": true, "holiday": holiday })))
}

#[axum::debug_handler]
pub async fn list_holidays(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<HolidayRangeQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = HolidayCalendarService::new(&state);
    let holidays = service
        .holidays_in_range(params.start, params.end, params.branch_id, Some(auth.token()))
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "holidays": holidays,
        "total": holidays.len()
    })))
}

#[axum::debug_handler]
pub async fn check_holiday(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<HolidayCheckParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = HolidayCalendarService::new(&state);
    let holiday = service
        .is_holiday(params.date, params.branch_id, Some(auth.token()))
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "date": params.date,
        "branch_id": params.branch_id,
        "is_holiday": holiday.is_some(),
        "holiday": holiday
    })))
}

#[axum::debug_handler]
pub async fn update_holiday(
    State(state): State<Arc<AppConfig>>,
    Path(holiday_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateHolidayRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = HolidayCalendarService::new(&state);
    let holiday = service.update_holiday(holiday_id, request, Some(auth.token())).await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({ "success": true, "holiday": holiday })))
}
