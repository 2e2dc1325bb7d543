// libs/appointment-cell/src/handlers.rs
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
    AppointmentError, AppointmentSearchQuery, CancelAppointmentRequest,
    CompleteAppointmentRequest, PublicBookingRequest, PublicCancelRequest,
    ScheduleAppointmentRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::booking::AppointmentBookingService;
use crate::services::lifecycle::AppointmentLifecycleService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    pub branch_id: Uuid,
    pub date: NaiveDate,
    pub appointment_type_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub appointment_number: String,
    pub client_number: String,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound
        | AppointmentError::ClientNotFound
        | AppointmentError::BranchNotFound
        | AppointmentError::AppointmentTypeNotFound => AppError::NotFound(e.to_string()),
        AppointmentError::InvalidTimeFormat(_)
        | AppointmentError::ValidationError(_) => AppError::ValidationError(e.to_string()),
        AppointmentError::SundayNotAvailable
        | AppointmentError::HolidayNotAvailable { .. }
        | AppointmentError::PastDateNotAvailable
        | AppointmentError::AlreadyCompleted
        | AppointmentError::AlreadyCancelled
        | AppointmentError::CannotCompleteCancelled
        | AppointmentError::CannotCancelCompleted
        | AppointmentError::AlreadyDeleted
        | AppointmentError::InvalidStatusTransition(_, _) => AppError::BadRequest(e.to_string()),
        AppointmentError::DailyCapacityExceeded
        | AppointmentError::SlotUnavailable => AppError::Conflict(e.to_string()),
        // Infrastructure details stay inside the logs.
        AppointmentError::DatabaseError(_) => {
            AppError::Internal("Internal storage error".to_string())
        }
        AppointmentError::ExternalServiceError(_) => {
            AppError::ExternalService("Notification delivery failed".to_string())
        }
    }
}

fn require_staff(user: &User) -> Result<(), AppError> {
    match user.role.as_deref() {
        Some("staff") | Some("admin") => Ok(()),
        _ => Err(AppError::Auth("Staff role required".to_string())),
    }
}

// ==============================================================================
// PUBLIC HANDLERS (no authentication)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let availability = service
        .get_available_times(params.branch_id, params.date, params.appointment_type_id, None)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(availability)))
}

#[axum::debug_handler]
pub async fn public_book_appointment(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<PublicBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service.schedule_for_client_number(request).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment_number": appointment.appointment_number,
        "date": appointment.appointment_date,
        "time": appointment.appointment_time,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn public_cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<PublicCancelRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .cancel_by_number(&request.appointment_number, &request.client_number, &request.reason)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment_number": appointment.appointment_number,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn verify_appointment(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let verification = service
        .verify_appointment(&params.appointment_number, &params.client_number)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(verification)))
}

// ==============================================================================
// STAFF HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ScheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service.schedule_appointment(request, Some(auth.token())).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AppointmentSearchQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = AppointmentBookingService::new(&state);
    let appointments = service.search_appointments(query, Some(auth.token())).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service.get_appointment(appointment_id, Some(auth.token())).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .complete(appointment_id, request.notes, Some(auth.token()))
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment completed"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .cancel(appointment_id, &request.reason, Some(auth.token()))
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    // Logical deletion is an administrative action, not a client-facing one
    if user.role.as_deref() != Some("admin") {
        return Err(AppError::Auth("Administrator role required".to_string()));
    }

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service.logical_delete(appointment_id, Some(auth.token())).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment deleted"
    })))
}

#[axum::debug_handler]
pub async fn remind_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = AppointmentBookingService::new(&state);
    service.send_reminder(appointment_id, Some(auth.token())).await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Reminder dispatched"
    })))
}
