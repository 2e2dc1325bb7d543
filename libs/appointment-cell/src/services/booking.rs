// libs/appointment-cell/src/services/booking.rs
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{ApiStatusError, SupabaseClient};
use scheduling_cell::models::parse_slot_time;
use scheduling_cell::services::holidays::HolidayCalendarService;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    AppointmentVerification, BookingValidationRules, PublicBookingRequest,
    ScheduleAppointmentRequest,
};
use crate::services::clients::ClientDirectoryService;
use crate::services::notifications::NotificationService;
use crate::services::reservation::SlotReservationService;

const MAX_APPOINTMENTS_SETTING: &str = "MAX_APPOINTMENTS_PER_DAY";

/// Write side of the engine. The resolver's availability snapshot is never
/// trusted here: every calendar, capacity and conflict rule is re-checked
/// inside the slot reservation lock, and the appointments table's partial
/// unique index turns any remaining race into a 409 instead of a double
/// booking.
pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    holidays: HolidayCalendarService,
    reservation: SlotReservationService,
    clients: ClientDirectoryService,
    notifications: NotificationService,
    validation_rules: BookingValidationRules,
    max_lock_attempts: u32,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_rules(config, BookingValidationRules::default())
    }

    pub fn with_rules(config: &AppConfig, validation_rules: BookingValidationRules) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            holidays: HolidayCalendarService::with_client(Arc::clone(&supabase)),
            reservation: SlotReservationService::with_client(Arc::clone(&supabase)),
            clients: ClientDirectoryService::with_client(Arc::clone(&supabase)),
            notifications: NotificationService::new(config),
            supabase,
            validation_rules,
            max_lock_attempts: 3,
        }
    }

    /// Book a slot for a known client id (staff flow).
    pub async fn schedule_appointment(
        &self,
        request: ScheduleAppointmentRequest,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for client {} at branch {} on {} {}",
            request.client_id, request.branch_id, request.date, request.time
        );

        let time = parse_slot_time(&request.time)
            .ok_or_else(|| AppointmentError::InvalidTimeFormat(request.time.clone()))?;
        let time_str = time.format("%H:%M").to_string();

        self.run_calendar_checks(request.branch_id, request.date, auth_token).await?;

        let client = self.clients.get_by_id(request.client_id, auth_token).await?;
        self.verify_branch_exists(request.branch_id, auth_token).await?;
        self.verify_appointment_type_exists(request.appointment_type_id, auth_token).await?;

        // Capacity and conflict checks plus the insert run under the slot
        // lock; concurrent requests for the same tuple serialize here.
        let lock_key = SlotReservationService::lock_key(request.branch_id, request.date, &time_str);

        let mut acquired = false;
        for attempt in 1..=self.max_lock_attempts {
            if self.reservation.acquire(&lock_key).await? {
                acquired = true;
                break;
            }
            debug!("Slot lock busy, attempt {}/{}", attempt, self.max_lock_attempts);
            tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64)).await;
        }
        if !acquired {
            warn!("Could not acquire slot lock {} - concurrent booking in flight", lock_key);
            return Err(AppointmentError::SlotUnavailable);
        }

        let booked = self.book_under_lock(&request, &time_str, auth_token).await;

        if let Err(e) = self.reservation.release(&lock_key).await {
            warn!("Failed to release booking lock {}: {}", lock_key, e);
        }

        let appointment = booked?;

        // Post-commit, best effort. The booking stands whatever happens to
        // the confirmation message.
        if let Err(e) = self.notifications.send_confirmation(&appointment, &client).await {
            warn!(
                "Confirmation notice for {} failed (booking stands): {}",
                appointment.appointment_number, e
            );
        }

        info!(
            "Appointment {} booked for branch {} on {} {}",
            appointment.appointment_number, appointment.branch_id,
            appointment.appointment_date, appointment.appointment_time
        );
        Ok(appointment)
    }

    /// Public booking flow, keyed on the opaque client number.
    pub async fn schedule_for_client_number(
        &self,
        request: PublicBookingRequest,
    ) -> Result<Appointment, AppointmentError> {
        let client = self.clients.get_by_number(&request.client_number, None).await?;

        self.schedule_appointment(
            ScheduleAppointmentRequest {
                client_id: client.id,
                branch_id: request.branch_id,
                appointment_type_id: request.appointment_type_id,
                date: request.date,
                time: request.time,
                notes: request.notes,
            },
            None,
        ).await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.fetch_one_appointment(&path, auth_token).await
    }

    pub async fn get_by_number(
        &self,
        appointment_number: &str,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?appointment_number=eq.{}&is_enabled=eq.true",
            urlencoding::encode(appointment_number)
        );
        self.fetch_one_appointment(&path, auth_token).await
    }

    /// Verification for the QR display: the (appointment number, client
    /// number) pair must match. A wrong pair is a plain not-found; which of
    /// the two was wrong is not revealed.
    pub async fn verify_appointment(
        &self,
        appointment_number: &str,
        client_number: &str,
    ) -> Result<AppointmentVerification, AppointmentError> {
        let client = self.clients.get_by_number(client_number, None).await
            .map_err(|_| AppointmentError::NotFound)?;

        let appointment = self.get_by_number(appointment_number, None).await?;

        if appointment.client_id != client.id {
            return Err(AppointmentError::NotFound);
        }

        Ok(AppointmentVerification {
            appointment_number: appointment.appointment_number,
            branch_id: appointment.branch_id,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            status: appointment.status,
            client_full_name: client.full_name,
        })
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);

        let mut query_parts = vec!["is_enabled=eq.true".to_string()];

        if let Some(branch_id) = query.branch_id {
            query_parts.push(format!("branch_id=eq.{}", branch_id));
        }
        if let Some(client_id) = query.client_id {
            query_parts.push(format!("client_id=eq.{}", client_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status_id=eq.{}", status.id()));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!("appointment_date=gte.{}", from_date));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!("appointment_date=lte.{}", to_date));
        }

        let mut path = format!(
            "/rest/v1/appointments?{}&order=appointment_date.desc,appointment_time.asc",
            query_parts.join("&")
        );

        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    /// Explicitly requested reminder for an upcoming appointment. Unlike the
    /// automatic confirmation this surfaces delivery failure to the caller.
    pub async fn send_reminder(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        let client = self.clients.get_by_id(appointment.client_id, auth_token).await?;
        self.notifications.send_reminder(&appointment, &client).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// Same calendar gate the availability resolver applies, re-run at write
    /// time because the read-side snapshot may be stale.
    async fn run_calendar_checks(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<(), AppointmentError> {
        if date.weekday() == Weekday::Sun {
            return Err(AppointmentError::SundayNotAvailable);
        }

        if let Some(holiday) = self
            .holidays
            .is_holiday(date, branch_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
        {
            return Err(AppointmentError::HolidayNotAvailable { name: holiday.name });
        }

        if date < Utc::now().date_naive() {
            return Err(AppointmentError::PastDateNotAvailable);
        }

        Ok(())
    }

    async fn book_under_lock(
        &self,
        request: &ScheduleAppointmentRequest,
        time_str: &str,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        self.check_daily_capacity(request.branch_id, request.date, auth_token).await?;
        self.check_slot_conflict(request.branch_id, request.date, time_str, auth_token).await?;
        self.insert_appointment(request, time_str, auth_token).await
    }

    /// Capacity counts every non-cancelled appointment for the branch and
    /// day; completed visits still consumed a slot of the day's budget.
    async fn check_daily_capacity(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let max_per_day = self.max_appointments_per_day(auth_token).await;

        let path = format!(
            "/rest/v1/appointments?branch_id=eq.{}&appointment_date=eq.{}&is_enabled=eq.true&status_id=neq.{}",
            branch_id,
            date,
            AppointmentStatus::Cancelled.id()
        );

        let booked = self.supabase.count(&path, auth_token).await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if booked >= max_per_day {
            warn!(
                "Daily capacity reached for branch {} on {}: {}/{}",
                branch_id, date, booked, max_per_day
            );
            return Err(AppointmentError::DailyCapacityExceeded);
        }

        Ok(())
    }

    async fn check_slot_conflict(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
        time_str: &str,
        auth_token: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?branch_id=eq.{}&appointment_date=eq.{}&appointment_time=eq.{}&is_enabled=eq.true&{}&limit=1",
            branch_id,
            date,
            time_str,
            AppointmentStatus::non_terminal_filter()
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if !result.is_empty() {
            return Err(AppointmentError::SlotUnavailable);
        }

        Ok(())
    }

    async fn insert_appointment(
        &self,
        request: &ScheduleAppointmentRequest,
        time_str: &str,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let status = if self.validation_rules.auto_confirm {
            AppointmentStatus::Confirmed
        } else {
            AppointmentStatus::Pending
        };
        let appointment_number = Self::generate_appointment_number(request.date);

        let appointment_data = json!({
            "appointment_number": appointment_number,
            "client_id": request.client_id,
            "branch_id": request.branch_id,
            "appointment_type_id": request.appointment_type_id,
            "appointment_date": request.date,
            "appointment_time": time_str,
            "status_id": status.id(),
            "notes": request.notes,
            "is_active": true,
            "is_enabled": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            auth_token,
            Some(appointment_data),
            Some(headers),
        ).await.map_err(|e| {
            // The partial unique index over (branch, date, time) for
            // non-terminal rows is the commit-time invariant: a 409 means a
            // concurrent writer won the slot after our conflict check.
            match e.downcast_ref::<ApiStatusError>() {
                Some(api_err) if api_err.status == 409 => {
                    if api_err.body.contains("appointment_number") {
                        AppointmentError::DatabaseError(
                            "Appointment number collision".to_string(),
                        )
                    } else {
                        AppointmentError::SlotUnavailable
                    }
                }
                _ => AppointmentError::DatabaseError(e.to_string()),
            }
        })?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
            })
    }

    async fn max_appointments_per_day(&self, auth_token: Option<&str>) -> i64 {
        let path = format!(
            "/rest/v1/system_settings?key=eq.{}&select=value",
            MAX_APPOINTMENTS_SETTING
        );

        let result: Result<Vec<Value>, _> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await;

        match result {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.get("value"))
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or_else(|| {
                    debug!("{} not set, using default", MAX_APPOINTMENTS_SETTING);
                    self.validation_rules.default_max_appointments_per_day
                }),
            Err(e) => {
                warn!("Failed to read {}: {}, using default", MAX_APPOINTMENTS_SETTING, e);
                self.validation_rules.default_max_appointments_per_day
            }
        }
    }

    async fn verify_branch_exists(
        &self,
        branch_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/branches?id=eq.{}&is_active=eq.true", branch_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::BranchNotFound);
        }
        Ok(())
    }

    async fn verify_appointment_type_exists(
        &self,
        appointment_type_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_types?id=eq.{}&is_active=eq.true",
            appointment_type_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::AppointmentTypeNotFound);
        }
        Ok(())
    }

    async fn fetch_one_appointment(
        &self,
        path: &str,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            auth_token,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
            })
    }

    /// Opaque, unique, assigned once at creation. A collision would surface
    /// as a unique-constraint 409 and is treated as an internal fault.
    fn generate_appointment_number(date: NaiveDate) -> String {
        let token = Uuid::new_v4().simple().to_string();
        format!(
            "APT-{}-{}",
            date.format("%Y%m%d"),
            token[..8].to_uppercase()
        )
    }
}
