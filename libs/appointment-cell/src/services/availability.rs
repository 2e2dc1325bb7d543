// libs/appointment-cell/src/services/availability.rs
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use scheduling_cell::models::{ScheduleError, TimeSlotConfig};
use scheduling_cell::services::holidays::HolidayCalendarService;
use scheduling_cell::services::slots::SlotCatalogService;

use crate::models::{
    AppointmentError, AppointmentStatus, AvailabilityResponse, UnavailableReason,
};

/// Read-side slot resolution: configured times minus occupied times minus
/// calendar exclusions. A pure snapshot; the booking transactor re-validates
/// everything at write time.
pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    holidays: HolidayCalendarService,
    slots: SlotCatalogService,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_client(supabase)
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            holidays: HolidayCalendarService::with_client(Arc::clone(&supabase)),
            slots: SlotCatalogService::with_client(Arc::clone(&supabase)),
            supabase,
        }
    }

    pub async fn get_available_times(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
        appointment_type_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        debug!("Resolving availability for branch {} on {}", branch_id, date);

        if date.weekday() == Weekday::Sun {
            return Ok(AvailabilityResponse::closed(
                branch_id,
                date,
                UnavailableReason::SundayNotAvailable,
                None,
            ));
        }

        if let Some(holiday) = self
            .holidays
            .is_holiday(date, branch_id, auth_token)
            .await
            .map_err(map_schedule_error)?
        {
            return Ok(AvailabilityResponse::closed(
                branch_id,
                date,
                UnavailableReason::HolidayNotAvailable,
                Some(holiday.name),
            ));
        }

        if date < Utc::now().date_naive() {
            return Ok(AvailabilityResponse::closed(
                branch_id,
                date,
                UnavailableReason::PastDateNotAvailable,
                None,
            ));
        }

        let configured = self
            .configured_slots(branch_id, appointment_type_id, auth_token)
            .await?;
        if configured.is_empty() {
            return Ok(AvailabilityResponse {
                branch_id,
                date,
                available_times: Vec::new(),
                unavailable_reason: None,
                holiday_name: None,
            });
        }

        let occupied = self.occupied_times(branch_id, date, auth_token).await?;

        let available_times = configured
            .into_iter()
            .map(|slot| slot.slot_time)
            .filter(|time| !occupied.contains(time))
            .collect();

        Ok(AvailabilityResponse {
            branch_id,
            date,
            available_times,
            unavailable_reason: None,
            holiday_name: None,
        })
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// Catalog entries applicable to the query: type-specific entries plus
    /// the branch's untyped entries when a type is requested, untyped only
    /// otherwise. Deduplicated by time, ordered by time-of-day.
    async fn configured_slots(
        &self,
        branch_id: Uuid,
        appointment_type_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeSlotConfig>, AppointmentError> {
        let mut slots = self
            .slots
            .list_slots(branch_id, None, auth_token)
            .await
            .map_err(map_schedule_error)?;

        if appointment_type_id.is_some() {
            let typed = self
                .slots
                .list_slots(branch_id, appointment_type_id, auth_token)
                .await
                .map_err(map_schedule_error)?;
            slots.extend(typed);
        }

        let mut seen = HashSet::new();
        slots.retain(|slot| seen.insert(slot.slot_time.clone()));
        slots.sort_by_key(|slot| slot.time_of_day());

        Ok(slots)
    }

    /// Times of enabled, non-terminal appointments at (branch, date).
    async fn occupied_times(
        &self,
        branch_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<HashSet<String>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?branch_id=eq.{}&appointment_date=eq.{}&is_enabled=eq.true&{}&select=appointment_time",
            branch_id,
            date,
            AppointmentStatus::non_terminal_filter()
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(result
            .into_iter()
            .filter_map(|row| {
                row.get("appointment_time")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .collect())
    }
}

fn map_schedule_error(e: ScheduleError) -> AppointmentError {
    AppointmentError::DatabaseError(e.to_string())
}
