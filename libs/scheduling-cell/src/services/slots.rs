// libs/scheduling-cell/src/services/slots.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{ApiStatusError, SupabaseClient};

use crate::models::{
    parse_slot_time, AddSlotRequest, BulkAddSlotsRequest, BulkAddSlotsResult,
    BulkSlotError, ScheduleError, TimeSlotConfig,
};

pub struct SlotCatalogService {
    supabase: Arc<SupabaseClient>,
}

impl SlotCatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Register a bookable time for a branch. The (branch, time, type) key
    /// must not collide with another active configuration.
    pub async fn add_slot(
        &self,
        request: AddSlotRequest,
        auth_token: Option<&str>,
    ) -> Result<TimeSlotConfig, ScheduleError> {
        debug!("Adding slot {} for branch {}", request.time, request.branch_id);

        let slot_time = parse_slot_time(&request.time)
            .ok_or_else(|| ScheduleError::InvalidTimeFormat(request.time.clone()))?;

        self.verify_branch_exists(request.branch_id, auth_token).await?;
        if let Some(type_id) = request.appointment_type_id {
            self.verify_appointment_type_exists(type_id, auth_token).await?;
        }

        let existing = self
            .find_active_slots(
                request.branch_id,
                Some(&request.time),
                request.appointment_type_id,
                auth_token,
            )
            .await?;
        if !existing.is_empty() {
            return Err(ScheduleError::DuplicateSlot);
        }

        let now = Utc::now();
        let slot_data = json!({
            "branch_id": request.branch_id,
            "appointment_type_id": request.appointment_type_id,
            "slot_time": slot_time.format("%H:%M").to_string(),
            "active": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/time_slot_configs",
            auth_token,
            Some(slot_data),
            Some(headers),
        ).await.map_err(|e| {
            // The table carries a partial unique index over the active key;
            // a 409 here means another writer inserted the same slot first.
            match e.downcast_ref::<ApiStatusError>() {
                Some(api_err) if api_err.status == 409 => ScheduleError::DuplicateSlot,
                _ => ScheduleError::DatabaseError(e.to_string()),
            }
        })?;

        let slot: TimeSlotConfig = result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to create slot".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse slot: {}", e)))
            })?;

        info!("Slot {} created for branch {} at {}", slot.id, slot.branch_id, slot.slot_time);
        Ok(slot)
    }

    /// Soft-deactivate a slot configuration. Calling it twice is an error,
    /// not a no-op.
    pub async fn deactivate_slot(
        &self,
        slot_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<TimeSlotConfig, ScheduleError> {
        debug!("Deactivating slot {}", slot_id);

        let path = format!("/rest/v1/time_slot_configs?id=eq.{}", slot_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let current: TimeSlotConfig = result
            .into_iter()
            .next()
            .ok_or(ScheduleError::SlotNotFound)
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse slot: {}", e)))
            })?;

        if !current.active {
            return Err(ScheduleError::AlreadyInactive);
        }

        let update_data = json!({
            "active": false,
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            auth_token,
            Some(update_data),
            Some(headers),
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to deactivate slot".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse slot: {}", e)))
            })
    }

    /// Active slots for a branch, ordered by time-of-day ascending. The
    /// availability resolver depends on this ordering.
    pub async fn list_slots(
        &self,
        branch_id: Uuid,
        appointment_type_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeSlotConfig>, ScheduleError> {
        let mut slots = self
            .find_active_slots(branch_id, None, appointment_type_id, auth_token)
            .await?;

        // Sort on the parsed time, not the string: "9:00" style data from a
        // legacy import would otherwise sort after "10:00".
        slots.sort_by_key(|s| s.time_of_day());
        Ok(slots)
    }

    /// Best-effort batch insert: each entry is validated and inserted
    /// independently and failures are reported per entry.
    pub async fn bulk_add_slots(
        &self,
        request: BulkAddSlotsRequest,
        auth_token: Option<&str>,
    ) -> Result<BulkAddSlotsResult, ScheduleError> {
        debug!("Bulk adding {} slots for branch {}", request.times.len(), request.branch_id);

        let mut result = BulkAddSlotsResult {
            created: 0,
            skipped: 0,
            errors: Vec::new(),
        };

        for time in &request.times {
            let add_request = AddSlotRequest {
                branch_id: request.branch_id,
                time: time.clone(),
                appointment_type_id: request.appointment_type_id,
            };

            match self.add_slot(add_request, auth_token).await {
                Ok(_) => result.created += 1,
                Err(e) => {
                    warn!("Skipping slot {} for branch {}: {}", time, request.branch_id, e);
                    result.skipped += 1;
                    result.errors.push(BulkSlotError {
                        time: time.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Bulk slot insert for branch {}: {} created, {} skipped",
            request.branch_id, result.created, result.skipped
        );
        Ok(result)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn find_active_slots(
        &self,
        branch_id: Uuid,
        slot_time: Option<&str>,
        appointment_type_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeSlotConfig>, ScheduleError> {
        let mut query_parts = vec![
            format!("branch_id=eq.{}", branch_id),
            "active=eq.true".to_string(),
        ];

        if let Some(time) = slot_time {
            query_parts.push(format!("slot_time=eq.{}", time));
        }
        match appointment_type_id {
            Some(type_id) => query_parts.push(format!("appointment_type_id=eq.{}", type_id)),
            None => query_parts.push("appointment_type_id=is.null".to_string()),
        }

        let path = format!("/rest/v1/time_slot_configs?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(|v| serde_json::from_value(v))
            .collect::<Result<Vec<TimeSlotConfig>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse slots: {}", e)))
    }

    async fn verify_branch_exists(
        &self,
        branch_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<(), ScheduleError> {
        let path = format!("/rest/v1/branches?id=eq.{}&is_active=eq.true", branch_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ScheduleError::BranchNotFound);
        }
        Ok(())
    }

    async fn verify_appointment_type_exists(
        &self,
        appointment_type_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<(), ScheduleError> {
        let path = format!("/rest/v1/appointment_types?id=eq.{}&is_active=eq.true", appointment_type_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ScheduleError::AppointmentTypeNotFound);
        }
        Ok(())
    }
}
