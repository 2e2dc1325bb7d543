// libs/appointment-cell/src/services/lifecycle.rs
//
// The lifecycle service is the only writer of an appointment's status. The
// booking transactor creates records; everything after creation (complete,
// cancel, logical delete) goes through here.

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::clients::ClientDirectoryService;
use crate::services::notifications::NotificationService;

/// Allowed status transitions. Terminal states accept none.
pub fn valid_transitions(current: AppointmentStatus) -> Vec<AppointmentStatus> {
    match current {
        AppointmentStatus::Pending => vec![
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::Confirmed => vec![
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::InProgress => vec![
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::Completed | AppointmentStatus::Cancelled => vec![],
    }
}

pub fn validate_transition(
    current: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if valid_transitions(current).contains(&next) {
        Ok(())
    } else {
        warn!("Invalid status transition attempted: {} -> {}", current, next);
        Err(AppointmentError::InvalidStatusTransition(current, next))
    }
}

pub struct AppointmentLifecycleService {
    supabase: Arc<SupabaseClient>,
    clients: ClientDirectoryService,
    notifications: NotificationService,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_client(supabase, config)
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            clients: ClientDirectoryService::with_client(Arc::clone(&supabase)),
            notifications: NotificationService::new(config),
            supabase,
        }
    }

    /// Mark an appointment completed. Terminal states are reported with
    /// their specific reason rather than a generic transition error.
    pub async fn complete(
        &self,
        appointment_id: Uuid,
        notes: Option<String>,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Completing appointment {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        match current.status {
            AppointmentStatus::Completed => return Err(AppointmentError::AlreadyCompleted),
            AppointmentStatus::Cancelled => return Err(AppointmentError::CannotCompleteCancelled),
            _ => validate_transition(current.status, AppointmentStatus::Completed)?,
        }

        let now = Utc::now();
        let mut update_data = serde_json::Map::new();
        update_data.insert("status_id".to_string(), json!(AppointmentStatus::Completed.id()));
        update_data.insert("completed_date".to_string(), json!(now.to_rfc3339()));
        update_data.insert("updated_at".to_string(), json!(now.to_rfc3339()));
        if let Some(notes) = notes {
            update_data.insert("notes".to_string(), json!(notes));
        }

        let completed = self
            .patch_appointment(appointment_id, Value::Object(update_data), auth_token)
            .await?;

        info!("Appointment {} completed", completed.appointment_number);
        Ok(completed)
    }

    /// Cancel an appointment and store the reason. The cancellation message
    /// is dispatched after the update commits; a gateway failure is logged
    /// and never rolls the cancellation back.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: &str,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        match current.status {
            AppointmentStatus::Cancelled => return Err(AppointmentError::AlreadyCancelled),
            AppointmentStatus::Completed => return Err(AppointmentError::CannotCancelCompleted),
            _ => validate_transition(current.status, AppointmentStatus::Cancelled)?,
        }

        let update_data = json!({
            "status_id": AppointmentStatus::Cancelled.id(),
            "cancellation_reason": reason,
            "updated_at": Utc::now().to_rfc3339()
        });

        let cancelled = self
            .patch_appointment(appointment_id, update_data, auth_token)
            .await?;

        info!("Appointment {} cancelled: {}", cancelled.appointment_number, reason);

        self.dispatch_cancellation_notice(&cancelled, reason, auth_token).await;

        Ok(cancelled)
    }

    /// Public cancellation flow: the (appointment number, client number)
    /// pair must match. A mismatch is reported as not-found without saying
    /// which half was wrong.
    pub async fn cancel_by_number(
        &self,
        appointment_number: &str,
        client_number: &str,
        reason: &str,
    ) -> Result<Appointment, AppointmentError> {
        let client = self.clients.get_by_number(client_number, None).await
            .map_err(|_| AppointmentError::NotFound)?;

        let appointment = self.get_by_number(appointment_number, None).await?;
        if appointment.client_id != client.id {
            return Err(AppointmentError::NotFound);
        }

        self.cancel(appointment.id, reason, None).await
    }

    /// Administrative soft delete, independent of status.
    pub async fn logical_delete(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Logically deleting appointment {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        if !current.is_active && !current.is_enabled {
            return Err(AppointmentError::AlreadyDeleted);
        }

        let update_data = json!({
            "is_active": false,
            "is_enabled": false,
            "updated_at": Utc::now().to_rfc3339()
        });

        let deleted = self
            .patch_appointment(appointment_id, update_data, auth_token)
            .await?;

        info!("Appointment {} logically deleted", deleted.appointment_number);
        Ok(deleted)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
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

    async fn get_by_number(
        &self,
        appointment_number: &str,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?appointment_number=eq.{}&is_enabled=eq.true",
            urlencoding::encode(appointment_number)
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
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

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            auth_token,
            Some(update_data),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to update appointment".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
            })
    }

    async fn dispatch_cancellation_notice(
        &self,
        appointment: &Appointment,
        reason: &str,
        auth_token: Option<&str>,
    ) {
        let client = match self.clients.get_by_id(appointment.client_id, auth_token).await {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    "Skipping cancellation notice for {}: client lookup failed: {}",
                    appointment.appointment_number, e
                );
                return;
            }
        };

        if let Err(e) = self.notifications.send_cancellation(appointment, &client, reason).await {
            warn!(
                "Cancellation notice for {} failed (appointment remains cancelled): {}",
                appointment.appointment_number, e
            );
        }
    }
}
