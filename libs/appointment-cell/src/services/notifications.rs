// libs/appointment-cell/src/services/notifications.rs
//
// Best-effort delivery of appointment messages through the external
// notification gateway. Every send is a single attempt made strictly after
// the triggering state change has committed; a failure here is logged by the
// caller and never unwinds the booking or cancellation.

use reqwest::Client as HttpClient;
use serde_json::json;
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::models::{Appointment, AppointmentError, Client};

pub struct NotificationService {
    http: HttpClient,
    base_url: String,
    api_token: String,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: config.notification_service_url.clone(),
            api_token: config.notification_api_token.clone(),
        }
    }

    pub async fn send_confirmation(
        &self,
        appointment: &Appointment,
        client: &Client,
    ) -> Result<(), AppointmentError> {
        self.dispatch("appointment.confirmed", json!({
            "appointment_id": appointment.id,
            "appointment_number": appointment.appointment_number,
            "branch_id": appointment.branch_id,
            "date": appointment.appointment_date,
            "time": appointment.appointment_time,
            "recipient_name": client.full_name,
            "recipient_email": client.email,
            "recipient_phone": client.phone
        })).await
    }

    pub async fn send_cancellation(
        &self,
        appointment: &Appointment,
        client: &Client,
        reason: &str,
    ) -> Result<(), AppointmentError> {
        self.dispatch("appointment.cancelled", json!({
            "appointment_id": appointment.id,
            "appointment_number": appointment.appointment_number,
            "branch_id": appointment.branch_id,
            "date": appointment.appointment_date,
            "time": appointment.appointment_time,
            "reason": reason,
            "recipient_name": client.full_name,
            "recipient_email": client.email,
            "recipient_phone": client.phone
        })).await
    }

    pub async fn send_reminder(
        &self,
        appointment: &Appointment,
        client: &Client,
    ) -> Result<(), AppointmentError> {
        self.dispatch("appointment.reminder", json!({
            "appointment_id": appointment.id,
            "appointment_number": appointment.appointment_number,
            "branch_id": appointment.branch_id,
            "date": appointment.appointment_date,
            "time": appointment.appointment_time,
            "recipient_name": client.full_name,
            "recipient_email": client.email,
            "recipient_phone": client.phone
        })).await
    }

    async fn dispatch(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppointmentError> {
        if self.base_url.is_empty() {
            debug!("Notification gateway not configured, skipping {} event", event);
            return Ok(());
        }

        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "event": event,
            "payload": payload
        });

        let response = self.http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppointmentError::ExternalServiceError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppointmentError::ExternalServiceError(format!(
                "Notification gateway returned {}: {}", status, text
            )));
        }

        info!("Dispatched {} notification for appointment", event);
        Ok(())
    }
}
