// libs/appointment-cell/src/services/clients.rs
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, Client};

/// Lookup against the client directory. Public booking and cancellation key
/// on the opaque client number; staff flows use the id directly.
pub struct ClientDirectoryService {
    supabase: Arc<SupabaseClient>,
}

impl ClientDirectoryService {
    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_by_id(
        &self,
        client_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Client, AppointmentError> {
        let path = format!("/rest/v1/clients?id=eq.{}&is_active=eq.true", client_id);
        self.fetch_one(&path, auth_token).await
    }

    pub async fn get_by_number(
        &self,
        client_number: &str,
        auth_token: Option<&str>,
    ) -> Result<Client, AppointmentError> {
        debug!("Resolving client by number");
        let path = format!(
            "/rest/v1/clients?client_number=eq.{}&is_active=eq.true",
            urlencoding::encode(client_number)
        );
        self.fetch_one(&path, auth_token).await
    }

    async fn fetch_one(
        &self,
        path: &str,
        auth_token: Option<&str>,
    ) -> Result<Client, AppointmentError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            auth_token,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(AppointmentError::ClientNotFound)
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse client: {}", e)))
            })
    }
}
