// libs/appointment-cell/src/services/reservation.rs
//
// Short-lived reservation locks over (branch, date, time) slot tuples.
// Booking holds a lock across its capacity/conflict checks and the insert,
// so two writers racing for the same tuple serialize on the lock row; the
// partial unique index on the appointments table remains the last line of
// defense if a lock expires mid-flight.

use chrono::{DateTime, NaiveDate, Utc, Duration};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::{ApiStatusError, SupabaseClient};

use crate::models::AppointmentError;

pub struct SlotReservationService {
    supabase: Arc<SupabaseClient>,
    lock_timeout_seconds: i64,
}

impl SlotReservationService {
    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            lock_timeout_seconds: 30,
        }
    }

    pub fn lock_key(branch_id: Uuid, date: NaiveDate, time: &str) -> String {
        format!("slot_{}_{}_{}", branch_id, date, time.replace(':', ""))
    }

    /// Try to take the lock. Returns false when another writer holds a
    /// still-valid lock on the same slot.
    pub async fn acquire(&self, lock_key: &str) -> Result<bool, AppointmentError> {
        match self.try_insert_lock(lock_key).await? {
            true => Ok(true),
            false => {
                // Lock row exists; if its holder died, clean it up and try once more.
                if self.cleanup_if_expired(lock_key).await? {
                    self.try_insert_lock(lock_key).await
                } else {
                    Ok(false)
                }
            }
        }
    }

    pub async fn release(&self, lock_key: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/booking_locks?lock_key=eq.{}", lock_key);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            None,
            None,
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(format!("Lock release failed: {}", e)))?;

        debug!("Booking lock released: {}", lock_key);
        Ok(())
    }

    /// Delete all expired lock rows. Run opportunistically; a crashed
    /// process must not leave a slot permanently unbookable.
    pub async fn cleanup_expired(&self) -> Result<usize, AppointmentError> {
        let now = Utc::now();
        let path = format!(
            "/rest/v1/booking_locks?expires_at=lt.{}",
            urlencoding::encode(&now.to_rfc3339())
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let removed: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            None,
            None,
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(format!("Lock cleanup failed: {}", e)))?;

        if !removed.is_empty() {
            info!("Cleaned up {} expired booking locks", removed.len());
        }
        Ok(removed.len())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn try_insert_lock(&self, lock_key: &str) -> Result<bool, AppointmentError> {
        let now = Utc::now();
        let lock_data = json!({
            "lock_key": lock_key,
            "acquired_at": now.to_rfc3339(),
            "expires_at": (now + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
            "process_id": format!("booking_{}", Uuid::new_v4())
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        match self.supabase.request_with_headers::<Vec<Value>>(
            Method::POST,
            "/rest/v1/booking_locks",
            None,
            Some(lock_data),
            Some(headers),
        ).await {
            Ok(_) => {
                debug!("Booking lock acquired: {}", lock_key);
                Ok(true)
            }
            // The lock_key column is unique; 409 means the slot is being
            // booked by someone else right now.
            Err(e) => match e.downcast_ref::<ApiStatusError>() {
                Some(api_err) if api_err.status == 409 => Ok(false),
                _ => Err(AppointmentError::DatabaseError(format!("Lock acquire failed: {}", e))),
            },
        }
    }

    async fn cleanup_if_expired(&self, lock_key: &str) -> Result<bool, AppointmentError> {
        let path = format!("/rest/v1/booking_locks?lock_key=eq.{}", lock_key);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(format!("Lock check failed: {}", e)))?;

        let Some(lock) = rows.first() else {
            // Holder released between our insert attempt and this check.
            return Ok(true);
        };

        let expired = lock
            .get("expires_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|expires_at| expires_at.with_timezone(&Utc) < Utc::now())
            .unwrap_or(false);

        if expired {
            self.release(lock_key).await?;
            return Ok(true);
        }

        Ok(false)
    }
}
