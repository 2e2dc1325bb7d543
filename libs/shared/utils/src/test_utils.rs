use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub notification_service_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            notification_service_url: String::new(),
        }
    }
}

impl TestConfig {
    /// Config pointing every outbound call at a single mock server.
    pub fn with_mock_server(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            notification_service_url: format!("{}/notify", url),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            notification_service_url: self.notification_service_url.clone(),
            notification_api_token: "test-notification-token".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "staff".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn staff(email: &str) -> Self {
        Self::new(email, "staff")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST row payloads used by cell tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn branch_response(branch_id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": branch_id,
            "name": name,
            "address": "100 Main St",
            "is_active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn client_response(client_id: &str, client_number: &str, full_name: &str) -> serde_json::Value {
        json!({
            "id": client_id,
            "client_number": client_number,
            "full_name": full_name,
            "email": "client@example.com",
            "phone": "+1-555-0100",
            "is_active": true
        })
    }

    pub fn appointment_type_response(type_id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": type_id,
            "name": name,
            "is_active": true
        })
    }

    pub fn slot_config_response(
        slot_id: &str,
        branch_id: &str,
        slot_time: &str,
        appointment_type_id: Option<&str>,
    ) -> serde_json::Value {
        json!({
            "id": slot_id,
            "branch_id": branch_id,
            "appointment_type_id": appointment_type_id,
            "slot_time": slot_time,
            "active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn holiday_response(
        holiday_id: &str,
        date: &str,
        name: &str,
        holiday_type: &str,
        branch_id: Option<&str>,
    ) -> serde_json::Value {
        json!({
            "id": holiday_id,
            "date": date,
            "name": name,
            "holiday_type": holiday_type,
            "branch_id": branch_id,
            "active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        client_id: &str,
        branch_id: &str,
        appointment_type_id: &str,
        date: &str,
        time: &str,
        status_id: i16,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "appointment_number": format!("APT-{}-ABCD1234", date.replace('-', "")),
            "client_id": client_id,
            "branch_id": branch_id,
            "appointment_type_id": appointment_type_id,
            "appointment_date": date,
            "appointment_time": time,
            "status_id": status_id,
            "notes": null,
            "cancellation_reason": null,
            "completed_date": null,
            "is_active": true,
            "is_enabled": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }
}
