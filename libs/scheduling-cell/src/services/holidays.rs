// libs/scheduling-cell/src/services/holidays.rs
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{ApiStatusError, SupabaseClient};

use crate::models::{Holiday, HolidayType, ScheduleError, UpdateHolidayRequest};

pub struct HolidayCalendarService {
    supabase: Arc<SupabaseClient>,
}

impl HolidayCalendarService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn create_national_holiday(
        &self,
        date: NaiveDate,
        name: &str,
        auth_token: Option<&str>,
    ) -> Result<Holiday, ScheduleError> {
        self.create_holiday(date, name, HolidayType::National, None, auth_token).await
    }

    pub async fn create_company_holiday(
        &self,
        date: NaiveDate,
        name: &str,
        auth_token: Option<&str>,
    ) -> Result<Holiday, ScheduleError> {
        self.create_holiday(date, name, HolidayType::Company, None, auth_token).await
    }

    pub async fn create_local_holiday(
        &self,
        date: NaiveDate,
        name: &str,
        branch_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Holiday, ScheduleError> {
        self.create_holiday(date, name, HolidayType::Local, Some(branch_id), auth_token).await
    }

    /// Does any active holiday close this branch on this date? National and
    /// company holidays on the same date as a foreign-branch local holiday
    /// must not leak across branches, so the scope filter happens here.
    pub async fn is_holiday(
        &self,
        date: NaiveDate,
        branch_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Option<Holiday>, ScheduleError> {
        let path = format!("/rest/v1/holidays?date=eq.{}&active=eq.true", date);
        let holidays = self.fetch_holidays(&path, auth_token).await?;

        Ok(holidays.into_iter().find(|h| h.applies_to_branch(branch_id)))
    }

    pub async fn holidays_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        branch_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Vec<Holiday>, ScheduleError> {
        if start > end {
            return Err(ScheduleError::InvalidRange);
        }

        let path = format!(
            "/rest/v1/holidays?date=gte.{}&date=lte.{}&active=eq.true&order=date.asc",
            start, end
        );
        let mut holidays = self.fetch_holidays(&path, auth_token).await?;

        if let Some(branch_id) = branch_id {
            holidays.retain(|h| h.applies_to_branch(branch_id));
        }

        Ok(holidays)
    }

    pub async fn update_holiday(
        &self,
        holiday_id: Uuid,
        request: UpdateHolidayRequest,
        auth_token: Option<&str>,
    ) -> Result<Holiday, ScheduleError> {
        debug!("Updating holiday {}", holiday_id);

        let path = format!("/rest/v1/holidays?id=eq.{}", holiday_id);
        let existing = self.fetch_holidays(&path, auth_token).await?;
        if existing.is_empty() {
            return Err(ScheduleError::HolidayNotFound);
        }

        let mut update_data = serde_json::Map::new();
        if let Some(name) = request.name {
            update_data.insert("name".to_string(), json!(name));
        }
        if let Some(date) = request.date {
            if date < Utc::now().date_naive() {
                return Err(ScheduleError::DateInPast);
            }
            update_data.insert("date".to_string(), json!(date));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            auth_token,
            Some(Value::Object(update_data)),
            Some(headers),
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to update holiday".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse holiday: {}", e)))
            })
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn create_holiday(
        &self,
        date: NaiveDate,
        name: &str,
        holiday_type: HolidayType,
        branch_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Holiday, ScheduleError> {
        debug!("Creating {} holiday '{}' on {}", holiday_type, name, date);

        if date < Utc::now().date_naive() {
            return Err(ScheduleError::DateInPast);
        }

        // One active holiday per scope per date. Local scope includes the
        // branch in its key; national/company do not.
        let mut query_parts = vec![
            format!("date=eq.{}", date),
            format!("holiday_type=eq.{}", holiday_type),
            "active=eq.true".to_string(),
        ];
        if let Some(branch_id) = branch_id {
            query_parts.push(format!("branch_id=eq.{}", branch_id));
        }

        let path = format!("/rest/v1/holidays?{}", query_parts.join("&"));
        let existing = self.fetch_holidays(&path, auth_token).await?;
        if !existing.is_empty() {
            return Err(ScheduleError::DuplicateHoliday);
        }

        let now = Utc::now();
        let holiday_data = json!({
            "date": date,
            "name": name,
            "holiday_type": holiday_type,
            "branch_id": branch_id,
            "active": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/holidays",
            auth_token,
            Some(holiday_data),
            Some(headers),
        ).await.map_err(|e| {
            match e.downcast_ref::<ApiStatusError>() {
                Some(api_err) if api_err.status == 409 => ScheduleError::DuplicateHoliday,
                _ => ScheduleError::DatabaseError(e.to_string()),
            }
        })?;

        let holiday: Holiday = result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to create holiday".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse holiday: {}", e)))
            })?;

        info!("Holiday '{}' ({}) created on {}", holiday.name, holiday.holiday_type, holiday.date);
        Ok(holiday)
    }

    async fn fetch_holidays(
        &self,
        path: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<Holiday>, ScheduleError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            auth_token,
            None,
        ).await.map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(|v| serde_json::from_value(v))
            .collect::<Result<Vec<Holiday>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse holidays: {}", e)))
    }
}
