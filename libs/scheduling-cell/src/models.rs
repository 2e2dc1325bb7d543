// libs/scheduling-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

// ==============================================================================
// SLOT CATALOG MODELS
// ==============================================================================

/// A configured bookable time-of-day for a branch, optionally restricted to
/// one appointment type. Deactivated rows are kept for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlotConfig {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub appointment_type_id: Option<Uuid>,
    pub slot_time: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeSlotConfig {
    /// Parsed time-of-day; configs are validated at creation, so a stored
    /// row that fails to parse is treated as corrupt data by callers.
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        parse_slot_time(&self.slot_time)
    }
}

/// Strict `HH:mm` parser (00-23 : 00-59). Rejects single-digit hours and
/// anything with trailing content, which `%H:%M` alone would let through.
pub fn parse_slot_time(value: &str) -> Option<NaiveTime> {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return None;
    }
    if !bytes.iter().enumerate().all(|(i, b)| i == 2 || b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddSlotRequest {
    pub branch_id: Uuid,
    pub time: String,
    pub appointment_type_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkAddSlotsRequest {
    pub branch_id: Uuid,
    pub appointment_type_id: Option<Uuid>,
    pub times: Vec<String>,
}

/// Outcome of a best-effort bulk insert: one malformed entry must not block
/// the rest of the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAddSlotsResult {
    pub created: usize,
    pub skipped: usize,
    pub errors: Vec<BulkSlotError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSlotError {
    pub time: String,
    pub reason: String,
}

// ==============================================================================
// HOLIDAY CALENDAR MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayType {
    National,
    Local,
    Company,
}

impl fmt::Display for HolidayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HolidayType::National => write!(f, "national"),
            HolidayType::Local => write!(f, "local"),
            HolidayType::Company => write!(f, "company"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub id: Uuid,
    pub date: NaiveDate,
    pub name: String,
    pub holiday_type: HolidayType,
    pub branch_id: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Holiday {
    /// National and company holidays close every branch; a local holiday
    /// closes only its own.
    pub fn applies_to_branch(&self, branch_id: Uuid) -> bool {
        match self.holiday_type {
            HolidayType::National | HolidayType::Company => true,
            HolidayType::Local => self.branch_id == Some(branch_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHolidayRequest {
    pub date: NaiveDate,
    pub name: String,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateHolidayRequest {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HolidayRangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub branch_id: Option<Uuid>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid time format: {0} (expected HH:mm)")]
    InvalidTimeFormat(String),

    #[error("An active slot already exists for this branch and time")]
    DuplicateSlot,

    #[error("Slot configuration not found")]
    SlotNotFound,

    #[error("Slot configuration is already inactive")]
    AlreadyInactive,

    #[error("Branch not found")]
    BranchNotFound,

    #[error("Appointment type not found")]
    AppointmentTypeNotFound,

    #[error("Holiday date cannot be in the past")]
    DateInPast,

    #[error("An active holiday of this scope already exists on this date")]
    DuplicateHoliday,

    #[error("Holiday not found")]
    HolidayNotFound,

    #[error("Invalid date range: start is after end")]
    InvalidRange,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
