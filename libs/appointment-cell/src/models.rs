// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};
use std::fmt;

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

/// The one definition of appointment statuses and their storage ids. Every
/// other module depends on this enum; the numeric ids appear nowhere else.
///
/// Id 3 was an undefined gap in the legacy numbering; it is pinned down here
/// as InProgress: non-terminal and slot-blocking, reachable from Confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const fn id(&self) -> i16 {
        match self {
            AppointmentStatus::Pending => 1,
            AppointmentStatus::Confirmed => 2,
            AppointmentStatus::InProgress => 3,
            AppointmentStatus::Completed => 4,
            AppointmentStatus::Cancelled => 5,
        }
    }

    /// Completed and cancelled appointments accept no further transitions
    /// and release their slot.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// PostgREST filter selecting only slot-blocking appointments.
    pub fn non_terminal_filter() -> String {
        format!(
            "status_id=not.in.({},{})",
            AppointmentStatus::Completed.id(),
            AppointmentStatus::Cancelled.id()
        )
    }
}

impl TryFrom<i16> for AppointmentStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AppointmentStatus::Pending),
            2 => Ok(AppointmentStatus::Confirmed),
            3 => Ok(AppointmentStatus::InProgress),
            4 => Ok(AppointmentStatus::Completed),
            5 => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("Unknown appointment status id: {}", other)),
        }
    }
}

impl From<AppointmentStatus> for i16 {
    fn from(status: AppointmentStatus) -> Self {
        status.id()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub appointment_number: String,
    pub client_id: Uuid,
    pub branch_id: Uuid,
    pub appointment_type_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    #[serde(rename = "status_id")]
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub completed_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Whether this appointment still blocks its (branch, date, time) slot.
    pub fn blocks_slot(&self) -> bool {
        self.is_enabled && !self.status.is_terminal()
    }
}

/// Client identity as resolved from the directory; public flows key on the
/// opaque client_number printed on the client's bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub client_number: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleAppointmentRequest {
    pub client_id: Uuid,
    pub branch_id: Uuid,
    pub appointment_type_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicBookingRequest {
    pub client_number: String,
    pub branch_id: Uuid,
    pub appointment_type_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicCancelRequest {
    pub appointment_number: String,
    pub client_number: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentSearchQuery {
    pub branch_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

/// Minimal projection returned by the public verification endpoint; enough
/// for a QR display, nothing that leaks other clients' data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentVerification {
    pub appointment_number: String,
    pub branch_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub status: AppointmentStatus,
    pub client_full_name: String,
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    SundayNotAvailable,
    HolidayNotAvailable,
    PastDateNotAvailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub branch_id: Uuid,
    pub date: NaiveDate,
    pub available_times: Vec<String>,
    pub unavailable_reason: Option<UnavailableReason>,
    pub holiday_name: Option<String>,
}

impl AvailabilityResponse {
    pub fn closed(
        branch_id: Uuid,
        date: NaiveDate,
        reason: UnavailableReason,
        holiday_name: Option<String>,
    ) -> Self {
        Self {
            branch_id,
            date,
            available_times: Vec::new(),
            unavailable_reason: Some(reason),
            holiday_name,
        }
    }
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct BookingValidationRules {
    /// Fallback capacity when the MAX_APPOINTMENTS_PER_DAY setting is absent.
    pub default_max_appointments_per_day: i64,
    /// New bookings start Confirmed; flip off to require manual confirmation.
    pub auto_confirm: bool,
}

impl Default for BookingValidationRules {
    fn default() -> Self {
        Self {
            default_max_appointments_per_day: 50,
            auto_confirm: true,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Client not found")]
    ClientNotFound,

    #[error("Branch not found")]
    BranchNotFound,

    #[error("Appointment type not found")]
    AppointmentTypeNotFound,

    #[error("Invalid time format: {0} (expected HH:mm)")]
    InvalidTimeFormat(String),

    #[error("Appointments are not available on Sundays")]
    SundayNotAvailable,

    #[error("The branch is closed on this date: {name}")]
    HolidayNotAvailable { name: String },

    #[error("Appointments cannot be booked for past dates")]
    PastDateNotAvailable,

    #[error("The daily appointment capacity for this branch has been reached")]
    DailyCapacityExceeded,

    #[error("The requested time slot is no longer available")]
    SlotUnavailable,

    #[error("Appointment is already completed")]
    AlreadyCompleted,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("A cancelled appointment cannot be completed")]
    CannotCompleteCancelled,

    #[error("A completed appointment cannot be cancelled")]
    CannotCancelCompleted,

    #[error("Appointment is already deleted")]
    AlreadyDeleted,

    #[error("Appointment cannot transition from {0} to {1}")]
    InvalidStatusTransition(AppointmentStatus, AppointmentStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}
