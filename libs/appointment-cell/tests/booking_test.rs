use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};
use assert_matches::assert_matches;

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, ScheduleAppointmentRequest,
};
use appointment_cell::services::booking::AppointmentBookingService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn service_for(mock_server: &MockServer) -> AppointmentBookingService {
    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..Default::default()
    }
    .to_app_config();
    AppointmentBookingService::new(&config)
}

fn upcoming(weekday: Weekday) -> NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(1);
    while date.weekday() != weekday {
        date = date + Duration::days(1);
    }
    date
}

fn booking_request(
    client_id: Uuid,
    branch_id: Uuid,
    appointment_type_id: Uuid,
    date: NaiveDate,
    time: &str,
) -> ScheduleAppointmentRequest {
    ScheduleAppointmentRequest {
        client_id,
        branch_id,
        appointment_type_id,
        date,
        time: time.to_string(),
        notes: None,
    }
}

/// Mounts the lookups every successful booking performs: empty holiday
/// calendar, existing client/branch/type, and a grantable slot lock.
async fn mount_reference_mocks(
    mock_server: &MockServer,
    client_id: Uuid,
    branch_id: Uuid,
    type_id: Uuid,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/holidays"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::client_response(
                &client_id.to_string(), "CL-100200", "Maria Gonzalez")
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::branch_response(&branch_id.to_string(), "Downtown Branch")
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_type_response(
                &type_id.to_string(), "Service Connection")
        ])))
        .mount(mock_server)
        .await;

    mount_lock_mocks(mock_server).await;
}

/// No MAX_APPOINTMENTS_PER_DAY override: the in-code default applies.
async fn mount_default_capacity_setting(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/system_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

async fn mount_lock_mocks(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {
                "lock_key": "slot_test",
                "acquired_at": Utc::now().to_rfc3339(),
                "expires_at": (Utc::now() + Duration::seconds(30)).to_rfc3339(),
                "process_id": "booking_test"
            }
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

/// Capacity count response: PostgREST reports the total in Content-Range.
fn capacity_response(booked: i64) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-range", format!("*/{}", booked).as_str())
        .set_body_json(json!([]))
}

async fn mount_free_slot_mocks(mock_server: &MockServer, time: &str) {
    // Capacity: nothing booked yet for the day
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status_id", "neq.5"))
        .respond_with(capacity_response(0))
        .mount(mock_server)
        .await;

    // Conflict: the requested tuple is free
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_time", format!("eq.{}", time)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn schedule_appointment_creates_confirmed_record() {
    let mock_server = MockServer::start().await;
    let (client_id, branch_id, type_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let date = upcoming(Weekday::Mon);

    mount_reference_mocks(&mock_server, client_id, branch_id, type_id).await;
    mount_default_capacity_setting(&mock_server).await;
    mount_free_slot_mocks(&mock_server, "09:00").await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &client_id.to_string(),
                &branch_id.to_string(),
                &type_id.to_string(),
                &date.to_string(),
                "09:00",
                AppointmentStatus::Confirmed.id(),
            )
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let appointment = service
        .schedule_appointment(
            booking_request(client_id, branch_id, type_id, date, "09:00"),
            Some("test-token"),
        )
        .await
        .expect("booking should succeed");

    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
    assert!(appointment.appointment_number.starts_with("APT-"));
    assert_eq!(appointment.appointment_time, "09:00");
}

#[tokio::test]
async fn booking_on_sunday_is_rejected_without_data_access() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let result = service
        .schedule_appointment(
            booking_request(
                Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(),
                upcoming(Weekday::Sun), "09:00",
            ),
            Some("test-token"),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::SundayNotAvailable));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn booking_on_a_holiday_is_rejected_with_the_holiday_name() {
    let mock_server = MockServer::start().await;
    let date = upcoming(Weekday::Mon);

    Mock::given(method("GET"))
        .and(path("/rest/v1/holidays"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::holiday_response(
                &Uuid::new_v4().to_string(),
                &date.to_string(),
                "Constitution Day",
                "national",
                None,
            )
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service
        .schedule_appointment(
            booking_request(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), date, "09:00"),
            Some("test-token"),
        )
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::HolidayNotAvailable { ref name }) if name == "Constitution Day"
    );
}

#[tokio::test]
async fn booking_a_past_date_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/holidays"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let mut date = Utc::now().date_naive() - Duration::days(1);
    while date.weekday() == Weekday::Sun {
        date = date - Duration::days(1);
    }

    let service = service_for(&mock_server);
    let result = service
        .schedule_appointment(
            booking_request(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), date, "09:00"),
            Some("test-token"),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::PastDateNotAvailable));
}

#[tokio::test]
async fn booking_with_malformed_time_is_rejected() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let result = service
        .schedule_appointment(
            booking_request(
                Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(),
                upcoming(Weekday::Mon), "half past nine",
            ),
            Some("test-token"),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidTimeFormat(_)));
}

#[tokio::test]
async fn daily_capacity_ceiling_is_enforced() {
    let mock_server = MockServer::start().await;
    let (client_id, branch_id, type_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let date = upcoming(Weekday::Mon);

    mount_reference_mocks(&mock_server, client_id, branch_id, type_id).await;

    // Cap tuned down to 1 via system settings, one appointment already booked
    Mock::given(method("GET"))
        .and(path("/rest/v1/system_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "key": "MAX_APPOINTMENTS_PER_DAY", "value": "1" }
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status_id", "neq.5"))
        .respond_with(capacity_response(1))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service
        .schedule_appointment(
            booking_request(client_id, branch_id, type_id, date, "10:00"),
            Some("test-token"),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::DailyCapacityExceeded));
}

#[tokio::test]
async fn occupied_slot_is_rejected() {
    let mock_server = MockServer::start().await;
    let (client_id, branch_id, type_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let date = upcoming(Weekday::Mon);

    mount_reference_mocks(&mock_server, client_id, branch_id, type_id).await;
    mount_default_capacity_setting(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status_id", "neq.5"))
        .respond_with(capacity_response(3))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_time", "eq.09:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &branch_id.to_string(),
                &type_id.to_string(),
                &date.to_string(),
                "09:00",
                AppointmentStatus::Confirmed.id(),
            )
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service
        .schedule_appointment(
            booking_request(client_id, branch_id, type_id, date, "09:00"),
            Some("test-token"),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::SlotUnavailable));
}

#[tokio::test]
async fn unique_index_conflict_on_insert_maps_to_slot_unavailable() {
    let mock_server = MockServer::start().await;
    let (client_id, branch_id, type_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let date = upcoming(Weekday::Mon);

    mount_reference_mocks(&mock_server, client_id, branch_id, type_id).await;
    mount_default_capacity_setting(&mock_server).await;
    mount_free_slot_mocks(&mock_server, "09:00").await;

    // A concurrent writer won the tuple between our check and the insert
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"uq_appointments_active_slot\""
        })))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service
        .schedule_appointment(
            booking_request(client_id, branch_id, type_id, date, "09:00"),
            Some("test-token"),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::SlotUnavailable));
}

#[tokio::test]
async fn concurrent_bookings_for_one_tuple_yield_exactly_one_winner() {
    let mock_server = MockServer::start().await;
    let (client_id, branch_id, type_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let date = upcoming(Weekday::Mon);

    // Reference data, without the default always-grant lock mocks
    Mock::given(method("GET"))
        .and(path("/rest/v1/holidays"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::client_response(
                &client_id.to_string(), "CL-100200", "Maria Gonzalez")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::branch_response(&branch_id.to_string(), "Downtown Branch")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_type_response(
                &type_id.to_string(), "Service Connection")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/system_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // The slot lock is granted exactly once; every later attempt collides
    // with the still-valid holder.
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {
                "lock_key": "slot_contended",
                "acquired_at": Utc::now().to_rfc3339(),
                "expires_at": (Utc::now() + Duration::seconds(30)).to_rfc3339(),
                "process_id": "booking_winner"
            }
        ])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"booking_locks_lock_key_key\""
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "lock_key": "slot_contended",
                "acquired_at": Utc::now().to_rfc3339(),
                "expires_at": (Utc::now() + Duration::seconds(30)).to_rfc3339(),
                "process_id": "booking_winner"
            }
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    mount_free_slot_mocks(&mock_server, "09:00").await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &client_id.to_string(),
                &branch_id.to_string(),
                &type_id.to_string(),
                &date.to_string(),
                "09:00",
                AppointmentStatus::Confirmed.id(),
            )
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let request = booking_request(client_id, branch_id, type_id, date, "09:00");

    let attempts: Vec<_> = (0..5)
        .map(|_| service.schedule_appointment(request.clone(), Some("test-token")))
        .collect();
    let results = futures::future::join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent booking may succeed");

    for result in results.into_iter().filter(|r| r.is_err()) {
        assert_matches!(result, Err(AppointmentError::SlotUnavailable));
    }
}

#[tokio::test]
async fn failed_confirmation_notice_does_not_unwind_the_booking() {
    let mock_server = MockServer::start().await;
    let (client_id, branch_id, type_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let date = upcoming(Weekday::Mon);

    mount_reference_mocks(&mock_server, client_id, branch_id, type_id).await;
    mount_default_capacity_setting(&mock_server).await;
    mount_free_slot_mocks(&mock_server, "09:00").await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &client_id.to_string(),
                &branch_id.to_string(),
                &type_id.to_string(),
                &date.to_string(),
                "09:00",
                AppointmentStatus::Confirmed.id(),
            )
        ])))
        .mount(&mock_server)
        .await;

    // Notification gateway is down
    Mock::given(method("POST"))
        .and(path("/notify/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "gateway unavailable"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    let service = AppointmentBookingService::new(&config);

    let appointment = service
        .schedule_appointment(
            booking_request(client_id, branch_id, type_id, date, "09:00"),
            Some("test-token"),
        )
        .await
        .expect("booking must stand even when the notice fails");

    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
}
