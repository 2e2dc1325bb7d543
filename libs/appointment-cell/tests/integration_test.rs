use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use appointment_cell::router::appointment_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn upcoming(weekday: Weekday) -> NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(1);
    while date.weekday() != weekday {
        date = date + Duration::days(1);
    }
    date
}

#[tokio::test]
async fn availability_endpoint_is_public() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/holidays"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slot_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..Default::default()
    };
    let app = appointment_routes(config.to_arc());

    let uri = format!(
        "/availability?branch_id={}&date={}",
        Uuid::new_v4(),
        upcoming(Weekday::Mon)
    );
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn verification_endpoint_matches_number_pair() {
    let mock_server = MockServer::start().await;
    let client_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/clients"))
        .and(query_param("client_number", "eq.CL-100200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::client_response(
                &client_id.to_string(), "CL-100200", "Maria Gonzalez")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &client_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                "2025-03-10",
                "09:00",
                2,
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..Default::default()
    };
    let app = appointment_routes(config.to_arc());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/public/verify?appointment_number=APT-20250310-ABCD1234&client_number=CL-100200")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn staff_routes_reject_missing_token() {
    let config = TestConfig::default();
    let app = appointment_routes(config.to_arc());

    let response = app
        .oneshot(Request::builder().uri("/search").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn staff_routes_reject_expired_token() {
    let config = TestConfig::default();
    let user = TestUser::staff("clerk@example.com");
    let token = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/search")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn staff_can_search_with_valid_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..Default::default()
    };
    let user = TestUser::staff("clerk@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/search")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logical_delete_requires_admin_role() {
    let config = TestConfig::default();
    let user = TestUser::staff("clerk@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/{}", Uuid::new_v4()))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
