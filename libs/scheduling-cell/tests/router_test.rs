use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path};

use scheduling_cell::router::scheduling_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn slot_body(branch_id: Uuid) -> Body {
    Body::from(
        serde_json::to_string(&json!({
            "branch_id": branch_id,
            "time": "09:00",
            "appointment_type_id": null
        }))
        .unwrap(),
    )
}

#[tokio::test]
async fn configuration_routes_reject_missing_token() {
    let config = TestConfig::default();
    let app = scheduling_routes(config.to_arc());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/slots")
                .header("content-type", "application/json")
                .body(slot_body(Uuid::new_v4()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn slot_configuration_requires_admin_role() {
    let config = TestConfig::default();
    let user = TestUser::staff("clerk@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

    let app = scheduling_routes(config.to_arc());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/slots")
                .header("Authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body(slot_body(Uuid::new_v4()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_can_create_slot_configuration() {
    let mock_server = MockServer::start().await;
    let branch_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::branch_response(&branch_id.to_string(), "Downtown Branch")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slot_configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/time_slot_configs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::slot_config_response(
                &Uuid::new_v4().to_string(),
                &branch_id.to_string(),
                "09:00",
                None,
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig {
        supabase_url: mock_server.uri(),
        ..Default::default()
    };
    let user = TestUser::admin("ops@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

    let app = scheduling_routes(config.to_arc());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/slots")
                .header("Authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body(slot_body(branch_id))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
