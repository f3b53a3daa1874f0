mod common;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use common::TestContext;
use hospital_api::{
    auth,
    create_router,
    models::{AppointmentStatus, Role},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(
    router: Router,
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let ctx = TestContext::new();
    let response = create_router(ctx.state.clone())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let ctx = TestContext::new();
    let routes = [
        (Method::GET, "/patients"),
        (Method::POST, "/patients"),
        (Method::GET, "/doctors"),
        (Method::POST, "/doctors"),
        (Method::GET, "/appointments?me=patient"),
        (Method::POST, "/appointments"),
        (Method::PUT, "/appointments"),
    ];

    for (method, uri) in routes {
        let (status, body) = send(
            create_router(ctx.state.clone()),
            method.clone(),
            uri,
            None,
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }
}

#[tokio::test]
async fn test_bad_tokens_are_unauthorized() {
    let ctx = TestContext::new();
    let user = ctx.user("Alice", Role::Admin).await;
    let foreign = auth::issue_token(user.id, user.role, "some-other-secret", 7).unwrap();
    let expired =
        auth::issue_token(user.id, user.role, &ctx.state.config.jwt_secret, -2).unwrap();
    let valid_but_unprefixed =
        auth::issue_token(user.id, user.role, &ctx.state.config.jwt_secret, 7).unwrap();

    for authorization in [
        format!("Bearer {foreign}"),
        format!("Bearer {expired}"),
        valid_but_unprefixed,
        "Bearer not.a.jwt".to_string(),
    ] {
        let (status, _) = send(
            create_router(ctx.state.clone()),
            Method::GET,
            "/doctors",
            Some(&authorization),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_register_then_login_over_http() {
    let ctx = TestContext::new();

    let (status, body) = send(
        create_router(ctx.state.clone()),
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "name": "Dr. Who",
            "email": "who@hospital.test",
            "password": "tardis",
            "role": "doctor"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "DOCTOR");
    assert!(body["user"].get("password").is_none());
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["token"].is_string());

    let (status, body) = send(
        create_router(ctx.state.clone()),
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "who@hospital.test", "password": "tardis" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        create_router(ctx.state.clone()),
        Method::POST,
        "/doctors",
        Some(&format!("Bearer {token}")),
        Some(json!({ "specialization": "Time", "department": "Temporal" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["userId"].is_string());

    let (status, body) = send(
        create_router(ctx.state.clone()),
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "who@hospital.test", "password": "dalek" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Invalid credentials" }));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let ctx = TestContext::new();
    let request = Request::post("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = create_router(ctx.state.clone())
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_booking_and_confirming_over_http() {
    let ctx = TestContext::new();
    let (patient_user, _) = ctx.patient("Alice").await;
    let (doctor_user, doctor) = ctx.doctor("Bob").await;
    let patient_auth = ctx.bearer(&patient_user);
    let doctor_auth = ctx.bearer(&doctor_user);

    let (status, booked) = send(
        create_router(ctx.state.clone()),
        Method::POST,
        "/appointments",
        Some(&patient_auth),
        Some(json!({ "date": Utc::now().to_rfc3339(), "doctorId": doctor.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booked["status"], "PENDING");
    assert_eq!(booked["doctor"]["user"]["name"], "Bob");
    assert_eq!(booked["patient"]["user"]["name"], "Alice");

    let (status, listed) = send(
        create_router(ctx.state.clone()),
        Method::GET,
        "/appointments?me=doctor&date=today",
        Some(&doctor_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, updated) = send(
        create_router(ctx.state.clone()),
        Method::PUT,
        "/appointments",
        Some(&doctor_auth),
        Some(json!({ "id": booked["id"], "status": "CONFIRMED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "CONFIRMED");

    let (status, body) = send(
        create_router(ctx.state.clone()),
        Method::PUT,
        "/appointments",
        Some(&doctor_auth),
        Some(json!({ "id": booked["id"], "status": "PENDING" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_missing_me_parameter_over_http() {
    let ctx = TestContext::new();
    let (user, patient) = ctx.patient("Carol").await;
    let (_, doctor) = ctx.doctor("Dan").await;
    ctx.appointment(&patient, &doctor, Utc::now(), AppointmentStatus::Pending);

    let (status, body) = send(
        create_router(ctx.state.clone()),
        Method::GET,
        "/appointments",
        Some(&ctx.bearer(&user)),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Missing or invalid 'me' parameter. Must be 'patient' or 'doctor'"
    );
}

#[tokio::test]
async fn test_internal_errors_hide_details() {
    let ctx = TestContext::failing();
    let user = auth::AuthUser {
        id: Uuid::new_v4(),
        role: Role::Admin,
    };

    let (status, body) = send(
        create_router(ctx.state.clone()),
        Method::GET,
        "/doctors",
        Some(&ctx.bearer(&user)),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Something went wrong" }));
}
