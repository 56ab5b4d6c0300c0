//! The full rule matrix, driven through `#[derive(Payload)]`.

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use trellis_web::{handler_fn, App, Context, Engine, Payload};

async fn body_text(response: http::Response<trellis_web::ResponseBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[derive(Debug, Deserialize, Serialize, Payload)]
struct Profile {
    #[payload(body, required, min_length = 3, max_length = 20)]
    username: String,
    #[payload(body, min = 18, max = 130)]
    age: i64,
    #[payload(body, multiple_of = 0.5)]
    rating: f64,
    #[payload(body, min_items = 1, max_items = 3, unique_items)]
    interests: Vec<String>,
    #[payload(body, pattern = "^[A-Z]{2}-[0-9]{4}$")]
    license: String,
    #[payload(body, enumeration = "free,pro,enterprise")]
    plan: String,
    #[payload(body, format = "ipv4")]
    last_ip: String,
    #[payload(body, format = "duration")]
    session_ttl: String,
    #[payload(body, format = "uuid")]
    device_id: String,
    #[payload(body, format = "date-time")]
    created_at: String,
}

fn valid_profile() -> serde_json::Value {
    json!({
        "username": "ada_l",
        "age": 36,
        "rating": 4.5,
        "interests": ["math", "engines"],
        "license": "AB-1234",
        "plan": "pro",
        "last_ip": "10.0.0.7",
        "session_ttl": "2h45m",
        "device_id": "550e8400-e29b-41d4-a716-446655440000",
        "created_at": "2024-01-15T10:30:00Z"
    })
}

fn app() -> App {
    let mut engine = Engine::new();
    engine.post(
        "/profiles",
        handler_fn(|ctx: Context| async move {
            let profile: Profile = ctx.bind().await?;
            ctx.json(StatusCode::CREATED, &profile)
        }),
    );
    engine.bind().unwrap()
}

async fn submit(payload: serde_json::Value) -> (StatusCode, String) {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/profiles")
        .header("content-type", "application/json")
        .body(Bytes::from(payload.to_string()))
        .unwrap();
    let response = app.dispatch(request).await;
    let status = response.status();
    (status, body_text(response).await)
}

fn mutate(mut payload: serde_json::Value, key: &str, value: serde_json::Value) -> serde_json::Value {
    payload[key] = value;
    payload
}

#[tokio::test]
async fn the_valid_profile_passes_every_rule() {
    let (status, body) = submit(valid_profile()).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
}

#[tokio::test]
async fn string_length_bounds() {
    let (status, body) = submit(mutate(valid_profile(), "username", json!("ab"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("username"), "{body}");

    let long = "x".repeat(21);
    let (status, _) = submit(mutate(valid_profile(), "username", json!(long))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn numeric_bounds_are_inclusive() {
    let (status, _) = submit(mutate(valid_profile(), "age", json!(18))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = submit(mutate(valid_profile(), "age", json!(17))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = submit(mutate(valid_profile(), "age", json!(131))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn multiple_of_with_tolerance() {
    let (status, _) = submit(mutate(valid_profile(), "rating", json!(3.0))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = submit(mutate(valid_profile(), "rating", json!(3.3))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("rating"), "{body}");
}

#[tokio::test]
async fn slice_rules() {
    let (status, _) = submit(mutate(valid_profile(), "interests", json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        submit(mutate(valid_profile(), "interests", json!(["a", "b", "c", "d"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        submit(mutate(valid_profile(), "interests", json!(["same", "same"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("interests"), "{body}");
}

#[tokio::test]
async fn pattern_rule() {
    let (status, _) = submit(mutate(valid_profile(), "license", json!("ab-1234"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn enumeration_rule() {
    let (status, _) = submit(mutate(valid_profile(), "plan", json!("platinum"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // empty value passes the enum check (absence is not invalidity)
    let (status, _) = submit(mutate(valid_profile(), "plan", json!(""))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn format_rules() {
    let cases = [
        ("last_ip", "999.1.1.1"),
        ("session_ttl", "soon"),
        ("device_id", "not-a-uuid"),
        ("created_at", "yesterday"),
    ];
    for (field, bad) in cases {
        let (status, body) = submit(mutate(valid_profile(), field, json!(bad))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{field}");
        assert!(body.contains(field), "{field}: {body}");
    }
}

#[tokio::test]
async fn missing_required_field_reports_required() {
    let mut payload = valid_profile();
    payload.as_object_mut().unwrap().remove("username");
    let (status, body) = submit(payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("required"), "{body}");
}
