//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use edge_agent::api::ApiServerBuilder;
use edge_agent::node::NodeMode;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{TestAgent, register_node};

const API_KEY: &str = "test-api-key";

/// Build a test API router over a fresh agent
fn build_test_router(agent: &TestAgent) -> Router {
    ApiServerBuilder::new(
        agent.db.clone(),
        0,
        Arc::clone(&agent.pipeline),
        agent.output.clone(),
    )
    .api_key(Some(API_KEY.to_string()))
    .build()
    .router()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {API_KEY}"))
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {API_KEY}"))
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn sensor_request(poll_interval: i64) -> Value {
    json!({
        "microservice": "org/sensor-svc/1.0/amd64",
        "attributes": { "pollInterval": poll_interval },
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let agent = TestAgent::new();
    let app = build_test_router(&agent);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_ready_endpoint() {
    let agent = TestAgent::new();
    let app = build_test_router(&agent);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["checks"]["database"]["status"], "ok");
    // No node registered yet
    assert_eq!(json["checks"]["node"]["status"], "unavailable");
}

#[tokio::test]
async fn test_microservice_requires_auth() {
    let agent = TestAgent::new();
    register_node(&agent.db, NodeMode::WorkloadBased);
    let app = build_test_router(&agent);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/microservice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unregistered_node_is_failed_dependency() {
    let agent = TestAgent::new();
    let app = build_test_router(&agent);

    let response = app
        .clone()
        .oneshot(get("/api/microservice/config"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FAILED_DEPENDENCY);
    assert_eq!(json_body(response).await["stage"], "node");

    let response = app
        .oneshot(post("/api/microservice/config", &sensor_request(30)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FAILED_DEPENDENCY);
    assert!(agent.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_options_advertises_allowed_methods() {
    let agent = TestAgent::new();
    let app = build_test_router(&agent);

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/microservice/config")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["allow"].to_str().unwrap(),
        "GET, POST, OPTIONS"
    );
}

#[tokio::test]
async fn test_register_and_list() {
    let agent = TestAgent::new();
    register_node(&agent.db, NodeMode::WorkloadBased);
    let app = build_test_router(&agent);

    let response = app
        .clone()
        .oneshot(post("/api/microservice/config", &sensor_request(30)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["microservice"], "org/sensor-svc/1.0/amd64");
    assert_eq!(created["policy"]["properties"][0]["name"], "pollInterval");
    assert_eq!(created["policy"]["properties"][0]["value"], 30);

    let response = app.clone().oneshot(get("/api/microservice")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = json_body(response).await;
    assert_eq!(listing["microservices"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(get("/api/microservice/config"))
        .await
        .unwrap();
    let configs = json_body(response).await;
    assert_eq!(configs["config"][0]["attributes"]["pollInterval"], 30);
    assert_eq!(configs["config"][0]["auto_upgrade"], true);

    let response = app.oneshot(get("/api/microservice/policy")).await.unwrap();
    let policies = json_body(response).await;
    assert!(policies["org/sensor-svc/1.0/amd64"].is_object());
}

#[tokio::test]
async fn test_duplicate_is_conflict_until_forced() {
    let agent = TestAgent::new();
    register_node(&agent.db, NodeMode::WorkloadBased);
    let app = build_test_router(&agent);

    let response = app
        .clone()
        .oneshot(post("/api/microservice/config", &sensor_request(30)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(post("/api/microservice/config", &sensor_request(60)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["stage"], "existing-record");

    let response = app
        .oneshot(post("/api/microservice/config?force=true", &sensor_request(60)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        json_body(response).await["policy"]["properties"][0]["value"],
        60
    );
}

#[tokio::test]
async fn test_validation_error_names_attribute() {
    let agent = TestAgent::new();
    register_node(&agent.db, NodeMode::WorkloadBased);
    let app = build_test_router(&agent);

    let response = app
        .oneshot(post(
            "/api/microservice/config",
            &json!({ "microservice": "org/sensor-svc/1.0/amd64", "attributes": {} }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["stage"], "attributes");
    assert_eq!(json["input"], "pollInterval");
}

#[tokio::test]
async fn test_dependency_failure_is_server_error() {
    let agent = TestAgent::new();
    register_node(&agent.db, NodeMode::WorkloadBased);
    let app = build_test_router(&agent);

    let response = app
        .oneshot(post(
            "/api/microservice/config",
            &json!({ "microservice": "org/broken-svc/1.0/amd64" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["stage"], "dependencies");
    assert!(json.get("input").is_none());
}

#[tokio::test]
async fn test_single_get_is_bad_request() {
    let agent = TestAgent::new();
    register_node(&agent.db, NodeMode::WorkloadBased);
    let app = build_test_router(&agent);

    let response = app
        .oneshot(get("/api/microservice/org-sensor-svc"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_service_node_sees_empty_config() {
    let agent = TestAgent::new();
    register_node(&agent.db, NodeMode::WorkloadBased);
    agent
        .pipeline
        .register(&serde_json::to_vec(&sensor_request(30)).unwrap(), false)
        .await
        .unwrap();

    // Node switches to the service model
    register_node(&agent.db, NodeMode::ServiceBased);
    let app = build_test_router(&agent);

    let response = app
        .clone()
        .oneshot(get("/api/microservice/config"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "config": [] }));

    let response = app.oneshot(get("/api/microservice/policy")).await.unwrap();
    assert_eq!(json_body(response).await, json!({}));
}

#[tokio::test]
async fn test_node_registration_round_trip() {
    let agent = TestAgent::new();
    let app = build_test_router(&agent);

    let response = app.clone().oneshot(get("/api/node")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FAILED_DEPENDENCY);

    let response = app
        .clone()
        .oneshot(post(
            "/api/node",
            &json!({ "node_id": "node-7", "org": "org", "token": "s3cret" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(get("/api/node")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["node_id"], "node-7");
    assert_eq!(json["mode"], "workload");
    assert!(json.get("token").is_none());
}

#[tokio::test]
async fn test_node_registration_rejects_bad_body() {
    let agent = TestAgent::new();
    let app = build_test_router(&agent);

    let response = app
        .oneshot(post("/api/node", &json!({ "node_id": "node-7" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["input"], "node");
}
