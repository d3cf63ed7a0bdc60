//! HTTP surface tests over the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use foreman_core::{Coordinator, ManualClock};
use foreman_mocks::MemoryStore;
use foreman_server::config::{
    AuthConfig, Config, CoordinationConfig, DatabaseConfig, LogFormat, LoggingConfig,
    ServerConfig,
};
use foreman_server::http::{app, AppState};

fn test_config(auth_enabled: bool) -> Config {
    Config {
        server: ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 4177,
            repo_root: None,
        },
        database: DatabaseConfig::default(),
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Compact,
        },
        auth: AuthConfig {
            enabled: auth_enabled,
            api_keys: vec!["secret-key".to_string()],
        },
        coordination: CoordinationConfig {
            strict_mode: true,
            rate_limit_rpm: 10_000,
        },
    }
}

fn router(auth_enabled: bool) -> Router {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(MemoryStore::new());
    let coord = Arc::new(Coordinator::new(store, clock));
    let state = Arc::new(AppState::new(coord, Arc::new(test_config(auth_enabled))));
    app(state)
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn status_reports_ok_envelope() {
    let app = router(false);
    let response = app
        .oneshot(request(Method::GET, "/api/status", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert!(body["data"]["version"].is_string());
    assert_eq!(body["data"]["summary"]["tasksTotal"], 0);
}

#[tokio::test]
async fn task_create_then_fetch_round_trip() {
    let app = router(false);

    let created = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/tasks",
            Some(json!({"title": "Fix login", "priority": "high"})),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    let created = body_json(created).await;
    let task_id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["status"], "backlog");
    assert_eq!(created["data"]["priority"], "high");

    let fetched = app
        .oneshot(request(
            Method::GET,
            &format!("/api/tasks/{task_id}"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let fetched = body_json(fetched).await;
    assert_eq!(fetched["data"]["title"], "Fix login");
}

#[tokio::test]
async fn validation_errors_are_400_with_error_envelope() {
    let app = router(false);
    let response = app
        .oneshot(request(
            Method::POST,
            "/api/tasks",
            Some(json!({"title": ""})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("title"));
}

#[tokio::test]
async fn missing_task_is_404() {
    let app = router(false);
    let response = app
        .oneshot(request(Method::GET, "/api/tasks/nope-missing", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn claim_conflict_is_409_but_still_ok() {
    let app = router(false);

    let first = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/claims",
            Some(json!({"agentId": "agent-a", "files": ["src/x.ts"], "ttlSeconds": 900})),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/claims",
            Some(json!({"agentId": "agent-b", "files": ["src/x.ts"], "ttlSeconds": 900})),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["conflictsWith"][0], "agent-a");

    // The claim list still shows only the first holder.
    let claims = app
        .oneshot(request(Method::GET, "/api/claims", None))
        .await
        .unwrap();
    let claims = body_json(claims).await;
    assert_eq!(claims["data"].as_array().unwrap().len(), 1);
    assert_eq!(claims["data"][0]["agentId"], "agent-a");
}

#[tokio::test]
async fn release_claims_via_delete_with_body() {
    let app = router(false);
    app.clone()
        .oneshot(request(
            Method::POST,
            "/api/claims",
            Some(json!({"agentId": "agent-a", "files": ["src/x.ts"], "ttlSeconds": 900})),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(request(
            Method::DELETE,
            "/api/claims",
            Some(json!({"agentId": "agent-a"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["released"], 1);
}

#[tokio::test]
async fn auth_distinguishes_missing_from_invalid_keys() {
    let app = router(true);

    let missing = app
        .clone()
        .oneshot(request(Method::GET, "/api/status", None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let invalid = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/api/status")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::FORBIDDEN);

    let valid = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/api/status")
                .header("x-api-key", "secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(valid.status(), StatusCode::OK);
}

#[tokio::test]
async fn feed_streams_recent_events() {
    let app = router(false);
    app.clone()
        .oneshot(request(
            Method::POST,
            "/api/tasks",
            Some(json!({"title": "Feed me"})),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(request(Method::GET, "/api/feed?limit=10", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let events = body["data"].as_array().unwrap();
    assert!(!events.is_empty());
    assert!(events
        .iter()
        .any(|e| e["type"] == "task.created"));
}

#[tokio::test]
async fn update_task_applies_strict_mode_by_default() {
    let app = router(false);

    let t1 = body_json(
        app.clone()
            .oneshot(request(
                Method::POST,
                "/api/tasks",
                Some(json!({"title": "T1"})),
            ))
            .await
            .unwrap(),
    )
    .await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let t2 = body_json(
        app.clone()
            .oneshot(request(
                Method::POST,
                "/api/tasks",
                Some(json!({"title": "T2"})),
            ))
            .await
            .unwrap(),
    )
    .await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    app.clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/tasks/{t2}/dependencies"),
            Some(json!({"dependsOnTaskId": t1})),
        ))
        .await
        .unwrap();

    // strict_mode=true enforces dependencies unless overridden.
    let blocked = app
        .clone()
        .oneshot(request(
            Method::PATCH,
            &format!("/api/tasks/{t2}"),
            Some(json!({"status": "in_progress"})),
        ))
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::BAD_REQUEST);

    let overridden = app
        .oneshot(request(
            Method::PATCH,
            &format!("/api/tasks/{t2}"),
            Some(json!({"status": "in_progress", "enforceDependencies": false})),
        ))
        .await
        .unwrap();
    assert_eq!(overridden.status(), StatusCode::OK);
    let body = body_json(overridden).await;
    assert!(!body["data"]["warnings"].as_array().unwrap().is_empty());
}
