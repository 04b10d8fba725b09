use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use bingo_battles_back::{
    config::AppConfig,
    dao::session_store::memory::MemorySessionStore,
    routes,
    state::AppState,
};

fn app() -> Router {
    app_with(AppConfig::default())
}

fn app_with(config: AppConfig) -> Router {
    routes::router(AppState::with_store(
        config,
        Arc::new(MemorySessionStore::new()),
    ))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_session(app: &Router, settings: Value) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/sessions",
        Some(json!({
            "host_id": "host",
            "host_name": "Host",
            "color": "blue",
            "settings": settings
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn healthcheck_reports_memory_backend() {
    let (status, body) = send(&app(), Method::GET, "/healthcheck", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn degraded_mode_returns_503() {
    let app = routes::router(AppState::new(AppConfig::default()));
    let (status, body) = send(&app, Method::GET, "/sessions", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "STORAGE_UNAVAILABLE");
}

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let (status, body) = send(
        &app(),
        Method::POST,
        "/sessions",
        Some(json!({
            "host_id": "host",
            "host_name": "Host",
            "settings": { "board_size": 9 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    let (status, body) = send(&app(), Method::POST, "/sessions", Some(json!({ "host_id": 3 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn board_preview_has_n_squared_cells() {
    let (status, body) = send(
        &app(),
        Method::POST,
        "/boards/generate",
        Some(json!({ "board_size": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cells"].as_array().unwrap().len(), 16);
}

#[tokio::test]
async fn full_game_over_http() {
    let app = app();
    let session = create_session(&app, json!({ "board_size": 3, "max_players": 2 })).await;
    let id = session["id"].as_str().unwrap().to_string();
    let code = session["session_code"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        "/sessions/join",
        Some(json!({ "session_code": code, "user_id": "alice", "display_name": "Alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["result"], "joined");
    assert_ne!(body["player"]["color"], "blue");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/start"),
        Some(json!({ "user_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/start"),
        Some(json!({ "user_id": "host" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");

    for (version, index) in [0, 1, 2].into_iter().enumerate() {
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/sessions/{id}/cells/{index}/mark"),
            Some(json!({ "user_id": "host", "expected_version": version })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["board"]["version"], version + 1);
    }

    let (status, body) = send(&app, Method::GET, &format!("/sessions/{id}/winner"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_winner"], true);
    assert_eq!(body["winner"], 0);
    assert_eq!(body["winning_color"], "blue");

    let (_, body) = send(&app, Method::GET, &format!("/sessions/{id}"), None).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["winner_id"], "host");
}

#[tokio::test]
async fn stale_board_write_returns_current_version() {
    let app = app();
    let session = create_session(&app, json!({ "board_size": 3 })).await;
    let id = session["id"].as_str().unwrap().to_string();
    send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/start"),
        Some(json!({ "user_id": "host" })),
    )
    .await;

    let patch = |version: u64| {
        json!({
            "user_id": "host",
            "expected_version": version,
            "updates": [{ "index": 4, "text": "Free space" }]
        })
    };
    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/sessions/{id}/board-state"),
        Some(patch(0)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/sessions/{id}/board-state"),
        Some(patch(0)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "VERSION_CONFLICT");
    assert_eq!(body["current_version"], 1);

    let (_, board) = send(&app, Method::GET, &format!("/sessions/{id}/board-state"), None).await;
    assert_eq!(board["version"], 1);
    assert_eq!(board["current_state"][4]["text"], "Free space");
}

#[tokio::test]
async fn queue_errors_over_http() {
    let mut config = AppConfig::default();
    config.queue.max_size = 1;
    let app = app_with(config);
    let session = create_session(&app, json!({ "board_size": 3, "allow_queue": true })).await;
    let id = session["id"].as_str().unwrap().to_string();

    let (status, entry) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/queue"),
        Some(json!({ "user_id": "a", "player_name": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["position"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{id}/queue"),
        Some(json!({ "user_id": "b", "player_name": "B" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "QUEUE_FULL");
    assert_eq!(body["message"], "Queue is full");

    let entry_id = entry["id"].as_str().unwrap();
    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/queue/{entry_id}"),
        Some(json!({ "user_id": "a", "position": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_POSITION");
    assert_eq!(body["message"], "Invalid queue position");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/queue/{entry_id}/approve"),
        Some(json!({ "user_id": "host" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/queue/{entry_id}"),
        Some(json!({ "user_id": "mallory" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/queue/{entry_id}"),
        Some(json!({ "user_id": "host" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_session_is_404() {
    let (status, body) = send(
        &app(),
        Method::GET,
        "/sessions/00000000-0000-0000-0000-000000000000/presence",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
