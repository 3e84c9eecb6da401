use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use rv_config::Config;
use rv_core::arguments::encode_variable_name;
use rv_storage::{NewRun, Storage};
use rv_web::{AppState, router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::ServiceExt;

type Received = Arc<Mutex<Vec<(String, String, serde_json::Value)>>>;

/// Stand-in for the job submission API that records what it was sent.
async fn start_submission_api() -> (String, Received) {
    async fn handler(
        State(received): State<Received>,
        Path(instrument): Path<String>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        received.lock().await.push((instrument, auth, body));
        Json(serde_json::json!({"message": "ok"}))
    }

    let received = Received::default();
    let app = Router::new()
        .route("/runs/batch/:instrument", post(handler))
        .with_state(received.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), received)
}

#[tokio::test]
async fn test_batch_run_submission() {
    let temp_dir = std::env::temp_dir().join(format!("rv-test-{}", uuid::Uuid::new_v4()));
    let scripts = temp_dir.join("scripts").join("MARI");
    std::fs::create_dir_all(&scripts).unwrap();
    std::fs::write(
        scripts.join("reduce_vars.json"),
        r#"{"standard_vars": {"ei": 10, "sum_runs": false}, "advanced_vars": {"mask": "default.xml"}}"#,
    )
    .unwrap();

    let storage = Storage::new(Some(temp_dir.join("test.db"))).await.unwrap();
    storage.create_instrument("MARI").await.unwrap();
    storage.create_run(NewRun::new("MARI", 1234567, 100)).await.unwrap();

    let (api_url, received) = start_submission_api().await;
    let mut config = Config::default();
    config.paths.scripts_root = temp_dir.join("scripts");
    config.submission.api_url = api_url;
    config.submission.auth_token = Some("secret".to_string());
    let state = AppState::new(Arc::new(storage), config, false).unwrap();

    let form = format!(
        "runs=100-102%2C+105-105&run_description=calibration&user_id=42&var-standard-{}=25",
        encode_variable_name("ei").replace('=', "%3D")
    );
    let request = Request::builder()
        .method("POST")
        .uri("/runs/batch/MARI")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["runs"], serde_json::json!([100, 101, 102, 105]));

    let received = received.lock().await;
    assert_eq!(received.len(), 1);
    let (instrument, auth, payload) = &received[0];
    assert_eq!(instrument, "MARI");
    assert_eq!(auth, "Token secret");
    assert_eq!(payload["runs"], serde_json::json!([100, 101, 102, 105]));
    assert_eq!(payload["user_id"], 42);
    assert_eq!(payload["description"], "calibration");
    assert_eq!(payload["reduction_arguments"]["standard_vars"]["ei"], 25);
    assert_eq!(payload["reduction_arguments"]["standard_vars"]["sum_runs"], false);
    assert_eq!(
        payload["reduction_arguments"]["advanced_vars"]["mask"],
        "default.xml"
    );

    // Cleanup
    std::fs::remove_dir_all(&temp_dir).unwrap();
}

#[tokio::test]
async fn test_unknown_variable_is_rejected() {
    let temp_dir = std::env::temp_dir().join(format!("rv-test-{}", uuid::Uuid::new_v4()));
    let scripts = temp_dir.join("scripts").join("MARI");
    std::fs::create_dir_all(&scripts).unwrap();
    std::fs::write(scripts.join("reduce_vars.json"), r#"{"standard_vars": {"ei": 10}}"#).unwrap();

    let storage = Storage::new(Some(temp_dir.join("test.db"))).await.unwrap();
    storage.create_instrument("MARI").await.unwrap();

    let mut config = Config::default();
    config.paths.scripts_root = temp_dir.join("scripts");
    config.submission.auth_token = Some("secret".to_string());
    let state = AppState::new(Arc::new(storage), config, false).unwrap();

    let form = format!(
        "runs=100&var-advanced-{}=1",
        encode_variable_name("not_a_variable").replace('=', "%3D")
    );
    let request = Request::builder()
        .method("POST")
        .uri("/runs/batch/MARI")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("not_a_variable"));

    // Cleanup
    std::fs::remove_dir_all(&temp_dir).unwrap();
}
