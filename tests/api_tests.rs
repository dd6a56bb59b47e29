mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{registry, ScriptedProber};
use scan_orchestrator::server::router;

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn submit_poll_and_fetch_results() {
    let reg = registry(ScriptedProber::all_closed().with_open("10.0.0.2", &[80]));
    let app = router(reg.clone());

    let (code, body) = call(
        &app,
        post_json(
            "/api/scan",
            json!({"targets": "10.0.0.1-2", "scan_type": "custom", "custom_ports": "80,22"}),
        ),
    )
    .await;
    assert_eq!(code, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["ports"], json!([22, 80]));
    assert_eq!(body["targets"], json!(["10.0.0.1", "10.0.0.2"]));
    let id = body["scan_id"].as_str().unwrap().to_string();

    tokio::time::timeout(Duration::from_secs(5), reg.wait(&id))
        .await
        .unwrap()
        .unwrap();

    let (code, status) = call(&app, get(&format!("/api/scan/{id}/status"))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(status["state"], "completed");
    assert_eq!(status["progress"], 100.0);

    let (code, doc) = call(&app, get(&format!("/api/scan/{id}/results"))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(doc["results"]["10.0.0.2"]["ports"]["80"]["status"], "open");
    assert_eq!(doc["insights"][0]["type"], "statistics");
}

#[tokio::test]
async fn request_errors_are_400() {
    let app = router(registry(ScriptedProber::all_closed()));

    let (code, body) = call(
        &app,
        post_json("/api/scan", json!({"targets": "10.0.0.300"})),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("invalid target"));

    let (code, _) = call(
        &app,
        post_json(
            "/api/scan",
            json!({"targets": "10.0.0.1", "scan_type": "custom", "custom_ports": "70000"}),
        ),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_bodies_use_the_error_envelope() {
    let reg = registry(ScriptedProber::all_closed());
    let app = router(reg.clone());

    let (code, body) = call(
        &app,
        post_json("/api/scan", json!({"targets": "10.0.0.1", "scan_type": "stealth"})),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("stealth"));

    let (code, body) = call(&app, post_json("/api/scan", json!({"scan_type": "quick"}))).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let raw = Request::builder()
        .method("POST")
        .uri("/api/scan")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (code, body) = call(&app, raw).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(reg.is_empty().await);
}

#[tokio::test]
async fn unknown_scan_is_404() {
    let app = router(registry(ScriptedProber::all_closed()));
    for req in [
        get("/api/scan/nope/status"),
        get("/api/scan/nope/results"),
        post_json("/api/scan/nope/cancel", json!({})),
    ] {
        let (code, body) = call(&app, req).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }
}

#[tokio::test]
async fn history_and_scan_types() {
    let reg = registry(ScriptedProber::all_closed());
    let app = router(reg.clone());

    let (_, empty) = call(&app, get("/api/scan-history")).await;
    assert_eq!(empty, json!({"status": "success", "history": []}));

    for t in ["10.0.0.1", "10.0.0.2"] {
        let (_, body) = call(
            &app,
            post_json(
                "/api/scan",
                json!({"targets": t, "scan_type": "custom", "custom_ports": "22"}),
            ),
        )
        .await;
        reg.wait(body["scan_id"].as_str().unwrap()).await.unwrap();
    }

    let (code, body) = call(&app, get("/api/scan-history?limit=1")).await;
    assert_eq!(code, StatusCode::OK);
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["targets"], json!(["10.0.0.2"]));

    let (code, types) = call(&app, get("/api/scan-types")).await;
    assert_eq!(code, StatusCode::OK);
    let names: Vec<&str> = types
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["scan_type"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["quick", "standard", "comprehensive", "custom"]);
}
