//! Integration tests for ForestWatch API endpoints.
//!
//! These tests verify the full request/response cycle through the HTTP API
//! without an imagery provider configured.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use forestwatch::api::{AppState, router};
use forestwatch::config::ServerConfig;

fn create_test_server() -> TestServer {
    let state = AppState::new(ServerConfig::default());
    TestServer::new(router(state)).unwrap()
}

/// 3x3 scene where only the center pixel has data in both rasters.
fn center_pixel_scene() -> Value {
    let gt = json!([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
    let mut past = vec![Value::Null; 9];
    let mut recent = vec![Value::Null; 9];
    past[4] = json!(0.6);
    recent[4] = json!(0.2);

    json!({
        "past": { "width": 3, "height": 3, "values": past, "geoTransform": gt },
        "recent": { "width": 3, "height": 3, "values": recent, "geoTransform": gt },
        "config": { "minRegionPixels": 1 }
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["imageryConfigured"], false);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_config_endpoint_reports_defaults() {
    let server = create_test_server();

    let response = server.get("/config").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["detection"]["changeThreshold"], -0.15);
    assert_eq!(body["detection"]["criticalThreshold"], -0.3);
    assert_eq!(body["detection"]["minRegionPixels"], 3);
    assert_eq!(body["windowDays"], 30);
    assert_eq!(body["rasterSize"], 512);
}

#[tokio::test]
async fn test_validate_coordinates_accepts_small_box() {
    let server = create_test_server();

    let response = server
        .post("/validate-coordinates")
        .json(&json!([-60.1, -3.1, -60.0, -3.0]))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["valid"], true);
    let area = body["areaKm2"].as_f64().unwrap();
    assert!(area > 100.0 && area < 150.0, "area was {}", area);
}

#[tokio::test]
async fn test_validate_coordinates_lists_every_error() {
    let server = create_test_server();

    let response = server
        .post("/validate-coordinates")
        .json(&json!([10.0, 95.0, 5.0, 91.0]))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["valid"], false);
    assert!(body["errors"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn test_validate_coordinates_wrong_arity() {
    let server = create_test_server();

    let response = server
        .post("/validate-coordinates")
        .json(&json!([1.0, 2.0, 3.0]))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["errors"][0].as_str().unwrap().contains("exactly 4"));
}

#[tokio::test]
async fn test_detect_center_pixel() {
    let server = create_test_server();

    let response = server.post("/detect").json(&center_pixel_scene()).await;

    response.assert_status_ok();
    let body: Value = response.json();
    let alerts = body["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);

    let alert = &alerts[0];
    assert_eq!(alert["id"], 1);
    assert_eq!(alert["severity"], "Critical");
    assert_eq!(alert["areaPixels"], 1);
    assert!((alert["avgNdviChange"].as_f64().unwrap() + 0.4).abs() < 1e-9);
    assert_eq!(alert["centerCoordinates"]["lon"], 1.5);
    assert_eq!(alert["centerCoordinates"]["lat"], -1.5);
    assert!(alert.get("seed").is_none());

    assert_eq!(body["summary"]["totalAlerts"], 1);
    assert_eq!(body["summary"]["criticalAlerts"], 1);
    assert_eq!(body["summary"]["changePercentage"], 100.0);
}

#[tokio::test]
async fn test_detect_dimension_mismatch_is_unprocessable() {
    let server = create_test_server();
    let gt = json!([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);

    let response = server
        .post("/detect")
        .json(&json!({
            "past": { "width": 2, "height": 1, "values": [0.5, 0.5], "geoTransform": gt },
            "recent": { "width": 1, "height": 2, "values": [0.5, 0.5], "geoTransform": gt }
        }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"], "detection_failed");
}

#[tokio::test]
async fn test_detect_invalid_config_is_unprocessable() {
    let server = create_test_server();
    let mut scene = center_pixel_scene();
    scene["config"] = json!({ "criticalThreshold": -0.1, "moderateThreshold": -0.2 });

    let response = server.post("/detect").json(&scene).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_detect_rejects_short_value_array() {
    let server = create_test_server();
    let gt = json!([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
    let raster = json!({ "width": 2, "height": 2, "values": [0.5], "geoTransform": gt });

    let response = server
        .post("/detect")
        .json(&json!({ "past": raster, "recent": raster }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_analyze_without_credentials_is_unavailable() {
    let server = create_test_server();

    let response = server
        .post("/analyze-deforestation")
        .json(&json!({ "bbox": [-60.1, -3.1, -60.0, -3.0] }))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"], "imagery_not_configured");
}

#[tokio::test]
async fn test_analyze_rejects_oversized_bbox() {
    let server = create_test_server();

    let response = server
        .post("/analyze-deforestation")
        .json(&json!({ "bbox": [0.0, 0.0, 2.0, 2.0] }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_image_search_validates_before_provider() {
    let server = create_test_server();

    let response = server
        .get("/images/search")
        .add_query_param("bbox", "1,2,3")
        .add_query_param("dateFrom", "2024-01-01")
        .add_query_param("dateTo", "2024-01-31")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get("/images/search")
        .add_query_param("bbox", "-60.1,-3.1,-60.0,-3.0")
        .add_query_param("dateFrom", "2024-01-01")
        .add_query_param("dateTo", "2024-01-31")
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
