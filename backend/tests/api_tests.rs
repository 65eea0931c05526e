//! HTTP API tests
//!
//! Drives the router end to end over the in-memory store.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use fifo_ledger::create_app;

fn app() -> Router {
    create_app(test_state())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_sale_and_report_flow() {
    let app = app();

    for (quantity, price, time) in [(10, 5, "2024-01-01 01:00:00"), (10, 7, "2024-01-01 03:00:00")] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/supplies",
            Some(json!({"barcode": BARCODE, "quantity": quantity, "price": price, "supply_time": time})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, sale) = send(
        &app,
        Method::POST,
        "/api/v1/sales",
        Some(json!({"barcode": BARCODE, "quantity": 15, "price": 10, "sale_time": "2024-01-01 02:00:00"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sale["total_revenue"], 150);
    assert_eq!(sale["total_net_profit"], 65);
    assert_eq!(sale["lms_remaining_quantity"], 5);
    assert_eq!(sale["sale_time"], "2024-01-01 02:00:00");

    let uri = format!(
        "/api/v1/reports?barcode={}&fromTime=2024-01-01%2000:00:00&toTime=2024-01-01%2023:59:59",
        BARCODE
    );
    let (status, report) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["revenue"], 150);
    assert_eq!(report["netProfit"], 65);
    assert_eq!(report["quantity"], 15);

    let uri = format!(
        "/api/v1/reports?barcode={}&fromTime=2023-01-01%2000:00:00&toTime=2023-12-31%2023:59:59",
        BARCODE
    );
    let (status, report) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["revenue"], 0);
    assert_eq!(report["netProfit"], 0);
    assert_eq!(report["quantity"], 0);
}

#[tokio::test]
async fn test_put_requires_every_field_but_patch_does_not() {
    let app = app();
    let (_, sale) = send(
        &app,
        Method::POST,
        "/api/v1/sales",
        Some(json!({"barcode": BARCODE, "quantity": 2, "price": 10, "sale_time": "2024-01-01 02:00:00"})),
    )
    .await;
    let uri = format!("/api/v1/sales/{}", sale["id"]);

    let (status, body) = send(&app, Method::PUT, &uri, Some(json!({"quantity": 3}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(&app, Method::PATCH, &uri, Some(json!({"quantity": 3}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_quantity"], 3);
    assert_eq!(body["backorder_quantity"], 3);

    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_report_validation() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/v1/reports?barcode=1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "fromTime");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/reports?barcode=1&fromTime=2024-02-01%2000:00:00&toTime=2024-01-01%2000:00:00",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/v1/reports?barcode=abc&fromTime=2024-01-01%2000:00:00&toTime=2024-01-02%2000:00:00",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/v1/reports?barcode=1&fromTime=2024-01-01T00:00:00&toTime=2024-01-02%2000:00:00",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_and_rebuild() {
    let app = app();
    for hour in 1..=3 {
        send(
            &app,
            Method::POST,
            "/api/v1/sales",
            Some(json!({
                "barcode": BARCODE,
                "quantity": 1,
                "price": 4,
                "sale_time": format!("2024-01-01 0{}:00:00", hour)
            })),
        )
        .await;
    }

    let uri = format!("/api/v1/sales?barcode={}&per_page=2", BARCODE);
    let (status, page) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"].as_array().unwrap().len(), 2);
    assert_eq!(page["pagination"]["total_items"], 3);
    assert_eq!(page["pagination"]["total_pages"], 2);

    let uri = format!("/api/v1/ledger/{}/rebuild", BARCODE);
    let (status, summary) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["sales_rewritten"], 3);
    assert_eq!(summary["backordered_sales"], 3);
}

#[tokio::test]
async fn test_csv_export() {
    let app = app();
    send(
        &app,
        Method::POST,
        "/api/v1/supplies",
        Some(json!({"barcode": BARCODE, "quantity": 4, "price": 2, "supply_time": "2024-01-01 00:00:00"})),
    )
    .await;

    let request = Request::builder()
        .uri(format!("/api/v1/supplies?barcode={}&format=csv", BARCODE))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/csv");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("id,barcode,quantity,price,supply_time,first_matched_sale_id"));
    assert!(text.contains("2024-01-01 00:00:00"));
}
