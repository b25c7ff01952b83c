//! HTTP adapter integration tests.
//!
//! Run with: TEST_DATABASE_URL=postgres://... cargo test -p inventory-service -- --ignored

mod common;

use common::{spawn_app, ADMIN_TOKEN};
use reqwest::StatusCode;
use serde_json::{json, Value};
use serial_test::serial;

#[tokio::test]
#[ignore]
async fn health_and_ready_report_ok() {
    let app = spawn_app().await;

    let health = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert!(health.headers().contains_key("x-request-id"));
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "inventory-service");

    let ready = app.client.get(app.url("/ready")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn movement_lifecycle_over_http() {
    let app = spawn_app().await;
    let part = app.create_part("H-1", 10).await;

    let created = app
        .client
        .post(app.url("/movements"))
        .json(&json!({
            "part_id": part.part_id,
            "quantity_delta": 4,
            "issued_to": "Crew A",
            "reason_code": "replacement"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let entry: Value = created.json().await.unwrap();
    let entry_id = entry["entry_id"].as_str().unwrap().to_string();
    assert_eq!(entry["reason_code"], "replacement");
    assert_eq!(app.quantity(part.part_id).await, 6);

    let patched = app
        .client
        .patch(app.url(&format!("/movements/{}", entry_id)))
        .json(&json!({ "quantity_delta": 6, "notes": "swapped pump" }))
        .send()
        .await
        .unwrap();
    assert_eq!(patched.status(), StatusCode::OK);
    assert_eq!(app.quantity(part.part_id).await, 4);

    let deleted = app
        .client
        .delete(app.url(&format!("/movements/{}", entry_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = app
        .client
        .get(app.url(&format!("/movements/{}", entry_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.quantity(part.part_id).await, 10);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn insufficient_stock_is_422_with_amounts() {
    let app = spawn_app().await;
    let part = app.create_part("H-2", 2).await;

    let response = app
        .client
        .post(app.url("/movements"))
        .json(&json!({ "part_id": part.part_id, "quantity_delta": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["details"]["available"], 2);
    assert_eq!(body["details"]["requested"], 5);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn fractional_quantity_is_rejected_before_any_write() {
    let app = spawn_app().await;
    let part = app.create_part("H-3", 5).await;

    let response = app
        .client
        .post(app.url("/movements"))
        .json(&json!({ "part_id": part.part_id, "quantity_delta": 2.5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.quantity(part.part_id).await, 5);
    assert_eq!(app.db.count_entries().await.unwrap(), 0);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn rejected_bulk_lists_failures() {
    let app = spawn_app().await;
    let a = app.create_part("H-4", 5).await;
    let b = app.create_part("H-5", 2).await;

    let response = app
        .client
        .post(app.url("/movements/bulk"))
        .json(&json!({
            "lines": [
                { "part_id": a.part_id, "quantity_delta": 3 },
                { "part_id": b.part_id, "quantity_delta": 5 }
            ],
            "issued_to": "Crew C"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    let failures = body["details"]["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["line"], 1);
    assert_eq!(failures[0]["reason"], "insufficient_stock");
    assert_eq!(failures[0]["available"], 2);
    assert_eq!(app.quantity(a.part_id).await, 5);

    let applied = app
        .client
        .post(app.url("/movements/bulk"))
        .json(&json!({
            "lines": [
                { "part_id": a.part_id, "quantity_delta": 3 },
                { "part_id": b.part_id, "quantity_delta": 2 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(applied.status(), StatusCode::CREATED);
    let body: Value = applied.json().await.unwrap();
    assert_eq!(body["lines_applied"], 2);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn recount_reports_each_line() {
    let app = spawn_app().await;
    let a = app.create_part("H-6", 1).await;

    let response = app
        .client
        .post(app.url("/recounts"))
        .json(&json!({
            "lines": [
                { "part_id": a.part_id, "absolute_quantity": 12 },
                { "part_id": a.part_id, "absolute_quantity": -3 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["applied"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["lines"][0]["outcome"]["status"], "applied");
    assert_eq!(body["lines"][1]["outcome"]["reason"], "invalid_quantity");
    assert_eq!(app.quantity(a.part_id).await, 12);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn recount_with_fractional_line_applies_the_rest() {
    let app = spawn_app().await;
    let a = app.create_part("H-10", 1).await;
    let b = app.create_part("H-11", 1).await;
    let c = app.create_part("H-12", 1).await;

    let response = app
        .client
        .post(app.url("/recounts"))
        .json(&json!({
            "lines": [
                { "part_id": a.part_id, "absolute_quantity": 10 },
                { "part_id": b.part_id, "absolute_quantity": 2.5 },
                { "part_id": c.part_id, "absolute_quantity": 3 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["applied"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["lines"][0]["outcome"]["status"], "applied");
    assert_eq!(body["lines"][1]["outcome"]["reason"], "invalid_quantity");
    assert_eq!(body["lines"][1]["outcome"]["requested"], 2.5);
    assert_eq!(body["lines"][2]["outcome"]["status"], "applied");
    assert_eq!(app.quantity(a.part_id).await, 10);
    assert_eq!(app.quantity(b.part_id).await, 1);
    assert_eq!(app.quantity(c.part_id).await, 3);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn reset_requires_admin_token() {
    let app = spawn_app().await;
    let reset_url = app.url("/dashboard/monthly-total/reset");

    let anonymous = app.client.post(&reset_url).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .client
        .post(&reset_url)
        .header("x-admin-token", "nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = app
        .client
        .post(&reset_url)
        .header("x-admin-token", ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let marker: Value = ok.json().await.unwrap();
    assert_eq!(marker["version"], 1);

    let total: Value = app
        .client
        .get(app.url("/dashboard/monthly-total"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(total["total"], 0);
    assert_eq!(total["degraded"], false);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn part_endpoints_cover_intake_and_removal() {
    let app = spawn_app().await;

    let created = app
        .client
        .post(app.url("/parts"))
        .json(&json!({
            "business_id": "H-7",
            "name": "Ballast 32W",
            "initial_quantity": 3,
            "reorder_level": 5,
            "unit_cost": "12.40"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let part: Value = created.json().await.unwrap();
    let part_id = part["part_id"].as_str().unwrap().to_string();

    let duplicate = app
        .client
        .post(app.url("/parts"))
        .json(&json!({ "business_id": "H-7", "name": "Dup" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let low: Value = app
        .client
        .get(app.url("/parts/low-stock"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(low.as_array().unwrap().len(), 1);

    let removed: Value = app
        .client
        .delete(app.url(&format!("/parts/{}", part_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(removed["outcome"], "deleted");

    let missing = app
        .client
        .get(app.url(&format!("/parts/{}", part_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    app.cleanup().await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn metrics_endpoint_exposes_ledger_series() {
    let app = spawn_app().await;
    let part = app.create_part("H-8", 3).await;

    app.client
        .post(app.url("/movements"))
        .json(&json!({ "part_id": part.part_id, "quantity_delta": 1 }))
        .send()
        .await
        .unwrap();

    let text = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("inventory_movements_total"));
    assert!(text.contains("inventory_db_query_duration_seconds"));

    app.cleanup().await;
}
