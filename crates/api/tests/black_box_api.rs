use std::sync::Arc;

use forgemrp_api::app::{router, services::AppServices};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over an in-memory store, bound to an ephemeral port.
        let app = router(Arc::new(AppServices::in_memory()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        let text = res.text().await.unwrap();
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap()
        };
        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, Some(body)).await
    }

    async fn receive(&self, part: &str, qty: u32) {
        let (status, _) = self
            .post(
                &format!("/inventory/{part}/transactions"),
                json!({ "kind": "receive", "quantity": qty, "reference": "PO-1" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn bom(&self, parent: &str, child: &str, qty_per: u32) {
        let (status, _) = self
            .put(&format!("/bom/{parent}/{child}"), json!({ "qty_per": qty_per }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn work_order(&self, assembly: &str, quantity: u32) -> String {
        let (status, body) = self
            .post(
                "/workorders",
                json!({ "assembly": assembly, "quantity": quantity, "status": "open" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn transition(&self, id: &str, to: &str) -> (StatusCode, Value) {
        self.put(&format!("/workorders/{id}"), json!({ "status": to }))
            .await
    }

    /// `(on_hand, reserved)` for a part.
    async fn stock(&self, part: &str) -> (f64, f64) {
        let (status, body) = self.get(&format!("/inventory/{part}")).await;
        assert_eq!(status, StatusCode::OK);
        (
            body["on_hand"].as_f64().unwrap(),
            body["reserved"].as_f64().unwrap(),
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn line<'a>(report: &'a Value, component: &str) -> &'a Value {
    report["lines"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["component"] == component)
        .unwrap()
}

#[tokio::test]
async fn health_reports_backend() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "in_memory");
}

#[tokio::test]
async fn kit_then_compete_then_complete() {
    let srv = TestServer::spawn().await;
    srv.bom("ASSY-1", "P", 1).await;
    srv.receive("P", 10).await;

    // Scenario 1: enough stock.
    let first = srv.work_order("ASSY-1", 5).await;
    let (status, report) = srv.post(&format!("/workorders/{first}/kit"), json!(null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "kitted");
    assert_eq!(srv.stock("P").await, (10.0, 5.0));

    // Scenario 2: a competing order only gets what is left.
    let second = srv.work_order("ASSY-1", 8).await;
    let (status, report) = srv.post(&format!("/workorders/{second}/kit"), json!(null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "partial");
    assert_eq!(line(&report, "P")["kitted"].as_f64(), Some(5.0));
    assert_eq!(line(&report, "P")["shortfall"].as_f64(), Some(3.0));
    assert_eq!(srv.stock("P").await, (10.0, 10.0));

    // Scenario 3: completing the first order consumes only its own claim.
    assert_eq!(srv.transition(&first, "in_progress").await.0, StatusCode::OK);
    let (status, body) = srv.transition(&first, "completed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["completed_at"].is_string());
    assert_eq!(srv.stock("P").await, (5.0, 5.0));
    assert_eq!(srv.stock("ASSY-1").await, (5.0, 0.0));

    let (_, history) = srv.get("/inventory/P/transactions").await;
    let kinds: Vec<_> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, ["receive", "issue"]);
}

#[tokio::test]
async fn cancel_releases_without_touching_on_hand() {
    let srv = TestServer::spawn().await;
    srv.bom("ASSY-2", "P", 7).await;
    srv.receive("P", 20).await;

    // Scenario 4.
    let wo = srv.work_order("ASSY-2", 1).await;
    srv.post(&format!("/workorders/{wo}/kit"), json!(null)).await;
    assert_eq!(srv.stock("P").await, (20.0, 7.0));

    let (status, body) = srv.transition(&wo, "cancelled").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settlement"]["kind"], "released");
    assert_eq!(srv.stock("P").await, (20.0, 0.0));

    let (_, reservations) = srv.get(&format!("/workorders/{wo}/reservations")).await;
    assert!(reservations.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_transition_is_rejected_and_status_kept() {
    let srv = TestServer::spawn().await;
    let wo = srv.work_order("ASSY-3", 1).await;

    let (status, body) = srv.transition(&wo, "completed").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (_, body) = srv.get(&format!("/workorders/{wo}")).await;
    assert_eq!(body["status"], "open");

    let (status, _) = srv.transition(&wo, "launched").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_serial_conflicts_across_orders() {
    let srv = TestServer::spawn().await;
    let a = srv.work_order("ASSY-4", 2).await;
    let b = srv.work_order("ASSY-4", 2).await;

    // Scenario 5.
    let (status, body) = srv
        .post(&format!("/workorders/{a}/serials"), json!({ "serial_number": "SN-001" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "building");

    let (status, _) = srv
        .post(&format!("/workorders/{b}/serials"), json!({ "serial_number": "SN-001" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, serials_a) = srv.get(&format!("/workorders/{a}/serials")).await;
    let (_, serials_b) = srv.get(&format!("/workorders/{b}/serials")).await;
    assert_eq!(serials_a.as_array().unwrap().len(), 1);
    assert!(serials_b.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn generated_serial_uses_assembly_prefix() {
    let srv = TestServer::spawn().await;
    let wo = srv.work_order("PCA-MAIN-V1.0", 1).await;

    // Scenario 6: no body at all.
    let res = srv
        .client
        .post(format!("{}/workorders/{wo}/serials", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let serial = body["serial_number"].as_str().unwrap();
    assert!(serial.starts_with("PCA"));
    assert!(serial.len() >= 15);

    // Reverse trace back to the order and its assembly.
    let (status, trace) = srv.get(&format!("/serials/{serial}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trace["work_order_id"], wo.as_str());
    assert_eq!(trace["assembly"], "PCA-MAIN-V1.0");

    let (status, unit) = srv
        .put(&format!("/serials/{serial}"), json!({ "status": "testing" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unit["status"], "testing");

    let (status, _) = srv
        .put(&format!("/serials/{serial}"), json!({ "status": "building" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn delete_cascades_only_own_serials() {
    let srv = TestServer::spawn().await;
    srv.bom("ASSY-5", "P", 2).await;
    srv.receive("P", 10).await;
    let doomed = srv.work_order("ASSY-5", 2).await;
    let kept = srv.work_order("ASSY-5", 1).await;
    srv.post(&format!("/workorders/{doomed}/kit"), json!(null)).await;
    srv.post(&format!("/workorders/{doomed}/serials"), json!({ "serial_number": "D-1" }))
        .await;
    srv.post(&format!("/workorders/{kept}/serials"), json!({ "serial_number": "K-1" }))
        .await;

    let (status, _) = srv.send(reqwest::Method::DELETE, &format!("/workorders/{doomed}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(srv.get(&format!("/workorders/{doomed}")).await.0, StatusCode::NOT_FOUND);
    assert_eq!(srv.get("/serials/D-1").await.0, StatusCode::NOT_FOUND);
    assert_eq!(srv.get("/serials/K-1").await.0, StatusCode::OK);
    assert_eq!(srv.stock("P").await, (10.0, 0.0));
}

#[tokio::test]
async fn validation_errors_are_400_and_unknown_ids_404() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post("/workorders", json!({ "assembly": "ASSY-6", "quantity": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = srv
        .post("/inventory/P/transactions", json!({ "kind": "teleport", "quantity": 1 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv.get("/workorders/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv
        .post("/workorders/0190a5a0-0000-7000-8000-000000000000/kit", json!(null))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Issuing more than is on hand breaks the ledger invariant.
    let (status, _) = srv
        .post("/inventory/P/transactions", json!({ "kind": "issue", "quantity": 1 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn multi_level_explosion() {
    let srv = TestServer::spawn().await;
    srv.bom("TOP", "SUB", 2).await;
    srv.bom("SUB", "LEAF", 3).await;
    srv.bom("TOP", "LEAF", 1).await;

    let (status, body) = srv.get("/bom/TOP/explode?qty=2").await;
    assert_eq!(status, StatusCode::OK);
    let reqs = body.as_array().unwrap();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0]["component"], "LEAF");
    assert_eq!(reqs[0]["required"].as_f64(), Some(14.0));

    srv.bom("LEAF", "TOP", 1).await;
    let (status, body) = srv.get("/bom/TOP/explode").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invariant_violation");
}

#[tokio::test]
async fn due_date_is_kept_unless_explicitly_nulled() {
    let srv = TestServer::spawn().await;
    let id = srv.work_order("ASSY-1", 1).await;
    let path = format!("/workorders/{id}");

    let (status, body) = srv.put(&path, json!({ "due_date": "2025-03-14" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["due_date"], "2025-03-14");

    let (_, body) = srv.put(&path, json!({ "notes": "rush" })).await;
    assert_eq!(body["due_date"], "2025-03-14");

    let (status, body) = srv.put(&path, json!({ "due_date": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["due_date"].is_null());
}

#[tokio::test]
async fn huge_receipts_fail_cleanly_and_the_store_keeps_serving() {
    let srv = TestServer::spawn().await;
    // Two of these exceed the largest representable quantity.
    let receipt = json!({ "kind": "receive", "quantity": 5e28, "reference": "PO-9" });

    let (status, _) = srv.post("/inventory/BIG/transactions", receipt.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = srv.post("/inventory/BIG/transactions", receipt).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = srv.get("/inventory/BIG").await;
    assert_eq!(status, StatusCode::OK);
}
