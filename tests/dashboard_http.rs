//! End-to-end tests for the dashboard HTTP surface.
//!
//! Each test builds the router over a fresh `MemoryStore` and drives it with
//! `tower::ServiceExt::oneshot`, carrying the session cookie between
//! requests the way a browser would.
#![cfg(feature = "web")]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tower::ServiceExt;

use medication_dashboard::app::{AppState, build_router};
use medication_dashboard::store::MemoryStore;
use medication_dashboard::{MedicationTable, PatientRecord, RecordFields, SheetStore, StoreError};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn record(id: &str, dosage: &str) -> PatientRecord {
    PatientRecord::new(
        id,
        RecordFields {
            name: "Walter Price".to_string(),
            phone_number: "555-0199".to_string(),
            medication_name: "Metformin".to_string(),
            dosage: dosage.to_string(),
            frequency: "Twice daily".to_string(),
            last_administered_date: "10/15/2026".to_string(),
            next_due_date: "10/16/2026".to_string(),
            time: "08:00 AM".to_string(),
            notes: "With breakfast".to_string(),
        },
    )
}

fn test_app(store: &MemoryStore) -> (Router, Arc<AppState>) {
    let state = Arc::new(
        AppState::new(Box::new(store.clone()), Duration::from_secs(3600))
            .expect("failed to build app state"),
    );
    (build_router(Arc::clone(&state)), state)
}

fn encode_form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: String,
}

/// Minimal browser: remembers the session cookie.
struct Browser {
    app: Router,
    cookie: Option<String>,
}

impl Browser {
    fn new(app: &Router) -> Self {
        Browser {
            app: app.clone(),
            cookie: None,
        }
    }

    async fn send(&mut self, request: axum::http::request::Builder, body: Body) -> Reply {
        let request = match &self.cookie {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        };
        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        Reply {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    async fn get(&mut self, path: &str) -> Reply {
        self.send(Request::builder().method("GET").uri(path), Body::empty())
            .await
    }

    async fn post_form(&mut self, path: &str, pairs: &[(&str, &str)]) -> Reply {
        let reply = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
                Body::from(encode_form(pairs)),
            )
            .await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER, "POST {path}: {}", reply.body);
        assert_eq!(reply.headers.get(header::LOCATION).unwrap(), "/");
        reply
    }
}

fn add_form_pairs<'a>(id: &'a str, dosage: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("action", "save"),
        ("patient_id", id),
        ("name", "Walter Price"),
        ("phone_number", "555-0199"),
        ("medication_name", "Metformin"),
        ("dosage", dosage),
        ("frequency", "Twice daily"),
        ("last_administered_date", "10/15/2026"),
        ("next_due_date", "10/16/2026"),
        ("time", "08:00 AM"),
        ("notes", "With breakfast"),
    ]
}

// ---------------------------------------------------------------------------
// Dashboard page
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_visit_starts_a_session_on_an_empty_table() {
    let store = MemoryStore::new();
    let (app, state) = test_app(&store);
    let mut browser = Browser::new(&app);

    let page = browser.get("/").await;

    assert_eq!(page.status, StatusCode::OK);
    assert!(browser.cookie.as_deref().unwrap().starts_with("session="));
    assert_eq!(page.headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    assert!(page.body.contains("No records available."));
    assert!(!page.body.contains("Add New Patient Record"));
    assert_eq!(state.sessions().len(), 1);
}

#[tokio::test]
async fn stylesheet_is_served() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);
    let reply = Browser::new(&app).get("/static/dashboard.css").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(
        reply.headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/css")
    );
}

// ---------------------------------------------------------------------------
// Add
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_flow_persists_and_closes_form() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);
    let mut browser = Browser::new(&app);
    browser.get("/").await;

    browser.post_form("/records/new", &[]).await;
    let page = browser.get("/").await;
    assert!(page.body.contains("Add New Patient Record"));

    browser
        .post_form("/records", &add_form_pairs("P001", "10mg"))
        .await;

    let table = store.load().unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.records()[0], record("P001", "10mg"));

    let page = browser.get("/").await;
    assert!(page.body.contains("New patient added."));
    assert!(!page.body.contains("Add New Patient Record"));
    assert!(page.body.contains("<td>P001</td>"));

    // Flash is shown once
    let page = browser.get("/").await;
    assert!(!page.body.contains("New patient added."));
}

#[tokio::test]
async fn duplicate_add_keeps_form_open_and_store_unchanged() {
    let store = MemoryStore::with_table(&MedicationTable::from_records(vec![record("P001", "10mg")]));
    let before = store.rows();
    let (app, _) = test_app(&store);
    let mut browser = Browser::new(&app);

    browser.post_form("/records/new", &[]).await;
    browser
        .post_form("/records", &add_form_pairs("P001", "99mg"))
        .await;

    assert_eq!(store.rows(), before);
    assert_eq!(store.save_count(), 0);

    let page = browser.get("/").await;
    assert!(page.body.contains("Patient ID already exists. Please use a unique ID."));
    assert!(page.body.contains("Add New Patient Record"));
    assert!(page.body.contains(r#"name="dosage" value="99mg""#));
}

#[tokio::test]
async fn empty_id_add_is_rejected() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);
    let mut browser = Browser::new(&app);

    browser.post_form("/records/new", &[]).await;
    browser.post_form("/records", &add_form_pairs("", "10mg")).await;

    assert!(store.load().unwrap().is_empty());
    assert_eq!(store.save_count(), 0);
    let page = browser.get("/").await;
    assert!(page.body.contains("Patient ID is required."));
}

#[tokio::test]
async fn cancel_closes_add_form_without_saving() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);
    let mut browser = Browser::new(&app);

    browser.post_form("/records/new", &[]).await;
    let mut pairs = add_form_pairs("P001", "10mg");
    pairs[0] = ("action", "cancel");
    browser.post_form("/records", &pairs).await;

    assert_eq!(store.save_count(), 0);
    let page = browser.get("/").await;
    assert!(!page.body.contains("Add New Patient Record"));
}

// ---------------------------------------------------------------------------
// Modify / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn modify_flow_changes_only_dosage() {
    let store = MemoryStore::with_table(&MedicationTable::from_records(vec![
        record("P001", "10mg"),
        record("P002", "5mg"),
    ]));
    let (app, _) = test_app(&store);
    let mut browser = Browser::new(&app);

    browser
        .post_form("/records/manage", &[("action", "modify"), ("patient_id", "P001")])
        .await;
    let page = browser.get("/").await;
    assert!(page.body.contains("Modify Record — Patient ID: P001"));
    assert!(page.body.contains(r#"name="dosage" value="10mg""#));

    let mut pairs = add_form_pairs("ignored", "20mg");
    pairs.remove(1);
    browser.post_form("/records/edit", &pairs).await;

    let table = store.load().unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.find("P001").unwrap(), &record("P001", "20mg"));
    assert_eq!(table.find("P002").unwrap(), &record("P002", "5mg"));

    let page = browser.get("/").await;
    assert!(page.body.contains("Record for Patient ID P001 updated."));
    assert!(!page.body.contains("Modify Record — Patient ID"));
}

#[tokio::test]
async fn edit_without_open_form_is_ignored() {
    let store = MemoryStore::with_table(&MedicationTable::from_records(vec![record("P001", "10mg")]));
    let (app, _) = test_app(&store);
    let mut browser = Browser::new(&app);

    let mut pairs = add_form_pairs("P001", "20mg");
    pairs.remove(1);
    browser.post_form("/records/edit", &pairs).await;

    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn delete_flow_removes_matching_rows() {
    let store = MemoryStore::with_table(&MedicationTable::from_records(vec![
        record("P001", "10mg"),
        record("P002", "5mg"),
    ]));
    let (app, _) = test_app(&store);
    let mut browser = Browser::new(&app);

    browser
        .post_form("/records/manage", &[("action", "delete"), ("patient_id", "P001")])
        .await;

    let table = store.load().unwrap();
    assert_eq!(table.ids(), vec!["P002"]);
    let page = browser.get("/").await;
    assert!(page.body.contains("Record with Patient ID P001 deleted."));
}

#[tokio::test]
async fn reminder_button_does_nothing() {
    let store = MemoryStore::with_table(&MedicationTable::from_records(vec![record("P001", "10mg")]));
    let before = store.rows();
    let (app, _) = test_app(&store);
    let mut browser = Browser::new(&app);

    browser.post_form("/reminders", &[]).await;

    assert_eq!(store.rows(), before);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn sessions_do_not_share_form_state() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);
    let mut alice = Browser::new(&app);
    let mut bob = Browser::new(&app);
    alice.get("/").await;
    bob.get("/").await;

    alice.post_form("/records/new", &[]).await;

    assert!(alice.get("/").await.body.contains("Add New Patient Record"));
    assert!(!bob.get("/").await.body.contains("Add New Patient Record"));
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

/// Sheet whose loads or saves can be switched to fail.
#[derive(Clone, Default)]
struct UnreliableStore {
    inner: MemoryStore,
    fail_loads: Arc<AtomicBool>,
    fail_saves: Arc<AtomicBool>,
}

impl SheetStore for UnreliableStore {
    fn load(&self) -> Result<MedicationTable, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Connection {
                target: "test sheet".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.inner.load()
    }

    fn save(&self, table: &MedicationTable) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Remote {
                status: 503,
                message: "The service is currently unavailable.".to_string(),
            });
        }
        self.inner.save(table)
    }

    fn describe(&self) -> String {
        "unreliable test sheet".to_string()
    }
}

fn unreliable_app(store: &UnreliableStore) -> Router {
    let state = AppState::new(Box::new(store.clone()), Duration::from_secs(3600))
        .expect("failed to build app state");
    build_router(Arc::new(state))
}

#[tokio::test]
async fn failed_save_keeps_add_form_open_with_entered_values() {
    let store = UnreliableStore::default();
    store.fail_saves.store(true, Ordering::SeqCst);
    let app = unreliable_app(&store);
    let mut browser = Browser::new(&app);

    browser.post_form("/records/new", &[]).await;
    browser
        .post_form("/records", &add_form_pairs("P001", "10mg"))
        .await;

    assert!(store.inner.load().unwrap().is_empty());
    assert_eq!(store.inner.save_count(), 0);
    let page = browser.get("/").await;
    assert!(page.body.contains("flash-error"));
    assert!(page.body.contains("backing store returned HTTP 503"));
    assert!(page.body.contains("Add New Patient Record"));
    assert!(page.body.contains(r#"name="patient_id" value="P001""#));
}

#[tokio::test]
async fn failed_save_keeps_modify_form_open_with_draft() {
    let store = UnreliableStore::default();
    store
        .inner
        .save(&MedicationTable::from_records(vec![record("P001", "10mg")]))
        .unwrap();
    let before = store.inner.rows();
    let app = unreliable_app(&store);
    let mut browser = Browser::new(&app);

    browser
        .post_form("/records/manage", &[("action", "modify"), ("patient_id", "P001")])
        .await;
    store.fail_saves.store(true, Ordering::SeqCst);
    let mut pairs = add_form_pairs("ignored", "20mg");
    pairs.remove(1);
    browser.post_form("/records/edit", &pairs).await;

    assert_eq!(store.inner.rows(), before);
    let page = browser.get("/").await;
    assert!(page.body.contains("backing store returned HTTP 503"));
    assert!(page.body.contains("Modify Record — Patient ID: P001"));
    assert!(page.body.contains(r#"name="dosage" value="20mg""#));
}

#[tokio::test]
async fn unreachable_store_renders_error_page_and_json_502() {
    let store = UnreliableStore::default();
    store.fail_loads.store(true, Ordering::SeqCst);
    let app = unreliable_app(&store);

    let page = Browser::new(&app).get("/").await;
    assert_eq!(page.status, StatusCode::BAD_GATEWAY);
    assert!(page.body.contains("connection refused"));

    let (status, body) = send_json(&app, "GET", "/api/records", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "STORE_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn csv_export_of_empty_table_is_header_only() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);

    let reply = Browser::new(&app).get("/export/reminders.csv").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        reply.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"reminders.csv\""
    );
    assert_eq!(
        reply.body,
        "PatientID,Name,PhoneNumber,MedicationName,Dosage,Frequency,LastAdministeredDate,NextDueDate,Time,Notes\n"
    );
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn csv_export_reflects_latest_store_contents() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);
    store
        .save(&MedicationTable::from_records(vec![record("P001", "10mg")]))
        .unwrap();

    let reply = Browser::new(&app).get("/export/reminders.csv").await;

    assert_eq!(reply.body.lines().count(), 2);
    assert!(reply.body.contains("P001,Walter Price,555-0199,Metformin,10mg,"));
}

#[tokio::test]
async fn xlsx_export_is_a_workbook() {
    let store = MemoryStore::with_table(&MedicationTable::from_records(vec![record("P001", "10mg")]));
    let (app, _) = test_app(&store);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/export/reminders.xlsx")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"PK"));
}

// ---------------------------------------------------------------------------
// JSON API
// ---------------------------------------------------------------------------

async fn send_json(
    app: &Router,
    method: &str,
    path: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn api_supports_the_full_record_lifecycle() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);
    let p001 = serde_json::to_value(record("P001", "10mg")).unwrap();

    let (status, body) = send_json(&app, "POST", "/api/records", Some(p001.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["PatientID"], "P001");

    let (status, body) = send_json(&app, "POST", "/api/records", Some(p001)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let fields = serde_json::to_value(record("P001", "20mg").fields()).unwrap();
    let (status, body) = send_json(&app, "PUT", "/api/records/P001", Some(fields)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let (status, body) = send_json(&app, "GET", "/api/records", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"][0], "PatientID");
    assert_eq!(body["records"][0]["Dosage"], "20mg");

    let (status, body) = send_json(&app, "DELETE", "/api/records/P001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (status, _) = send_json(&app, "DELETE", "/api/records/P001", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(store.load().unwrap().is_empty());
}

#[tokio::test]
async fn api_rejects_empty_patient_id() {
    let store = MemoryStore::new();
    let (app, _) = test_app(&store);

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/records",
        Some(serde_json::json!({ "PatientID": "", "Name": "Nobody" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["message"], "Patient ID is required.");
    assert_eq!(store.save_count(), 0);
}
