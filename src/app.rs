use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post, put},
};
use axum_extra::extract::cookie::CookieJar;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::Config;
use crate::downloader::{CSV_CONTENT_TYPE, CSV_FILENAME, XLSX_CONTENT_TYPE, XLSX_FILENAME};
use crate::error::{DashboardError, StoreError};
use crate::operations;
use crate::record::{COLUMNS, PatientRecord, RecordFields};
use crate::session::{DATE_FORMAT, Sessions};
use crate::store::SheetStore;
use crate::view;

pub struct AppState {
    store: Mutex<Box<dyn SheetStore>>,
    sessions: Sessions,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(store: Box<dyn SheetStore>, session_ttl: Duration) -> Result<Self, DashboardError> {
        let templates = view::templates().map_err(|e| DashboardError::Render(e.to_string()))?;
        Ok(AppState {
            store: Mutex::new(store),
            sessions: Sessions::new(session_ttl),
            templates,
        })
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }
}

/// Submit button of a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FormAction {
    Save,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ManageAction {
    Modify,
    Delete,
}

#[derive(Debug, Deserialize)]
struct AddRecordForm {
    action: FormAction,
    #[serde(default)]
    patient_id: String,
    #[serde(flatten)]
    fields: FieldsForm,
}

#[derive(Debug, Deserialize)]
struct ModifyRecordForm {
    action: FormAction,
    #[serde(flatten)]
    fields: FieldsForm,
}

#[derive(Debug, Deserialize)]
struct ManageForm {
    action: ManageAction,
    patient_id: String,
}

/// Form encoding of the non-key columns.
#[derive(Debug, Default, Deserialize)]
struct FieldsForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    medication_name: String,
    #[serde(default)]
    dosage: String,
    #[serde(default)]
    frequency: String,
    #[serde(default)]
    last_administered_date: String,
    #[serde(default)]
    next_due_date: String,
    #[serde(default)]
    time: String,
    #[serde(default)]
    notes: String,
}

impl From<FieldsForm> for RecordFields {
    fn from(form: FieldsForm) -> Self {
        RecordFields {
            name: form.name,
            phone_number: form.phone_number,
            medication_name: form.medication_name,
            dosage: form.dosage,
            frequency: form.frequency,
            last_administered_date: form.last_administered_date,
            next_due_date: form.next_due_date,
            time: form.time,
            notes: form.notes,
        }
    }
}

#[derive(Serialize)]
struct RecordsResponse {
    columns: &'static [&'static str],
    records: Vec<PatientRecord>,
}

/// Build the dashboard router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/static/dashboard.css", get(serve_stylesheet))
        .route("/records/new", post(open_add_form))
        .route("/records", post(submit_add_form))
        .route("/records/manage", post(manage_record))
        .route("/records/edit", post(submit_modify_form))
        .route("/reminders", post(set_reminder))
        .route("/export/reminders.csv", get(export_csv))
        .route("/export/reminders.xlsx", get(export_xlsx))
        .route("/api/records", get(api_list_records).post(api_add_record))
        .route(
            "/api/records/:patient_id",
            put(api_modify_record).delete(api_delete_record),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Serve the dashboard on `config.bind` until the process is stopped.
pub async fn run(config: Config, store: Box<dyn SheetStore>) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(store, config.session_ttl)?);
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run a store operation on the blocking pool, holding the store lock.
///
/// Store calls do blocking network or file I/O, and holding the lock keeps
/// this process's load/mutate/save sequences from interleaving.
async fn with_store<T, F>(state: &Arc<AppState>, op: F) -> Result<T, DashboardError>
where
    T: Send + 'static,
    F: FnOnce(&dyn SheetStore) -> Result<T, DashboardError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let store = state.store.lock().map_err(|_| StoreError::Poisoned)?;
        op(&**store)
    })
    .await
    .map_err(|e| DashboardError::Internal(e.to_string()))?
}

fn today() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

fn back_to_dashboard(jar: CookieJar) -> (CookieJar, Redirect) {
    (jar, Redirect::to("/"))
}

async fn serve_dashboard(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, session_id) = state.sessions.resolve(jar);

    let table = match with_store(&state, |store| operations::list_records(store)).await {
        Ok(table) => table,
        Err(e) => {
            log::error!("could not load records: {e}");
            let message = format!("Could not load records: {e}");
            return match view::render_error(&state.templates, &message) {
                Ok(html) => (StatusCode::BAD_GATEWAY, jar, Html(html)).into_response(),
                Err(render) => DashboardError::Render(render.to_string()).into_response(),
            };
        }
    };

    let (session, flash) = state.sessions.with(&session_id, |s| {
        s.reconcile(&table);
        let flash = s.take_flash();
        (s.clone(), flash)
    });

    match view::render_dashboard(&state.templates, &table, &session, flash.as_ref()) {
        Ok(html) => (jar, Html(html)).into_response(),
        Err(e) => DashboardError::Render(e.to_string()).into_response(),
    }
}

async fn serve_stylesheet() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        include_str!("./static/dashboard.css"),
    )
}

async fn open_add_form(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let (jar, session_id) = state.sessions.resolve(jar);
    let today = today();
    state.sessions.with(&session_id, |s| s.open_add_form(&today));
    back_to_dashboard(jar)
}

async fn submit_add_form(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<AddRecordForm>,
) -> (CookieJar, Redirect) {
    let (jar, session_id) = state.sessions.resolve(jar);
    if form.action == FormAction::Cancel {
        state.sessions.with(&session_id, |s| s.close_forms());
        return back_to_dashboard(jar);
    }

    let record = PatientRecord::new(form.patient_id, form.fields.into());
    let draft = record.clone();
    let result = with_store(&state, move |store| operations::add_record(store, record)).await;
    state.sessions.with(&session_id, |s| match result {
        Ok(added) => s.add_succeeded(&added.patient_id),
        Err(DashboardError::Validation(e)) => s.add_rejected(draft, e.to_string()),
        Err(e) => {
            log::error!("could not add record: {e}");
            s.add_rejected(draft, format!("Could not save record: {e}"));
        }
    });
    back_to_dashboard(jar)
}

async fn manage_record(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ManageForm>,
) -> (CookieJar, Redirect) {
    let (jar, session_id) = state.sessions.resolve(jar);
    match form.action {
        ManageAction::Modify => {
            state
                .sessions
                .with(&session_id, |s| s.open_modify_form(&form.patient_id));
        }
        ManageAction::Delete => {
            let patient_id = form.patient_id.clone();
            let result =
                with_store(&state, move |store| operations::delete_record(store, &patient_id))
                    .await;
            state.sessions.with(&session_id, |s| match result {
                Ok(_) => s.deleted(&form.patient_id),
                Err(e) => {
                    log::error!("could not delete {:?}: {e}", form.patient_id);
                    s.failed(e.to_string());
                }
            });
        }
    }
    back_to_dashboard(jar)
}

async fn submit_modify_form(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ModifyRecordForm>,
) -> (CookieJar, Redirect) {
    let (jar, session_id) = state.sessions.resolve(jar);
    let target = state
        .sessions
        .with(&session_id, |s| s.modify_target().map(str::to_string));
    let Some(patient_id) = target else {
        // Stale form from a session that no longer has it open.
        return back_to_dashboard(jar);
    };
    if form.action == FormAction::Cancel {
        state.sessions.with(&session_id, |s| s.close_forms());
        return back_to_dashboard(jar);
    }

    let fields: RecordFields = form.fields.into();
    let draft = fields.clone();
    let id = patient_id.clone();
    let result =
        with_store(&state, move |store| operations::modify_record(store, &id, &fields)).await;
    state.sessions.with(&session_id, |s| match result {
        Ok(_) => s.modify_succeeded(&patient_id),
        Err(e) => {
            log::error!("could not modify {patient_id:?}: {e}");
            s.modify_failed(&patient_id, draft, e.to_string());
        }
    });
    back_to_dashboard(jar)
}

/// Placeholder for reminder scheduling. Intentionally does nothing.
async fn set_reminder(jar: CookieJar) -> (CookieJar, Redirect) {
    log::debug!("set reminder pressed; reminders are not implemented");
    back_to_dashboard(jar)
}

fn attachment(content_type: &'static str, filename: &str, body: impl IntoResponse) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Result<Response, DashboardError> {
    let csv = with_store(&state, |store| operations::export_csv(store)).await?;
    Ok(attachment(CSV_CONTENT_TYPE, CSV_FILENAME, csv))
}

async fn export_xlsx(State(state): State<Arc<AppState>>) -> Result<Response, DashboardError> {
    let bytes = with_store(&state, |store| operations::export_xlsx(store)).await?;
    Ok(attachment(XLSX_CONTENT_TYPE, XLSX_FILENAME, bytes))
}

async fn api_list_records(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecordsResponse>, DashboardError> {
    let table = with_store(&state, |store| operations::list_records(store)).await?;
    Ok(Json(RecordsResponse {
        columns: &COLUMNS,
        records: table.into_records(),
    }))
}

async fn api_add_record(
    State(state): State<Arc<AppState>>,
    Json(record): Json<PatientRecord>,
) -> Result<(StatusCode, Json<PatientRecord>), DashboardError> {
    let added = with_store(&state, move |store| operations::add_record(store, record)).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn api_modify_record(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<String>,
    Json(fields): Json<RecordFields>,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let updated = with_store(&state, move |store| {
        operations::modify_record(store, &patient_id, &fields)
    })
    .await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn api_delete_record(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<String>,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let deleted =
        with_store(&state, move |store| operations::delete_record(store, &patient_id)).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
