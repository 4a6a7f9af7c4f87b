//! Error types for the dashboard.
//!
//! [`StoreError`] covers the backing store, [`ValidationError`] the record
//! invariants, and [`DashboardError`] is what an operation hands back to the
//! presentation layer. With the `web` feature, [`DashboardError`] renders as
//! a structured JSON error response.

/// Failures talking to the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or opened.
    #[error("could not open {target}: {reason}")]
    Connection { target: String, reason: String },

    /// The store rejected our credentials.
    #[error("access to {target} was denied: {reason}")]
    Unauthorized { target: String, reason: String },

    /// The remote store answered with an unexpected status.
    #[error("backing store returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored content does not look like a medication sheet.
    #[error("malformed sheet: {0}")]
    Malformed(String),

    #[error("could not encode snapshot: {0}")]
    Codec(#[from] bincode::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// True for the unrecoverable "cannot open the store" kind.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            StoreError::Connection { .. } | StoreError::Unauthorized { .. }
        )
    }
}

/// Record-level validation failures.
///
/// The display text is shown to the caregiver as is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Patient ID is required.")]
    MissingPatientId,

    #[error("Patient ID already exists. Please use a unique ID.")]
    DuplicatePatientId(String),

    #[error("No record with Patient ID {0}.")]
    UnknownPatientId(String),
}

/// Error returned by a dashboard operation.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("export failed: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),

    #[error("could not render page: {0}")]
    Render(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Invalid command line or environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("a spreadsheet id is required for the google backend (--sheet-id or SHEET_ID)")]
    MissingSheetId,

    #[error(
        "credentials are required for the google backend (--credentials, --access-token or --access-token-file)"
    )]
    MissingCredentials,

    #[error("could not read access token file {path}: {source}")]
    TokenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(feature = "web")]
mod response {
    use axum::Json;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use serde::Serialize;

    use super::{DashboardError, StoreError, ValidationError};

    #[derive(Debug, Clone, Serialize)]
    struct ErrorDetail {
        code: &'static str,
        message: String,
    }

    impl DashboardError {
        /// HTTP status and machine-readable code for this error.
        pub fn status(&self) -> (StatusCode, &'static str) {
            match self {
                DashboardError::Validation(ValidationError::UnknownPatientId(_)) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND")
                }
                DashboardError::Validation(ValidationError::DuplicatePatientId(_)) => {
                    (StatusCode::CONFLICT, "CONFLICT")
                }
                DashboardError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED")
                }
                DashboardError::Store(StoreError::Poisoned) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
                DashboardError::Store(_) => (StatusCode::BAD_GATEWAY, "STORE_UNAVAILABLE"),
                DashboardError::Export(_)
                | DashboardError::Render(_)
                | DashboardError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            }
        }
    }

    impl IntoResponse for DashboardError {
        fn into_response(self) -> Response {
            let (status, code) = self.status();
            let body = serde_json::json!({
                "success": false,
                "error": ErrorDetail {
                    code,
                    message: self.to_string(),
                },
            });
            (status, Json(body)).into_response()
        }
    }
}
