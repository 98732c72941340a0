//! Appointment creation API.
//!
//! Endpoints:
//! - `POST /appointments`: store a new appointment, `201` with the stored record
//! - `GET /health`: liveness check
//!
//! Any failure on create is a single `500` with body `Exception=<description>`.
//! There is no retry; the client decides whether to resubmit.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::model::{AppointmentRecord, RecordError};
use crate::storage::{AppointmentStore, StorageError};
use crate::utils::bootstrap::wait_for_shutdown;

/// Shared state for axum handlers.
type AppState = Arc<dyn AppointmentStore>;

/// Reasons a create request fails.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(serde_json::Error),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to encode response: {0}")]
    Encode(serde_json::Error),
}

impl IntoResponse for CreateError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Exception={}", self),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct Created<'a> {
    message: &'a AppointmentRecord,
    #[serde(rename = "statusCode")]
    status_code: u16,
}

/// Start the API server, stopping when `shutdown` turns `true`.
pub async fn serve(
    store: Arc<dyn AppointmentStore>,
    addr: SocketAddr,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Appointments API listening");
    axum::serve(listener, router(store))
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
}

/// Build the axum router (separated for testing).
pub fn router(store: Arc<dyn AppointmentStore>) -> Router {
    Router::new()
        .route("/appointments", post(create_appointment))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_appointment(State(store): State<AppState>, body: Bytes) -> Response {
    match create(store.as_ref(), &body).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Failed to create appointment");
            e.into_response()
        }
    }
}

async fn create(store: &dyn AppointmentStore, body: &[u8]) -> Result<Response, CreateError> {
    let request: serde_json::Value = serde_json::from_slice(body).map_err(CreateError::InvalidJson)?;
    let record = AppointmentRecord::from_request(request)?;

    store.put(&record).await?;
    info!(id = %record.id, "Appointment created");

    let body = serde_json::to_string_pretty(&Created {
        message: &record,
        status_code: StatusCode::CREATED.as_u16(),
    })
    .map_err(CreateError::Encode)?;

    Ok((
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
