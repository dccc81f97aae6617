//! HTTP gateway for publishing events, resolving profiles and emitting zap
//! receipts.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, net::SocketAddr, sync::Arc};

use crate::config::csv_strings;
use crate::error::{Error, ErrorClass};
use crate::event::Event;
use crate::service::Service;
use crate::transport::Transport;

type AppState<T> = Arc<Service<T>>;

/// Response body for the `/healthz` endpoint.
#[derive(Serialize, Deserialize)]
struct Health {
    /// Always "ok" when the server is running.
    status: String,
}

/// Start the HTTP gateway on `addr` until `shutdown` resolves.
pub async fn serve_http<T: Transport>(
    addr: SocketAddr,
    service: Service<T>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "http gateway listening");
    axum::serve(listener, router(service).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn router<T: Transport>(service: Service<T>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/profile/:id", get(profile::<T>))
        .route("/events", post(publish::<T>))
        .route("/zaps/receipt", post(zap_receipt::<T>))
        .with_state(Arc::new(service))
}

/// Health check endpoint.
async fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

#[derive(Deserialize)]
struct ProfileParams {
    /// Comma-separated relays to ask instead of the defaults.
    relays: Option<String>,
}

async fn profile<T: Transport>(
    State(service): State<AppState<T>>,
    Path(id): Path<String>,
    Query(params): Query<ProfileParams>,
) -> Result<Response, ApiError> {
    let relays = csv_strings(params.relays.unwrap_or_default());
    tracing::debug!(id = %id, relays = relays.len(), "GET /profile");
    let record = service.resolve_profile(&id, Some(&relays)).await?;
    Ok(Json(record).into_response())
}

#[derive(Deserialize)]
struct PublishRequest {
    event: Event,
    #[serde(default)]
    relays: Vec<String>,
}

/// Broadcast a signed event. Answers 502 with the full report when no relay
/// accepted it.
async fn publish<T: Transport>(
    State(service): State<AppState<T>>,
    Json(req): Json<PublishRequest>,
) -> Result<Response, ApiError> {
    req.event.verify()?;
    let report = service.publish(&req.event, &req.relays).await;
    let status = if report.is_total_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)).into_response())
}

#[derive(Deserialize)]
struct ReceiptRequest {
    zap_request: Event,
    bolt11: String,
}

/// Sign a zap receipt and publish it in the background.
async fn zap_receipt<T: Transport>(
    State(service): State<AppState<T>>,
    Json(req): Json<ReceiptRequest>,
) -> Result<Response, ApiError> {
    let (receipt, _publishing) = service.emit_receipt(&req.zap_request, &req.bolt11)?;
    Ok((StatusCode::ACCEPTED, Json(receipt)).into_response())
}

/// Library errors rendered as JSON `{"error": ...}` with a matching status.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match (&self.0, self.0.class()) {
            (Error::MissingKey, _) => StatusCode::SERVICE_UNAVAILABLE,
            (Error::ProfileNotFound { .. }, _) => StatusCode::NOT_FOUND,
            (_, ErrorClass::ProtocolDecode) => StatusCode::BAD_REQUEST,
            (_, ErrorClass::ExhaustedRelays | ErrorClass::TransientNetwork) => {
                StatusCode::BAD_GATEWAY
            }
            (_, ErrorClass::SigningFailure) => {
                tracing::error!(error = %self.0, "signing failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
