//! Public HTTP surface: device ingestion and operator queries.
//!
//! Every query response passes through the core policy engine; this
//! module never touches a `TelemetryRecord` directly, only the
//! `PartialRecord` projections the query service hands out.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use fleetmed_core::device::{DeviceProof, DeviceRegistry};
use fleetmed_core::error::{AuthError, IngestError, QueryError};
use fleetmed_core::ingest::{IngestService, SystemClock};
use fleetmed_core::policy::PartialRecord;
use fleetmed_core::query::QueryService;
use fleetmed_core::record::{RecordId, VehicleId};
use fleetmed_core::session::{Credentials, Principal, UserAuthenticator};
use fleetmed_core::store::{RecordFilter, RecordStore};

use crate::config::DaemonConfig;
use crate::public_error::{ErrorBody, PublicErrorCode};
use crate::telemetry::Telemetry;

pub const VEHICLE_HEADER: &str = "x-fleetmed-vehicle";
pub const SIGNATURE_HEADER: &str = "x-fleetmed-signature";

#[derive(Clone)]
pub struct AppState {
    pub cfg: DaemonConfig,
    pub ingest: Arc<IngestService>,
    pub query: Arc<QueryService>,
    pub users: Arc<dyn UserAuthenticator>,
    pub telemetry: Telemetry,
}

pub fn build_state(
    cfg: DaemonConfig,
    registry: Arc<RwLock<DeviceRegistry>>,
    store: Arc<dyn RecordStore>,
    users: Arc<dyn UserAuthenticator>,
) -> AppState {
    let ingest = Arc::new(IngestService::new(
        registry,
        store.clone(),
        Arc::new(SystemClock),
    ));
    let query = Arc::new(QueryService::new(store));
    AppState {
        cfg,
        ingest,
        query,
        users,
        telemetry: Telemetry::new(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/telemetry", post(ingest_record))
        .route("/v1/records", get(query_records))
        .route("/v1/latest", get(latest_records))
        .route("/metrics", get(metrics))
        .layer(RequestBodyLimitLayer::new(state.cfg.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestAccepted {
    pub record_id: RecordId,
}

#[derive(Debug)]
struct HttpErr {
    kind: &'static str,
    status: StatusCode,
    body: ErrorBody,
}

impl HttpErr {
    fn new(kind: &'static str, code: PublicErrorCode) -> Self {
        Self {
            kind,
            status: code.status(),
            body: ErrorBody::new(code),
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.body = self.body.with_field(field);
        self
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.body = self.body.with_reason(reason);
        self
    }
}

impl IntoResponse for HttpErr {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn ingest_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    match ingest_record_impl(&state, &headers, body).await {
        Ok(accepted) => {
            state.telemetry.record_ingest_accepted();
            (StatusCode::CREATED, Json(accepted)).into_response()
        }
        Err(err) => {
            state.telemetry.record_ingest_rejected(err.kind);
            err.into_response()
        }
    }
}

async fn ingest_record_impl(
    state: &AppState,
    headers: &HeaderMap,
    body: axum::body::Bytes,
) -> Result<IngestAccepted, HttpErr> {
    let (vehicle_id, proof) = device_identity_from_headers(headers)?;

    let ingest = state.ingest.clone();
    let payload = body.to_vec();
    let claimed = vehicle_id.clone();
    // The worker checks the deadline itself, right before the commit,
    // and the handler waits for its real outcome. A blocking task
    // cannot be cancelled, so racing it against a timer here would let
    // a "timed out" reply precede a commit that still lands.
    let deadline = std::time::Instant::now() + Duration::from_millis(state.cfg.ingest_timeout_ms);
    let outcome = tokio::task::spawn_blocking(move || {
        ingest.ingest_with_deadline(&payload, &claimed, &proof, Some(deadline))
    })
    .await;

    let result = match outcome {
        Err(join_err) => {
            tracing::error!(error = %join_err, "ingest worker failed");
            return Err(HttpErr::new("internal", PublicErrorCode::Internal));
        }
        Ok(result) => result,
    };

    match result {
        Ok(record_id) => Ok(IngestAccepted { record_id }),
        Err(err) => Err(map_ingest_error(state, &vehicle_id, err)),
    }
}

fn map_ingest_error(state: &AppState, vehicle_id: &VehicleId, err: IngestError) -> HttpErr {
    match err {
        IngestError::Validation(v) => HttpErr::new("validation", PublicErrorCode::InvalidInput)
            .with_field(v.field)
            .with_reason(v.reason),
        IngestError::Auth(auth) => {
            let (kind, code) = match auth {
                AuthError::UnknownDevice => ("unknown_device", PublicErrorCode::Unauthorized),
                AuthError::InvalidProof => ("invalid_proof", PublicErrorCode::Unauthorized),
                AuthError::RevokedDevice => ("revoked_device", PublicErrorCode::Forbidden),
                AuthError::VehicleMismatch => ("vehicle_mismatch", PublicErrorCode::Forbidden),
            };
            state.telemetry.record_auth_failure(kind);
            tracing::warn!(vehicle_id = %vehicle_id, kind, "rejected device submission");
            HttpErr::new(kind, code).with_reason(auth.to_string())
        }
        IngestError::Storage(storage) => {
            tracing::error!(error = %storage, "record store failed during ingest");
            HttpErr::new("storage", PublicErrorCode::Unavailable)
                .with_reason("storage unavailable; retry the submission")
        }
        // A validation failure from the device's point of view: nothing
        // was persisted, resubmitting is safe.
        IngestError::DeadlineExceeded => {
            HttpErr::new("timeout", PublicErrorCode::InvalidInput)
                .with_field("payload")
                .with_reason("processing deadline exceeded")
        }
    }
}

/// Device identity is asserted in headers and verified against the
/// registered key. Header problems are authentication failures, not
/// validation failures: the submitter has not proven who it is.
fn device_identity_from_headers(
    headers: &HeaderMap,
) -> Result<(VehicleId, DeviceProof), HttpErr> {
    let unauthorized = |reason: &'static str| {
        HttpErr::new("missing_credentials", PublicErrorCode::Unauthorized).with_reason(reason)
    };

    let vehicle = headers
        .get(VEHICLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| unauthorized("missing x-fleetmed-vehicle"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| unauthorized("missing x-fleetmed-signature"))?;
    let sig_hex = signature
        .strip_prefix("sha256=")
        .ok_or_else(|| unauthorized("invalid signature format"))?;
    let sig_bytes =
        hex::decode(sig_hex).map_err(|_| unauthorized("invalid signature format"))?;

    Ok((
        VehicleId::new(vehicle),
        DeviceProof::from_bytes(sig_bytes),
    ))
}

#[derive(Debug, Deserialize)]
struct RecordsQuery {
    vehicle_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    newest_first: bool,
}

async fn query_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RecordsQuery>,
) -> Response {
    match query_records_impl(&state, &headers, params) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn query_records_impl(
    state: &AppState,
    headers: &HeaderMap,
    params: RecordsQuery,
) -> Result<Vec<PartialRecord>, HttpErr> {
    let principal = principal_from_headers(state, headers)?;
    let filter = RecordFilter {
        vehicle_id: params.vehicle_id.map(VehicleId::new),
        from: parse_instant_param("from", params.from.as_deref())?,
        to: parse_instant_param("to", params.to.as_deref())?,
        limit: params.limit,
        newest_first: params.newest_first,
    };

    let records: Vec<PartialRecord> = state
        .query
        .query(&principal, &filter)
        .map_err(map_query_error)?
        .collect();
    state
        .telemetry
        .record_query(principal.role.as_str(), records.len() as u64);
    Ok(records)
}

async fn latest_records(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match latest_records_impl(&state, &headers) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn latest_records_impl(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Vec<PartialRecord>, HttpErr> {
    let principal = principal_from_headers(state, headers)?;
    let records = state
        .query
        .latest_per_vehicle(&principal)
        .map_err(map_query_error)?;
    state
        .telemetry
        .record_query(principal.role.as_str(), records.len() as u64);
    Ok(records)
}

async fn metrics(State(state): State<AppState>) -> String {
    state.telemetry.render()
}

fn map_query_error(err: QueryError) -> HttpErr {
    let QueryError::Storage(storage) = err;
    tracing::error!(error = %storage, "record store failed during query");
    HttpErr::new("storage", PublicErrorCode::Unavailable)
        .with_reason("storage unavailable; retry the query")
}

/// Resolve the operator principal from the bearer token. The reply is
/// deliberately uniform: callers cannot distinguish a missing token
/// from an unknown one.
fn principal_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Principal, HttpErr> {
    let denied = || {
        state.telemetry.record_auth_failure("operator");
        HttpErr::new("operator_auth", PublicErrorCode::Unauthorized)
            .with_reason("authentication failed")
    };

    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(denied)?;
    let token = header.strip_prefix("Bearer ").ok_or_else(denied)?;
    state
        .users
        .authenticate_user(&Credentials {
            token: token.to_string(),
        })
        .ok_or_else(denied)
}

fn parse_instant_param(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, HttpErr> {
    match raw {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|_| {
                HttpErr::new("validation", PublicErrorCode::InvalidInput)
                    .with_field(field)
                    .with_reason("must be an RFC 3339 timestamp")
            }),
    }
}
