//! HTTP handlers.
//!
//! Error bodies follow what polling clients already parse:
//! - `/upload-link`: `{"success": false, "error": ..}`
//! - `/status`: `{"error": .., "message": ..}`, never leaking internals

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::request_id::RequestId;
use super::state::AppState;
use crate::adapters::Precondition;
use crate::core::{parse_trigger, ObjectCreated, QueryError, UploadError, UploadRequest};

/// Form field carrying the file in an upload
const FILE_FIELD: &str = "file";

fn upload_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

fn error_body(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": error, "message": message.into() })),
    )
        .into_response()
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /upload-link`
#[tracing::instrument(skip(state, body))]
pub async fn upload_link_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: UploadRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Malformed upload request");
            return upload_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e));
        }
    };

    match state.uploads.issue(&request) {
        Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
        Err(UploadError::Validation(e)) => {
            info!(error = %e, "Upload request rejected");
            upload_error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(UploadError::Store(e)) => {
            error!(error = %e, "Failed to issue upload grant");
            upload_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// `GET /status` without a key
pub async fn missing_file_key_handler() -> Response {
    file_key_required()
}

fn file_key_required() -> Response {
    error_body(
        StatusCode::BAD_REQUEST,
        "fileKey parameter required",
        "Provide the fileKey of the file to query",
    )
}

/// `GET /status/{*file_key}`
#[tracing::instrument(skip(state))]
pub async fn status_handler(State(state): State<AppState>, Path(file_key): Path<String>) -> Response {
    match state.status.query(&file_key).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(QueryError::Validation(e)) => {
            info!(error = %e, "Rejected status query");
            file_key_required()
        }
        Err(QueryError::Store(e)) => {
            error!(error = %e, "Failed to read status");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "Could not fetch the processing status",
            )
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EventParams {
    /// Run the pipeline before answering instead of in the background
    #[serde(default)]
    pub wait: bool,
}

/// `POST /events`: object-created trigger
#[tracing::instrument(skip(state, request_id, event))]
pub async fn events_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<EventParams>,
    Json(event): Json<Value>,
) -> Response {
    let objects = match parse_trigger(&event) {
        Ok(objects) => objects,
        Err(e) => {
            warn!(error = %e, "Malformed trigger event");
            return error_body(StatusCode::BAD_REQUEST, "Malformed event", e.to_string());
        }
    };

    if params.wait {
        let mut responses = Vec::with_capacity(objects.len());
        for object in &objects {
            let outcome = state.intake.handle(object, &request_id.0).await;
            responses.push(outcome.response());
        }
        return (StatusCode::OK, Json(Value::Array(responses))).into_response();
    }

    let accepted = objects.len();
    spawn_intake(&state, objects, request_id.0);
    (StatusCode::ACCEPTED, Json(json!({ "accepted": accepted }))).into_response()
}

fn spawn_intake(state: &AppState, objects: Vec<ObjectCreated>, request_id: String) {
    let intake = state.intake.clone();
    state.jobs.spawn(async move {
        for object in &objects {
            let outcome = intake.handle(object, &request_id).await;
            info!(file_key = %object.key, outcome = ?outcome, "Intake finished");
        }
    });
}

/// `POST /objects`: form upload honoring an upload grant
#[tracing::instrument(skip(state, request_id, multipart))]
pub async fn upload_object_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    mut multipart: Multipart,
) -> Response {
    let mut fields = HashMap::new();
    let mut body = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read multipart");
                return upload_error(StatusCode::BAD_REQUEST, format!("Failed to read multipart: {}", e));
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, field = %name, "Failed to read form field");
                return upload_error(StatusCode::BAD_REQUEST, format!("Failed to read field: {}", e));
            }
        };
        if name == FILE_FIELD {
            body = Some(data);
        } else {
            fields.insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }

    let Some(body) = body else {
        return upload_error(StatusCode::BAD_REQUEST, "No file uploaded");
    };

    let policy = match state
        .signer
        .verify_post(&fields, body.len() as u64, Utc::now())
    {
        Ok(policy) => policy,
        Err(e) => {
            warn!(error = %e, "Upload rejected");
            return upload_error(StatusCode::FORBIDDEN, e.to_string());
        }
    };

    if let Err(e) = state
        .store
        .put(&policy.key, body.to_vec(), &policy.content_type, Precondition::None)
        .await
    {
        error!(key = %policy.key, error = %e, "Failed to store upload");
        return upload_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
    }
    info!(key = %policy.key, bytes = body.len(), "Stored upload");

    let created = ObjectCreated::new(state.store.bucket(), policy.key);
    spawn_intake(&state, vec![created], request_id.0);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
pub struct GrantParams {
    pub expires: i64,
    pub signature: String,
}

/// `GET /objects/{*key}`: download honoring a read grant
#[tracing::instrument(skip(state, grant))]
pub async fn download_object_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(grant): Query<GrantParams>,
) -> Response {
    if let Err(e) = state
        .signer
        .verify_get(&key, grant.expires, &grant.signature, Utc::now())
    {
        warn!(error = %e, "Download rejected");
        return error_body(StatusCode::FORBIDDEN, "Access denied", e.to_string());
    }

    match state.store.get(&key).await {
        Ok(Some(object)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, object.content_type)],
            object.body,
        )
            .into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "Not found", key),
        Err(e) => {
            error!(error = %e, "Failed to read object");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", "Could not read the object")
        }
    }
}
