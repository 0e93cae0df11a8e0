//! HTTP query and upload API
//!
//! Read-only views of hub state plus the attachment upload boundary. Every
//! query goes through the `HubHandle`, so it is answered by the ChatServer
//! actor in order with all other commands.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        multipart::{Field, MultipartError},
        rejection::QueryRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::warn;

use crate::client::UserInfo;
use crate::error::{AppError, UploadError};
use crate::server::HubHandle;
use crate::store::{Attachment, ChatMessage};
use crate::types::GENERAL_ROOM;
use crate::upload::{self, BlobStore, UploadedFile, MAX_FILES, MAX_FILE_SIZE, UPLOADS_PREFIX};

/// Largest page a client may ask for
pub const MAX_PAGE_SIZE: usize = 100;

const DEFAULT_PAGE_SIZE: usize = 20;

/// Shared state of the HTTP API
pub struct ApiState<S> {
    pub hub: HubHandle,
    pub blobs: Arc<S>,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            blobs: Arc::clone(&self.blobs),
        }
    }
}

/// Errors surfaced to HTTP callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Hub(#[from] AppError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Hub(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(UploadError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upload(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            warn!("API request failed: {}", self);
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub room: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub room: String,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub files: Vec<Attachment>,
}

/// Build the API router
///
/// Uploaded files are served from `upload_dir` under `/uploads`.
pub fn router<S: BlobStore>(state: ApiState<S>, upload_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/rooms", get(list_rooms::<S>))
        .route("/api/users", get(list_users::<S>))
        .route("/api/messages", get(list_messages::<S>))
        .route(
            "/api/upload",
            post(upload_files::<S>)
                .layer(DefaultBodyLimit::max(MAX_FILES * MAX_FILE_SIZE + 1024 * 1024)),
        )
        .nest_service(UPLOADS_PREFIX, ServeDir::new(upload_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> &'static str {
    "Chat hub running"
}

async fn list_rooms<S: BlobStore>(State(state): State<ApiState<S>>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.hub.rooms().await?))
}

async fn list_users<S: BlobStore>(
    State(state): State<ApiState<S>>,
) -> ApiResult<Json<Vec<UserInfo>>> {
    Ok(Json(state.hub.users().await?))
}

async fn list_messages<S: BlobStore>(
    State(state): State<ApiState<S>>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<MessagePage>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let room = params
        .room
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| GENERAL_ROOM.to_string());
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if page == 0 {
        return Err(ApiError::BadRequest("page must be at least 1".to_string()));
    }
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let result = state.hub.messages(&room, page, limit).await?;
    Ok(Json(MessagePage {
        room,
        page,
        limit,
        total: result.total,
        messages: result.messages,
    }))
}

async fn upload_files<S: BlobStore>(
    State(state): State<ApiState<S>>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut files = Vec::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "upload"))?
    {
        if field.name() != Some("files") {
            continue;
        }
        if files.len() == MAX_FILES {
            return Err(UploadError::TooManyFiles { max: MAX_FILES }.into());
        }
        let original_name = field.file_name().unwrap_or("file").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = match read_limited(&mut field, &original_name).await {
            Err(e @ UploadError::TooLarge { .. }) => {
                drop(field);
                // Consume the rest of the body so the client sees the reply
                while let Ok(Some(_)) = multipart.next_field().await {}
                return Err(e.into());
            }
            other => other?,
        };
        files.push(UploadedFile {
            original_name,
            mime_type,
            data,
        });
    }

    let attachments = upload::store_all(state.blobs.as_ref(), files).await?;
    Ok(Json(UploadResponse {
        ok: true,
        files: attachments,
    }))
}

/// Read one file part, stopping as soon as it passes `MAX_FILE_SIZE`
async fn read_limited(field: &mut Field<'_>, name: &str) -> Result<Bytes, UploadError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, name))? {
        if data.len() + chunk.len() > MAX_FILE_SIZE {
            return Err(UploadError::TooLarge {
                name: name.to_string(),
                max: MAX_FILE_SIZE,
            });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(data))
}

/// A body cut off by the request limit is an oversized upload, not a malformed one
fn multipart_error(e: MultipartError, name: &str) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge {
            name: name.to_string(),
            max: MAX_FILE_SIZE,
        }
    } else {
        UploadError::Malformed(e.body_text())
    }
}
