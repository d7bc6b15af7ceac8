//! HTTP handlers.
//!
//! Every handler answers failures with `400 Bad Request` and a `{"error": "..."}` body, and
//! every success with a `Location` header naming the route that produced it. Store calls do
//! blocking disk I/O, so they run on tokio's blocking pool.

use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Json,
};
use fileshelf_store::{FileId, FileRecord, FileStore, Index, StoreError, StoreResult, Upload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

type ApiError = (StatusCode, Json<ErrorRes>);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error body returned with every `400`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusRes {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendFileRes {
    pub status: String,
    pub id: String,
}

/// One index entry as it appears on the wire.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordRes {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub type_label: String,
    pub size: u64,
    #[serde(rename = "modificationTime")]
    pub modification_time: String,
}

/// Index entries keyed by file id.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IndexRes(pub BTreeMap<String, RecordRes>);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MoveReq {
    /// Logical directory to move the file into; empty means the storage root
    pub directory: String,
}

/// The `?data=` query parameter shared by most routes.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DataQuery {
    /// File id, or directory prefix for `/underdir`
    #[serde(default)]
    pub data: String,
}

impl From<FileRecord> for RecordRes {
    fn from(record: FileRecord) -> Self {
        Self {
            name: record.name.as_str().to_owned(),
            path: record.path,
            type_label: record.type_label.as_str().to_owned(),
            size: record.size,
            modification_time: record.modification_time,
        }
    }
}

impl From<Index> for IndexRes {
    fn from(index: Index) -> Self {
        Self(
            index
                .into_iter()
                .map(|(id, record)| (id.to_string(), record.into()))
                .collect(),
        )
    }
}

fn status_success() -> StatusRes {
    StatusRes {
        status: "success".into(),
    }
}

fn rejected(context: &str, e: impl Display) -> ApiError {
    tracing::error!("{} error: {}", context, e);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorRes {
            error: e.to_string(),
        }),
    )
}

fn location(route: String) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match HeaderValue::try_from(route) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
        }
        Err(e) => tracing::debug!("location header skipped: {}", e),
    }
    headers
}

fn parse_id(context: &str, raw: &str) -> Result<FileId, ApiError> {
    FileId::parse(raw).map_err(|e| rejected(context, StoreError::from(e)))
}

/// Runs a store operation on the blocking pool.
async fn with_store<T, F>(state: &AppState, context: &str, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&FileStore) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!("{} task failed: {:?}", context, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorRes {
                    error: "Internal error".into(),
                }),
            )
        })?
        .map_err(|e| rejected(context, e))
}

/// Reduces a multipart `Content-Type` such as `image/png` to the bare type label `png`.
///
/// Parameters are dropped. The generic `application/octet-stream` carries no type at all and
/// yields an empty label, leaving detection to the store.
pub(crate) fn type_label_from_content_type(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence == "application/octet-stream" {
        return String::new();
    }
    match essence.rsplit_once('/') {
        Some((_, subtype)) => subtype.to_owned(),
        None => essence,
    }
}

/// Collects the `file` and `path` parts of an upload form.
async fn read_upload(context: &str, mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload::default();
    let mut saw_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| rejected(context, e))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                upload.name = field.file_name().unwrap_or_default().to_owned();
                upload.type_label = field
                    .content_type()
                    .map(type_label_from_content_type)
                    .unwrap_or_default();
                let bytes = field.bytes().await.map_err(|e| rejected(context, e))?;
                upload.size = Some(bytes.len() as u64);
                upload.bytes = bytes.to_vec();
                saw_file = true;
            }
            Some("path") => {
                upload.directory = field.text().await.map_err(|e| rejected(context, e))?;
            }
            other => tracing::debug!("ignoring multipart field {:?}", other),
        }
    }

    if !saw_file {
        return Err(rejected(context, "missing multipart field: file"));
    }
    Ok(upload)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
pub(crate) async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "fileshelf REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/sendfile",
    request_body(content_type = "multipart/form-data", description = "`file` part with filename and content type, `path` part with the target directory"),
    responses(
        (status = 200, description = "File stored", body = SendFileRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
/// Store an uploaded file
///
/// The part's filename becomes the record name and its content type the type label. When
/// the upload carries no usable content type, the store detects one from the bytes.
///
/// # Returns
/// * `Ok(Json<SendFileRes>)` - Success status with the new file id
///
/// # Errors
/// Returns `400 Bad Request` if:
/// - the body is not a multipart form or has no `file` part,
/// - the directory or file name is invalid, or
/// - writing the file or the index fails.
#[axum::debug_handler]
pub(crate) async fn send_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(HeaderMap, Json<SendFileRes>), ApiError> {
    let multipart = multipart.map_err(|e| rejected("Send file", e))?;
    let upload = read_upload("Send file", multipart).await?;

    let (id, _) = with_store(&state, "Send file", move |store| store.store(upload)).await?;

    Ok((
        location("/sendfile".into()),
        Json(SendFileRes {
            status: "success".into(),
            id: id.to_string(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/allfiles",
    responses(
        (status = 200, description = "The whole index", body = IndexRes),
        (status = 400, description = "Index unreadable", body = ErrorRes)
    )
)]
/// List every stored file
#[axum::debug_handler]
pub(crate) async fn all_files(
    State(state): State<AppState>,
) -> Result<(HeaderMap, Json<IndexRes>), ApiError> {
    let index = with_store(&state, "All files", |store| store.list_all()).await?;
    Ok((location("/allfiles".into()), Json(index.into())))
}

#[utoipa::path(
    get,
    path = "/underdir",
    params(DataQuery),
    responses(
        (status = 200, description = "Index entries whose path starts with the prefix", body = IndexRes),
        (status = 400, description = "Index unreadable", body = ErrorRes)
    )
)]
/// List files whose path starts with `data`
///
/// A plain string prefix, so `ht` also matches `https/...`. An empty prefix lists everything.
#[axum::debug_handler]
pub(crate) async fn under_dir(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> Result<(HeaderMap, Json<IndexRes>), ApiError> {
    let prefix = query.data.clone();
    let index = with_store(&state, "Under dir", move |store| {
        store.list_under_dir(&prefix)
    })
    .await?;
    Ok((
        location(format!("/underdir?data={}", query.data)),
        Json(index.into()),
    ))
}

#[utoipa::path(
    get,
    path = "/byid",
    params(DataQuery),
    responses(
        (status = 200, description = "The record for the id", body = RecordRes),
        (status = 400, description = "Malformed or unknown id", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn by_id(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> Result<(HeaderMap, Json<RecordRes>), ApiError> {
    let id = parse_id("By id", &query.data)?;
    let lookup = id.clone();
    let record = with_store(&state, "By id", move |store| store.get_by_id(&lookup)).await?;
    Ok((
        location(format!("/byid?data={id}")),
        Json(record.into()),
    ))
}

#[utoipa::path(
    get,
    path = "/content",
    params(DataQuery),
    responses(
        (status = 200, description = "Raw file bytes", body = [u8], content_type = "application/octet-stream"),
        (status = 400, description = "Malformed or unknown id", body = ErrorRes)
    )
)]
/// Download the bytes of a stored file
///
/// `Content-Type` is sniffed from the bytes and falls back to `application/octet-stream`.
#[axum::debug_handler]
pub(crate) async fn content(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> Result<(HeaderMap, Vec<u8>), ApiError> {
    let id = parse_id("Content", &query.data)?;
    let lookup = id.clone();
    let (_, bytes) =
        with_store(&state, "Content", move |store| store.read_content(&lookup)).await?;

    let mut headers = location(format!("/content?data={id}"));
    let mime = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    Ok((headers, bytes))
}

#[utoipa::path(
    post,
    path = "/movefile",
    params(DataQuery),
    request_body = MoveReq,
    responses(
        (status = 200, description = "File moved", body = StatusRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
/// Move a file into another directory, keeping its name
///
/// # Errors
/// Returns `400 Bad Request` if:
/// - the id is malformed or unknown,
/// - the body is not `{"directory": "..."}`, or
/// - the target already exists or the rename fails.
#[axum::debug_handler]
pub(crate) async fn move_file(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
    payload: Result<Json<MoveReq>, JsonRejection>,
) -> Result<(HeaderMap, Json<StatusRes>), ApiError> {
    let id = parse_id("Move file", &query.data)?;
    let Json(req) = payload.map_err(|e| rejected("Move file", e))?;

    let target = id.clone();
    with_store(&state, "Move file", move |store| {
        store.move_file(&target, &req.directory)
    })
    .await?;

    Ok((
        location(format!("/movefile?data={id}")),
        Json(status_success()),
    ))
}

#[utoipa::path(
    post,
    path = "/delete",
    params(DataQuery),
    responses(
        (status = 200, description = "File deleted", body = StatusRes),
        (status = 400, description = "Malformed or unknown id", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn delete(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> Result<(HeaderMap, Json<StatusRes>), ApiError> {
    let id = parse_id("Delete", &query.data)?;
    let target = id.clone();
    with_store(&state, "Delete", move |store| store.delete_by_id(&target)).await?;

    Ok((
        location(format!("/delete?data={id}")),
        Json(status_success()),
    ))
}

#[utoipa::path(
    post,
    path = "/overwrite",
    params(DataQuery),
    request_body(content_type = "multipart/form-data", description = "Same form as `/sendfile`"),
    responses(
        (status = 200, description = "The replacement record, under the original id", body = RecordRes),
        (status = 400, description = "Bad request", body = ErrorRes)
    )
)]
/// Replace a stored file with a new upload, keeping its id
///
/// The old file is deleted before the new one is written. If writing the new file fails
/// the old one stays deleted.
#[axum::debug_handler]
pub(crate) async fn overwrite(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(HeaderMap, Json<RecordRes>), ApiError> {
    let id = parse_id("Overwrite", &query.data)?;
    let multipart = multipart.map_err(|e| rejected("Overwrite", e))?;
    let upload = read_upload("Overwrite", multipart).await?;

    let target = id.clone();
    let record = with_store(&state, "Overwrite", move |store| {
        store.overwrite_file(&target, upload)
    })
    .await?;

    Ok((
        location(format!("/overwrite?data={id}")),
        Json(record.into()),
    ))
}
