//! # API REST
//!
//! REST API implementation for fileshelf.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (multipart intake, JSON serialization, CORS)
//!
//! All storage semantics live in `fileshelf-store`; this crate only translates requests.

#![warn(rust_2018_idioms)]

mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use fileshelf_store::FileStore;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use handlers::{
    DataQuery, ErrorRes, HealthRes, IndexRes, MoveReq, RecordRes, SendFileRes, StatusRes,
};

/// Application state shared across REST API handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FileStore>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::send_file,
        handlers::all_files,
        handlers::under_dir,
        handlers::by_id,
        handlers::content,
        handlers::move_file,
        handlers::delete,
        handlers::overwrite,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        StatusRes,
        SendFileRes,
        RecordRes,
        IndexRes,
        MoveReq,
    ))
)]
pub struct ApiDoc;

/// Builds the full REST router.
///
/// Besides the JSON routes this serves the storage root read-only under `/storagedata`,
/// and the OpenAPI document with Swagger UI under `/swagger-ui`. Request bodies larger than
/// `max_upload_bytes` are refused.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let storage_root = state.store.config().storage_root().to_path_buf();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/sendfile", post(handlers::send_file))
        .route("/allfiles", get(handlers::all_files))
        .route("/underdir", get(handlers::under_dir))
        .route("/byid", get(handlers::by_id))
        .route("/content", get(handlers::content))
        .route("/movefile", post(handlers::move_file))
        .route("/delete", post(handlers::delete))
        .route("/overwrite", post(handlers::overwrite))
        .nest_service("/storagedata", ServeDir::new(storage_root))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
