use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use fileshelf_store::{
    config::{max_upload_bytes_from_env_value, storage_root_from_env_value},
    FileStore, StoreConfig,
};

/// Main entry point for the fileshelf application
///
/// Opens the file store and serves the REST API, including the read-only
/// `/storagedata` mount and Swagger UI.
///
/// # Environment Variables
/// - `FILESHELF_REST_ADDR`: REST server address (default: "0.0.0.0:8081")
/// - `FILESHELF_STORAGE_DIR`: Storage root (default: "storagedata")
/// - `FILESHELF_MAX_UPLOAD_BYTES`: Request body limit (default: 16000000)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, store startup, or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fileshelf_store=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("FILESHELF_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".into());
    let storage_root = storage_root_from_env_value(std::env::var("FILESHELF_STORAGE_DIR").ok());
    let max_upload_bytes =
        max_upload_bytes_from_env_value(std::env::var("FILESHELF_MAX_UPLOAD_BYTES").ok())?;

    let store = FileStore::open(StoreConfig::with_defaults(storage_root)?)?;
    tracing::info!(
        "++ Serving storage root {}",
        store.config().storage_root().display()
    );

    let app = api_rest::router(
        AppState {
            store: Arc::new(store),
        },
        max_upload_bytes,
    );

    tracing::info!("++ Starting fileshelf REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
