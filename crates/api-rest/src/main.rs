//! MedLedger REST API server binary.
//!
//! Resolves configuration from the environment once, wires the blob store,
//! ledger backend and identity directory, and serves the REST router with
//! Swagger UI.
//!
//! ## Environment Variables
//! - `MEDLEDGER_REST_ADDR`: server address (default: "0.0.0.0:3000")
//! - `MEDLEDGER_DATA_DIR`: data directory root (default: "./medledger-data")
//! - `MEDLEDGER_LEDGER`: `durable` (default) or `fabric`
//! - `MEDLEDGER_FABRIC_CHANNEL`: fabric channel (default: "medical-channel")
//! - `MEDLEDGER_FABRIC_CHAINCODE`: fabric chaincode (default: "encryption")
//! - `MEDLEDGER_DIRECTORY_FILE`: optional provider directory JSON file

use api_rest::{router, ApiDoc, AppState};
use medledger_core::config::{build_ledger, ledger_backend_from_env_value, CoreConfig};
use medledger_core::identity::{IdentityLookup, NullDirectory, StaticDirectory};
use medledger_core::PatientService;
use medledger_storage::FsBlobStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const DEFAULT_DATA_DIR: &str = "./medledger-data";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("MEDLEDGER_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("-- Starting MedLedger REST API on {}", addr);

    let data_dir = std::env::var("MEDLEDGER_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    std::fs::create_dir_all(&data_dir)?;

    let channel =
        std::env::var("MEDLEDGER_FABRIC_CHANNEL").unwrap_or_else(|_| "medical-channel".into());
    let chaincode =
        std::env::var("MEDLEDGER_FABRIC_CHAINCODE").unwrap_or_else(|_| "encryption".into());
    let backend = ledger_backend_from_env_value(
        std::env::var("MEDLEDGER_LEDGER").ok().as_deref(),
        channel,
        chaincode,
    )?;

    let cfg = CoreConfig::new(PathBuf::from(data_dir), backend)?;

    let identity: Arc<dyn IdentityLookup> = match std::env::var("MEDLEDGER_DIRECTORY_FILE") {
        Ok(path) => {
            let directory = StaticDirectory::from_file(std::path::Path::new(&path))?;
            tracing::info!("loaded provider directory ({} entries)", directory.len());
            Arc::new(directory)
        }
        Err(_) => Arc::new(NullDirectory),
    };

    let blobs = Arc::new(FsBlobStore::open(&cfg.blob_dir())?);
    // No gateway is wired here: selecting the fabric backend requires a
    // deployment that provides one, and fails fast below if it does not.
    let ledger = build_ledger(&cfg, None)?;
    let service = Arc::new(PatientService::new(&cfg, blobs, ledger, identity)?);

    let app = router(AppState { service }).merge(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
