//! Core configuration.
//!
//! Resolved once at startup by the binary and passed in; nothing in this
//! crate reads the environment directly. The `*_from_env_value` helpers
//! exist so binaries interpret raw environment strings consistently.

use crate::error::{CoreError, CoreResult};
use medledger_ledger::{
    ChaincodeRef, DurableLedger, FabricGateway, FabricLedger, LedgerPort,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default chaincode invocation deadline.
pub const DEFAULT_FABRIC_TIMEOUT: Duration = Duration::from_secs(30);

/// Which ledger backend anchors records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Local append-only journal under the data directory.
    Durable,
    /// External Fabric-style ledger reached through an injected gateway.
    Fabric {
        channel: String,
        chaincode: String,
        timeout: Duration,
    },
}

#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    ledger: LedgerBackend,
}

impl CoreConfig {
    /// Builds a configuration rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for an empty data directory path.
    pub fn new(data_dir: impl Into<PathBuf>, ledger: LedgerBackend) -> CoreResult<Self> {
        let data_dir = data_dir.into();
        if data_dir.as_os_str().is_empty() {
            return Err(CoreError::Validation("data directory is required".into()));
        }
        Ok(Self { data_dir, ledger })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn ledger(&self) -> &LedgerBackend {
        &self.ledger
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    pub fn grants_dir(&self) -> PathBuf {
        self.data_dir.join("grants")
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.data_dir.join("requests")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.data_dir.join("audit")
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }
}

/// Interprets a raw `MEDLEDGER_LEDGER` value: `durable` (the default when
/// absent) or `fabric`.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] for any other value.
pub fn ledger_backend_from_env_value(
    value: Option<&str>,
    channel: String,
    chaincode: String,
) -> CoreResult<LedgerBackend> {
    match value {
        None | Some("durable") => Ok(LedgerBackend::Durable),
        Some("fabric") => Ok(LedgerBackend::Fabric {
            channel,
            chaincode,
            timeout: DEFAULT_FABRIC_TIMEOUT,
        }),
        Some(other) => Err(CoreError::Validation(format!(
            "unknown ledger backend: '{}' (expected 'durable' or 'fabric')",
            other
        ))),
    }
}

/// Constructs the configured ledger backend.
///
/// The Fabric backend needs a transport; the binary supplies one as
/// `gateway`. Selecting Fabric without a gateway is a configuration error,
/// not a runtime surprise.
///
/// # Errors
///
/// - [`CoreError::Validation`] for Fabric without a gateway.
/// - [`CoreError::LedgerUnavailable`] if the durable journal cannot be
///   opened.
pub fn build_ledger(
    config: &CoreConfig,
    gateway: Option<Arc<dyn FabricGateway>>,
) -> CoreResult<Arc<dyn LedgerPort>> {
    match config.ledger() {
        LedgerBackend::Durable => {
            let ledger = DurableLedger::open(&config.ledger_dir())?;
            Ok(Arc::new(ledger))
        }
        LedgerBackend::Fabric {
            channel,
            chaincode,
            timeout,
        } => {
            let gateway = gateway.ok_or_else(|| {
                CoreError::Validation(
                    "fabric ledger backend selected but no gateway is configured".into(),
                )
            })?;
            let context = ChaincodeRef {
                channel: channel.clone(),
                chaincode: chaincode.clone(),
            };
            Ok(Arc::new(FabricLedger::new(gateway, context, *timeout)))
        }
    }
}
