//! # MedLedger Core
//!
//! Consent-and-provenance core for patient-controlled medical records.
//!
//! This crate owns the parts of the system with real invariants to protect:
//! - [`registry`] — `MedicalRecord` entities: metadata, content handle and
//!   ledger anchor, created only when both exist.
//! - [`consent`] — the `AccessGrant` / `AccessRequest` state machines that
//!   govern who may reach a subject's records.
//! - [`audit`] — the append-only, per-subject activity log that makes every
//!   state transition independently verifiable.
//! - [`facade`] — the coordinator sequencing blob storage, ledger anchoring,
//!   registry writes and audit events.
//!
//! **No API concerns**: HTTP endpoints, envelopes and serialization for the
//! wire belong in `api-rest`. External collaborators (blob store, ledger,
//! identity directory) are reached only through the contracts in
//! `medledger-storage`, `medledger-ledger` and [`identity`].

pub mod audit;
pub mod config;
pub mod consent;
pub mod error;
pub mod facade;
pub mod identity;
pub mod model;
pub mod registry;

mod store;

pub use config::{CoreConfig, LedgerBackend};
pub use error::{CoreError, CoreResult};
pub use facade::{PatientService, UploadRecord};
