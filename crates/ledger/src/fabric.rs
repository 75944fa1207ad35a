//! Distributed-ledger backend.
//!
//! Adapts an external permissioned ledger (a Hyperledger-Fabric-style
//! chaincode) to [`LedgerPort`]. The network transport is abstracted behind
//! [`FabricGateway`] so the core never depends on an SDK: the gateway
//! receives a transaction name, string arguments and a deadline, and answers
//! with raw bytes this module decodes.
//!
//! Wire shapes follow the `storeProtectedMedicalData` chaincode contract:
//! camelCase JSON with RFC 3339 timestamps.

use crate::{AnchorReceipt, AnchorRequest, AnchoredRecord, LedgerPort, LedgerResult};
use std::sync::Arc;
use std::time::Duration;

/// Chaincode transaction that anchors one protected record.
pub const STORE_PROTECTED_TX: &str = "storeProtectedMedicalData";

/// Chaincode query returning every anchored record for a subject.
pub const QUERY_SUBJECT_RECORDS: &str = "getPatientRecords";

/// Addressing context for a chaincode invocation.
#[derive(Clone, Debug)]
pub struct ChaincodeRef {
    pub channel: String,
    pub chaincode: String,
}

/// Narrow transport contract to an external Fabric-style gateway.
///
/// Implementations own connection management and must respect the supplied
/// deadline, answering [`LedgerError::Timeout`] instead of blocking. An
/// unknown transaction or query name is answered with
/// [`LedgerError::UnsupportedOperation`].
///
/// [`LedgerError::Timeout`]: crate::LedgerError::Timeout
/// [`LedgerError::UnsupportedOperation`]: crate::LedgerError::UnsupportedOperation
pub trait FabricGateway: Send + Sync {
    /// Submits a state-changing transaction and returns the raw result bytes.
    fn submit(
        &self,
        context: &ChaincodeRef,
        transaction: &str,
        args: &[String],
        timeout: Duration,
    ) -> LedgerResult<Vec<u8>>;

    /// Evaluates a read-only query and returns the raw result bytes.
    fn evaluate(
        &self,
        context: &ChaincodeRef,
        query: &str,
        args: &[String],
        timeout: Duration,
    ) -> LedgerResult<Vec<u8>>;
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRecordsRes {
    records: Vec<AnchoredRecord>,
}

/// [`LedgerPort`] backend over an external distributed ledger.
///
/// Durability and ordering guarantees are whatever the external ledger
/// provides; this adapter only shapes requests and decodes answers.
pub struct FabricLedger {
    gateway: Arc<dyn FabricGateway>,
    context: ChaincodeRef,
    timeout: Duration,
}

impl FabricLedger {
    /// Creates a backend submitting through `gateway` to the given channel
    /// and chaincode, with `timeout` applied to every invocation.
    pub fn new(gateway: Arc<dyn FabricGateway>, context: ChaincodeRef, timeout: Duration) -> Self {
        Self {
            gateway,
            context,
            timeout,
        }
    }
}

impl LedgerPort for FabricLedger {
    fn anchor(&self, request: AnchorRequest) -> LedgerResult<AnchorReceipt> {
        let payload_json = serde_json::to_string(&request.payload)?;
        let args = [
            request.record_id,
            payload_json,
            request.submitter_id,
            request.subject_id,
        ];

        let bytes = self
            .gateway
            .submit(&self.context, STORE_PROTECTED_TX, &args, self.timeout)?;

        let receipt: AnchorReceipt = serde_json::from_slice(&bytes)?;
        Ok(receipt)
    }

    fn query_by_subject(&self, subject_id: &str) -> LedgerResult<Vec<AnchoredRecord>> {
        let args = [subject_id.to_string()];
        let bytes =
            self.gateway
                .evaluate(&self.context, QUERY_SUBJECT_RECORDS, &args, self.timeout)?;

        let res: QueryRecordsRes = serde_json::from_slice(&bytes)?;
        Ok(res.records)
    }
}
