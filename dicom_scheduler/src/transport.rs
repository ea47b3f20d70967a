//! Interface to the DICOM network layer.
//!
//! Association negotiation and PDU exchange are out of scope for this crate:
//! a [Transport] implementation does that work, and the workers only observe
//! success, failure and the datasets it produces.

use crate::cancel::CancelToken;
use crate::error::TransportError;
use dicom_jobs_api::{
    AeTitle, Dataset, DicomAddress, JobResponseSet, JobUid, RetrieveProtocol, Server,
};
use std::time::Duration;

/// Per-call context handed to every [Transport] operation.
pub struct OperationContext<'a> {
    pub job_uid: &'a JobUid,
    pub cancel: &'a CancelToken,
}

impl OperationContext<'_> {
    /// Returns `true` once the job was stopped. Long-running operations
    /// should poll this and return [TransportError::Canceled].
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }
}

/// Parameters of a C-STORE SCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub ae_title: AeTitle,
    pub port: u16,
    /// Idle timeout of a single incoming association.
    pub timeout: Duration,
}

/// Blocking DICOM network operations.
///
/// Every method blocks the calling pool thread for the duration of the
/// operation. Implementations must be callable from several threads at once.
pub trait Transport: Send + Sync {
    /// C-ECHO.
    fn echo(&self, server: &Server, ctx: &OperationContext) -> Result<(), TransportError>;

    /// C-FIND at the level of `address`. `filters` are additional matching keys.
    fn find(
        &self,
        server: &Server,
        address: &DicomAddress,
        filters: &Dataset,
        ctx: &OperationContext,
    ) -> Result<Vec<Dataset>, TransportError>;

    /// C-GET or C-MOVE at the level of `address`. Every received dataset is
    /// passed to `sink` as soon as it arrives.
    fn retrieve(
        &self,
        server: &Server,
        address: &DicomAddress,
        protocol: RetrieveProtocol,
        ctx: &OperationContext,
        sink: &mut dyn FnMut(Dataset),
    ) -> Result<(), TransportError>;

    /// Run a C-STORE SCP until `ctx` is canceled or an error occurs. Every
    /// stored instance is passed to `sink` as a [JobResponseSet].
    ///
    /// Cancellation is the normal way for a listener to stop, so returning
    /// either `Ok(())` or [TransportError::Canceled] after it is fine.
    fn listen(
        &self,
        listener: &ListenerConfig,
        ctx: &OperationContext,
        sink: &mut dyn FnMut(JobResponseSet),
    ) -> Result<(), TransportError>;
}
