use crate::worker::Worker;
use dicom_jobs_api::{
    AeTitle, ConnectionName, Dataset, DicomAddress, DicomLevel, JobKind, JobStatus, JobUid,
    Priority, ResponseType,
};
use std::fmt::Write;
use std::time::Duration;

/// What a job does, with the fields specific to its [JobKind].
#[derive(Debug, Clone, PartialEq)]
pub enum JobSpec {
    Echo {
        connection_name: ConnectionName,
    },
    Query {
        connection_name: ConnectionName,
        address: DicomAddress,
        /// Additional matching keys sent with the C-FIND.
        filters: Dataset,
    },
    Retrieve {
        connection_name: ConnectionName,
        address: DicomAddress,
    },
    StorageListen {
        ae_title: AeTitle,
        port: u16,
        timeout: Duration,
    },
}

impl JobSpec {
    pub fn kind(&self) -> JobKind {
        match self {
            JobSpec::Echo { .. } => JobKind::Echo,
            JobSpec::Query { .. } => JobKind::Query,
            JobSpec::Retrieve { .. } => JobKind::Retrieve,
            JobSpec::StorageListen { .. } => JobKind::StorageListen,
        }
    }

    /// The server this job talks to. Listeners have none.
    pub fn connection_name(&self) -> Option<&ConnectionName> {
        match self {
            JobSpec::Echo { connection_name }
            | JobSpec::Query {
                connection_name, ..
            }
            | JobSpec::Retrieve {
                connection_name, ..
            } => Some(connection_name),
            JobSpec::StorageListen { .. } => None,
        }
    }

    pub fn address(&self) -> Option<&DicomAddress> {
        match self {
            JobSpec::Query { address, .. } | JobSpec::Retrieve { address, .. } => Some(address),
            _ => None,
        }
    }
}

/// Two jobs with equal keys do the same thing. See [Job::dedup_key].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Echo(ConnectionName),
    Query(ConnectionName, DicomAddress),
    Retrieve(ConnectionName, DicomAddress),
    StorageListen(AeTitle, u16),
}

/// A unit of DICOM network work.
///
/// A [Job] is plain data: it performs no I/O. Once submitted to a
/// [crate::Scheduler] the scheduler owns the authoritative copy and only
/// hands out snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    uid: Option<JobUid>,
    spec: JobSpec,
    priority: Priority,
    persistent: bool,
    retry_counter: usize,
    maximum_number_of_retry: usize,
    retry_delay: Duration,
    maximum_concurrent_jobs_per_type: usize,
    status: JobStatus,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        let persistent = matches!(spec, JobSpec::StorageListen { .. });
        Self {
            uid: None,
            spec,
            priority: Priority::default(),
            persistent,
            retry_counter: 0,
            maximum_number_of_retry: 3,
            retry_delay: Duration::from_millis(100),
            maximum_concurrent_jobs_per_type: 20,
            status: JobStatus::Initialized,
        }
    }

    pub fn echo(connection_name: ConnectionName) -> Self {
        Self::new(JobSpec::Echo { connection_name })
    }

    pub fn query(connection_name: ConnectionName, address: DicomAddress) -> Self {
        Self::new(JobSpec::Query {
            connection_name,
            address,
            filters: Dataset::new(),
        })
    }

    pub fn retrieve(connection_name: ConnectionName, address: DicomAddress) -> Self {
        Self::new(JobSpec::Retrieve {
            connection_name,
            address,
        })
    }

    pub fn storage_listen(ae_title: AeTitle, port: u16, timeout: Duration) -> Self {
        Self::new(JobSpec::StorageListen {
            ae_title,
            port,
            timeout,
        })
    }

    /// Use a caller-chosen identifier. The scheduler replaces it if it is
    /// already taken by a live job.
    pub fn with_uid(mut self, uid: JobUid) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Persistent jobs survive [crate::Scheduler::clear_completed_jobs] and
    /// `stop_all_jobs(false)`.
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_maximum_number_of_retry(mut self, maximum: usize) -> Self {
        self.maximum_number_of_retry = maximum;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// At least one job of each kind may run, whatever `maximum` says.
    pub fn with_maximum_concurrent_jobs_per_type(mut self, maximum: usize) -> Self {
        self.maximum_concurrent_jobs_per_type = maximum.max(1);
        self
    }

    /// Replace the matching keys of a query job. No effect on other kinds.
    pub fn with_filters(mut self, new_filters: Dataset) -> Self {
        if let JobSpec::Query { filters, .. } = &mut self.spec {
            *filters = new_filters;
        }
        self
    }

    /// Address the job at another server. No effect on listeners.
    pub fn with_connection_name(mut self, name: ConnectionName) -> Self {
        match &mut self.spec {
            JobSpec::Echo { connection_name }
            | JobSpec::Query {
                connection_name, ..
            }
            | JobSpec::Retrieve {
                connection_name, ..
            } => *connection_name = name,
            JobSpec::StorageListen { .. } => (),
        }
        self
    }

    pub fn uid(&self) -> Option<&JobUid> {
        self.uid.as_ref()
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn kind(&self) -> JobKind {
        self.spec.kind()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn retry_counter(&self) -> usize {
        self.retry_counter
    }

    pub fn maximum_number_of_retry(&self) -> usize {
        self.maximum_number_of_retry
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn maximum_concurrent_jobs_per_type(&self) -> usize {
        self.maximum_concurrent_jobs_per_type
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn connection_name(&self) -> Option<&ConnectionName> {
        self.spec.connection_name()
    }

    pub fn address(&self) -> Option<&DicomAddress> {
        self.spec.address()
    }

    pub fn level(&self) -> Option<DicomLevel> {
        self.address().map(DicomAddress::level)
    }

    pub fn response_type(&self) -> ResponseType {
        ResponseType::for_job(self.kind(), self.level())
    }

    /// Jobs with the same kind, server and addressing keys share a key.
    /// Listeners are identified by AE title and port.
    pub fn dedup_key(&self) -> DedupKey {
        match &self.spec {
            JobSpec::Echo { connection_name } => DedupKey::Echo(connection_name.clone()),
            JobSpec::Query {
                connection_name,
                address,
                ..
            } => DedupKey::Query(connection_name.clone(), address.clone()),
            JobSpec::Retrieve {
                connection_name,
                address,
            } => DedupKey::Retrieve(connection_name.clone(), address.clone()),
            JobSpec::StorageListen { ae_title, port, .. } => {
                DedupKey::StorageListen(ae_title.clone(), *port)
            }
        }
    }

    /// An independent duplicate of this job: same addressing, retry and
    /// scheduling configuration, but no identifier, a zero retry counter and
    /// [JobStatus::Initialized].
    pub fn generate_copy(&self) -> Job {
        Self {
            uid: None,
            retry_counter: 0,
            status: JobStatus::Initialized,
            ..self.clone()
        }
    }

    /// A new [Worker] matching the kind of this job, bound to a copy of it.
    pub fn create_worker(&self) -> Worker {
        Worker::bound(self.clone())
    }

    /// Describe this job at its DICOM level, for diagnostics.
    pub fn logger_report(&self, status: &str) -> String {
        let uid = self.uid.as_ref().map(|u| u.as_str()).unwrap_or("(none)");
        let mut report = match &self.spec {
            JobSpec::Echo { connection_name } => {
                format!("echo job {status}.\nJobUID: {uid}\nServer: {connection_name}")
            }
            JobSpec::Query {
                connection_name,
                address,
                ..
            } => format!(
                "query job at {} level {status}.\nJobUID: {uid}\nServer: {connection_name}",
                address.level()
            ),
            JobSpec::Retrieve {
                connection_name,
                address,
            } => format!(
                "retrieve job at {} level {status}.\nJobUID: {uid}\nServer: {connection_name}",
                address.level()
            ),
            JobSpec::StorageListen { ae_title, port, .. } => {
                format!("storage listener job {status}.\nJobUID: {uid}\nAETitle: {ae_title}\nPort: {port}")
            }
        };
        if let Some(address) = self.address() {
            // infallible: writing to a String
            let _ = write_address(&mut report, address);
        }
        report
    }

    /// Admission into the scheduler: the job gets its final identifier.
    pub(crate) fn queue(&mut self, uid: JobUid) {
        self.uid = Some(uid);
        self.set_status(JobStatus::Queued);
    }

    pub(crate) fn set_status(&mut self, status: JobStatus) {
        if !self.status.can_transition_to(status) {
            tracing::warn!(
                job = ?self.uid,
                from = ?self.status,
                to = ?status,
                "unexpected job status transition"
            );
        }
        self.status = status;
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub(crate) fn increment_retry_counter(&mut self) -> usize {
        self.retry_counter += 1;
        self.retry_counter
    }
}

fn write_address(report: &mut String, address: &DicomAddress) -> std::fmt::Result {
    if let Some(patient_id) = address.patient_id() {
        write!(report, "\nPatientID: {patient_id}")?;
    }
    if let Some(study) = address.study_instance_uid() {
        write!(report, "\nStudyInstanceUID: {study}")?;
    }
    if let Some(series) = address.series_instance_uid() {
        write!(report, "\nSeriesInstanceUID: {series}")?;
    }
    if let Some(sop) = address.sop_instance_uid() {
        write!(report, "\nSOPInstanceUID: {sop}")?;
    }
    Ok(())
}
