use crate::dicom::{Dataset, DicomAddress, DicomLevel};
use crate::types::{ConnectionName, JobUid, PatientId, SeriesInstanceUid, SopInstanceUid, StudyInstanceUid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// The DICOM network operation performed by a job.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Copy, Clone, Hash)]
pub enum JobKind {
    /// C-ECHO connectivity check.
    Echo,
    /// C-FIND.
    Query,
    /// C-GET or C-MOVE, depending on the server's retrieve protocol.
    Retrieve,
    /// Passive C-STORE SCP.
    StorageListen,
}

/// Job status.
///
/// ```text
/// Initialized → Queued → Running → {Finished, Failed}
///                  │        │ ↑
///                  │        │ └─ retry: Running → Queued
///                  └────────┴──→ Stopped → Finished
/// ```
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Copy, Clone, Hash, Default)]
pub enum JobStatus {
    /// Constructed but never submitted.
    #[default]
    Initialized,
    /// Accepted by the scheduler, waiting for a free slot or for a pool thread.
    Queued,
    /// A worker is executing the job.
    Running,
    /// Cancellation was requested; the worker has not observed it yet.
    Stopped,
    /// Terminal: success or cooperative cancellation.
    Finished,
    /// Terminal: non-retryable failure or retries exhausted.
    Failed,
}

impl JobStatus {
    /// Returns `true` for [JobStatus::Finished] and [JobStatus::Failed].
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Returns `true` if the job occupies the scheduler: queued, running,
    /// or stopped but not yet unwound.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Queued | JobStatus::Running | JobStatus::Stopped
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Initialized, Queued)
                | (Queued, Running)
                | (Queued, Stopped)
                | (Queued, Finished)
                | (Running, Stopped)
                | (Running, Finished)
                | (Running, Failed)
                | (Running, Queued)
                | (Stopped, Finished)
        )
    }
}

/// Scheduling hint given to the thread pool. Higher runs first.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Copy, Clone, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    Idle,
    Lowest,
    #[default]
    Low,
    Normal,
    High,
    Highest,
    TimeCritical,
}

/// What a [JobResponseSet] contains, derived from the kind and level of the
/// job that produced it.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Copy, Clone, Hash, Default)]
pub enum ResponseType {
    #[default]
    None,
    QueryPatients,
    QueryStudies,
    QuerySeries,
    QueryInstances,
    RetrieveStudy,
    RetrieveSeries,
    #[serde(rename = "RetrieveSOPInstance")]
    RetrieveSopInstance,
    #[serde(rename = "StoreSOPInstance")]
    StoreSopInstance,
}

impl ResponseType {
    pub fn for_job(kind: JobKind, level: Option<DicomLevel>) -> Self {
        match (kind, level) {
            (JobKind::Query, Some(DicomLevel::Patients)) => ResponseType::QueryPatients,
            (JobKind::Query, Some(DicomLevel::Studies)) => ResponseType::QueryStudies,
            (JobKind::Query, Some(DicomLevel::Series)) => ResponseType::QuerySeries,
            (JobKind::Query, Some(DicomLevel::Instances)) => ResponseType::QueryInstances,
            (JobKind::Retrieve, Some(DicomLevel::Studies)) => ResponseType::RetrieveStudy,
            (JobKind::Retrieve, Some(DicomLevel::Series)) => ResponseType::RetrieveSeries,
            (JobKind::Retrieve, Some(DicomLevel::Instances)) => ResponseType::RetrieveSopInstance,
            (JobKind::StorageListen, _) => ResponseType::StoreSopInstance,
            _ => ResponseType::None,
        }
    }
}

/// Why a job ended in [JobStatus::Failed].
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub enum FailureReason {
    /// The transport failed and no retries are left.
    Transport(String),
    /// The operation is not supported, e.g. retrieving a whole patient.
    NotImplemented(String),
    /// The transport or the catalog panicked while running the job.
    Panicked(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Transport(e) => write!(f, "transport failure: {e}"),
            FailureReason::NotImplemented(e) => write!(f, "not implemented: {e}"),
            FailureReason::Panicked(e) => write!(f, "panicked: {e}"),
        }
    }
}

/// Summary of a [JobResponseSet], sent to subscribers as job progress.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct JobDetail {
    pub type_of_job: ResponseType,
    #[serde(rename = "JobUID")]
    pub job_uid: JobUid,
    #[serde(rename = "PatientID")]
    pub patient_id: Option<PatientId>,
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: Option<StudyInstanceUid>,
    #[serde(rename = "SeriesInstanceUID")]
    pub series_instance_uid: Option<SeriesInstanceUid>,
    #[serde(rename = "SOPInstanceUID")]
    pub sop_instance_uid: Option<SopInstanceUid>,
    pub connection_name: Option<ConnectionName>,
    pub number_of_datasets: usize,
}

/// Datasets produced by one job execution, destined for the catalog.
///
/// Datasets are keyed by [Dataset::unique_key]; inserting a dataset with a
/// key already present replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobResponseSet {
    #[serde(rename = "JobUID")]
    job_uid: JobUid,
    type_of_job: ResponseType,
    #[serde(rename = "PatientID")]
    patient_id: Option<PatientId>,
    #[serde(rename = "StudyInstanceUID")]
    study_instance_uid: Option<StudyInstanceUid>,
    #[serde(rename = "SeriesInstanceUID")]
    series_instance_uid: Option<SeriesInstanceUid>,
    #[serde(rename = "SOPInstanceUID")]
    sop_instance_uid: Option<SopInstanceUid>,
    connection_name: Option<ConnectionName>,
    file_path: Option<PathBuf>,
    copy_file: bool,
    overwrite_existing_dataset: bool,
    datasets: HashMap<String, Dataset>,
}

impl JobResponseSet {
    pub fn new(job_uid: JobUid, type_of_job: ResponseType) -> Self {
        Self {
            job_uid,
            type_of_job,
            patient_id: None,
            study_instance_uid: None,
            series_instance_uid: None,
            sop_instance_uid: None,
            connection_name: None,
            file_path: None,
            copy_file: false,
            overwrite_existing_dataset: false,
            datasets: HashMap::new(),
        }
    }

    /// Copy the addressing keys of a job.
    pub fn with_address(mut self, address: &DicomAddress) -> Self {
        self.patient_id = address.patient_id().cloned();
        self.study_instance_uid = address.study_instance_uid().cloned();
        self.series_instance_uid = address.series_instance_uid().cloned();
        self.sop_instance_uid = address.sop_instance_uid().cloned();
        self
    }

    pub fn with_connection_name(mut self, connection_name: ConnectionName) -> Self {
        self.connection_name = Some(connection_name);
        self
    }

    pub fn with_file_path(mut self, file_path: PathBuf) -> Self {
        self.file_path = Some(file_path);
        self
    }

    /// Whether the file at [JobResponseSet::file_path] should be copied into managed storage.
    pub fn with_copy_file(mut self, copy_file: bool) -> Self {
        self.copy_file = copy_file;
        self
    }

    pub fn with_overwrite_existing_dataset(mut self, overwrite: bool) -> Self {
        self.overwrite_existing_dataset = overwrite;
        self
    }

    /// Add a dataset. Returns the dataset it replaced, if any.
    pub fn insert_dataset(&mut self, dataset: Dataset) -> Option<Dataset> {
        let key = dataset.unique_key().to_string();
        self.datasets.insert(key, dataset)
    }

    pub fn job_uid(&self) -> &JobUid {
        &self.job_uid
    }

    pub fn type_of_job(&self) -> ResponseType {
        self.type_of_job
    }

    pub fn patient_id(&self) -> Option<&PatientId> {
        self.patient_id.as_ref()
    }

    pub fn study_instance_uid(&self) -> Option<&StudyInstanceUid> {
        self.study_instance_uid.as_ref()
    }

    pub fn series_instance_uid(&self) -> Option<&SeriesInstanceUid> {
        self.series_instance_uid.as_ref()
    }

    pub fn sop_instance_uid(&self) -> Option<&SopInstanceUid> {
        self.sop_instance_uid.as_ref()
    }

    pub fn connection_name(&self) -> Option<&ConnectionName> {
        self.connection_name.as_ref()
    }

    pub fn file_path(&self) -> Option<&std::path::Path> {
        self.file_path.as_deref()
    }

    pub fn copy_file(&self) -> bool {
        self.copy_file
    }

    pub fn overwrite_existing_dataset(&self) -> bool {
        self.overwrite_existing_dataset
    }

    pub fn datasets(&self) -> &HashMap<String, Dataset> {
        &self.datasets
    }

    pub fn into_datasets(self) -> HashMap<String, Dataset> {
        self.datasets
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Summarize this response set for progress notifications.
    pub fn to_detail(&self) -> JobDetail {
        JobDetail {
            type_of_job: self.type_of_job,
            job_uid: self.job_uid.clone(),
            patient_id: self.patient_id.clone(),
            study_instance_uid: self.study_instance_uid.clone(),
            series_instance_uid: self.series_instance_uid.clone(),
            sop_instance_uid: self.sop_instance_uid.clone(),
            connection_name: self.connection_name.clone(),
            number_of_datasets: self.datasets.len(),
        }
    }
}
