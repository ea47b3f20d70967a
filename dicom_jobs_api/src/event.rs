use crate::job::{FailureReason, JobDetail, JobKind};
use crate::types::JobUid;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::time::Duration;

/// A job lifecycle notification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct JobEvent {
    #[serde(rename = "JobUID")]
    pub job_uid: JobUid,
    pub kind: JobKind,
    pub event: JobEventKind,
}

/// What happened to a job.
///
/// Every job emits exactly one of [JobEventKind::Failed] or
/// [JobEventKind::Finished] as its last event. A cooperatively stopped job
/// emits [JobEventKind::Canceled] followed by `Finished { canceled: true }`.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "Type", content = "Content")]
pub enum JobEventKind {
    /// A worker started executing the job.
    Started,
    /// A batch of results was produced.
    Progress(JobDetail),
    /// The job failed with a retryable error and was queued again.
    #[serde(rename_all = "PascalCase")]
    Retrying {
        attempt: usize,
        #[serde_as(as = "DurationMilliSeconds<u64>")]
        delay: Duration,
    },
    /// The job observed a stop request.
    Canceled,
    /// The job failed permanently.
    Failed(FailureReason),
    #[serde(rename_all = "PascalCase")]
    Finished { canceled: bool },
}

impl JobEventKind {
    /// Returns `true` for the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEventKind::Failed(_) | JobEventKind::Finished { .. })
    }
}
