//! Execution of a single job on a pool thread.

mod echo;
mod query;
mod retrieve;
mod storage_listener;

use crate::cancel::CancelToken;
use crate::error::{TransportError, WorkerError};
use crate::job::{Job, JobSpec};
use crate::scheduler::{Begin, Outcome, SchedulerInner};
use crate::transport::OperationContext;
use dicom_jobs_api::{FailureReason, JobKind, JobResponseSet, JobUid, Server};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Weak;

/// Runs exactly one job, translating the outcome of the transport into
/// job status transitions and response sets.
///
/// A worker only holds a [Weak] handle to its scheduler and a snapshot of
/// its job: the scheduler may drop both at any time.
pub struct Worker {
    kind: JobKind,
    job: Option<Job>,
    cancel: CancelToken,
    scheduler: Weak<SchedulerInner>,
}

impl Worker {
    /// Create an unbound worker for jobs of the given kind.
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            job: None,
            cancel: CancelToken::new(),
            scheduler: Weak::new(),
        }
    }

    pub(crate) fn bound(job: Job) -> Self {
        let kind = job.kind();
        Self {
            job: Some(job),
            ..Self::new(kind)
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Bind a job to this worker. A worker is bound at most once.
    pub fn set_job(&mut self, job: Job) -> Result<(), WorkerError> {
        if let Some(bound) = &self.job {
            let uid = bound.uid().map(|u| u.to_string()).unwrap_or_default();
            return Err(WorkerError::AlreadyBound(uid));
        }
        if job.kind() != self.kind {
            return Err(WorkerError::KindMismatch {
                worker: self.kind,
                job: job.kind(),
            });
        }
        self.job = Some(job);
        Ok(())
    }

    /// Ask the running transport operation to stop at its next checkpoint.
    /// Safe to call from any thread.
    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Connect this worker to its scheduler, sharing the cancellation flag
    /// of the scheduler's job entry.
    pub(crate) fn attach(&mut self, scheduler: Weak<SchedulerInner>, cancel: CancelToken) {
        self.scheduler = scheduler;
        self.cancel = cancel;
    }

    /// Execute the job. Every outcome is reported to the scheduler, including
    /// a panic raised by the transport or the catalog.
    pub fn run(self) {
        let Some(uid) = self.job.as_ref().and_then(|j| j.uid().cloned()) else {
            tracing::warn!(kind = ?self.kind, "worker has no submitted job to run");
            return;
        };
        let Some(scheduler) = self.scheduler.upgrade() else {
            tracing::info!(job = %uid, "scheduler is gone, job canceled");
            return;
        };

        let server = match self.job.as_ref().and_then(Job::connection_name) {
            Some(name) => match scheduler.server(name) {
                Some(server) => Some(server),
                None => {
                    tracing::warn!(job = %uid, connection = %name, "unknown server, job canceled");
                    scheduler.complete(&uid, Outcome::Canceled);
                    return;
                }
            },
            None => None,
        };

        let job = match scheduler.begin(&uid) {
            Begin::Run(job) => job,
            Begin::Canceled | Begin::Gone => return,
        };
        tracing::debug!(
            thread = std::thread::current().name().unwrap_or("?"),
            "{}",
            job.logger_report("started")
        );

        let execution = Execution {
            scheduler: &scheduler,
            job: &job,
            uid: &uid,
            cancel: &self.cancel,
        };
        let result = catch_unwind(AssertUnwindSafe(|| execution.execute(server.as_ref())))
            .unwrap_or_else(|payload| Err(Failure::Panicked(panic_message(payload.as_ref()))));

        let canceled = matches!(result, Err(Failure::Transport(TransportError::Canceled)));
        if canceled || self.cancel.is_canceled() || scheduler.is_stopped(&uid) {
            tracing::debug!("{}", job.logger_report("canceled"));
            scheduler.complete(&uid, Outcome::Canceled);
            return;
        }

        let outcome = match result {
            Ok(Completion::Insert(response_sets)) => {
                match catch_unwind(AssertUnwindSafe(|| {
                    scheduler.insert_job_response_sets(response_sets)
                })) {
                    Ok(()) => Outcome::Succeeded,
                    Err(payload) => panicked(&uid, panic_message(payload.as_ref())),
                }
            }
            Ok(Completion::Chain(copy)) => {
                if let Some(chained) = scheduler.add_job(copy, false) {
                    tracing::info!(job = %uid, chained = %chained, "job handed off to proxy server");
                }
                Outcome::Succeeded
            }
            Err(Failure::Transport(e)) => Outcome::TransportFailed(e),
            Err(Failure::NotImplemented(what)) => {
                Outcome::Failed(FailureReason::NotImplemented(what))
            }
            Err(Failure::Panicked(message)) => panicked(&uid, message),
        };
        tracing::debug!("{}", job.logger_report("done"));
        scheduler.complete(&uid, outcome);
    }
}

fn panicked(uid: &JobUid, message: String) -> Outcome {
    tracing::error!(job = %uid, panic = %message, "job panicked");
    Outcome::Failed(FailureReason::Panicked(message))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Everything a strategy needs to execute a job.
pub(crate) struct Execution<'a> {
    pub scheduler: &'a SchedulerInner,
    pub job: &'a Job,
    pub uid: &'a JobUid,
    pub cancel: &'a CancelToken,
}

/// Successful end of a strategy.
pub(crate) enum Completion {
    /// Response sets to hand to the catalog.
    Insert(Vec<JobResponseSet>),
    /// Submit this job instead of storing results.
    Chain(Job),
}

pub(crate) enum Failure {
    Transport(TransportError),
    NotImplemented(String),
    Panicked(String),
}

impl From<TransportError> for Failure {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl Execution<'_> {
    pub fn context(&self) -> OperationContext<'_> {
        OperationContext {
            job_uid: self.uid,
            cancel: self.cancel,
        }
    }

    /// A response set tagged with the identity and addressing keys of this job.
    pub fn new_response_set(&self) -> JobResponseSet {
        let mut set = JobResponseSet::new(self.uid.clone(), self.job.response_type());
        if let Some(address) = self.job.address() {
            set = set.with_address(address);
        }
        if let Some(name) = self.job.connection_name() {
            set = set.with_connection_name(name.clone());
        }
        set
    }

    /// The same job, addressed at `proxy`.
    pub fn chain_to(&self, proxy: &Server) -> Job {
        self.job
            .generate_copy()
            .with_connection_name(proxy.connection_name.clone())
    }

    fn execute(&self, server: Option<&Server>) -> Result<Completion, Failure> {
        match (self.job.spec(), server) {
            (JobSpec::Echo { .. }, Some(server)) => echo::execute(self, server),
            (JobSpec::Query { address, filters, .. }, Some(server)) => {
                query::execute(self, server, address, filters)
            }
            (JobSpec::Retrieve { address, .. }, Some(server)) => {
                retrieve::execute(self, server, address)
            }
            (JobSpec::StorageListen { ae_title, port, timeout }, _) => {
                storage_listener::execute(self, ae_title, *port, *timeout)
            }
            // connection names are resolved before the job starts
            (spec, None) => Err(Failure::NotImplemented(format!(
                "{:?} job without a server",
                spec.kind()
            ))),
        }
    }
}
