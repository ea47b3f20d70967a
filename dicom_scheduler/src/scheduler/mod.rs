//! The job table, admission control and the job state machine.

mod state;

use self::state::{JobEntry, State};
use crate::catalog::Catalog;
use crate::config::SchedulerConfig;
use crate::error::TransportError;
use crate::job::Job;
use crate::lock;
use crate::notify::NotificationThread;
use crate::pool::{Task, ThreadPool};
use crate::transport::Transport;
use dicom_jobs_api::*;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// Result of [SchedulerInner::begin].
pub(crate) enum Begin {
    /// The job is now running. Contains a snapshot of it.
    Run(Job),
    /// The job was stopped before it started and is now finished.
    Canceled,
    /// The job was removed or is not waiting to run.
    Gone,
}

/// What a worker reports to [SchedulerInner::complete].
pub(crate) enum Outcome {
    Succeeded,
    Canceled,
    TransportFailed(TransportError),
    Failed(FailureReason),
}

/// State shared by the [Scheduler] handle and its workers.
pub(crate) struct SchedulerInner {
    this: Weak<SchedulerInner>,
    state: Mutex<State>,
    /// Notified every time a job becomes terminal.
    idle: Condvar,
    pool: ThreadPool,
    transport: Arc<dyn Transport>,
    catalog: Arc<dyn Catalog>,
    config: SchedulerConfig,
    events: Mutex<Option<Sender<JobEvent>>>,
}

impl SchedulerInner {
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn emit(&self, uid: &JobUid, kind: JobKind, event: JobEventKind) {
        if let Some(sender) = lock(&self.events).as_ref() {
            let event = JobEvent {
                job_uid: uid.clone(),
                kind,
                event,
            };
            if sender.send(event).is_err() {
                tracing::debug!(job = %uid, "notification thread is gone, event dropped");
            }
        }
    }

    /// Admit a job. Returns its UID, or `None` if an equivalent job is
    /// already queued or running (unless `force`) or the scheduler is
    /// shutting down.
    pub fn add_job(&self, mut job: Job, force: bool) -> Option<JobUid> {
        let mut state = self.lock_state();
        if state.shutting_down {
            tracing::warn!(kind = ?job.kind(), "scheduler is shutting down, job ignored");
            return None;
        }
        let key = job.dedup_key();
        if !force && let Some(existing) = state.active.get_by_left(&key) {
            tracing::debug!(
                existing = %existing,
                kind = ?job.kind(),
                "an equivalent job is already queued or running"
            );
            return None;
        }
        let uid = match job.uid() {
            Some(uid) if !state.jobs.contains_key(uid) => uid.clone(),
            requested => {
                if let Some(uid) = requested {
                    tracing::warn!(job = %uid, "job UID already in use, generating another one");
                }
                state.generate_unique_job_uid()
            }
        };
        job.queue(uid.clone());

        let kind = job.kind();
        let can_dispatch =
            state.same_kind_dispatched(kind) < job.maximum_concurrent_jobs_per_type();
        if state.active.insert_no_overwrite(key, uid.clone()).is_err() {
            tracing::debug!(job = %uid, "forced duplicate of an active job");
        }
        tracing::debug!(
            job = %uid,
            kind = ?kind,
            priority = ?job.priority(),
            held = !can_dispatch,
            "job queued"
        );
        let seq = state.next_seq();
        state.jobs.insert(uid.clone(), JobEntry::new(job, seq));
        if can_dispatch {
            self.dispatch(&mut state, &uid, None);
        }
        Some(uid)
    }

    /// Hand a queued job to the thread pool.
    fn dispatch(&self, state: &mut State, uid: &JobUid, delay: Option<Duration>) {
        let Some(entry) = state.jobs.get_mut(uid) else {
            return;
        };
        entry.dispatched = true;
        let mut worker = entry.job.create_worker();
        worker.attach(self.this.clone(), entry.cancel.clone());
        let task = Task {
            uid: uid.clone(),
            priority: entry.job.priority(),
            seq: entry.seq,
            worker,
        };
        self.pool.submit(task, delay);
    }

    /// Dispatch held-back jobs of a kind while its concurrency limit allows.
    fn dispatch_held(&self, state: &mut State, kind: JobKind) {
        while let Some((uid, limit)) = state.next_held(kind) {
            if state.same_kind_dispatched(kind) >= limit {
                break;
            }
            self.dispatch(state, &uid, None);
        }
    }

    /// Called by a worker before it touches the network.
    pub fn begin(&self, uid: &JobUid) -> Begin {
        let mut state = self.lock_state();
        let Some(entry) = state.jobs.get_mut(uid) else {
            return Begin::Gone;
        };
        match entry.job.status() {
            JobStatus::Queued if !entry.cancel.is_canceled() => {
                entry.job.set_status(JobStatus::Running);
                let job = entry.job.clone();
                self.emit(uid, job.kind(), JobEventKind::Started);
                Begin::Run(job)
            }
            JobStatus::Queued | JobStatus::Stopped => {
                tracing::debug!(job = %uid, "job stopped before it started");
                self.finish(&mut state, uid, true);
                Begin::Canceled
            }
            status => {
                tracing::warn!(job = %uid, status = ?status, "job is not waiting to run");
                Begin::Gone
            }
        }
    }

    /// Returns `true` if the job was stopped or is not in the table anymore.
    pub fn is_stopped(&self, uid: &JobUid) -> bool {
        self.lock_state()
            .jobs
            .get(uid)
            .is_none_or(|e| e.job.status() == JobStatus::Stopped)
    }

    /// Called by a worker once its job is done, to apply the outcome.
    pub fn complete(&self, uid: &JobUid, outcome: Outcome) {
        let mut state = self.lock_state();
        let Some(entry) = state.jobs.get_mut(uid) else {
            tracing::debug!(job = %uid, "completed job was removed");
            return;
        };
        let stopped = entry.job.status() == JobStatus::Stopped || entry.cancel.is_canceled();
        match outcome {
            _ if stopped => self.finish(&mut state, uid, true),
            Outcome::Canceled => self.finish(&mut state, uid, true),
            Outcome::Succeeded => self.finish(&mut state, uid, false),
            Outcome::Failed(reason) => {
                tracing::error!(job = %uid, "job failed: {reason}");
                self.settle(
                    &mut state,
                    uid,
                    JobStatus::Failed,
                    vec![JobEventKind::Failed(reason)],
                );
            }
            Outcome::TransportFailed(error)
                if error.is_retryable()
                    && entry.job.retry_counter() < entry.job.maximum_number_of_retry() =>
            {
                let attempt = entry.job.increment_retry_counter();
                let delay = entry.job.retry_delay();
                let kind = entry.job.kind();
                entry.job.set_status(JobStatus::Queued);
                tracing::warn!(job = %uid, attempt, delay = ?delay, "{error}, retrying");
                self.emit(uid, kind, JobEventKind::Retrying { attempt, delay });
                self.dispatch(&mut state, uid, Some(delay));
            }
            Outcome::TransportFailed(error) => {
                tracing::error!(
                    job = %uid,
                    retries = entry.job.retry_counter(),
                    "job failed: {error}"
                );
                let reason = error.to_failure_reason();
                self.settle(
                    &mut state,
                    uid,
                    JobStatus::Failed,
                    vec![JobEventKind::Failed(reason)],
                );
            }
        }
    }

    fn finish(&self, state: &mut State, uid: &JobUid, canceled: bool) {
        let events = if canceled {
            vec![
                JobEventKind::Canceled,
                JobEventKind::Finished { canceled: true },
            ]
        } else {
            vec![JobEventKind::Finished { canceled: false }]
        };
        self.settle(state, uid, JobStatus::Finished, events)
    }

    /// Move a job to a terminal status and release what it holds.
    fn settle(&self, state: &mut State, uid: &JobUid, status: JobStatus, events: Vec<JobEventKind>) {
        let Some(entry) = state.jobs.get_mut(uid) else {
            return;
        };
        entry.job.set_status(status);
        let kind = entry.job.kind();
        let key = entry.job.dedup_key();
        let dispatched = entry.dispatched;
        let remove = entry.remove_on_finish;
        for event in events {
            self.emit(uid, kind, event);
        }
        state.release_dedup_key(uid, key);
        if remove {
            state.jobs.remove(uid);
        }
        if dispatched {
            self.dispatch_held(state, kind);
        }
        self.idle.notify_all();
    }

    /// Stop a job. A job which never reached a pool thread is finished right
    /// away, a running one is asked to cancel and finishes when its worker
    /// returns.
    fn stop(&self, state: &mut State, uid: &JobUid, remove: bool) {
        let Some(entry) = state.jobs.get_mut(uid) else {
            return;
        };
        entry.remove_on_finish |= remove;
        match entry.job.status() {
            JobStatus::Queued | JobStatus::Running => {
                entry.cancel.cancel();
                let waiting = entry.job.status() == JobStatus::Queued
                    && (!entry.dispatched || self.pool.remove(uid));
                if waiting {
                    self.finish(state, uid, true);
                } else {
                    entry.job.set_status(JobStatus::Stopped);
                    tracing::debug!(job = %uid, "job stop requested");
                }
            }
            JobStatus::Finished | JobStatus::Failed if remove => {
                state.jobs.remove(uid);
            }
            _ => (),
        }
    }

    fn shutdown(&self) {
        let mut state = self.lock_state();
        state.shutting_down = true;
        let uids: Vec<JobUid> = state.jobs.keys().cloned().collect();
        for uid in &uids {
            self.stop(&mut state, uid, false);
        }
    }

    /// Persist response sets into the catalog, then report progress.
    pub fn insert_job_response_sets(&self, response_sets: Vec<JobResponseSet>) {
        if response_sets.is_empty() {
            return;
        }
        let details: Vec<JobDetail> = response_sets.iter().map(JobResponseSet::to_detail).collect();
        let count = response_sets.len();
        if let Err(e) = self.catalog.insert(response_sets) {
            tracing::error!(count, "cannot insert response sets into the catalog: {e}");
            return;
        }
        let state = self.lock_state();
        for detail in details {
            if let Some(entry) = state.jobs.get(&detail.job_uid) {
                let uid = detail.job_uid.clone();
                self.emit(&uid, entry.job.kind(), JobEventKind::Progress(detail));
            }
        }
    }

    /// Settings of a server by connection name: configured servers, their
    /// proxies, then the catalog.
    pub fn server(&self, name: &ConnectionName) -> Option<Server> {
        let known = self.lock_state().find_server(name).cloned();
        known.or_else(|| self.catalog.lookup_server_config(name))
    }
}

/// Runs DICOM jobs on a fixed-size thread pool.
///
/// Jobs are deduplicated, limited per [JobKind], ordered by [Priority] and
/// retried after transport failures. Progress is published as [JobEvent]s,
/// see [Scheduler::subscribe].
///
/// Dropping the scheduler stops every job (listeners included) and joins
/// all of its threads.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    notifications: Option<NotificationThread>,
}

impl Scheduler {
    /// Create a scheduler whose threads log through the current default
    /// [tracing] dispatcher.
    pub fn new(
        transport: Arc<dyn Transport>,
        catalog: Arc<dyn Catalog>,
        config: SchedulerConfig,
    ) -> std::io::Result<Self> {
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());
        Self::with_dispatch(transport, catalog, config, dispatch)
    }

    /// Create a scheduler whose threads log through `dispatch`.
    pub fn with_dispatch(
        transport: Arc<dyn Transport>,
        catalog: Arc<dyn Catalog>,
        config: SchedulerConfig,
        dispatch: tracing::Dispatch,
    ) -> std::io::Result<Self> {
        let notifications = NotificationThread::spawn(dispatch.clone())?;
        let pool = ThreadPool::new(config.maximum_thread_count, &dispatch)?;
        let events = notifications.sender();
        let state = State::with_servers(config.servers.clone());
        let inner = Arc::new_cyclic(|this| SchedulerInner {
            this: this.clone(),
            state: Mutex::new(state),
            idle: Condvar::new(),
            pool,
            transport,
            catalog,
            config,
            events: Mutex::new(Some(events)),
        });
        tracing::info!(
            threads = inner.config.maximum_thread_count,
            servers = inner.config.servers.len(),
            "scheduler started"
        );
        Ok(Self {
            inner,
            notifications: Some(notifications),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Receive every [JobEvent] emitted from now on.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        match &self.notifications {
            Some(notifications) => notifications.subscribe(),
            None => std::sync::mpsc::channel().1,
        }
    }


    /// Queue a job. Returns `None` if an equivalent job is already queued or
    /// running: same kind, server and addressing keys, or for listeners the
    /// same AE title and port.
    pub fn add_job(&self, job: Job) -> Option<JobUid> {
        self.inner.add_job(job, false)
    }

    /// Queue a job even if an equivalent one is already active.
    pub fn add_job_forced(&self, job: Job) -> Option<JobUid> {
        self.inner.add_job(job, true)
    }

    /// Stop a job and forget it as soon as it is terminal.
    pub fn remove_job(&self, uid: &JobUid) {
        let mut state = self.inner.lock_state();
        self.inner.stop(&mut state, uid, true);
    }

    pub fn stop_jobs(&self, uids: &[JobUid]) {
        let mut state = self.inner.lock_state();
        for uid in uids {
            self.inner.stop(&mut state, uid, false);
        }
    }

    /// Stop every queued or running job. Persistent jobs (listeners) are
    /// only stopped if `stop_persistent`.
    pub fn stop_all_jobs(&self, stop_persistent: bool) {
        let mut state = self.inner.lock_state();
        let uids: Vec<JobUid> = state
            .jobs
            .iter()
            .filter(|(_, e)| e.job.status().is_active())
            .filter(|(_, e)| stop_persistent || !e.job.is_persistent())
            .map(|(uid, _)| uid.clone())
            .collect();
        tracing::info!(count = uids.len(), stop_persistent, "stopping jobs");
        for uid in &uids {
            self.inner.stop(&mut state, uid, false);
        }
    }

    /// Change the priority of jobs which did not start yet. Running jobs
    /// keep running.
    pub fn set_jobs_priority(&self, uids: &[JobUid], priority: Priority) {
        let mut state = self.inner.lock_state();
        for uid in uids {
            if let Some(entry) = state.jobs.get_mut(uid)
                && !entry.job.status().is_terminal()
            {
                entry.job.set_priority(priority);
                self.inner.pool.set_priority(uid, priority);
            }
        }
    }

    /// Snapshot of a job.
    pub fn job(&self, uid: &JobUid) -> Option<Job> {
        self.inner.lock_state().jobs.get(uid).map(|e| e.job.clone())
    }

    pub fn job_status(&self, uid: &JobUid) -> Option<JobStatus> {
        self.inner.lock_state().jobs.get(uid).map(|e| e.job.status())
    }

    /// Number of jobs in the table, terminal ones included.
    pub fn number_of_jobs(&self) -> usize {
        self.inner.lock_state().jobs.len()
    }

    /// Number of jobs of a kind which are queued, running or stopping.
    pub fn same_kind_jobs_queued_or_running(&self, kind: JobKind) -> usize {
        self.inner
            .lock_state()
            .jobs
            .values()
            .filter(|e| e.job.kind() == kind && e.job.status().is_active())
            .count()
    }

    /// Forget finished and failed jobs, except persistent ones.
    pub fn clear_completed_jobs(&self) {
        let mut state = self.inner.lock_state();
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, e| !e.job.status().is_terminal() || e.job.is_persistent());
        tracing::debug!(count = before - state.jobs.len(), "completed jobs cleared");
    }

    /// Block until no job is queued or running, or `timeout` elapses.
    /// Returns `false` on timeout.
    pub fn wait_for_finish(&self, timeout: Duration) -> bool {
        let state = self.inner.lock_state();
        let (_state, result) = self
            .inner
            .idle
            .wait_timeout_while(state, timeout, |s| s.has_active_jobs())
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    pub fn generate_unique_job_uid(&self) -> JobUid {
        self.inner.lock_state().generate_unique_job_uid()
    }

    /// Persist response sets into the catalog and report progress of the
    /// jobs they belong to.
    pub fn insert_job_response_sets(&self, response_sets: Vec<JobResponseSet>) {
        self.inner.insert_job_response_sets(response_sets)
    }


    /// Add a server. A server with the same connection name is replaced.
    pub fn add_server(&self, server: Server) {
        let mut state = self.inner.lock_state();
        if let Some(existing) = state
            .servers
            .iter_mut()
            .find(|s| s.connection_name == server.connection_name)
        {
            tracing::warn!(connection = %server.connection_name, "server replaced");
            *existing = server;
        } else {
            tracing::info!(connection = %server.connection_name, "server added");
            state.servers.push(server);
        }
    }

    /// Remove a server. Returns it if it was configured.
    pub fn remove_server(&self, name: &ConnectionName) -> Option<Server> {
        let mut state = self.inner.lock_state();
        let index = state.servers.iter().position(|s| &s.connection_name == name)?;
        Some(state.servers.remove(index))
    }

    pub fn servers(&self) -> Vec<Server> {
        self.inner.lock_state().servers.clone()
    }

    /// Settings of a server by connection name: configured servers, their
    /// proxies, then the catalog.
    pub fn server(&self, name: &ConnectionName) -> Option<Server> {
        self.inner.server(name)
    }

    /// The configured proxy with this connection name.
    pub fn proxy_server(&self, name: &ConnectionName) -> Option<Server> {
        self.inner.lock_state().find_proxy_server(name).cloned()
    }

    pub fn number_of_servers(&self) -> usize {
        self.inner.lock_state().servers.len()
    }

    pub fn number_of_query_retrieve_servers(&self) -> usize {
        let state = self.inner.lock_state();
        state.servers.iter().filter(|s| s.query_retrieve_enabled).count()
    }

    pub fn number_of_storage_servers(&self) -> usize {
        let state = self.inner.lock_state();
        state.servers.iter().filter(|s| s.storage_enabled).count()
    }


    /// Matching keys added to every query created by this scheduler.
    pub fn set_filters(&self, filters: Dataset) {
        self.inner.lock_state().filters = filters;
    }

    pub fn filters(&self) -> Dataset {
        self.inner.lock_state().filters.clone()
    }


    /// Apply the configured retry and concurrency settings.
    fn configured(&self, job: Job) -> Job {
        let config = &self.inner.config;
        let limit = config.maximum_concurrent_jobs_per_type.get(job.kind());
        job.with_maximum_number_of_retry(config.maximum_number_of_retry)
            .with_retry_delay(config.retry_delay)
            .with_maximum_concurrent_jobs_per_type(limit)
    }

    /// Queue one job per server matching `include`.
    fn add_for_servers(
        &self,
        include: impl Fn(&Server) -> bool,
        make: impl Fn(ConnectionName) -> Job,
    ) -> Vec<JobUid> {
        let names: Vec<ConnectionName> = self
            .inner
            .lock_state()
            .servers
            .iter()
            .filter(|s| include(s))
            .map(|s| s.connection_name.clone())
            .collect();
        names
            .into_iter()
            .filter_map(|name| self.add_job(self.configured(make(name))))
            .collect()
    }

    fn query_all(&self, address: DicomAddress) -> Vec<JobUid> {
        let filters = self.filters();
        self.add_for_servers(
            |s| s.query_retrieve_enabled,
            |name| Job::query(name, address.clone()).with_filters(filters.clone()),
        )
    }

    fn retrieve_all(&self, address: DicomAddress) -> Vec<JobUid> {
        self.add_for_servers(
            |s| s.query_retrieve_enabled,
            |name| Job::retrieve(name, address.clone()),
        )
    }

    /// Query patients on every query/retrieve server.
    pub fn query_patients(&self) -> Vec<JobUid> {
        self.query_all(DicomAddress::new(DicomLevel::Patients, None, None, None, None))
    }

    /// Query the studies of a patient on every query/retrieve server.
    pub fn query_studies(&self, patient_id: &PatientId) -> Vec<JobUid> {
        self.query_all(DicomAddress::new(
            DicomLevel::Studies,
            Some(patient_id.clone()),
            None,
            None,
            None,
        ))
    }

    pub fn query_series(&self, patient_id: &PatientId, study: &StudyInstanceUid) -> Vec<JobUid> {
        self.query_all(DicomAddress::new(
            DicomLevel::Series,
            Some(patient_id.clone()),
            Some(study.clone()),
            None,
            None,
        ))
    }

    pub fn query_instances(
        &self,
        patient_id: &PatientId,
        study: &StudyInstanceUid,
        series: &SeriesInstanceUid,
    ) -> Vec<JobUid> {
        self.query_all(DicomAddress::new(
            DicomLevel::Instances,
            Some(patient_id.clone()),
            Some(study.clone()),
            Some(series.clone()),
            None,
        ))
    }

    pub fn retrieve_study(&self, patient_id: &PatientId, study: &StudyInstanceUid) -> Vec<JobUid> {
        self.retrieve_all(DicomAddress::study(patient_id.clone(), study.clone()))
    }

    pub fn retrieve_series(
        &self,
        patient_id: &PatientId,
        study: &StudyInstanceUid,
        series: &SeriesInstanceUid,
    ) -> Vec<JobUid> {
        self.retrieve_all(DicomAddress::series(
            patient_id.clone(),
            study.clone(),
            series.clone(),
        ))
    }

    pub fn retrieve_sop_instance(
        &self,
        patient_id: &PatientId,
        study: &StudyInstanceUid,
        series: &SeriesInstanceUid,
        sop: &SopInstanceUid,
    ) -> Vec<JobUid> {
        self.retrieve_all(DicomAddress::instance(
            patient_id.clone(),
            study.clone(),
            series.clone(),
            sop.clone(),
        ))
    }

    /// Verify connectivity with every configured server.
    pub fn echo_all(&self) -> Vec<JobUid> {
        self.add_for_servers(|_| true, Job::echo)
    }

    /// Start a C-STORE SCP. Returns `None` if one is already running with the
    /// same AE title and port.
    pub fn start_listener(&self, port: u16, ae_title: AeTitle, timeout: Duration) -> Option<JobUid> {
        self.add_job(self.configured(Job::storage_listen(ae_title, port, timeout)))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        tracing::info!("scheduler shutting down");
        self.inner.shutdown();
        self.inner.pool.shutdown_and_join();
        lock(&self.inner.events).take();
        if let Some(notifications) = self.notifications.take()
            && notifications.join().is_err()
        {
            tracing::error!("notification thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::job::JobSpec;
    use crate::transport::{ListenerConfig, OperationContext};
    use pretty_assertions::assert_eq;

    /// Answers every operation successfully and immediately.
    struct Loopback;

    impl Transport for Loopback {
        fn echo(&self, _: &Server, _: &OperationContext) -> Result<(), TransportError> {
            Ok(())
        }

        fn find(
            &self,
            _: &Server,
            _: &DicomAddress,
            _: &Dataset,
            _: &OperationContext,
        ) -> Result<Vec<Dataset>, TransportError> {
            Ok(Vec::new())
        }

        fn retrieve(
            &self,
            _: &Server,
            _: &DicomAddress,
            _: RetrieveProtocol,
            _: &OperationContext,
            _: &mut dyn FnMut(Dataset),
        ) -> Result<(), TransportError> {
            Ok(())
        }

        fn listen(
            &self,
            _: &ListenerConfig,
            ctx: &OperationContext,
            _: &mut dyn FnMut(JobResponseSet),
        ) -> Result<(), TransportError> {
            while !ctx.is_canceled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(TransportError::Canceled)
        }
    }

    fn server(name: &str) -> Server {
        let ae = AeTitle::try_new("CTK").unwrap();
        Server::new(ConnectionName::new(name), ae.clone(), ae, "localhost", 104)
    }

    fn scheduler(servers: Vec<Server>) -> Scheduler {
        let config = SchedulerConfig {
            maximum_thread_count: 2,
            servers,
            ..Default::default()
        };
        Scheduler::new(
            Arc::new(Loopback),
            Arc::new(MemoryCatalog::default()),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_add_job_assigns_uid() {
        let scheduler = scheduler(vec![server("PACS")]);
        let uid = scheduler.add_job(Job::echo(ConnectionName::new("PACS"))).unwrap();
        assert!(scheduler.wait_for_finish(Duration::from_secs(5)));
        assert_eq!(scheduler.job_status(&uid), Some(JobStatus::Finished));
        assert_eq!(scheduler.job(&uid).and_then(|j| j.uid().cloned()), Some(uid));
    }

    #[test]
    fn test_add_job_keeps_free_uid_and_replaces_taken_one() {
        let scheduler = scheduler(vec![server("PACS")]);
        let wanted = JobUid::new("echo-1");
        let first = scheduler
            .add_job(Job::echo(ConnectionName::new("PACS")).with_uid(wanted.clone()))
            .unwrap();
        assert_eq!(first, wanted);
        assert!(scheduler.wait_for_finish(Duration::from_secs(5)));
        let second = scheduler
            .add_job(Job::echo(ConnectionName::new("PACS")).with_uid(wanted.clone()))
            .unwrap();
        assert_ne!(second, wanted);
    }

    #[test]
    fn test_copy_gets_its_own_uid() {
        let scheduler = scheduler(vec![server("PACS")]);
        let job = Job::echo(ConnectionName::new("PACS")).with_priority(Priority::High);
        let original = scheduler.add_job(job).unwrap();
        let copy = scheduler.job(&original).unwrap().generate_copy();
        let copied = scheduler.add_job_forced(copy).unwrap();
        assert_ne!(copied, original);
        let actual = scheduler.job(&copied).unwrap();
        assert_eq!(actual.uid(), Some(&copied));
        assert_eq!(actual.priority(), Priority::High);
        assert_eq!(actual.retry_counter(), 0);
        assert!(scheduler.wait_for_finish(Duration::from_secs(5)));
    }

    #[test]
    fn test_servers() {
        let proxied = server("PACS").with_proxy(server("Proxy"));
        let mut storage_only = server("Storage");
        storage_only.query_retrieve_enabled = false;
        let scheduler = scheduler(vec![proxied, storage_only]);
        assert_eq!(scheduler.number_of_servers(), 2);
        assert_eq!(scheduler.number_of_query_retrieve_servers(), 1);
        assert_eq!(scheduler.number_of_storage_servers(), 2);
        assert!(scheduler.proxy_server(&ConnectionName::new("Proxy")).is_some());
        assert!(scheduler.server(&ConnectionName::new("Proxy")).is_some());

        let mut replacement = server("Storage");
        replacement.port = 4242;
        scheduler.add_server(replacement);
        assert_eq!(scheduler.number_of_servers(), 2);
        let actual = scheduler.server(&ConnectionName::new("Storage")).map(|s| s.port);
        assert_eq!(actual, Some(4242));

        assert!(scheduler.remove_server(&ConnectionName::new("Storage")).is_some());
        assert!(scheduler.remove_server(&ConnectionName::new("Storage")).is_none());
        assert_eq!(scheduler.number_of_servers(), 1);
    }

    #[test]
    fn test_query_patients_on_query_retrieve_servers() {
        let mut storage_only = server("Storage");
        storage_only.query_retrieve_enabled = false;
        let scheduler = scheduler(vec![server("A"), server("B"), storage_only]);
        scheduler.set_filters(Dataset::new().with("PatientSex", "F"));
        let uids = scheduler.query_patients();
        assert_eq!(uids.len(), 2);
        let job = scheduler.job(&uids[0]).unwrap();
        let JobSpec::Query { filters, address, .. } = job.spec() else {
            panic!("not a query: {job:?}")
        };
        assert_eq!(filters.get_str("PatientSex"), Some("F"));
        assert_eq!(address.level(), DicomLevel::Patients);
        assert_eq!(job.maximum_number_of_retry(), scheduler.config().maximum_number_of_retry);
        assert!(scheduler.wait_for_finish(Duration::from_secs(5)));
    }

    #[test]
    fn test_clear_completed_jobs() {
        let scheduler = scheduler(vec![server("PACS")]);
        scheduler.echo_all();
        let listener = scheduler
            .start_listener(11112, AeTitle::try_new("CTK").unwrap(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(scheduler.number_of_jobs(), 2);
        scheduler.stop_all_jobs(true);
        assert!(scheduler.wait_for_finish(Duration::from_secs(5)));
        scheduler.clear_completed_jobs();
        assert_eq!(scheduler.number_of_jobs(), 1);
        assert_eq!(scheduler.job_status(&listener), Some(JobStatus::Finished));
    }

    #[test]
    fn test_stop_all_jobs_keeps_listener() {
        let scheduler = scheduler(Vec::new());
        let listener = scheduler
            .start_listener(11112, AeTitle::try_new("CTK").unwrap(), Duration::from_secs(1))
            .unwrap();
        scheduler.stop_all_jobs(false);
        assert!(!scheduler.wait_for_finish(Duration::from_millis(50)));
        assert!(scheduler.job_status(&listener).is_some_and(|s| s.is_active()));
        assert_eq!(scheduler.same_kind_jobs_queued_or_running(JobKind::StorageListen), 1);
    }

    #[test]
    fn test_add_job_after_shutdown_started() {
        let scheduler = scheduler(vec![server("PACS")]);
        scheduler.inner.shutdown();
        assert_eq!(scheduler.add_job(Job::echo(ConnectionName::new("PACS"))), None);
    }
}
