use crate::cancel::CancelToken;
use crate::job::{DedupKey, Job};
use bimap::BiMap;
use dicom_jobs_api::{ConnectionName, Dataset, JobKind, JobStatus, JobUid, Server};
use std::collections::HashMap;

/// The scheduler's authoritative record of a job.
pub(super) struct JobEntry {
    pub job: Job,
    pub cancel: CancelToken,
    /// Handed to the thread pool at least once. Jobs held back by their
    /// kind's concurrency limit are not.
    pub dispatched: bool,
    /// Drop the entry as soon as the job is terminal.
    pub remove_on_finish: bool,
    /// Admission order.
    pub seq: u64,
}

impl JobEntry {
    pub fn new(job: Job, seq: u64) -> Self {
        Self {
            job,
            cancel: CancelToken::new(),
            dispatched: false,
            remove_on_finish: false,
            seq,
        }
    }
}

/// Everything guarded by the scheduler mutex.
#[derive(Default)]
pub(super) struct State {
    pub jobs: HashMap<JobUid, JobEntry>,
    /// Key of every non-terminal job, used to reject duplicates.
    pub active: BiMap<DedupKey, JobUid>,
    pub servers: Vec<Server>,
    pub filters: Dataset,
    pub shutting_down: bool,
    next_seq: u64,
}

impl State {
    pub fn with_servers(servers: Vec<Server>) -> Self {
        Self {
            jobs: HashMap::with_capacity(64),
            active: BiMap::with_capacity(64),
            servers,
            ..Default::default()
        }
    }

    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// A random job UID not used by any job in the table.
    pub fn generate_unique_job_uid(&self) -> JobUid {
        loop {
            let uid = JobUid::new(uuid::Uuid::new_v4().to_string());
            if !self.jobs.contains_key(&uid) {
                return uid;
            }
        }
    }

    /// Number of jobs of this kind which were handed to the pool and are not
    /// terminal yet.
    pub fn same_kind_dispatched(&self, kind: JobKind) -> usize {
        self.jobs
            .values()
            .filter(|e| e.dispatched && e.job.kind() == kind && e.job.status().is_active())
            .count()
    }

    /// The held-back job of this kind to dispatch next, with its concurrency
    /// limit: highest priority first, then first admitted.
    pub fn next_held(&self, kind: JobKind) -> Option<(JobUid, usize)> {
        self.jobs
            .iter()
            .filter(|(_, e)| {
                !e.dispatched && e.job.kind() == kind && e.job.status() == JobStatus::Queued
            })
            .max_by(|(_, a), (_, b)| {
                a.job
                    .priority()
                    .cmp(&b.job.priority())
                    .then_with(|| b.seq.cmp(&a.seq))
            })
            .map(|(uid, e)| (uid.clone(), e.job.maximum_concurrent_jobs_per_type()))
    }

    pub fn has_active_jobs(&self) -> bool {
        self.jobs.values().any(|e| e.job.status().is_active())
    }

    /// Forget the key of a job which became terminal. If a forced duplicate
    /// with the same key is still active, it takes over the key.
    pub fn release_dedup_key(&mut self, uid: &JobUid, key: DedupKey) {
        if self.active.remove_by_right(uid).is_none() {
            return;
        }
        let heir = self
            .jobs
            .iter()
            .filter(|(other, e)| *other != uid && e.job.status().is_active())
            .filter(|(_, e)| e.job.dedup_key() == key)
            .min_by_key(|(_, e)| e.seq)
            .map(|(other, _)| other.clone());
        if let Some(heir) = heir {
            self.active.insert(key, heir);
        }
    }

    /// A configured server, or the proxy of one, by connection name.
    pub fn find_server(&self, name: &ConnectionName) -> Option<&Server> {
        self.servers
            .iter()
            .find(|s| &s.connection_name == name)
            .or_else(|| self.find_proxy_server(name))
    }

    /// The proxy of a configured server, by connection name.
    pub fn find_proxy_server(&self, name: &ConnectionName) -> Option<&Server> {
        self.servers
            .iter()
            .filter_map(|s| s.proxy_server.as_deref())
            .find(|proxy| &proxy.connection_name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_jobs_api::{AeTitle, Priority};
    use pretty_assertions::assert_eq;

    fn admit(state: &mut State, uid: &str, job: Job, dispatched: bool) {
        let uid = JobUid::new(uid);
        let mut job = job;
        job.queue(uid.clone());
        let seq = state.next_seq();
        let _ = state.active.insert_no_overwrite(job.dedup_key(), uid.clone());
        let mut entry = JobEntry::new(job, seq);
        entry.dispatched = dispatched;
        state.jobs.insert(uid, entry);
    }

    fn echo(name: &str) -> Job {
        Job::echo(ConnectionName::new(name))
    }

    fn server(name: &str) -> Server {
        let ae = AeTitle::try_new("CTK").unwrap();
        Server::new(ConnectionName::new(name), ae.clone(), ae, "localhost", 104)
    }

    #[test]
    fn test_generate_unique_job_uid() {
        let mut state = State::default();
        let first = state.generate_unique_job_uid();
        admit(&mut state, first.as_str(), echo("PACS"), false);
        let second = state.generate_unique_job_uid();
        assert_ne!(first, second);
        assert_eq!(second.len(), 36);
    }

    #[test]
    fn test_next_held_by_priority_then_admission() {
        let mut state = State::default();
        admit(&mut state, "running", echo("A"), true);
        admit(&mut state, "low", echo("B"), false);
        admit(&mut state, "high-old", echo("C").with_priority(Priority::High), false);
        admit(&mut state, "high-new", echo("D").with_priority(Priority::High), false);
        let actual = state.next_held(JobKind::Echo).map(|(uid, _)| uid);
        assert_eq!(actual, Some(JobUid::new("high-old")));
        assert_eq!(state.same_kind_dispatched(JobKind::Echo), 1);
        assert_eq!(state.same_kind_dispatched(JobKind::Query), 0);
        assert_eq!(state.next_held(JobKind::Query), None);
    }

    #[test]
    fn test_release_dedup_key_to_forced_duplicate() {
        let mut state = State::default();
        admit(&mut state, "first", echo("PACS"), true);
        admit(&mut state, "forced", echo("PACS"), true);
        let key = echo("PACS").dedup_key();
        assert_eq!(state.active.get_by_left(&key), Some(&JobUid::new("first")));

        state.release_dedup_key(&JobUid::new("first"), key.clone());
        assert_eq!(state.active.get_by_left(&key), Some(&JobUid::new("forced")));

        state.release_dedup_key(&JobUid::new("unknown"), key.clone());
        assert_eq!(state.active.get_by_left(&key), Some(&JobUid::new("forced")));
    }

    #[test]
    fn test_find_server_and_proxy() {
        let state = State::with_servers(vec![server("PACS").with_proxy(server("Proxy"))]);
        let name = ConnectionName::new("Proxy");
        assert_eq!(
            state.find_server(&name).map(|s| &s.connection_name),
            Some(&name)
        );
        assert!(state.find_proxy_server(&ConnectionName::new("PACS")).is_none());
        assert!(state.find_server(&ConnectionName::new("Other")).is_none());
    }
}
