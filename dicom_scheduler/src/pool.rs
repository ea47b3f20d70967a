use crate::lock;
use crate::worker::Worker;
use dicom_jobs_api::{JobUid, Priority};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// A [Worker] waiting for a pool thread.
pub(crate) struct Task {
    pub uid: JobUid,
    pub priority: Priority,
    /// Submission order of the job, used to keep FIFO order within a priority.
    pub seq: u64,
    pub worker: Worker,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    /// Higher priority first, then older submission first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct PoolQueue {
    ready: BinaryHeap<Task>,
    delayed: Vec<(Instant, Task)>,
    shutdown: bool,
}

impl PoolQueue {
    /// Move delayed tasks which are due (or all of them) to the ready heap.
    fn promote(&mut self, now: Instant, all: bool) {
        if self.delayed.is_empty() {
            return;
        }
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|(at, _)| all || *at <= now);
        self.delayed = pending;
        self.ready.extend(due.into_iter().map(|(_, task)| task));
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }
}

struct PoolShared {
    queue: Mutex<PoolQueue>,
    available: Condvar,
}

/// Fixed-size pool of threads running [Worker]s by priority.
///
/// A running worker is never preempted: priority only decides which waiting
/// task a free thread picks next.
pub(crate) struct ThreadPool {
    shared: Arc<PoolShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn `size` threads (at least one), each logging through `dispatch`.
    pub fn new(size: usize, dispatch: &tracing::Dispatch) -> std::io::Result<Self> {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(PoolQueue::default()),
            available: Condvar::new(),
        });
        let threads = (0..size.max(1))
            .map(|i| {
                let shared = Arc::clone(&shared);
                let dispatch = dispatch.clone();
                std::thread::Builder::new()
                    .name(format!("dicom-worker-{i}"))
                    .spawn(move || {
                        let _guard = tracing::dispatcher::set_default(&dispatch);
                        while let Some(task) = next_task(&shared) {
                            task.worker.run();
                        }
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self {
            shared,
            threads: Mutex::new(threads),
        })
    }

    /// Queue a task, to be started no sooner than `delay` from now.
    ///
    /// Every idle thread is woken for a delayed task, so that each recomputes
    /// the deadline it waits for.
    pub fn submit(&self, task: Task, delay: Option<Duration>) {
        let mut queue = lock(&self.shared.queue);
        let delayed = match delay {
            Some(delay) if !delay.is_zero() => {
                queue.delayed.push((Instant::now() + delay, task));
                true
            }
            _ => {
                queue.ready.push(task);
                false
            }
        };
        drop(queue);
        if delayed {
            self.shared.available.notify_all();
        } else {
            self.shared.available.notify_one();
        }
    }

    /// Change the priority of a job's waiting task, if any.
    pub fn set_priority(&self, uid: &JobUid, priority: Priority) {
        let mut queue = lock(&self.shared.queue);
        let mut tasks = std::mem::take(&mut queue.ready).into_vec();
        for task in tasks.iter_mut().filter(|t| &t.uid == uid) {
            task.priority = priority;
        }
        queue.ready = tasks.into();
        for (_, task) in queue.delayed.iter_mut().filter(|(_, t)| &t.uid == uid) {
            task.priority = priority;
        }
    }

    /// Take a job's task out of the pool if no thread picked it up yet.
    /// Returns `true` if a task was removed.
    pub fn remove(&self, uid: &JobUid) -> bool {
        let mut queue = lock(&self.shared.queue);
        let before = queue.ready.len() + queue.delayed.len();
        queue.ready.retain(|t| &t.uid != uid);
        queue.delayed.retain(|(_, t)| &t.uid != uid);
        before != queue.ready.len() + queue.delayed.len()
    }

    /// Number of tasks waiting for a thread.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        let queue = lock(&self.shared.queue);
        queue.ready.len() + queue.delayed.len()
    }

    /// Let the threads run every waiting task, ignoring delays, then join them.
    pub fn shutdown_and_join(&self) {
        lock(&self.shared.queue).shutdown = true;
        self.shared.available.notify_all();
        let threads = std::mem::take(&mut *lock(&self.threads));
        for handle in threads {
            if handle.join().is_err() {
                tracing::error!("a worker thread panicked");
            }
        }
    }
}

fn next_task(shared: &PoolShared) -> Option<Task> {
    let mut queue = lock(&shared.queue);
    loop {
        let now = Instant::now();
        let shutdown = queue.shutdown;
        queue.promote(now, shutdown);
        if let Some(task) = queue.ready.pop() {
            return Some(task);
        }
        if shutdown {
            return None;
        }
        queue = match queue.next_deadline() {
            Some(deadline) => {
                shared
                    .available
                    .wait_timeout(queue, deadline.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .available
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}
