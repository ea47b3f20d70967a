use super::{Completion, Execution, Failure};
use crate::config::DrainPolicy;
use crate::error::TransportError;
use crate::transport::ListenerConfig;
use dicom_jobs_api::{AeTitle, JobResponseSet};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// C-STORE SCP. Blocks until the listener is stopped.
///
/// The transport pushes every stored instance into a channel; a second
/// thread drains it into the scheduler according to the [DrainPolicy], so
/// flushing never depends on the transport's accept loop.
pub(super) fn execute(
    exec: &Execution,
    ae_title: &AeTitle,
    port: u16,
    timeout: Duration,
) -> Result<Completion, Failure> {
    let listener = ListenerConfig {
        ae_title: ae_title.clone(),
        port,
        timeout,
    };
    let policy = exec.scheduler.config().listener_drain;
    let (tx, rx) = std::sync::mpsc::channel::<JobResponseSet>();
    let dispatch = tracing::dispatcher::get_default(|d| d.clone());

    tracing::info!(job = %exec.uid, AETitle = ae_title.as_str(), port, "storage listener starting");
    let result = std::thread::scope(|scope| {
        let drain_thread = std::thread::Builder::new()
            .name(format!("dicom-listener-{port}"))
            .spawn_scoped(scope, move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                drain(rx, policy, |batch| exec.scheduler.insert_job_response_sets(batch))
            });
        let mut sink = move |set: JobResponseSet| {
            // fails only if the drain thread is gone
            let _ = tx.send(set);
        };
        let result = match drain_thread {
            Ok(_) => exec
                .scheduler
                .transport()
                .listen(&listener, &exec.context(), &mut sink),
            Err(e) => {
                tracing::error!(job = %exec.uid, "cannot spawn listener drain thread: {e}");
                Err(TransportError::Protocol(e.to_string()))
            }
        };
        // closes the channel, the drain thread flushes what is left and exits
        drop(sink);
        result
    });
    tracing::info!(job = %exec.uid, AETitle = ae_title.as_str(), port, "storage listener stopped");
    result?;
    Ok(Completion::Insert(Vec::new()))
}

/// Receive response sets until the channel closes, calling `flush` with
/// batches of at most `policy.batch_size`, at least every `policy.interval`
/// while some are pending.
fn drain(
    rx: Receiver<JobResponseSet>,
    policy: DrainPolicy,
    mut flush: impl FnMut(Vec<JobResponseSet>),
) {
    let batch_size = policy.batch_size.max(1);
    let mut pending = Vec::with_capacity(batch_size);
    let mut deadline = Instant::now() + policy.interval;
    loop {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(timeout) {
            Ok(set) => {
                pending.push(set);
                if pending.len() >= batch_size {
                    flush(std::mem::take(&mut pending));
                    deadline = Instant::now() + policy.interval;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !pending.is_empty() {
                    flush(std::mem::take(&mut pending));
                }
                deadline = Instant::now() + policy.interval;
            }
            Err(RecvTimeoutError::Disconnected) => {
                if !pending.is_empty() {
                    flush(pending);
                }
                return;
            }
        }
    }
}
