use super::{Completion, Execution, Failure};
use dicom_jobs_api::{Dataset, DicomAddress, DicomLevel, Server};

/// C-GET or C-MOVE, depending on the server's retrieve protocol.
///
/// Datasets are handed to the scheduler in batches while they arrive, so a
/// large study never sits in memory as a whole. When the server has an
/// active proxy, datasets are dropped and the job is chained to the proxy.
pub(super) fn execute(
    exec: &Execution,
    server: &Server,
    address: &DicomAddress,
) -> Result<Completion, Failure> {
    let protocol = server.retrieve_protocol;
    if address.level() == DicomLevel::Patients {
        tracing::info!(job = %exec.uid, protocol = ?protocol, "retrieve of a full patient is not implemented");
        return Err(Failure::NotImplemented(format!(
            "{protocol:?} retrieve of a full patient"
        )));
    }

    let proxy = server.active_proxy();
    let batch_size = exec.scheduler.config().retrieve_batch_size.max(1);
    let mut pending = exec.new_response_set();
    let mut received = 0usize;
    let mut sink = |dataset: Dataset| {
        received += 1;
        if proxy.is_some() {
            return;
        }
        pending.insert_dataset(dataset);
        if pending.len() >= batch_size {
            let full = std::mem::replace(&mut pending, exec.new_response_set());
            exec.scheduler.insert_job_response_sets(vec![full]);
        }
    };
    exec.scheduler
        .transport()
        .retrieve(server, address, protocol, &exec.context(), &mut sink)?;
    tracing::debug!(job = %exec.uid, received, "retrieve done");

    if let Some(proxy) = proxy {
        return Ok(Completion::Chain(exec.chain_to(proxy)));
    }
    let remaining = if pending.is_empty() {
        Vec::new()
    } else {
        vec![pending]
    };
    Ok(Completion::Insert(remaining))
}
