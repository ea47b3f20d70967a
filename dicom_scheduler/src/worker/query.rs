use super::{Completion, Execution, Failure};
use dicom_jobs_api::{Dataset, DicomAddress, DicomLevel, Server};

/// C-FIND at the level of the job. Each answer becomes its own response set.
pub(super) fn execute(
    exec: &Execution,
    server: &Server,
    address: &DicomAddress,
    filters: &Dataset,
) -> Result<Completion, Failure> {
    let mut datasets = exec
        .scheduler
        .transport()
        .find(server, address, filters, &exec.context())?;

    if let Some(proxy) = server.active_proxy() {
        return Ok(Completion::Chain(exec.chain_to(proxy)));
    }

    let maximum = exec.scheduler.config().maximum_patients_query;
    if address.level() == DicomLevel::Patients && datasets.len() > maximum {
        tracing::info!(
            job = %exec.uid,
            found = datasets.len(),
            kept = maximum,
            "too many patients found, ignoring the rest"
        );
        datasets.truncate(maximum);
    }
    tracing::debug!(job = %exec.uid, level = %address.level(), found = datasets.len());

    let response_sets = datasets
        .into_iter()
        .map(|dataset| {
            let mut set = exec.new_response_set();
            set.insert_dataset(dataset);
            set
        })
        .collect();
    Ok(Completion::Insert(response_sets))
}
