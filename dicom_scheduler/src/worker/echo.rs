use super::{Completion, Execution, Failure};
use dicom_jobs_api::Server;

/// C-ECHO. A failed echo is retried by the scheduler, never here.
pub(super) fn execute(exec: &Execution, server: &Server) -> Result<Completion, Failure> {
    exec.scheduler
        .transport()
        .echo(server, &exec.context())?;
    tracing::info!(
        job = %exec.uid,
        connection = %server.connection_name,
        host = server.host.as_str(),
        port = server.port,
        "echo succeeded"
    );
    Ok(Completion::Insert(Vec::new()))
}
