#![allow(dead_code)]

use dicom_scheduler::dicom_jobs_api::*;
use dicom_scheduler::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A [Transport] whose behavior is scripted by the test.
///
/// Every operation records the call, then blocks for the configured hold
/// time (returning early if canceled), then panics or fails with the next
/// scripted error if any.
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<(&'static str, String)>>,
    failures: Mutex<VecDeque<TransportError>>,
    answers: Mutex<Vec<Dataset>>,
    hold: Mutex<Duration>,
    protocols: Mutex<Vec<RetrieveProtocol>>,
    panics: AtomicUsize,
    running: AtomicUsize,
    high_water: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `times` operations fail with `error`.
    pub fn fail_next(&self, error: TransportError, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat_n(error, times));
    }

    /// The next `times` operations panic.
    pub fn panic_next(&self, times: usize) {
        self.panics.fetch_add(times, Ordering::SeqCst);
    }

    /// Datasets returned by C-FIND, sent by C-GET and received by listeners.
    pub fn answer_with(&self, datasets: Vec<Dataset>) {
        *self.answers.lock().unwrap() = datasets;
    }

    pub fn hold_for(&self, duration: Duration) {
        *self.hold.lock().unwrap() = duration;
    }

    /// Operation name and connection name (or AE title) of every call.
    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Protocol of every retrieve call.
    pub fn protocols(&self) -> Vec<RetrieveProtocol> {
        self.protocols.lock().unwrap().clone()
    }

    pub fn number_of_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of operations observed running at once.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    fn answers(&self) -> Vec<Dataset> {
        self.answers.lock().unwrap().clone()
    }

    fn enter(&self, operation: &'static str, name: String) {
        self.calls.lock().unwrap().push((operation, name));
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(running, Ordering::SeqCst);
    }

    fn exit(&self, ctx: &OperationContext) -> Result<(), TransportError> {
        let hold = *self.hold.lock().unwrap();
        let deadline = Instant::now() + hold;
        while Instant::now() < deadline && !ctx.is_canceled() {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        if ctx.is_canceled() {
            return Err(TransportError::Canceled);
        }
        let panics = self
            .panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if panics.is_ok() {
            panic!("association aborted by peer");
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Transport for FakeTransport {
    fn echo(&self, server: &Server, ctx: &OperationContext) -> Result<(), TransportError> {
        self.enter("echo", server.connection_name.to_string());
        self.exit(ctx)
    }

    fn find(
        &self,
        server: &Server,
        _address: &DicomAddress,
        _filters: &Dataset,
        ctx: &OperationContext,
    ) -> Result<Vec<Dataset>, TransportError> {
        self.enter("find", server.connection_name.to_string());
        self.exit(ctx)?;
        Ok(self.answers())
    }

    fn retrieve(
        &self,
        server: &Server,
        _address: &DicomAddress,
        protocol: RetrieveProtocol,
        ctx: &OperationContext,
        sink: &mut dyn FnMut(Dataset),
    ) -> Result<(), TransportError> {
        self.protocols.lock().unwrap().push(protocol);
        self.enter("retrieve", server.connection_name.to_string());
        self.exit(ctx)?;
        self.answers().into_iter().for_each(sink);
        Ok(())
    }

    fn listen(
        &self,
        listener: &ListenerConfig,
        ctx: &OperationContext,
        sink: &mut dyn FnMut(JobResponseSet),
    ) -> Result<(), TransportError> {
        self.enter("listen", listener.ae_title.to_string());
        for dataset in self.answers() {
            let mut set =
                JobResponseSet::new(ctx.job_uid.clone(), ResponseType::StoreSopInstance);
            set.insert_dataset(dataset);
            sink(set);
        }
        while !ctx.is_canceled() {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        Err(TransportError::Canceled)
    }
}

pub fn server(name: &str) -> Server {
    Server::new(
        ConnectionName::new(name),
        ae_title("CTK"),
        ae_title(name),
        "localhost",
        4242,
    )
}

pub fn ae_title(value: &str) -> AeTitle {
    AeTitle::try_new(value).unwrap()
}

pub fn config(servers: Vec<Server>) -> SchedulerConfig {
    SchedulerConfig {
        maximum_thread_count: 4,
        retry_delay: Duration::from_millis(10),
        servers,
        ..Default::default()
    }
}

pub fn start(
    transport: &Arc<FakeTransport>,
    catalog: &Arc<MemoryCatalog>,
    config: SchedulerConfig,
) -> Scheduler {
    let transport: Arc<dyn Transport> = transport.clone();
    let catalog: Arc<dyn Catalog> = catalog.clone();
    Scheduler::new(transport, catalog, config).unwrap()
}

pub fn instance(sop: &str) -> Dataset {
    Dataset::new()
        .with("PatientID", "1449c1d")
        .with("StudyInstanceUID", "1.2.3")
        .with("SeriesInstanceUID", "1.2.3.4")
        .with("SOPInstanceUID", sop)
}

pub fn patient(id: &str) -> Dataset {
    Dataset::new()
        .with("PatientID", id)
        .with("PatientName", format!("Doe^{id}"))
}

pub fn series_address() -> DicomAddress {
    DicomAddress::series(
        PatientId::new("1449c1d"),
        StudyInstanceUid::new("1.2.3"),
        SeriesInstanceUid::new("1.2.3.4"),
    )
}

/// Events of one job, up to and including its terminal event.
pub fn events_of(rx: &Receiver<JobEvent>, uid: &JobUid) -> Vec<JobEventKind> {
    let mut events = Vec::new();
    let deadline = Instant::now() + TIMEOUT;
    while let Ok(event) = rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        if &event.job_uid != uid {
            continue;
        }
        let terminal = event.event.is_terminal();
        events.push(event.event);
        if terminal {
            break;
        }
    }
    events
}

/// Poll `condition` until it holds. Returns `false` on timeout.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}
