//! Job lifecycle notifications are delivered on a dedicated thread so that
//! neither pool threads nor callers ever run subscriber code.

use crate::lock;
use dicom_jobs_api::JobEvent;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// A thread and channel fanning [JobEvent]s out to subscribers.
pub(crate) struct NotificationThread {
    handle: JoinHandle<()>,
    sender: Sender<JobEvent>,
    subscribers: Arc<Mutex<Vec<Sender<JobEvent>>>>,
}

impl NotificationThread {
    /// Spawn the thread. It logs through `dispatch`.
    pub fn spawn(dispatch: tracing::Dispatch) -> std::io::Result<Self> {
        let (sender, rx) = std::sync::mpsc::channel::<JobEvent>();
        let subscribers: Arc<Mutex<Vec<Sender<JobEvent>>>> = Default::default();
        let thread_subscribers = Arc::clone(&subscribers);
        let handle = std::thread::Builder::new()
            .name("dicom-notify".to_string())
            .spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                while let Ok(event) = rx.recv() {
                    let mut subscribers = lock(&thread_subscribers);
                    subscribers.retain(|s| s.send(event.clone()).is_ok());
                }
                tracing::trace!("notification thread exiting");
            })?;
        Ok(Self {
            handle,
            sender,
            subscribers,
        })
    }

    /// Create a new [Sender] feeding this thread.
    pub fn sender(&self) -> Sender<JobEvent> {
        self.sender.clone()
    }

    /// Register a subscriber. It receives every event sent from now on.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        let (tx, rx) = std::sync::mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Send an event to the thread.
    #[cfg(test)]
    pub fn send(&self, event: JobEvent) -> Result<(), std::sync::mpsc::SendError<JobEvent>> {
        self.sender.send(event)
    }

    /// Join this thread. Every [Sender] obtained from [NotificationThread::sender]
    /// must have been dropped, otherwise this blocks forever.
    pub fn join(self) -> std::thread::Result<()> {
        drop(self.sender);
        self.handle.join()
    }
}
