//! Scheduling engine for DICOM network jobs.
//!
//! A [Scheduler] owns a table of [Job]s and a fixed-size thread pool. Every
//! admitted job is run by a [Worker], which talks to remote nodes through a
//! [Transport] and persists what it receives into a [Catalog].
//!
//! ```no_run
//! use dicom_scheduler::*;
//! use std::sync::Arc;
//!
//! # fn example(transport: Arc<dyn Transport>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = SchedulerConfig::from_path("scheduler.json")?;
//! let scheduler = Scheduler::new(transport, Arc::new(MemoryCatalog::default()), config)?;
//! let events = scheduler.subscribe();
//! scheduler.echo_all();
//! for event in events.iter().take(2) {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod cancel;
mod catalog;
mod config;
mod error;
mod job;
mod logging;
mod notify;
mod pool;
mod scheduler;
mod transport;
mod worker;

pub use cancel::CancelToken;
pub use catalog::{Catalog, MemoryCatalog};
pub use config::{ConcurrencyLimits, DrainPolicy, SchedulerConfig};
pub use error::{CatalogError, ConfigError, TransportError, WorkerError};
pub use job::{DedupKey, Job, JobSpec};
pub use logging::SchedulerLogger;
pub use scheduler::Scheduler;
pub use transport::{ListenerConfig, OperationContext, Transport};
pub use worker::Worker;

pub use dicom_jobs_api;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, ignoring poisoning: a panic on another thread must not take
/// the whole scheduler down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
