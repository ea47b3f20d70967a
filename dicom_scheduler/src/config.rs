use crate::error::ConfigError;
use dicom_jobs_api::{JobKind, Server};
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use std::path::Path;
use std::time::Duration;

/// Scheduler configuration.
///
/// Every field is optional in the JSON document:
///
/// ```json
/// {
///   "MaximumThreadCount": 8,
///   "RetryDelay": 250,
///   "MaximumConcurrentJobsPerType": { "Retrieve": 4 },
///   "Servers": [ ... ]
/// }
/// ```
#[serde_as]
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SchedulerConfig {
    /// Number of pool threads.
    pub maximum_thread_count: usize,
    pub maximum_number_of_retry: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retry_delay: Duration,
    pub maximum_concurrent_jobs_per_type: ConcurrencyLimits,
    /// Answers of a patient-level query beyond this count are dropped.
    pub maximum_patients_query: usize,
    pub listener_drain: DrainPolicy,
    /// Number of retrieved datasets sent to the catalog at once.
    pub retrieve_batch_size: usize,
    pub servers: Vec<Server>,
    /// Log INFO events as warnings.
    pub verbose: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            maximum_thread_count: 20,
            maximum_number_of_retry: 3,
            retry_delay: Duration::from_millis(100),
            maximum_concurrent_jobs_per_type: ConcurrencyLimits::default(),
            maximum_patients_query: 25,
            listener_drain: DrainPolicy::default(),
            retrieve_batch_size: 10,
            servers: Vec::new(),
            verbose: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::from)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(ConfigError::from)
    }
}

/// Maximum number of concurrently dispatched jobs, per [JobKind].
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConcurrencyLimits {
    pub echo: usize,
    pub query: usize,
    pub retrieve: usize,
    pub storage_listen: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            echo: 20,
            query: 20,
            retrieve: 20,
            storage_listen: 20,
        }
    }
}

impl ConcurrencyLimits {
    /// Limit for `kind`. A limit of 0 counts as 1.
    pub fn get(&self, kind: JobKind) -> usize {
        let limit = match kind {
            JobKind::Echo => self.echo,
            JobKind::Query => self.query,
            JobKind::Retrieve => self.retrieve,
            JobKind::StorageListen => self.storage_listen,
        };
        limit.max(1)
    }
}

/// When a storage listener hands received instances to the catalog: as soon as
/// `batch_size` instances are pending, or `interval` after the last flush.
#[serde_as]
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct DrainPolicy {
    pub batch_size: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            batch_size: 10,
            interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_jobs_api::ConnectionName;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_empty_config_is_default() {
        let actual = SchedulerConfig::from_json_str("{}").unwrap();
        assert_eq!(actual, SchedulerConfig::default())
    }

    #[test]
    fn test_partial_config() {
        let data = json!({
            "MaximumThreadCount": 4,
            "RetryDelay": 250,
            "MaximumConcurrentJobsPerType": { "Retrieve": 2 },
            "ListenerDrain": { "Interval": 50 },
            "Servers": [
                {
                    "ConnectionName": "PACS",
                    "CallingAETitle": "CTK",
                    "CalledAETitle": "PACS",
                    "Host": "localhost",
                    "Port": 4242
                }
            ],
            "Verbose": true
        });
        let actual = SchedulerConfig::from_json_str(&data.to_string()).unwrap();
        assert_eq!(actual.maximum_thread_count, 4);
        assert_eq!(actual.maximum_number_of_retry, 3);
        assert_eq!(actual.retry_delay, Duration::from_millis(250));
        assert_eq!(actual.maximum_concurrent_jobs_per_type.get(JobKind::Retrieve), 2);
        assert_eq!(actual.maximum_concurrent_jobs_per_type.get(JobKind::Query), 20);
        assert_eq!(
            actual.listener_drain,
            DrainPolicy {
                batch_size: 10,
                interval: Duration::from_millis(50)
            }
        );
        assert_eq!(actual.servers[0].connection_name, ConnectionName::new("PACS"));
        assert!(actual.verbose);
    }

    #[test]
    fn test_zero_concurrency_limit() {
        let data = r#"{"MaximumConcurrentJobsPerType": {"Echo": 0}}"#;
        let actual = SchedulerConfig::from_json_str(data).unwrap();
        assert_eq!(actual.maximum_concurrent_jobs_per_type.get(JobKind::Echo), 1);
        assert_eq!(actual.maximum_concurrent_jobs_per_type.get(JobKind::Retrieve), 20);
    }

    #[test]
    fn test_invalid_config() {
        let actual = SchedulerConfig::from_json_str(r#"{"MaximumThreadCount": "many"}"#);
        assert!(matches!(actual, Err(ConfigError::Json(_))))
    }
}
