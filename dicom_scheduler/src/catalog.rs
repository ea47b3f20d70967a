use crate::error::CatalogError;
use crate::lock;
use dicom_jobs_api::{ConnectionName, Dataset, JobResponseSet, Server};
use std::collections::HashMap;
use std::sync::Mutex;

/// The local database results are persisted into.
pub trait Catalog: Send + Sync {
    /// Persist a batch of response sets. Called concurrently by workers; the
    /// implementation serializes its own writes.
    fn insert(&self, response_sets: Vec<JobResponseSet>) -> Result<(), CatalogError>;

    /// Connection settings of a server the scheduler does not know about.
    fn lookup_server_config(&self, connection_name: &ConnectionName) -> Option<Server>;
}

/// In-process and in-memory [Catalog].
#[derive(Default)]
pub struct MemoryCatalog {
    data: Mutex<MemoryCatalogData>,
}

#[derive(Default)]
struct MemoryCatalogData {
    datasets: HashMap<String, Dataset>,
    batches: Vec<Vec<JobResponseSet>>,
    servers: HashMap<ConnectionName, Server>,
}

impl MemoryCatalog {
    /// Create an empty [MemoryCatalog] with at least the specified capacity for datasets.
    pub fn with_capacity(capacity: usize) -> Self {
        let data = MemoryCatalogData {
            datasets: HashMap::with_capacity(capacity),
            ..Default::default()
        };
        Self {
            data: Mutex::new(data),
        }
    }

    /// Register a server returned by [Catalog::lookup_server_config].
    pub fn add_server(&self, server: Server) {
        lock(&self.data)
            .servers
            .insert(server.connection_name.clone(), server);
    }

    /// Every batch passed to [Catalog::insert], in call order.
    pub fn batches(&self) -> Vec<Vec<JobResponseSet>> {
        lock(&self.data).batches.clone()
    }

    /// Number of calls to [Catalog::insert].
    pub fn number_of_inserts(&self) -> usize {
        lock(&self.data).batches.len()
    }

    /// Get a stored dataset by its key.
    pub fn dataset(&self, key: &str) -> Option<Dataset> {
        lock(&self.data).datasets.get(key).cloned()
    }

    pub fn number_of_datasets(&self) -> usize {
        lock(&self.data).datasets.len()
    }
}

impl Catalog for MemoryCatalog {
    fn insert(&self, response_sets: Vec<JobResponseSet>) -> Result<(), CatalogError> {
        let mut data = lock(&self.data);
        for set in &response_sets {
            let overwrite = set.overwrite_existing_dataset();
            for (key, dataset) in set.datasets() {
                if !overwrite && data.datasets.contains_key(key) {
                    tracing::warn!(
                        job = %set.job_uid(),
                        SOPInstanceUID = key.as_str(),
                        "dataset already stored, not overwriting"
                    );
                    continue;
                }
                data.datasets.insert(key.clone(), dataset.clone());
            }
        }
        data.batches.push(response_sets);
        Ok(())
    }

    fn lookup_server_config(&self, connection_name: &ConnectionName) -> Option<Server> {
        lock(&self.data).servers.get(connection_name).cloned()
    }
}
