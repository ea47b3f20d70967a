use crate::types::{AeTitle, ConnectionName};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use std::time::Duration;

/// Protocol used to retrieve datasets from a remote node.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum RetrieveProtocol {
    /// C-GET: datasets come back on the same association.
    #[default]
    #[serde(rename = "CGET")]
    Get,
    /// C-MOVE: the remote node opens a new association to
    /// [Server::move_destination_ae_title].
    #[serde(rename = "CMOVE")]
    Move,
}

/// Connection parameters of a remote DICOM node.
///
/// `proxy_server`, when set, is the node jobs are delegated to: a query or
/// retrieve against this server is re-issued against the proxy instead of
/// being stored directly.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Server {
    pub connection_name: ConnectionName,
    #[serde(default = "enabled")]
    pub query_retrieve_enabled: bool,
    #[serde(default = "enabled")]
    pub storage_enabled: bool,
    #[serde(rename = "CallingAETitle")]
    pub calling_ae_title: AeTitle,
    #[serde(rename = "CalledAETitle")]
    pub called_ae_title: AeTitle,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub retrieve_protocol: RetrieveProtocol,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: Duration,
    #[serde(rename = "MoveDestinationAETitle", default)]
    pub move_destination_ae_title: Option<AeTitle>,
    #[serde(default)]
    pub keep_association_open: bool,
    #[serde(default)]
    pub proxy_server: Option<Box<Server>>,
}

fn enabled() -> bool {
    true
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Server {
    /// Create a server with query/retrieve and storage enabled, C-GET
    /// retrieval and a 30 s connection timeout.
    pub fn new(
        connection_name: ConnectionName,
        calling_ae_title: AeTitle,
        called_ae_title: AeTitle,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            connection_name,
            query_retrieve_enabled: true,
            storage_enabled: true,
            calling_ae_title,
            called_ae_title,
            host: host.into(),
            port,
            retrieve_protocol: RetrieveProtocol::default(),
            connection_timeout: default_connection_timeout(),
            move_destination_ae_title: None,
            keep_association_open: false,
            proxy_server: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Server) -> Self {
        self.proxy_server = Some(Box::new(proxy));
        self
    }

    pub fn with_retrieve_protocol(mut self, protocol: RetrieveProtocol) -> Self {
        self.retrieve_protocol = protocol;
        self
    }

    /// The proxy jobs against this server should be chained to, if any.
    ///
    /// A proxy with query/retrieve disabled is ignored.
    pub fn active_proxy(&self) -> Option<&Server> {
        self.proxy_server
            .as_deref()
            .filter(|proxy| proxy.query_retrieve_enabled)
    }
}
