use std::time::Duration;

use typed_builder::TypedBuilder;

use super::{store::StoreKind, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT};

/// Everything the server needs to know before it starts.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ServerConfig {
    /// Interface to listen on.
    #[builder(default = String::from("0.0.0.0"), setter(into))]
    pub host: String,
    /// Port to listen on. 0 picks a free one.
    #[builder(default = DEFAULT_PORT)]
    pub port: u16,
    /// Connections served at once. Further clients wait for a free slot.
    #[builder(default = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,
    /// How often the stats report is printed.
    #[builder(default = Duration::from_secs(10))]
    pub report_interval: Duration,
    /// How numbers are deduplicated.
    #[builder(default)]
    pub store: StoreKind,
}

impl ServerConfig {
    /// `max_connections`, but never zero.
    pub fn connection_limit(&self) -> usize {
        self.max_connections.max(1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
