//! Runtime configuration.

use std::sync::Arc;

use huddle_app::{ChannelRegistry, DEFAULT_CHANNELS, RegistryError};

/// Where presence and messages live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// In-process store and broker. Only this process takes part.
    Simulation,
    /// Redis server at `host:port`.
    Redis(String),
}

/// Settings for one client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Store and transport backend.
    pub backend: Backend,
    /// User name. Prompted for when absent.
    pub name: Option<String>,
    /// Channel list; the first one is the broadcast channel. Empty means the
    /// default list.
    pub channels: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { backend: Backend::Simulation, name: None, channels: Vec::new() }
    }
}

impl RuntimeConfig {
    /// Build the channel registry.
    pub fn registry(&self) -> Result<Arc<ChannelRegistry>, RegistryError> {
        let registry = if self.channels.is_empty() {
            ChannelRegistry::new(DEFAULT_CHANNELS)?
        } else {
            ChannelRegistry::new(self.channels.iter().map(|c| c.trim()))?
        };
        Ok(Arc::new(registry))
    }

    /// The configured name, if it is usable.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}
