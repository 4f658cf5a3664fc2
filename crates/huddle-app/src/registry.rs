//! Fixed channel list.
//!
//! The [`ChannelRegistry`] is decided once at startup and never changes for
//! the lifetime of the process. Channels are addressed by their position in
//! the list ([`ChannelIndex`]); index 0 is the broadcast channel every session
//! joins and writes to first.

use std::fmt;

use crate::error::RegistryError;

/// Position of a channel in the [`ChannelRegistry`].
///
/// Only the registry hands these out, so an index always names a channel of
/// the registry that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelIndex(usize);

impl ChannelIndex {
    /// Zero-based position in the registry.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Channel list used when none is configured.
pub const DEFAULT_CHANNELS: [&str; 5] =
    ["allchat", "en-trading-1", "en-trading-2", "pl-grouping-1", "pl-grouping-2"];

/// Ordered, immutable list of known channel names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRegistry {
    channels: Vec<String>,
}

impl ChannelRegistry {
    /// Build a registry from an ordered list of names.
    ///
    /// The first name becomes the broadcast channel. Rejects an empty list
    /// and repeated names.
    pub fn new<I, S>(names: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut channels: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if name.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if channels.contains(&name) {
                return Err(RegistryError::Duplicate(name));
            }
            channels.push(name);
        }

        if channels.is_empty() {
            return Err(RegistryError::Empty);
        }

        Ok(Self { channels })
    }

    /// Index of the channel named exactly `name`. `None` if unknown.
    pub fn index_of(&self, name: &str) -> Option<ChannelIndex> {
        self.channels.iter().position(|c| c == name).map(ChannelIndex)
    }

    /// Indices of every channel whose name contains `substring`, in registry
    /// order.
    ///
    /// Plain substring containment: no globbing, no regex. An empty
    /// substring matches every channel.
    pub fn indices_matching<'a>(
        &'a self,
        substring: &'a str,
    ) -> impl Iterator<Item = ChannelIndex> + 'a {
        self.iter().filter(move |(_, c)| c.contains(substring)).map(|(i, _)| i)
    }

    /// Channel name at `index`.
    ///
    /// Indices minted by a different registry may not resolve; those yield
    /// an empty name.
    pub fn name(&self, index: ChannelIndex) -> &str {
        self.channels.get(index.0).map_or("", String::as_str)
    }

    /// The broadcast channel (always the first entry).
    pub fn broadcast(&self) -> ChannelIndex {
        ChannelIndex(0)
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always `false`: construction rejects empty lists.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels with their indices, in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelIndex, &str)> {
        self.channels.iter().enumerate().map(|(i, c)| (ChannelIndex(i), c.as_str()))
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self { channels: DEFAULT_CHANNELS.iter().map(ToString::to_string).collect() }
    }
}
