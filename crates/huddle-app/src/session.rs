//! Per-session state.
//!
//! A [`SessionContext`] is created once the user has picked a name, is owned
//! by the runtime loop, and is lent to every component call. It holds the
//! only mutable session state: which channels are joined and which channel
//! plain chat goes to.

use std::{collections::BTreeSet, sync::Arc};

use crate::registry::{ChannelIndex, ChannelRegistry};

/// Store key of a channel's presence set.
pub fn presence_key(channel: &str) -> String {
    format!("presence:{channel}")
}

/// Store key of a user's friend set.
pub fn friends_key(user: &str) -> String {
    format!("friends:{user}")
}

/// Prefix shared by all transient aggregate keys.
pub const SCRATCH_PREFIX: &str = "scratch:";

/// State of one chat session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Name chosen at startup. Immutable.
    user: String,
    /// Fixed channel list.
    registry: Arc<ChannelRegistry>,
    /// Channels currently joined.
    subscriptions: BTreeSet<ChannelIndex>,
    /// Channel plain chat is published to.
    write_target: ChannelIndex,
}

impl SessionContext {
    /// Fresh session for `user`. Nothing joined; writing to broadcast.
    pub fn new(user: impl Into<String>, registry: Arc<ChannelRegistry>) -> Self {
        let write_target = registry.broadcast();
        Self { user: user.into(), registry, subscriptions: BTreeSet::new(), write_target }
    }

    /// Session user name.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Channel list.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Name of the channel at `index`.
    pub fn channel_name(&self, index: ChannelIndex) -> &str {
        self.registry.name(index)
    }

    /// Store key of this user's friend set.
    pub fn friends_key(&self) -> String {
        friends_key(&self.user)
    }

    /// Presence keys of every channel, in registry order.
    pub fn all_presence_keys(&self) -> Vec<String> {
        self.registry.iter().map(|(_, name)| presence_key(name)).collect()
    }

    /// Fresh transient key for one aggregate computation.
    ///
    /// Scoped to this user and randomized per call so concurrent sessions
    /// never share one.
    pub fn scratch_key(&self) -> String {
        format!("{SCRATCH_PREFIX}online:{}:{:016x}", self.user, rand::random::<u64>())
    }

    /// Joined channels, ascending.
    pub fn subscriptions(&self) -> &BTreeSet<ChannelIndex> {
        &self.subscriptions
    }

    /// Whether `index` is joined.
    pub fn is_subscribed(&self, index: ChannelIndex) -> bool {
        self.subscriptions.contains(&index)
    }

    /// Channel plain chat is published to.
    pub fn write_target(&self) -> ChannelIndex {
        self.write_target
    }

    /// Name of the write-target channel.
    pub fn write_target_name(&self) -> &str {
        self.registry.name(self.write_target)
    }

    pub(crate) fn mark_joined(&mut self, index: ChannelIndex) {
        self.subscriptions.insert(index);
    }

    pub(crate) fn mark_left(&mut self, index: ChannelIndex) {
        self.subscriptions.remove(&index);
    }

    pub(crate) fn clear_subscriptions(&mut self) {
        self.subscriptions.clear();
    }

    pub(crate) fn set_write_target(&mut self, index: ChannelIndex) {
        self.write_target = index;
    }
}
