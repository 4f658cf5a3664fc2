//! Presence and friend queries.
//!
//! A friend is online when their name is in at least one channel's presence
//! set. The union of all presence sets is computed server-side into a
//! transient key, the friend set is intersected with it and diffed against
//! it, and the transient key is deleted again.

use std::sync::Arc;

use crate::{
    registry::ChannelIndex,
    session::{SessionContext, presence_key},
    store::{PresenceStore, SetOp, StoreError},
};

/// Friend set split by presence.
///
/// Every friend is in exactly one of the two lists. Both are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendPartition {
    /// Friends present on at least one channel.
    pub online: Vec<String>,
    /// Friends present nowhere.
    pub offline: Vec<String>,
}

/// Read-side queries over presence and friend sets.
#[derive(Debug)]
pub struct PresenceQuery<S> {
    store: Arc<S>,
}

impl<S: PresenceStore> PresenceQuery<S> {
    /// Query over a shared store handle.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Partition the user's friends by presence on any channel.
    ///
    /// Considers every channel in the registry, joined or not. The user's
    /// own name is never counted as present.
    ///
    /// # Invariants
    ///
    /// - The transient aggregate key is deleted before returning, on success
    ///   and on failure alike.
    pub async fn online_offline(&self, ctx: &SessionContext) -> Result<FriendPartition, StoreError> {
        let scratch = ctx.scratch_key();

        let result = self.partition_against_union(ctx, &scratch).await;
        let cleanup = self.store.delete(&scratch).await;

        let partition = result?;
        cleanup?;
        Ok(partition)
    }

    async fn partition_against_union(
        &self,
        ctx: &SessionContext,
        scratch: &str,
    ) -> Result<FriendPartition, StoreError> {
        let present =
            self.store.combine_store(SetOp::Union, scratch, &ctx.all_presence_keys()).await?;
        self.store.remove_member(scratch, ctx.user()).await?;
        tracing::trace!(present, %scratch, "aggregated presence");

        self.partition(&ctx.friends_key(), scratch).await
    }

    /// Partition the user's friends by presence on one channel.
    pub async fn friends_on(
        &self,
        ctx: &SessionContext,
        index: ChannelIndex,
    ) -> Result<FriendPartition, StoreError> {
        self.partition(&ctx.friends_key(), &presence_key(ctx.channel_name(index))).await
    }

    async fn partition(&self, friends: &str, present: &str) -> Result<FriendPartition, StoreError> {
        let keys = [friends.to_string(), present.to_string()];
        let mut online = self.store.combine(SetOp::Intersect, &keys).await?;
        let mut offline = self.store.combine(SetOp::Difference, &keys).await?;
        online.sort_unstable();
        offline.sort_unstable();
        Ok(FriendPartition { online, offline })
    }

    /// Everyone present on a channel, sorted.
    pub async fn users_on(
        &self,
        ctx: &SessionContext,
        index: ChannelIndex,
    ) -> Result<Vec<String>, StoreError> {
        let mut users = self.store.members(&presence_key(ctx.channel_name(index))).await?;
        users.sort_unstable();
        Ok(users)
    }

    /// Declare `name` a friend. Idempotent.
    pub async fn add_friend(&self, ctx: &SessionContext, name: &str) -> Result<(), StoreError> {
        let added = self.store.add_member(&ctx.friends_key(), name).await?;
        tracing::debug!(user = ctx.user(), friend = name, added, "friend declared");
        Ok(())
    }
}
