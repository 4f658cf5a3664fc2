//! Channel subscription lifecycle.
//!
//! Joining a channel is two writes: subscribe on the transport and add the
//! user to the channel's presence set. Leaving undoes both. Both directions
//! are idempotent, so repeating a join or leaving a channel that was never
//! joined is harmless.

use std::sync::Arc;

use crate::{
    error::SessionError,
    registry::ChannelIndex,
    session::{SessionContext, presence_key},
    store::PresenceStore,
    transport::Transport,
};

/// Drives joins and leaves against the store and the transport.
#[derive(Debug)]
pub struct SubscriptionManager<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
}

impl<S: PresenceStore, T: Transport> SubscriptionManager<S, T> {
    /// Manager over shared store and transport handles.
    pub fn new(store: Arc<S>, transport: Arc<T>) -> Self {
        Self { store, transport }
    }

    /// Subscribe to a channel and mark the user present on it.
    pub async fn join(
        &self,
        ctx: &mut SessionContext,
        index: ChannelIndex,
    ) -> Result<(), SessionError> {
        let channel = ctx.channel_name(index).to_string();
        self.transport.subscribe(&channel).await?;
        self.store.add_member(&presence_key(&channel), ctx.user()).await?;
        ctx.mark_joined(index);

        tracing::debug!(user = ctx.user(), %channel, "joined channel");
        Ok(())
    }

    /// Unsubscribe from a channel and remove the user's presence on it.
    ///
    /// Succeeds whether or not the channel was joined.
    pub async fn leave(
        &self,
        ctx: &mut SessionContext,
        index: ChannelIndex,
    ) -> Result<(), SessionError> {
        let channel = ctx.channel_name(index).to_string();
        self.transport.unsubscribe(&channel).await?;
        self.store.remove_member(&presence_key(&channel), ctx.user()).await?;
        ctx.mark_left(index);

        tracing::debug!(user = ctx.user(), %channel, "left channel");
        Ok(())
    }

    /// Make `index` the channel plain chat is published to.
    ///
    /// The channel does not have to be joined: publishing without listening
    /// is valid pub/sub usage.
    pub fn select_for_writing(&self, ctx: &mut SessionContext, index: ChannelIndex) {
        if !ctx.is_subscribed(index) {
            tracing::debug!(channel = ctx.channel_name(index), "write target is not joined");
        }
        ctx.set_write_target(index);
    }

    /// Join every channel whose name contains `pattern`.
    ///
    /// Returns the joined channels in registry order. Empty means nothing
    /// matched.
    pub async fn join_matching(
        &self,
        ctx: &mut SessionContext,
        pattern: &str,
    ) -> Result<Vec<ChannelIndex>, SessionError> {
        let matches: Vec<ChannelIndex> = ctx.registry().indices_matching(pattern).collect();
        for &index in &matches {
            self.join(ctx, index).await?;
        }
        Ok(matches)
    }

    /// Drop every subscription and every presence entry of this user.
    ///
    /// Sweeps all channels in the registry, not only the ones this session
    /// believes it joined. Keeps going after a failed removal and reports
    /// the first error at the end.
    pub async fn leave_all(&self, ctx: &mut SessionContext) -> Result<(), SessionError> {
        let mut first_error: Option<SessionError> = None;

        if let Err(e) = self.transport.unsubscribe_all().await {
            first_error = Some(e.into());
        }

        for key in ctx.all_presence_keys() {
            if let Err(e) = self.store.remove_member(&key, ctx.user()).await {
                tracing::warn!(%key, error = %e, "failed to clear presence");
                if first_error.is_none() {
                    first_error = Some(e.into());
                }
            }
        }
        ctx.clear_subscriptions();

        first_error.map_or(Ok(()), Err)
    }
}
