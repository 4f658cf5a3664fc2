//! Publish/subscribe transport contract.
//!
//! Subscribing does not take a callback. Each transport is created together
//! with an [`Inbox`], and every message arriving on a subscribed channel is
//! pushed there as a [`Delivery`]. Whoever drains the inbox is the message
//! handler. In the TUI that is the background render task.

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

/// Inbound message on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel the message was published on.
    pub channel: String,
    /// Message text as published.
    pub payload: String,
}

/// Receiving end for deliveries.
pub type Inbox = mpsc::Receiver<Delivery>;

/// Capacity of inbox channels created by the bundled transports.
pub const INBOX_CAPACITY: usize = 256;

/// Transport failures. All of them are fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection-level failure.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The broker answered with something unexpected.
    #[error("unexpected transport reply: {0}")]
    Protocol(String),
}

/// Channel-based publish/subscribe.
///
/// Delivery is at-most-once. Ordering holds only within one channel for one
/// publisher, and only as far as the underlying broker provides it.
pub trait Transport: Send + Sync + 'static {
    /// Publish `message` on `channel`. Returns how many subscribers received
    /// it.
    fn publish(
        &self,
        channel: &str,
        message: &str,
    ) -> impl Future<Output = Result<usize, TransportError>> + Send;

    /// Start delivering `channel` to the inbox. Idempotent.
    fn subscribe(&self, channel: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop delivering `channel`. Unsubscribing an unknown channel is a no-op.
    fn unsubscribe(&self, channel: &str)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop delivering every channel.
    fn unsubscribe_all(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
