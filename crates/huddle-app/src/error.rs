//! Error types.
//!
//! Two severities exist. [`LookupError`] is reported back to the user and the
//! session carries on. [`SessionError`] wraps store and transport failures,
//! which end the session.

use thiserror::Error;

use crate::{store::StoreError, transport::TransportError};

/// Invalid channel list at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No channels configured.
    #[error("channel list is empty")]
    Empty,

    /// A channel name was the empty string.
    #[error("channel names must not be empty")]
    EmptyName,

    /// The same channel name appeared twice.
    #[error("duplicate channel name: {0}")]
    Duplicate(String),
}

/// Channel lookup miss. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No channel has this exact name.
    #[error("channel {0} not found")]
    UnknownChannel(String),

    /// No channel name contains the pattern.
    #[error("no matching channel was found for '{0}'")]
    NoMatchingChannel(String),
}

/// Fatal session error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Key/set store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Publish/subscribe transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
