//! Client errors and their mapping onto the store and transport contracts.

use huddle_app::{StoreError, TransportError};
use thiserror::Error;

use crate::resp::CodecError;

/// Redis connection failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the server.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address dialled.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// Framing or socket error on an established connection.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The reply had the wrong shape for the command.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        /// Command sent.
        command: &'static str,
        /// Debug rendering of what came back.
        reply: String,
    },
}

impl ClientError {
    /// True when the server answered but the answer was wrong, as opposed
    /// to the connection failing.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Server(_) | Self::UnexpectedReply { .. } | Self::Codec(CodecError::Malformed(_))
        )
    }
}

impl From<ClientError> for StoreError {
    fn from(e: ClientError) -> Self {
        if e.is_protocol() {
            Self::Protocol(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

impl From<ClientError> for TransportError {
    fn from(e: ClientError) -> Self {
        if e.is_protocol() {
            Self::Protocol(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}
