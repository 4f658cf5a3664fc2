//! Redis backend for huddle
//!
//! Implements the [`huddle_app::PresenceStore`] and [`huddle_app::Transport`]
//! contracts against a Redis server over plain TCP.
//!
//! # Components
//!
//! - [`RespCodec`]: RESP2 framing for `tokio_util::codec::Framed`
//! - [`Connection`]: request/response over one framed socket
//! - [`RedisStore`]: presence and friend sets (`SADD`, `SINTER`, ...)
//! - [`RedisTransport`]: `PUBLISH` plus a dedicated subscriber connection

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod connection;
mod error;
mod pubsub;
mod resp;
mod store;

pub use connection::Connection;
pub use error::ClientError;
pub use pubsub::RedisTransport;
pub use resp::{CodecError, RespCodec, RespValue};
pub use store::RedisStore;
