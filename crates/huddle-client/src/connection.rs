//! Framed request/response connection.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::{
    error::ClientError,
    resp::{RespCodec, RespValue},
};

/// One TCP connection to a Redis server speaking RESP2.
#[derive(Debug)]
pub struct Connection {
    framed: Framed<TcpStream, RespCodec>,
}

impl Connection {
    /// Dial `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let socket = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr: addr.to_string(), source })?;
        socket
            .set_nodelay(true)
            .map_err(|source| ClientError::Connect { addr: addr.to_string(), source })?;

        tracing::debug!(%addr, "connected");
        Ok(Self { framed: Framed::new(socket, RespCodec::new()) })
    }

    /// Send a command and wait for its reply.
    ///
    /// Error replies become [`ClientError::Server`].
    pub async fn request<S: AsRef<str>>(&mut self, args: &[S]) -> Result<RespValue, ClientError> {
        self.send(args).await?;
        match self.next().await? {
            RespValue::Error(message) => Err(ClientError::Server(message)),
            reply => Ok(reply),
        }
    }

    /// Send a command without waiting for a reply.
    pub async fn send<S: AsRef<str>>(&mut self, args: &[S]) -> Result<(), ClientError> {
        self.framed.send(RespValue::command(args)).await?;
        Ok(())
    }

    /// Next value from the server.
    pub async fn next(&mut self) -> Result<RespValue, ClientError> {
        match self.framed.next().await {
            Some(value) => Ok(value?),
            None => Err(ClientError::Closed),
        }
    }
}

/// Integer reply, or [`ClientError::UnexpectedReply`].
pub(crate) fn integer_reply(command: &'static str, reply: RespValue) -> Result<i64, ClientError> {
    match reply {
        RespValue::Integer(n) => Ok(n),
        other => Err(ClientError::UnexpectedReply { command, reply: format!("{other:?}") }),
    }
}

/// Array-of-strings reply, or [`ClientError::UnexpectedReply`].
pub(crate) fn strings_reply(
    command: &'static str,
    reply: RespValue,
) -> Result<Vec<String>, ClientError> {
    let unexpected =
        |v: &RespValue| ClientError::UnexpectedReply { command, reply: format!("{v:?}") };

    match reply {
        RespValue::Array(items) => items
            .iter()
            .map(|item| item.as_text().map(str::to_string).ok_or_else(|| unexpected(item)))
            .collect(),
        RespValue::Null => Ok(Vec::new()),
        other => Err(unexpected(&other)),
    }
}
