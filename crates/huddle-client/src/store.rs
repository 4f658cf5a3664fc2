//! [`PresenceStore`] over Redis sets.

use huddle_app::{PresenceStore, SetOp, StoreError};
use tokio::sync::Mutex;

use crate::{
    connection::{Connection, integer_reply, strings_reply},
    error::ClientError,
    resp::RespValue,
};

/// Redis-backed set store.
///
/// Commands are serialized over a single connection.
#[derive(Debug)]
pub struct RedisStore {
    connection: Mutex<Connection>,
}

impl RedisStore {
    /// Connect to the server at `addr` and check it answers.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let store = Self { connection: Mutex::new(Connection::connect(addr).await?) };
        store.ping().await?;
        Ok(store)
    }

    /// Round-trip a `PING`.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let reply = self.connection.lock().await.request(&["PING"]).await?;
        match reply.as_text() {
            Some("PONG") => Ok(()),
            _ => Err(ClientError::UnexpectedReply { command: "PING", reply: format!("{reply:?}") }),
        }
    }

    async fn integer(&self, command: &'static str, args: &[&str]) -> Result<i64, StoreError> {
        let reply = self.request(command, args).await?;
        Ok(integer_reply(command, reply)?)
    }

    async fn strings(
        &self,
        command: &'static str,
        args: &[&str],
    ) -> Result<Vec<String>, StoreError> {
        let reply = self.request(command, args).await?;
        Ok(strings_reply(command, reply)?)
    }

    async fn request(
        &self,
        command: &'static str,
        args: &[&str],
    ) -> Result<RespValue, ClientError> {
        let mut request = Vec::with_capacity(args.len() + 1);
        request.push(command);
        request.extend_from_slice(args);

        tracing::trace!(command, keys = args.len(), "store request");
        self.connection.lock().await.request(&request).await
    }
}

fn combine_command(op: SetOp) -> &'static str {
    match op {
        SetOp::Union => "SUNION",
        SetOp::Intersect => "SINTER",
        SetOp::Difference => "SDIFF",
    }
}

fn combine_store_command(op: SetOp) -> &'static str {
    match op {
        SetOp::Union => "SUNIONSTORE",
        SetOp::Intersect => "SINTERSTORE",
        SetOp::Difference => "SDIFFSTORE",
    }
}

impl PresenceStore for RedisStore {
    async fn add_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.integer("SADD", &[key, member]).await? > 0)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.integer("SREM", &[key, member]).await? > 0)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.strings("SMEMBERS", &[key]).await
    }

    async fn combine(&self, op: SetOp, keys: &[String]) -> Result<Vec<String>, StoreError> {
        // Redis rejects set commands without keys
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let args: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.strings(combine_command(op), &args).await
    }

    async fn combine_store(
        &self,
        op: SetOp,
        destination: &str,
        keys: &[String],
    ) -> Result<usize, StoreError> {
        if keys.is_empty() {
            self.delete(destination).await?;
            return Ok(0);
        }
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push(destination);
        args.extend(keys.iter().map(String::as_str));

        let stored = self.integer(combine_store_command(op), &args).await?;
        usize::try_from(stored)
            .map_err(|_| StoreError::Protocol(format!("negative cardinality {stored}")))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.integer("DEL", &[key]).await? > 0)
    }
}
