//! [`Transport`] over Redis pub/sub.
//!
//! A connection in subscribe mode only accepts (UN)SUBSCRIBE, so the
//! transport uses two: one for `PUBLISH`, and one owned by a background task
//! that issues subscription changes and reads pushes. Pushed `message`
//! arrays are forwarded to the inbox; subscription confirmations complete
//! the waiting caller.

use std::collections::VecDeque;

use huddle_app::{Delivery, INBOX_CAPACITY, Inbox, Transport, TransportError};
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};

use crate::{
    connection::{Connection, integer_reply},
    error::ClientError,
    resp::RespValue,
};

/// Subscription change requests queued to the subscriber task.
const CONTROL_CAPACITY: usize = 32;

/// Subscription change requested of the subscriber task.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Subscribe(String),
    Unsubscribe(String),
    UnsubscribeAll,
}

impl Change {
    fn command(&self) -> Vec<&str> {
        match self {
            Self::Subscribe(channel) => vec!["SUBSCRIBE", channel.as_str()],
            Self::Unsubscribe(channel) => vec!["UNSUBSCRIBE", channel.as_str()],
            Self::UnsubscribeAll => vec!["UNSUBSCRIBE"],
        }
    }

    /// Whether a confirmation push completes this change.
    fn completed_by(&self, confirmation: &Confirmation) -> bool {
        match (self, confirmation) {
            (Self::Subscribe(want), Confirmation::Subscribed { channel, .. }) => want == channel,
            (Self::Unsubscribe(want), Confirmation::Unsubscribed { channel, .. }) => {
                channel.as_ref() == Some(want)
            },
            (Self::UnsubscribeAll, Confirmation::Unsubscribed { remaining, .. }) => *remaining == 0,
            _ => false,
        }
    }
}

#[derive(Debug)]
struct Control {
    change: Change,
    done: oneshot::Sender<Result<(), TransportError>>,
}

/// What the subscriber connection pushed.
#[derive(Debug, PartialEq, Eq)]
enum Push {
    Message(Delivery),
    Confirmation(Confirmation),
}

#[derive(Debug, PartialEq, Eq)]
enum Confirmation {
    Subscribed { channel: String, remaining: i64 },
    Unsubscribed { channel: Option<String>, remaining: i64 },
}

fn classify(value: &RespValue) -> Option<Push> {
    let RespValue::Array(items) = value else {
        return None;
    };
    match items.as_slice() {
        [kind, channel, payload] if kind.as_text() == Some("message") => {
            Some(Push::Message(Delivery {
                channel: channel.as_text()?.to_string(),
                payload: payload.as_text()?.to_string(),
            }))
        },
        [kind, channel, RespValue::Integer(remaining)] => {
            let channel = channel.as_text().map(str::to_string);
            match kind.as_text()? {
                "subscribe" => Some(Push::Confirmation(Confirmation::Subscribed {
                    channel: channel?,
                    remaining: *remaining,
                })),
                "unsubscribe" => Some(Push::Confirmation(Confirmation::Unsubscribed {
                    channel,
                    remaining: *remaining,
                })),
                _ => None,
            }
        },
        _ => None,
    }
}

/// Redis-backed publish/subscribe.
///
/// Dropping it stops the subscriber task and closes the inbox.
#[derive(Debug)]
pub struct RedisTransport {
    publisher: Mutex<Connection>,
    control: mpsc::Sender<Control>,
    subscriber: JoinHandle<()>,
}

impl RedisTransport {
    /// Open both connections to `addr` and start the subscriber task.
    pub async fn connect(addr: &str) -> Result<(Self, Inbox), ClientError> {
        let publisher = Connection::connect(addr).await?;
        let subscriber = Connection::connect(addr).await?;

        let (outbox, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (control, requests) = mpsc::channel(CONTROL_CAPACITY);
        let subscriber = tokio::spawn(run_subscriber(subscriber, requests, outbox));

        Ok((Self { publisher: Mutex::new(publisher), control, subscriber }, inbox))
    }

    async fn change(&self, change: Change) -> Result<(), TransportError> {
        let (done, wait) = oneshot::channel();
        self.control
            .send(Control { change, done })
            .await
            .map_err(|_| TransportError::Unavailable("subscriber connection closed".into()))?;
        wait.await
            .map_err(|_| TransportError::Unavailable("subscriber connection closed".into()))?
    }
}

impl Drop for RedisTransport {
    fn drop(&mut self) {
        self.subscriber.abort();
    }
}

impl Transport for RedisTransport {
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, TransportError> {
        let reply = self.publisher.lock().await.request(&["PUBLISH", channel, message]).await?;
        let receivers = integer_reply("PUBLISH", reply)?;
        usize::try_from(receivers)
            .map_err(|_| TransportError::Protocol(format!("negative receiver count {receivers}")))
    }

    async fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.change(Change::Subscribe(channel.to_string())).await
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.change(Change::Unsubscribe(channel.to_string())).await
    }

    async fn unsubscribe_all(&self) -> Result<(), TransportError> {
        self.change(Change::UnsubscribeAll).await
    }
}

/// Own the subscriber connection until it fails or the transport is
/// dropped.
async fn run_subscriber(
    mut connection: Connection,
    mut requests: mpsc::Receiver<Control>,
    outbox: mpsc::Sender<Delivery>,
) {
    let mut pending: VecDeque<Control> = VecDeque::new();

    let failure = loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    break None;
                };
                if let Err(e) = connection.send(&request.change.command()).await {
                    let _ = request.done.send(Err(e.into()));
                    break Some("failed to send subscription change".to_string());
                }
                pending.push_back(request);
            },
            value = connection.next() => {
                let value = match value {
                    Ok(value) => value,
                    Err(e) => break Some(e.to_string()),
                };
                match value {
                    RespValue::Error(message) => match pending.pop_front() {
                        Some(request) => {
                            let _ = request.done.send(Err(TransportError::Protocol(message)));
                        },
                        None => tracing::warn!(%message, "unsolicited error reply"),
                    },
                    value => handle_push(&value, &mut pending, &outbox),
                }
            },
        }
    };

    if let Some(reason) = &failure {
        tracing::warn!(%reason, "subscriber connection lost");
    }
    let reason = failure.unwrap_or_else(|| "transport dropped".to_string());
    for request in pending {
        let _ = request.done.send(Err(TransportError::Unavailable(reason.clone())));
    }
}

fn handle_push(
    value: &RespValue,
    pending: &mut VecDeque<Control>,
    outbox: &mpsc::Sender<Delivery>,
) {
    match classify(value) {
        Some(Push::Message(delivery)) => match outbox.try_send(delivery) {
            Ok(()) | Err(TrySendError::Closed(_)) => {},
            Err(TrySendError::Full(delivery)) => {
                tracing::warn!(channel = %delivery.channel, "inbox full, dropping message");
            },
        },
        Some(Push::Confirmation(confirmation)) => {
            tracing::trace!(?confirmation, "subscription confirmed");
            if pending.front().is_some_and(|request| request.change.completed_by(&confirmation)) {
                if let Some(request) = pending.pop_front() {
                    let _ = request.done.send(Ok(()));
                }
            }
        },
        None => tracing::warn!(?value, "ignoring unexpected push"),
    }
}
