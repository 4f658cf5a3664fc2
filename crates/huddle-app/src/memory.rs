//! In-process store and broker.
//!
//! [`MemoryStore`] and [`MemoryBroker`] implement the store and transport
//! contracts on plain process memory. The TUI uses them in simulation mode
//! (no Redis address given) and the tests use them everywhere.
//!
//! Semantics follow Redis where the contract is silent: missing keys read as
//! empty sets, a set that becomes empty disappears, and storing an empty
//! aggregate removes the destination key.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    store::{PresenceStore, SetOp, StoreError},
    transport::{Delivery, INBOX_CAPACITY, Inbox, Transport, TransportError},
};

/// Store operation kinds, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`PresenceStore::add_member`].
    AddMember,
    /// [`PresenceStore::remove_member`].
    RemoveMember,
    /// [`PresenceStore::members`].
    Members,
    /// [`PresenceStore::combine`] with the given operation.
    Combine(SetOp),
    /// [`PresenceStore::combine_store`] with the given operation.
    CombineStore(SetOp),
    /// [`PresenceStore::delete`].
    Delete,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    sets: HashMap<String, BTreeSet<String>>,
    /// Operations that fail with `Unavailable` until cleared.
    faults: HashSet<StoreOp>,
    operation_count: usize,
}

/// Set store held in process memory.
///
/// Clones share the same sets.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `op` call fail with [`StoreError::Unavailable`].
    pub fn inject_fault(&self, op: StoreOp) {
        self.lock().faults.insert(op);
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// All keys currently holding a non-empty set, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().sets.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Total number of store calls attempted, including failed ones.
    pub fn operation_count(&self) -> usize {
        self.lock().operation_count
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        // Set mutations are single statements; a panicking holder cannot
        // leave a half-applied update behind.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<T>(
        &self,
        op: StoreOp,
        f: impl FnOnce(&mut HashMap<String, BTreeSet<String>>) -> T,
    ) -> Result<T, StoreError> {
        let mut inner = self.lock();
        inner.operation_count += 1;
        if inner.faults.contains(&op) {
            return Err(StoreError::Unavailable(format!("injected fault on {op:?}")));
        }
        Ok(f(&mut inner.sets))
    }
}

/// Fold `keys` left to right with `op`. Missing keys are empty sets.
fn evaluate(
    sets: &HashMap<String, BTreeSet<String>>,
    op: SetOp,
    keys: &[String],
) -> BTreeSet<String> {
    let mut inputs = keys.iter().map(|key| sets.get(key));
    let Some(first) = inputs.next() else {
        return BTreeSet::new();
    };
    let mut acc = first.cloned().unwrap_or_default();

    for set in inputs {
        match (op, set) {
            (SetOp::Union, Some(set)) => acc.extend(set.iter().cloned()),
            (SetOp::Union | SetOp::Difference, None) => {},
            (SetOp::Intersect, Some(set)) => acc.retain(|m| set.contains(m)),
            (SetOp::Intersect, None) => acc.clear(),
            (SetOp::Difference, Some(set)) => acc.retain(|m| !set.contains(m)),
        }
    }
    acc
}

impl PresenceStore for MemoryStore {
    async fn add_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.run(StoreOp::AddMember, |sets| {
            sets.entry(key.to_string()).or_default().insert(member.to_string())
        })
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.run(StoreOp::RemoveMember, |sets| {
            let Some(set) = sets.get_mut(key) else {
                return false;
            };
            let removed = set.remove(member);
            if set.is_empty() {
                sets.remove(key);
            }
            removed
        })
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.run(StoreOp::Members, |sets| {
            sets.get(key).map(|set| set.iter().cloned().collect()).unwrap_or_default()
        })
    }

    async fn combine(&self, op: SetOp, keys: &[String]) -> Result<Vec<String>, StoreError> {
        self.run(StoreOp::Combine(op), |sets| evaluate(sets, op, keys).into_iter().collect())
    }

    async fn combine_store(
        &self,
        op: SetOp,
        destination: &str,
        keys: &[String],
    ) -> Result<usize, StoreError> {
        self.run(StoreOp::CombineStore(op), |sets| {
            let result = evaluate(sets, op, keys);
            let len = result.len();
            if result.is_empty() {
                sets.remove(destination);
            } else {
                sets.insert(destination.to_string(), result);
            }
            len
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.run(StoreOp::Delete, |sets| sets.remove(key).is_some())
    }
}

#[derive(Debug)]
struct Subscriber {
    channels: HashSet<String>,
    outbox: mpsc::Sender<Delivery>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    subscribers: HashMap<u64, Subscriber>,
    next_id: u64,
    shut_down: bool,
}

/// Publish/subscribe hub held in process memory.
///
/// Each [`MemoryBroker::connect`] call yields one session's transport and
/// inbox. Clones share the same hub.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl MemoryBroker {
    /// Empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session on the broker.
    pub fn connect(&self) -> (MemoryTransport, Inbox) {
        let (outbox, inbox) = mpsc::channel(INBOX_CAPACITY);
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, Subscriber { channels: HashSet::new(), outbox });
        drop(inner);

        (MemoryTransport { broker: self.clone(), id }, inbox)
    }

    /// Number of sessions subscribed to `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().subscribers.values().filter(|s| s.channels.contains(channel)).count()
    }

    /// Make every subsequent transport call fail with
    /// [`TransportError::Unavailable`] and close every session's inbox, as a
    /// lost server connection would.
    pub fn shut_down(&self) {
        let mut inner = self.lock();
        inner.shut_down = true;
        inner.subscribers.clear();
    }

    fn lock(&self) -> MutexGuard<'_, BrokerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(
        &self,
        id: u64,
        f: impl FnOnce(&mut Subscriber) -> T,
    ) -> Result<T, TransportError> {
        let mut inner = self.lock();
        if inner.shut_down {
            return Err(TransportError::Unavailable("broker shut down".into()));
        }
        inner
            .subscribers
            .get_mut(&id)
            .map(f)
            .ok_or_else(|| TransportError::Unavailable("session disconnected".into()))
    }
}

/// One session's handle on a [`MemoryBroker`].
///
/// Dropping it disconnects the session.
#[derive(Debug)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    id: u64,
}

impl Transport for MemoryTransport {
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, TransportError> {
        let inner = self.broker.lock();
        if inner.shut_down {
            return Err(TransportError::Unavailable("broker shut down".into()));
        }

        let mut receivers = 0;
        for subscriber in inner.subscribers.values().filter(|s| s.channels.contains(channel)) {
            let delivery =
                Delivery { channel: channel.to_string(), payload: message.to_string() };
            match subscriber.outbox.try_send(delivery) {
                Ok(()) => receivers += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(channel, "subscriber inbox full, dropping message");
                },
                Err(TrySendError::Closed(_)) => {},
            }
        }
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.broker.with_session(self.id, |s| {
            s.channels.insert(channel.to_string());
        })
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.broker.with_session(self.id, |s| {
            s.channels.remove(channel);
        })
    }

    async fn unsubscribe_all(&self) -> Result<(), TransportError> {
        self.broker.with_session(self.id, |s| s.channels.clear())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.broker.lock().subscribers.remove(&self.id);
    }
}
