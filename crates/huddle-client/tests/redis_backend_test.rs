//! Tests for the Redis store and transport against an in-process fake server.
//!
//! The fake speaks RESP2 through the crate's own codec and implements just
//! the set, key and pub/sub commands the client issues, with Redis reply
//! shapes. A key named `wrongtype` makes set commands fail the way Redis
//! does on a type mismatch.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use huddle_app::{
    ChannelRegistry, CommandDispatcher, FixedClock, Inbox, PresenceQuery, PresenceStore, SetOp,
    SessionContext, StoreError, Transport, TransportError,
};
use huddle_client::{ClientError, RedisStore, RedisTransport, RespCodec, RespValue};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_util::codec::Framed;

const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct ServerState {
    sets: HashMap<String, BTreeSet<String>>,
    subscribers: HashMap<u64, Subscriber>,
    next_id: u64,
}

struct Subscriber {
    channels: BTreeSet<String>,
    push: mpsc::UnboundedSender<RespValue>,
}

/// Handle on a running fake server.
#[derive(Clone)]
struct FakeRedis {
    addr: String,
    state: Arc<Mutex<ServerState>>,
}

impl FakeRedis {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        let state = Arc::new(Mutex::new(ServerState::default()));

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&accept_state)));
            }
        });

        Self { addr, state }
    }

    fn keys(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = state.sets.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Hang up on every connection in subscribe mode.
    fn disconnect_subscribers(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.retain(|_, s| s.channels.is_empty());
    }

    fn members(&self, key: &str) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }
}

async fn serve(socket: TcpStream, state: Arc<Mutex<ServerState>>) {
    let mut framed = Framed::new(socket, RespCodec::new());
    let (push, mut pushes) = mpsc::unbounded_channel();
    let id = {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, Subscriber { channels: BTreeSet::new(), push });
        id
    };

    loop {
        tokio::select! {
            request = framed.next() => {
                let Some(Ok(RespValue::Array(args))) = request else {
                    break;
                };
                let args: Vec<String> =
                    args.iter().filter_map(|a| a.as_text().map(str::to_string)).collect();
                let replies = execute(&state, id, &args);
                for reply in replies {
                    if framed.send(reply).await.is_err() {
                        return;
                    }
                }
            },
            message = pushes.recv() => {
                let Some(message) = message else {
                    break;
                };
                if framed.send(message).await.is_err() {
                    break;
                }
            },
        }
    }

    state.lock().unwrap_or_else(PoisonError::into_inner).subscribers.remove(&id);
}

fn bulk(s: &str) -> RespValue {
    RespValue::Bulk(Bytes::copy_from_slice(s.as_bytes()))
}

fn int(n: usize) -> RespValue {
    RespValue::Integer(i64::try_from(n).expect("small count"))
}

fn fold(sets: &HashMap<String, BTreeSet<String>>, command: &str, keys: &[String]) -> BTreeSet<String> {
    let mut inputs = keys.iter().map(|k| sets.get(k).cloned().unwrap_or_default());
    let first = inputs.next().unwrap_or_default();
    inputs.fold(first, |acc, set| match command {
        "SUNION" => acc.union(&set).cloned().collect(),
        "SINTER" => acc.intersection(&set).cloned().collect(),
        _ => acc.difference(&set).cloned().collect(),
    })
}

fn execute(state: &Mutex<ServerState>, id: u64, args: &[String]) -> Vec<RespValue> {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    let Some((command, rest)) = args.split_first() else {
        return vec![RespValue::Error("ERR empty command".into())];
    };
    let command = command.to_ascii_uppercase();

    if command.starts_with('S') && rest.iter().any(|a| a == "wrongtype") {
        return vec![RespValue::Error(
            "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
        )];
    }

    match (command.as_str(), rest) {
        ("PING", []) => vec![RespValue::Simple("PONG".into())],
        ("SADD", [key, members @ ..]) => {
            let set = state.sets.entry(key.clone()).or_default();
            vec![int(members.iter().filter(|m| set.insert((*m).clone())).count())]
        },
        ("SREM", [key, members @ ..]) => {
            let Some(set) = state.sets.get_mut(key) else {
                return vec![int(0)];
            };
            let removed = members.iter().filter(|m| set.remove(*m)).count();
            if set.is_empty() {
                state.sets.remove(key);
            }
            vec![int(removed)]
        },
        ("SMEMBERS", [key]) => {
            let members = state.sets.get(key).cloned().unwrap_or_default();
            vec![RespValue::Array(members.iter().map(|m| bulk(m)).collect())]
        },
        ("SUNION" | "SINTER" | "SDIFF", keys) if !keys.is_empty() => {
            let result = fold(&state.sets, &command, keys);
            vec![RespValue::Array(result.iter().map(|m| bulk(m)).collect())]
        },
        ("SUNIONSTORE" | "SINTERSTORE" | "SDIFFSTORE", [destination, keys @ ..])
            if !keys.is_empty() =>
        {
            let result = fold(&state.sets, command.trim_end_matches("STORE"), keys);
            let len = result.len();
            if result.is_empty() {
                state.sets.remove(destination);
            } else {
                state.sets.insert(destination.clone(), result);
            }
            vec![int(len)]
        },
        ("DEL", keys) => vec![int(keys.iter().filter(|k| state.sets.remove(*k).is_some()).count())],
        ("PUBLISH", [channel, message]) => {
            let push = RespValue::Array(vec![bulk("message"), bulk(channel), bulk(message)]);
            let receivers = state
                .subscribers
                .values()
                .filter(|s| s.channels.contains(channel))
                .filter(|s| s.push.send(push.clone()).is_ok())
                .count();
            vec![int(receivers)]
        },
        ("SUBSCRIBE", channels) if !channels.is_empty() => {
            let Some(me) = state.subscribers.get_mut(&id) else {
                return Vec::new();
            };
            channels
                .iter()
                .map(|channel| {
                    me.channels.insert(channel.clone());
                    RespValue::Array(vec![bulk("subscribe"), bulk(channel), int(me.channels.len())])
                })
                .collect()
        },
        ("UNSUBSCRIBE", channels) => {
            let Some(me) = state.subscribers.get_mut(&id) else {
                return Vec::new();
            };
            let targets: Vec<String> =
                if channels.is_empty() { me.channels.iter().cloned().collect() } else { channels.to_vec() };
            if targets.is_empty() {
                return vec![RespValue::Array(vec![bulk("unsubscribe"), RespValue::Null, int(0)])];
            }
            targets
                .iter()
                .map(|channel| {
                    me.channels.remove(channel);
                    RespValue::Array(vec![
                        bulk("unsubscribe"),
                        bulk(channel),
                        int(me.channels.len()),
                    ])
                })
                .collect()
        },
        _ => vec![RespValue::Error(format!("ERR unknown command '{command}'"))],
    }
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

async fn next_delivery(inbox: &mut Inbox) -> huddle_app::Delivery {
    timeout(WAIT, inbox.recv()).await.expect("delivery in time").expect("inbox open")
}

#[tokio::test]
async fn store_commands_follow_set_semantics() {
    let server = FakeRedis::start().await;
    let store = RedisStore::connect(&server.addr).await.expect("connect");

    assert!(store.add_member("x", "a").await.expect("sadd"));
    assert!(!store.add_member("x", "a").await.expect("sadd"));
    store.add_member("x", "b").await.expect("sadd");
    store.add_member("y", "b").await.expect("sadd");
    store.add_member("y", "c").await.expect("sadd");

    let mut members = store.members("x").await.expect("smembers");
    members.sort();
    assert_eq!(members, ["a", "b"]);

    let xy = keys(&["x", "y"]);
    assert_eq!(store.combine(SetOp::Intersect, &xy).await.expect("sinter"), ["b"]);
    assert_eq!(store.combine(SetOp::Difference, &xy).await.expect("sdiff"), ["a"]);
    assert_eq!(store.combine_store(SetOp::Union, "z", &xy).await.expect("sunionstore"), 3);
    assert_eq!(server.members("z"), ["a", "b", "c"]);
    assert!(store.combine(SetOp::Union, &[]).await.expect("no keys").is_empty());

    assert!(store.remove_member("x", "a").await.expect("srem"));
    assert!(!store.remove_member("x", "a").await.expect("srem"));
    assert!(store.delete("z").await.expect("del"));
    assert!(!store.delete("z").await.expect("del"));
    assert_eq!(server.keys(), ["x", "y"]);
}

#[tokio::test]
async fn error_reply_is_protocol_error() {
    let server = FakeRedis::start().await;
    let store = RedisStore::connect(&server.addr).await.expect("connect");

    let err = store.add_member("wrongtype", "a").await.expect_err("type mismatch");
    assert!(matches!(err, StoreError::Protocol(ref m) if m.contains("WRONGTYPE")), "{err:?}");

    // The connection stays usable
    assert!(store.add_member("fine", "a").await.expect("sadd"));
}

#[tokio::test]
async fn unreachable_server_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr").to_string();
    drop(listener);

    let err = RedisStore::connect(&addr).await.expect_err("nothing listening");
    assert!(matches!(err, ClientError::Connect { .. }));
    assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
}

#[tokio::test]
async fn online_offline_cleans_up_on_redis() {
    let server = FakeRedis::start().await;
    let store = Arc::new(RedisStore::connect(&server.addr).await.expect("connect"));
    let query = PresenceQuery::new(Arc::clone(&store));
    let ctx = SessionContext::new("alice", Arc::new(ChannelRegistry::default()));

    query.add_friend(&ctx, "bob").await.expect("add friend");
    query.add_friend(&ctx, "carol").await.expect("add friend");
    store.add_member("presence:en-trading-1", "bob").await.expect("sadd");
    store.add_member("presence:allchat", "alice").await.expect("sadd");

    let partition = query.online_offline(&ctx).await.expect("query");
    assert_eq!(partition.online, ["bob"]);
    assert_eq!(partition.offline, ["carol"]);
    assert!(server.keys().iter().all(|k| !k.starts_with("scratch:")), "{:?}", server.keys());
}

#[tokio::test]
async fn publish_reaches_subscribers_only() {
    let server = FakeRedis::start().await;
    let (alice, _alice_inbox) = RedisTransport::connect(&server.addr).await.expect("connect");
    let (bob, mut bob_inbox) = RedisTransport::connect(&server.addr).await.expect("connect");

    bob.subscribe("allchat").await.expect("subscribe");
    assert_eq!(alice.publish("allchat", "alice: hi").await.expect("publish"), 1);
    assert_eq!(alice.publish("en-trading-1", "nobody").await.expect("publish"), 0);

    let delivery = next_delivery(&mut bob_inbox).await;
    assert_eq!(delivery.channel, "allchat");
    assert_eq!(delivery.payload, "alice: hi");

    bob.unsubscribe("allchat").await.expect("unsubscribe");
    assert_eq!(alice.publish("allchat", "gone").await.expect("publish"), 0);
}

#[tokio::test]
async fn unsubscribe_all_completes_with_and_without_subscriptions() {
    let server = FakeRedis::start().await;
    let (transport, _inbox) = RedisTransport::connect(&server.addr).await.expect("connect");

    transport.unsubscribe_all().await.expect("nothing subscribed");

    transport.subscribe("allchat").await.expect("subscribe");
    transport.subscribe("pl-grouping-1").await.expect("subscribe");
    transport.unsubscribe_all().await.expect("unsubscribe all");

    let (publisher, _publisher_inbox) =
        RedisTransport::connect(&server.addr).await.expect("connect");
    assert_eq!(publisher.publish("allchat", "x").await.expect("publish"), 0);
    assert_eq!(publisher.publish("pl-grouping-1", "x").await.expect("publish"), 0);
}

#[tokio::test]
async fn sessions_chat_over_redis() {
    let server = FakeRedis::start().await;
    let registry = Arc::new(ChannelRegistry::default());
    let clock = FixedClock::at(14, 5).expect("valid time");

    let store = Arc::new(RedisStore::connect(&server.addr).await.expect("connect"));
    let (alice_transport, _alice_inbox) =
        RedisTransport::connect(&server.addr).await.expect("connect");
    let (bob_transport, mut bob_inbox) =
        RedisTransport::connect(&server.addr).await.expect("connect");

    let alice = CommandDispatcher::new(Arc::clone(&store), Arc::new(alice_transport), clock);
    let bob = CommandDispatcher::new(Arc::clone(&store), Arc::new(bob_transport), clock);
    let mut alice_ctx = SessionContext::new("alice", Arc::clone(&registry));
    let mut bob_ctx = SessionContext::new("bob", registry);

    bob.dispatch(&mut bob_ctx, "pschan:trading").await.expect("pschan");
    alice.dispatch(&mut alice_ctx, "wchan:en-trading-2").await.expect("wchan");
    alice.dispatch(&mut alice_ctx, "hello").await.expect("chat");

    let delivery = next_delivery(&mut bob_inbox).await;
    assert_eq!(delivery.channel, "en-trading-2");
    assert_eq!(delivery.payload, "alice: hello  (14:5 on en-trading-2)");
    assert_eq!(server.members("presence:en-trading-1"), ["bob"]);

    bob.dispatch(&mut bob_ctx, "exit:").await.expect("exit");
    assert!(server.keys().is_empty(), "{:?}", server.keys());
}

#[tokio::test]
async fn lost_subscriber_connection_closes_the_inbox() {
    let server = FakeRedis::start().await;
    let (transport, mut inbox) = RedisTransport::connect(&server.addr).await.expect("connect");
    transport.subscribe("allchat").await.expect("subscribe");

    server.disconnect_subscribers();

    let closed = timeout(WAIT, inbox.recv()).await.expect("inbox closed in time");
    assert_eq!(closed, None);
    assert!(matches!(
        transport.subscribe("en-trading-1").await,
        Err(TransportError::Unavailable(_))
    ));
}
