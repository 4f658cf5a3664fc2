//! Headless session tests.
//!
//! `run_session` is driven with scripted key events and draws onto a
//! [`VirtualScreen`], so the full key-to-screen path runs without a terminal.

use std::{io, sync::Arc, time::Duration};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use futures::{channel::mpsc, stream};
use huddle_app::{
    ChannelRegistry, CommandDispatcher, FixedClock, HELP, Inbox, SessionError, SharedScreen,
    Transport, TransportError, VirtualScreen,
    memory::{MemoryBroker, MemoryStore, MemoryTransport},
};
use huddle_client::RedisTransport;
use huddle_tui::{TerminalError, run_session};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(2);

type Dispatcher = CommandDispatcher<MemoryStore, MemoryTransport, FixedClock>;

fn key(code: KeyCode) -> io::Result<Event> {
    Ok(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)))
}

fn typed(line: &str) -> Vec<io::Result<Event>> {
    let mut events: Vec<_> = line.chars().map(|c| key(KeyCode::Char(c))).collect();
    events.push(key(KeyCode::Enter));
    events
}

fn script(lines: &[&str]) -> Vec<io::Result<Event>> {
    lines.iter().flat_map(|line| typed(line)).collect()
}

fn session(store: &MemoryStore, broker: &MemoryBroker) -> (Dispatcher, Inbox) {
    let (transport, inbox) = broker.connect();
    let clock = FixedClock::at(9, 30).expect("valid time");
    (CommandDispatcher::new(Arc::new(store.clone()), Arc::new(transport), clock), inbox)
}

fn screen() -> SharedScreen<VirtualScreen> {
    SharedScreen::new(VirtualScreen::new(200, 20))
}

#[tokio::test]
async fn commands_print_their_results() {
    let store = MemoryStore::new();
    let broker = MemoryBroker::new();
    let (dispatcher, inbox) = session(&store, &broker);
    let screen = screen();

    let mut events = script(&["addfriend:carol", "friends:", "onchan:allchat", "wchan:nowhere"]);
    events.push(key(KeyCode::Esc));

    run_session(
        dispatcher,
        Arc::new(ChannelRegistry::default()),
        inbox,
        screen.clone(),
        stream::iter(events),
        Some("bob"),
    )
    .await
    .expect("session");

    insta::assert_snapshot!(screen.with(|s| s.contents()), @r"
    Welcome bob! You joined channel allchat.
    Commands: friends: | friends:<channel> | addfriend:<name> | onchan:<channel> | schan:<channel> | pschan:<pattern> | uchan:<channel> | wchan:<channel> | cls: | exit:
    addfriend:carol
    carol was added successfully.
    friends:
    Online friends (0)
    Offline friends (1): carol
    onchan:allchat
    Users on channel allchat (1): bob
    wchan:nowhere
    Error: channel nowhere not found
    Bye.
    ");
    assert_eq!(store.keys(), vec!["friends:bob".to_string()]);
}

#[tokio::test]
async fn name_is_prompted_when_absent() {
    let store = MemoryStore::new();
    let broker = MemoryBroker::new();
    let (dispatcher, inbox) = session(&store, &broker);
    let screen = screen();

    let events = script(&["  ", "dave", "cls:", "exit:"]);

    run_session(
        dispatcher,
        Arc::new(ChannelRegistry::default()),
        inbox,
        screen.clone(),
        stream::iter(events),
        None,
    )
    .await
    .expect("session");

    // cls: wiped the prompt and welcome, leaving only the exit echo
    insta::assert_snapshot!(screen.with(|s| s.contents()), @r"
    exit:
    Bye.
    ");
    assert!(store.keys().is_empty());
    assert_eq!(broker.subscriber_count("allchat"), 0);
}

#[tokio::test]
async fn quitting_at_the_name_prompt_joins_nothing() {
    let store = MemoryStore::new();
    let broker = MemoryBroker::new();
    let (dispatcher, inbox) = session(&store, &broker);
    let screen = screen();

    let mut events = vec![key(KeyCode::Char('e'))];
    events.push(Ok(Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))));

    run_session(
        dispatcher,
        Arc::new(ChannelRegistry::default()),
        inbox,
        screen.clone(),
        stream::iter(events),
        None,
    )
    .await
    .expect("session");

    assert_eq!(screen.with(|s| s.line(0)), "Enter your name: e");
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn end_of_input_clears_presence() {
    let store = MemoryStore::new();
    let broker = MemoryBroker::new();
    let (dispatcher, inbox) = session(&store, &broker);

    run_session(
        dispatcher,
        Arc::new(ChannelRegistry::default()),
        inbox,
        screen(),
        stream::iter(script(&["schan:en-trading-1"])),
        Some("erin"),
    )
    .await
    .expect("session");

    assert!(store.keys().is_empty());
    assert_eq!(broker.subscriber_count("en-trading-1"), 0);
}

#[tokio::test]
async fn inbound_message_lands_above_the_input_line() {
    let store = MemoryStore::new();
    let broker = MemoryBroker::new();
    let (dispatcher, inbox) = session(&store, &broker);
    let (carol, _carol_inbox) = broker.connect();
    let screen = screen();
    let (keys, events) = mpsc::unbounded();

    let driver = {
        let screen = screen.clone();
        async move {
            for c in "hel".chars() {
                keys.unbounded_send(key(KeyCode::Char(c))).expect("send key");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;

            let reached = carol.publish("allchat", "carol: hi  (9:30 on allchat)").await;
            assert_eq!(reached.expect("publish"), 1);
            tokio::time::sleep(Duration::from_millis(20)).await;

            let (inbound, input, cursor) = screen.with(|s| (s.line(2), s.line(3), s.cursor()));
            assert_eq!(inbound, "carol: hi  (9:30 on allchat)");
            assert_eq!(input, "hel");
            assert_eq!(cursor, (3, 3));

            keys.unbounded_send(key(KeyCode::Esc)).expect("send key");
        }
    };

    let (outcome, ()) = tokio::join!(
        run_session(
            dispatcher,
            Arc::new(ChannelRegistry::default()),
            inbox,
            screen.clone(),
            events,
            Some("bob"),
        ),
        driver,
    );
    outcome.expect("session");

    assert_eq!(screen.with(|s| s.line(3)), "Bye.");
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn narrow_terminal_keeps_input_below_wrapped_output() {
    let store = MemoryStore::new();
    let broker = MemoryBroker::new();
    let (dispatcher, inbox) = session(&store, &broker);
    let (carol, _carol_inbox) = broker.connect();
    let screen = SharedScreen::new(VirtualScreen::new(60, 20));
    let (keys, events) = mpsc::unbounded();
    let message = format!("carol: {}  (9:30 on allchat)", "la".repeat(25));

    let driver = {
        let screen = screen.clone();
        let message = message.clone();
        async move {
            for c in "hel".chars() {
                keys.unbounded_send(key(KeyCode::Char(c))).expect("send key");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;

            carol.publish("allchat", &message).await.expect("publish");
            tokio::time::sleep(Duration::from_millis(20)).await;

            // Welcome on row 0, the banner wraps over rows 1 to 3, the
            // message over rows 4 and 5, and the input line follows
            let help: Vec<char> = HELP.chars().collect();
            let expected_help: Vec<String> = help
                .chunks(60)
                .map(|row| row.iter().collect::<String>().trim_end().to_string())
                .collect();
            let lines: Vec<String> = screen.with(|s| (0..8).map(|row| s.line(row)).collect());
            assert_eq!(expected_help.len(), 3);
            assert_eq!(lines[1..4], expected_help[..]);
            assert_eq!(format!("{}{}", lines[4], lines[5]), message);
            assert_eq!(lines[6], "hel");
            assert_eq!(screen.with(|s| s.cursor()), (3, 6));

            keys.unbounded_send(key(KeyCode::Esc)).expect("send key");
        }
    };

    let (outcome, ()) = tokio::join!(
        run_session(
            dispatcher,
            Arc::new(ChannelRegistry::default()),
            inbox,
            screen.clone(),
            events,
            Some("bob"),
        ),
        driver,
    );
    outcome.expect("session");
    assert_eq!(screen.with(|s| s.line(6)), "Bye.");
}

fn is_lost_transport(outcome: &Result<(), TerminalError>) -> bool {
    matches!(
        outcome,
        Err(TerminalError::Session(SessionError::Transport(TransportError::Unavailable(_))))
    )
}

#[tokio::test]
async fn closed_inbox_ends_the_session_with_an_error() {
    let store = MemoryStore::new();
    let broker = MemoryBroker::new();
    let (dispatcher, inbox) = session(&store, &broker);
    let (keys, events) = mpsc::unbounded::<io::Result<Event>>();

    let driver = {
        let broker = broker.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            broker.shut_down();
        }
    };

    let run = run_session(
        dispatcher,
        Arc::new(ChannelRegistry::default()),
        inbox,
        screen(),
        events,
        Some("bob"),
    );
    let (outcome, ()) = tokio::join!(timeout(WAIT, run), driver);

    assert!(is_lost_transport(&outcome.expect("session ended")));
    drop(keys);
}

/// A server that confirms the first SUBSCRIBE on the subscriber connection
/// and then hangs up on it, keeping the publish connection open.
async fn server_dropping_subscriber() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr").to_string();

    tokio::spawn(async move {
        let (publisher, _) = listener.accept().await.expect("accept publisher");
        let (mut subscriber, _) = listener.accept().await.expect("accept subscriber");

        let mut request = Vec::new();
        let mut chunk = [0_u8; 256];
        while !request.ends_with(b"allchat\r\n") {
            let n = subscriber.read(&mut chunk).await.expect("read");
            if n == 0 {
                return;
            }
            request.extend_from_slice(&chunk[..n]);
        }
        subscriber
            .write_all(b"*3\r\n$9\r\nsubscribe\r\n$7\r\nallchat\r\n:1\r\n")
            .await
            .expect("write");
        drop(subscriber);

        tokio::time::sleep(WAIT).await;
        drop(publisher);
    });

    addr
}

#[tokio::test]
async fn lost_subscriber_connection_ends_the_session() {
    let addr = server_dropping_subscriber().await;
    let (transport, inbox) = RedisTransport::connect(&addr).await.expect("connect");
    let clock = FixedClock::at(9, 30).expect("valid time");
    let dispatcher = CommandDispatcher::new(Arc::new(MemoryStore::new()), Arc::new(transport), clock);
    let (_keys, events) = mpsc::unbounded::<io::Result<Event>>();

    let outcome = timeout(
        WAIT,
        run_session(
            dispatcher,
            Arc::new(ChannelRegistry::default()),
            inbox,
            screen(),
            events,
            Some("bob"),
        ),
    )
    .await
    .expect("session ended");

    assert!(is_lost_transport(&outcome), "unexpected outcome: {outcome:?}");
}
