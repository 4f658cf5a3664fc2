//! Async runtime
//!
//! Two tasks share the terminal. The foreground loop reads key events,
//! echoes the input line and dispatches submitted lines. A background task
//! drains the transport inbox and draws each message above the input line.
//! Both write through one [`SharedScreen`].
//!
//! The session ends when either side stops. An inbox that closes while the
//! session is still running means the transport lost its connection, and
//! that is as fatal as a failed store call.
//!
//! Supports two modes:
//! - Simulation mode: in-process memory store and broker
//! - Redis mode: presence and pub/sub on a Redis server

use std::{convert::Infallible, io, sync::Arc};

use crossterm::event::{Event, EventStream, KeyEventKind};
use futures::{Stream, StreamExt};
use huddle_app::{
    ChannelRegistry, Clock, CommandDispatcher, HELP, Inbox, PresenceStore, RegistryError, Screen,
    SessionAction, SessionContext, SessionError, SharedScreen, SystemClock, Transport,
    TransportError,
    memory::{MemoryBroker, MemoryStore},
    render_inbound,
};
use huddle_client::{ClientError, RedisStore, RedisTransport};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

use crate::{
    config::{Backend, RuntimeConfig},
    input::{EditOutcome, LineEditor},
    terminal::{RawMode, TerminalScreen, convert_key},
};

const NAME_PROMPT: &str = "Enter your name: ";

/// Runtime errors.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// I/O error from terminal operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Store or transport failure during the session.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Invalid channel list.
    #[error("invalid channel list: {0}")]
    Registry(#[from] RegistryError),

    /// Could not reach Redis.
    #[error("redis: {0}")]
    Client(#[from] ClientError),

    /// The message delivery task panicked or was cancelled.
    #[error("delivery task failed: {0}")]
    Delivery(#[from] JoinError),
}

impl From<Infallible> for TerminalError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Run a session on the real terminal.
pub async fn run(config: RuntimeConfig) -> Result<(), TerminalError> {
    let registry = config.registry()?;

    match &config.backend {
        Backend::Simulation => {
            tracing::info!("starting in simulation mode");
            let (transport, inbox) = MemoryBroker::new().connect();
            let store = Arc::new(MemoryStore::new());
            let dispatcher = CommandDispatcher::new(store, Arc::new(transport), SystemClock);
            on_terminal(dispatcher, registry, inbox, config.name()).await
        },
        Backend::Redis(addr) => {
            tracing::info!(%addr, "connecting to redis");
            let store = Arc::new(RedisStore::connect(addr).await?);
            let (transport, inbox) = RedisTransport::connect(addr).await?;
            let dispatcher = CommandDispatcher::new(store, Arc::new(transport), SystemClock);
            on_terminal(dispatcher, registry, inbox, config.name()).await
        },
    }
}

async fn on_terminal<S: PresenceStore, T: Transport, C: Clock>(
    dispatcher: CommandDispatcher<S, T, C>,
    registry: Arc<ChannelRegistry>,
    inbox: Inbox,
    name: Option<&str>,
) -> Result<(), TerminalError> {
    let _raw = RawMode::enable()?;
    let screen = SharedScreen::new(TerminalScreen::new()?);
    let events = EventStream::new();

    let resize_target = screen.clone();
    let events = events.inspect(move |event| {
        if let Ok(Event::Resize(columns, rows)) = event {
            resize_target.with(|s| s.resize(*columns, *rows));
        }
    });

    run_session(dispatcher, registry, inbox, screen, events, name).await
}

/// Drive one session until the user exits or the event stream ends.
///
/// Generic over the screen and event source so it can run headless.
///
/// # Invariants
///
/// - Every exit path after the name prompt clears the user's presence.
/// - The delivery task has rendered every queued message before this
///   returns successfully.
pub async fn run_session<S, T, C, Sc, E>(
    dispatcher: CommandDispatcher<S, T, C>,
    registry: Arc<ChannelRegistry>,
    inbox: Inbox,
    screen: SharedScreen<Sc>,
    mut events: E,
    name: Option<&str>,
) -> Result<(), TerminalError>
where
    S: PresenceStore,
    T: Transport,
    C: Clock,
    Sc: Screen + Send + 'static,
    TerminalError: From<Sc::Error>,
    E: Stream<Item = io::Result<Event>> + Unpin,
{
    let name = match name {
        Some(name) => name.to_string(),
        None => match prompt_name(&screen, &mut events).await? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let mut ctx = SessionContext::new(name, registry);
    let broadcast = ctx.registry().broadcast();
    dispatcher.subscriptions().join(&mut ctx, broadcast).await?;
    tracing::info!(user = ctx.user(), "session started");

    let welcome =
        format!("Welcome {}! You joined channel {}.", ctx.user(), ctx.channel_name(broadcast));
    screen.with(|s| -> Result<(), Sc::Error> {
        s.print_line(&welcome)?;
        s.print_line(HELP)?;
        s.flush()
    })?;

    let mut delivery = spawn_delivery(inbox, screen.clone());
    let (outcome, delivery_finished) = tokio::select! {
        outcome = foreground(&dispatcher, &mut ctx, &screen, &mut events) => (outcome, false),
        finished = &mut delivery => (Err(delivery_stopped(finished)), true),
    };

    if outcome.is_err() {
        // Best effort; the session error is the one returned
        if let Err(e) = dispatcher.subscriptions().leave_all(&mut ctx).await {
            tracing::warn!(error = %e, "failed to clear presence after error");
        }
    }

    // Dropping the transport closes the inbox, so the task finishes what is
    // queued and exits
    drop(dispatcher);
    if !delivery_finished {
        match delivery.await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to render queued messages"),
            Err(e) => tracing::warn!(error = %e, "delivery task failed"),
        }
    }

    outcome?;
    screen.with(|s| -> Result<(), Sc::Error> {
        s.rewrite_line("", 0)?;
        s.print_line("Bye.")?;
        s.flush()
    })?;
    Ok(())
}

/// Ask for the user name. `None` if the user quit instead.
async fn prompt_name<Sc, E>(
    screen: &SharedScreen<Sc>,
    events: &mut E,
) -> Result<Option<String>, TerminalError>
where
    Sc: Screen,
    TerminalError: From<Sc::Error>,
    E: Stream<Item = io::Result<Event>> + Unpin,
{
    let mut editor = LineEditor::with_prompt(NAME_PROMPT);
    redraw(screen, &editor)?;

    while let Some(event) = events.next().await {
        let Some(outcome) = key_outcome(&mut editor, event?) else {
            continue;
        };
        match outcome {
            EditOutcome::Redraw => redraw(screen, &editor)?,
            EditOutcome::Submit(line) => {
                let name = line.trim();
                if name.is_empty() {
                    redraw(screen, &editor)?;
                    continue;
                }
                let echo = format!("{NAME_PROMPT}{line}");
                screen.with(|s| -> Result<(), Sc::Error> {
                    s.rewrite_line("", 0)?;
                    s.print_line(&echo)?;
                    s.flush()
                })?;
                return Ok(Some(name.to_string()));
            },
            EditOutcome::Quit => return Ok(None),
        }
    }
    Ok(None)
}

/// Key loop. Returns once the session should end, with presence cleared.
async fn foreground<S, T, C, Sc, E>(
    dispatcher: &CommandDispatcher<S, T, C>,
    ctx: &mut SessionContext,
    screen: &SharedScreen<Sc>,
    events: &mut E,
) -> Result<(), TerminalError>
where
    S: PresenceStore,
    T: Transport,
    C: Clock,
    Sc: Screen,
    TerminalError: From<Sc::Error>,
    E: Stream<Item = io::Result<Event>> + Unpin,
{
    let mut editor = LineEditor::new();

    while let Some(event) = events.next().await {
        let Some(outcome) = key_outcome(&mut editor, event?) else {
            continue;
        };
        match outcome {
            EditOutcome::Redraw => redraw(screen, &editor)?,
            EditOutcome::Submit(line) => {
                screen.with(|s| -> Result<(), Sc::Error> {
                    s.rewrite_line("", 0)?;
                    s.print_line(&line)?;
                    s.flush()
                })?;

                let actions = dispatcher.dispatch(ctx, &line).await?;
                if apply(screen, actions)? {
                    return Ok(());
                }
            },
            EditOutcome::Quit => break,
        }
    }

    dispatcher.subscriptions().leave_all(ctx).await?;
    tracing::info!(user = ctx.user(), "session ended");
    Ok(())
}

/// Execute dispatcher actions. Returns true when the session should end.
fn apply<Sc>(screen: &SharedScreen<Sc>, actions: Vec<SessionAction>) -> Result<bool, TerminalError>
where
    Sc: Screen,
    TerminalError: From<Sc::Error>,
{
    let mut exit = false;
    screen.with(|s| -> Result<(), Sc::Error> {
        for action in actions {
            match action {
                SessionAction::Print(line) => s.print_line(&line)?,
                SessionAction::ClearScreen => s.clear()?,
                SessionAction::Exit => exit = true,
            }
        }
        s.flush()
    })?;
    Ok(exit)
}

fn key_outcome(editor: &mut LineEditor, event: Event) -> Option<EditOutcome> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            convert_key(key).map(|k| editor.handle_key(k))
        },
        _ => None,
    }
}

fn redraw<Sc>(screen: &SharedScreen<Sc>, editor: &LineEditor) -> Result<(), TerminalError>
where
    Sc: Screen,
    TerminalError: From<Sc::Error>,
{
    screen.with(|s| -> Result<(), Sc::Error> {
        let (columns, _) = s.size()?;
        let (line, column) = editor.view_within(columns);
        s.rewrite_line(&line, column)?;
        s.flush()
    })?;
    Ok(())
}

/// Render inbound messages until the inbox closes. `Ok` means it closed.
fn spawn_delivery<Sc>(
    mut inbox: Inbox,
    screen: SharedScreen<Sc>,
) -> JoinHandle<Result<(), TerminalError>>
where
    Sc: Screen + Send + 'static,
    TerminalError: From<Sc::Error>,
{
    tokio::spawn(async move {
        while let Some(delivery) = inbox.recv().await {
            tracing::trace!(channel = %delivery.channel, "rendering delivery");
            screen.with(|s| render_inbound(s, &delivery.payload))?;
        }
        Ok(())
    })
}

/// Error for a delivery task that stopped while the session was running.
fn delivery_stopped(finished: Result<Result<(), TerminalError>, JoinError>) -> TerminalError {
    match finished {
        Ok(Ok(())) => {
            tracing::warn!("inbound message stream closed during the session");
            SessionError::from(TransportError::Unavailable("inbound message stream closed".into()))
                .into()
        },
        Ok(Err(e)) => e,
        Err(e) => e.into(),
    }
}
