//! Routes parsed input lines to the subscription, presence and chat
//! components.

use std::sync::Arc;

use crate::{
    action::SessionAction,
    clock::{Clock, SystemClock},
    command::{self, Command},
    error::{LookupError, SessionError},
    presence::{FriendPartition, PresenceQuery},
    registry::ChannelIndex,
    router::MessageRouter,
    session::SessionContext,
    store::PresenceStore,
    subscription::SubscriptionManager,
    transport::Transport,
};

/// Separator between names in list output.
const LIST_SEPARATOR: &str = " | ";

/// Executes one input line per call.
///
/// Store and transport failures are returned as errors and end the session.
/// Lookup failures (unknown channel, no match) are reported to the user as a
/// printed line and the session continues.
#[derive(Debug)]
pub struct CommandDispatcher<S, T, C = SystemClock> {
    subscriptions: SubscriptionManager<S, T>,
    presence: PresenceQuery<S>,
    router: MessageRouter<T, C>,
}

impl<S: PresenceStore, T: Transport, C: Clock> CommandDispatcher<S, T, C> {
    /// Dispatcher over shared store and transport handles.
    pub fn new(store: Arc<S>, transport: Arc<T>, clock: C) -> Self {
        Self {
            subscriptions: SubscriptionManager::new(Arc::clone(&store), Arc::clone(&transport)),
            presence: PresenceQuery::new(store),
            router: MessageRouter::new(transport, clock),
        }
    }

    /// Join/leave driver.
    pub fn subscriptions(&self) -> &SubscriptionManager<S, T> {
        &self.subscriptions
    }

    /// Presence queries.
    pub fn presence(&self) -> &PresenceQuery<S> {
        &self.presence
    }

    /// Outgoing chat.
    pub fn router(&self) -> &MessageRouter<T, C> {
        &self.router
    }

    /// Parse and execute `line`.
    ///
    /// Returns the terminal actions to perform, in order.
    pub async fn dispatch(
        &self,
        ctx: &mut SessionContext,
        line: &str,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let command = command::parse(line);
        tracing::trace!(?command, "dispatching");

        match command {
            Command::Chat { text } => {
                self.router.send(ctx, text).await?;
                Ok(Vec::new())
            },
            Command::Friends { channel: None } => {
                let partition = self.presence.online_offline(ctx).await?;
                Ok(partition_lines(&partition, "Online friends", "Offline friends"))
            },
            Command::Friends { channel: Some(name) } => {
                let index = match lookup(ctx, name) {
                    Ok(index) => index,
                    Err(e) => return Ok(report(&e)),
                };
                let partition = self.presence.friends_on(ctx, index).await?;
                let online = format!("Friends on channel {name}");
                let offline = format!("Friends away from channel {name}");
                Ok(partition_lines(&partition, &online, &offline))
            },
            Command::AddFriend { name } if name.is_empty() => {
                Ok(vec![SessionAction::Print("Usage: addfriend:<name>".to_string())])
            },
            Command::AddFriend { name } => {
                self.presence.add_friend(ctx, name).await?;
                Ok(vec![SessionAction::Print(format!("{name} was added successfully."))])
            },
            Command::OnChannel { channel } => {
                let index = match lookup(ctx, channel) {
                    Ok(index) => index,
                    Err(e) => return Ok(report(&e)),
                };
                let users = self.presence.users_on(ctx, index).await?;
                Ok(vec![SessionAction::Print(list_line(
                    &format!("Users on channel {channel}"),
                    &users,
                ))])
            },
            Command::Join { channel } => {
                let index = match lookup(ctx, channel) {
                    Ok(index) => index,
                    Err(e) => return Ok(report(&e)),
                };
                self.subscriptions.join(ctx, index).await?;
                Ok(vec![SessionAction::Print(format!("You joined channel {channel}."))])
            },
            Command::JoinMatching { pattern } => {
                let joined = self.subscriptions.join_matching(ctx, pattern).await?;
                if joined.is_empty() {
                    return Ok(report(&LookupError::NoMatchingChannel(pattern.to_string())));
                }
                let names: Vec<&str> = joined.iter().map(|&i| ctx.channel_name(i)).collect();
                Ok(vec![SessionAction::Print(format!(
                    "Joined {} channel(s) matching '{pattern}': {}",
                    names.len(),
                    names.join(LIST_SEPARATOR)
                ))])
            },
            Command::Leave { channel } => {
                let index = match lookup(ctx, channel) {
                    Ok(index) => index,
                    Err(e) => return Ok(report(&e)),
                };
                self.subscriptions.leave(ctx, index).await?;
                Ok(vec![SessionAction::Print(format!("You left channel {channel}."))])
            },
            Command::Write { channel } => {
                let index = match lookup(ctx, channel) {
                    Ok(index) => index,
                    Err(e) => return Ok(report(&e)),
                };
                self.subscriptions.select_for_writing(ctx, index);
                Ok(vec![SessionAction::Print(format!("Now you are writing to {channel}."))])
            },
            Command::Clear => Ok(vec![SessionAction::ClearScreen]),
            Command::Exit => {
                self.subscriptions.leave_all(ctx).await?;
                tracing::info!(user = ctx.user(), "session ended");
                Ok(vec![SessionAction::Exit])
            },
        }
    }
}

fn lookup(ctx: &SessionContext, name: &str) -> Result<ChannelIndex, LookupError> {
    ctx.registry()
        .index_of(name)
        .ok_or_else(|| LookupError::UnknownChannel(name.to_string()))
}

fn report(error: &LookupError) -> Vec<SessionAction> {
    vec![SessionAction::Print(format!("Error: {error}"))]
}

fn list_line(label: &str, names: &[String]) -> String {
    if names.is_empty() {
        format!("{label} (0)")
    } else {
        format!("{label} ({}): {}", names.len(), names.join(LIST_SEPARATOR))
    }
}

fn partition_lines(partition: &FriendPartition, online: &str, offline: &str) -> Vec<SessionAction> {
    vec![
        SessionAction::Print(list_line(online, &partition.online)),
        SessionAction::Print(list_line(offline, &partition.offline)),
    ]
}
