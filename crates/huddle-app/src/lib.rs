//! Core of the huddle chat client
//!
//! Channel subscriptions, presence tracking and friend queries over a
//! key/set store and a publish/subscribe transport. Both external systems
//! are consumed through traits so the same code runs against Redis in
//! production and against the in-process [`memory`] backend in simulation
//! mode and tests.
//!
//! # Components
//!
//! - [`ChannelRegistry`]: fixed, ordered channel list
//! - [`SubscriptionManager`]: join, leave, write target
//! - [`PresenceQuery`]: online/offline friends, users on a channel
//! - [`MessageRouter`]: outgoing chat and inbound rendering
//! - [`CommandDispatcher`]: input line to component call
//!
//! Per-session state lives in [`SessionContext`], owned by the caller and
//! passed by reference into every operation.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod clock;
mod command;
mod dispatcher;
mod error;
pub mod memory;
mod presence;
mod registry;
mod router;
mod screen;
mod session;
mod store;
mod subscription;
mod transport;

pub use action::SessionAction;
pub use clock::{Clock, FixedClock, SystemClock};
pub use command::{Command, DELIMITER, HELP, parse};
pub use dispatcher::CommandDispatcher;
pub use error::{LookupError, RegistryError, SessionError};
pub use presence::{FriendPartition, PresenceQuery};
pub use registry::{ChannelIndex, ChannelRegistry, DEFAULT_CHANNELS};
pub use router::{MessageRouter, format_message, render_inbound};
pub use screen::{Screen, SharedScreen, VirtualScreen, rows_spanned};
pub use session::{SCRATCH_PREFIX, SessionContext, friends_key, presence_key};
pub use store::{PresenceStore, SetOp, StoreError};
pub use subscription::SubscriptionManager;
pub use transport::{Delivery, INBOX_CAPACITY, Inbox, Transport, TransportError};
