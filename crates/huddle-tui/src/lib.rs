//! Terminal client for huddle
//!
//! A line-oriented shell over [`huddle_app`]: one input row at the bottom,
//! chat and command output scrolling above it. All session logic lives in
//! [`huddle_app::CommandDispatcher`]; this crate only handles keys, the
//! screen and backend selection.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod input;
pub mod runtime;
pub mod terminal;

pub use config::{Backend, RuntimeConfig};
pub use input::{EditOutcome, KeyInput, LineEditor};
pub use runtime::{TerminalError, run, run_session};
pub use terminal::{InsertLines, RawMode, TerminalScreen};
