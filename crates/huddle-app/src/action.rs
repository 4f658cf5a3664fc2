//! Session side-effects.
//!
//! The [`crate::CommandDispatcher`] performs store and transport calls itself
//! but leaves terminal output to the runtime, returning [`SessionAction`]s to
//! execute in order.

/// Terminal-side instructions produced by dispatching a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Print a line of feedback.
    Print(String),

    /// Clear the screen.
    ClearScreen,

    /// End the session. Presence has already been cleared.
    Exit,
}
