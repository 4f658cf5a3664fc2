//! Outgoing chat and inbound message rendering.

use std::sync::Arc;

use chrono::Timelike;

use crate::{
    clock::{Clock, SystemClock},
    screen::{Screen, rows_spanned},
    session::SessionContext,
    transport::{Transport, TransportError},
};

/// Wire form of a chat line: `user: text  (h:m on channel)`.
///
/// Hour and minute are not zero-padded.
pub fn format_message(user: &str, text: &str, hour: u32, minute: u32, channel: &str) -> String {
    format!("{user}: {text}  ({hour}:{minute} on {channel})")
}

/// Publishes chat to the write target and renders what comes back.
#[derive(Debug)]
pub struct MessageRouter<T, C = SystemClock> {
    transport: Arc<T>,
    clock: C,
}

impl<T: Transport, C: Clock> MessageRouter<T, C> {
    /// Router over a shared transport handle.
    pub fn new(transport: Arc<T>, clock: C) -> Self {
        Self { transport, clock }
    }

    /// Build the message `text` would be published as right now.
    pub fn compose(&self, ctx: &SessionContext, text: &str) -> String {
        let now = self.clock.local_time();
        format_message(ctx.user(), text, now.hour(), now.minute(), ctx.write_target_name())
    }

    /// Publish `text` on the write-target channel. Returns the published
    /// message.
    ///
    /// The text is not validated in any way.
    pub async fn send(&self, ctx: &SessionContext, text: &str) -> Result<String, TransportError> {
        let message = self.compose(ctx, text);
        let receivers = self.transport.publish(ctx.write_target_name(), &message).await?;

        tracing::debug!(channel = ctx.write_target_name(), receivers, "published chat");
        Ok(message)
    }
}

/// Draw an inbound message above the line being typed.
///
/// Call with exclusive access to the screen. The message takes the cursor's
/// row, plus one more row per wrap when it is wider than the screen. The
/// input line moves down below it and the cursor follows to the same column,
/// so a half-typed line stays intact and editable. When the input line would
/// be pushed off the bottom the screen scrolls up first to make room. A
/// message taller than the rows above the input line is cut off.
pub fn render_inbound<S: Screen + ?Sized>(screen: &mut S, message: &str) -> Result<(), S::Error> {
    let (column, mut row) = screen.cursor_position()?;
    let (columns, rows) = screen.size()?;

    let chars: Vec<char> = message.chars().collect();
    let height = rows_spanned(0, chars.len(), columns).min(rows.saturating_sub(1).max(1));

    let overflow = (u32::from(row) + u32::from(height) + 1).saturating_sub(u32::from(rows));
    if overflow > 0 {
        let overflow = u16::try_from(overflow).unwrap_or(row);
        screen.scroll_up(overflow)?;
        row = row.saturating_sub(overflow);
    }

    screen.insert_lines(row, height)?;
    // One write per row, so nothing relies on the terminal's wrapping
    for (offset, segment) in (0..height).zip(chars.chunks(usize::from(columns.max(1)))) {
        let segment: String = segment.iter().collect();
        screen.write_at(0, row + offset, &segment)?;
    }
    screen.move_cursor(column, row.saturating_add(height))?;
    screen.flush()
}
