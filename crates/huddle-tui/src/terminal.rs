//! Crossterm-backed [`Screen`].
//!
//! The terminal runs in raw mode on the main screen buffer, so chat history
//! scrolls like a normal console. The cursor is tracked locally rather than
//! queried: every write goes through [`TerminalScreen`], and asking the
//! terminal would race the event stream for stdin. Tracking follows the
//! terminal's auto-wrap, so a line wider than the screen advances the cursor
//! by every row it wraps onto.

use std::{
    fmt,
    io::{self, Stdout, Write, stdout},
};

use crossterm::{
    Command, QueueableCommand,
    cursor::{MoveTo, MoveToColumn},
    event::{KeyCode, KeyEvent, KeyModifiers},
    style::Print,
    terminal::{self, Clear, ClearType, ScrollUp, disable_raw_mode, enable_raw_mode},
};
use huddle_app::{Screen, rows_spanned};

use crate::input::KeyInput;

/// Insert `n` blank lines at the cursor row (`CSI n L`).
///
/// crossterm has no command for this, so it is written by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertLines(pub u16);

impl Command for InsertLines {
    fn write_ansi(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "\x1b[{}L", self.0)
    }

    #[cfg(windows)]
    fn execute_winapi(&self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "InsertLines needs an ANSI terminal"))
    }
}

/// Raw mode for as long as the guard lives.
#[derive(Debug)]
pub struct RawMode(());

impl RawMode {
    /// Switch the terminal to raw mode.
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// An ANSI terminal as a [`Screen`]. Stdout unless built with
/// [`TerminalScreen::with_writer`].
#[derive(Debug)]
pub struct TerminalScreen<W = Stdout> {
    out: W,
    cursor: (u16, u16),
    size: (u16, u16),
}

impl TerminalScreen {
    /// Take over stdout. Reads the cursor position once, so call it before
    /// any event stream starts reading stdin.
    pub fn new() -> io::Result<Self> {
        let cursor = crossterm::cursor::position()?;
        let size = terminal::size()?;
        Ok(Self { out: stdout(), cursor, size })
    }
}

impl<W: Write> TerminalScreen<W> {
    /// Drive `out` as a terminal of `size` whose cursor is at `cursor`.
    pub fn with_writer(out: W, cursor: (u16, u16), size: (u16, u16)) -> Self {
        Self { out, cursor, size }
    }

    /// Bytes written so far.
    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Record a terminal resize.
    pub fn resize(&mut self, columns: u16, rows: u16) {
        self.size = (columns, rows);
        self.cursor.0 = self.cursor.0.min(columns.saturating_sub(1));
        self.cursor.1 = self.cursor.1.min(rows.saturating_sub(1));
    }

    fn bottom(&self) -> u16 {
        self.size.1.saturating_sub(1)
    }

    /// Where the terminal leaves its cursor after printing `width`
    /// characters from `(column, row)`.
    fn advance(&self, (column, row): (u16, u16), width: usize) -> (u16, u16) {
        let columns = self.size.0.max(1);
        let spanned = rows_spanned(column, width, columns);
        let last_row = row.saturating_add(spanned - 1).min(self.bottom());
        let wrapped = usize::from(spanned - 1) * usize::from(columns);
        let end_column = (usize::from(column) + width).saturating_sub(wrapped);
        let end_column = u16::try_from(end_column).unwrap_or(u16::MAX).min(columns - 1);
        (end_column, last_row)
    }
}

impl<W: Write> Screen for TerminalScreen<W> {
    type Error = io::Error;

    fn cursor_position(&mut self) -> io::Result<(u16, u16)> {
        Ok(self.cursor)
    }

    fn size(&self) -> io::Result<(u16, u16)> {
        Ok(self.size)
    }

    fn scroll_up(&mut self, rows: u16) -> io::Result<()> {
        self.out.queue(ScrollUp(rows))?;
        Ok(())
    }

    fn insert_lines(&mut self, row: u16, count: u16) -> io::Result<()> {
        self.out.queue(MoveTo(0, row))?;
        if count > 0 {
            self.out.queue(InsertLines(count))?;
        }
        self.cursor = (0, row);
        Ok(())
    }

    fn write_at(&mut self, column: u16, row: u16, text: &str) -> io::Result<()> {
        self.out.queue(MoveTo(column, row))?.queue(Print(text))?;
        self.cursor = self.advance((column, row), text.chars().count());
        Ok(())
    }

    fn move_cursor(&mut self, column: u16, row: u16) -> io::Result<()> {
        self.out.queue(MoveTo(column, row))?;
        self.cursor = (column, row);
        Ok(())
    }

    fn print_line(&mut self, text: &str) -> io::Result<()> {
        // Raw mode needs the explicit carriage return
        self.out.queue(Print(text))?.queue(Print("\r\n"))?;
        let (_, last_row) = self.advance(self.cursor, text.chars().count());
        self.cursor = (0, last_row.saturating_add(1).min(self.bottom()));
        Ok(())
    }

    fn rewrite_line(&mut self, text: &str, column: u16) -> io::Result<()> {
        self.out
            .queue(MoveToColumn(0))?
            .queue(Clear(ClearType::CurrentLine))?
            .queue(Print(text))?
            .queue(MoveToColumn(column))?;
        self.cursor.0 = column;
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        self.out.queue(Clear(ClearType::All))?.queue(MoveTo(0, 0))?;
        self.cursor = (0, 0);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Map a crossterm key press onto [`KeyInput`].
pub fn convert_key(event: KeyEvent) -> Option<KeyInput> {
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    match event.code {
        KeyCode::Char('c' | 'd') if ctrl => Some(KeyInput::Interrupt),
        KeyCode::Char(_) if ctrl => None,
        KeyCode::Char(c) => Some(KeyInput::Char(c)),
        KeyCode::Enter => Some(KeyInput::Enter),
        KeyCode::Backspace => Some(KeyInput::Backspace),
        KeyCode::Delete => Some(KeyInput::Delete),
        KeyCode::Esc => Some(KeyInput::Esc),
        KeyCode::Left => Some(KeyInput::Left),
        KeyCode::Right => Some(KeyInput::Right),
        KeyCode::Home => Some(KeyInput::Home),
        KeyCode::End => Some(KeyInput::End),
        _ => None,
    }
}
