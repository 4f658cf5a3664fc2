//! Terminal model shared between input echo and message rendering.
//!
//! The terminal is one resource touched from two places at once: the
//! foreground loop echoing keystrokes and the background task rendering
//! inbound messages. [`SharedScreen`] serializes them; every write happens
//! inside [`SharedScreen::with`] and the lock is released when the closure
//! returns, on every path.
//!
//! [`Screen`] is the small set of cursor operations the session needs.
//! [`VirtualScreen`] implements it on an in-memory grid for tests, with the
//! same auto-wrap behaviour as a real terminal.

use std::{
    convert::Infallible,
    sync::{Arc, Mutex, PoisonError},
};

/// Rows occupied by `width` characters written from `start_column` on a
/// terminal `columns` wide that wraps at the right edge. Always at least one.
pub fn rows_spanned(start_column: u16, width: usize, columns: u16) -> u16 {
    let columns = usize::from(columns.max(1));
    let end = usize::from(start_column) + width;
    let rows = end.div_ceil(columns).max(1);
    u16::try_from(rows).unwrap_or(u16::MAX)
}

/// Cursor-addressed terminal surface.
///
/// Coordinates are `(column, row)`, zero-based, matching crossterm. Text that
/// runs past the right edge wraps onto the next row, scrolling at the bottom.
pub trait Screen {
    /// Error raised by terminal I/O.
    type Error;

    /// Current cursor position.
    fn cursor_position(&mut self) -> Result<(u16, u16), Self::Error>;

    /// Terminal size in `(columns, rows)`.
    fn size(&self) -> Result<(u16, u16), Self::Error>;

    /// Scroll the whole screen up by `rows`, blanking the bottom.
    fn scroll_up(&mut self, rows: u16) -> Result<(), Self::Error>;

    /// Insert `count` blank lines at `row`, pushing that row and everything
    /// below it down. Rows pushed past the bottom fall off.
    fn insert_lines(&mut self, row: u16, count: u16) -> Result<(), Self::Error>;

    /// Write `text` starting at `(column, row)`, wrapping at the right edge.
    /// The cursor ends just after the last character written.
    fn write_at(&mut self, column: u16, row: u16, text: &str) -> Result<(), Self::Error>;

    /// Move the cursor.
    fn move_cursor(&mut self, column: u16, row: u16) -> Result<(), Self::Error>;

    /// Write `text` at the cursor, then move to the start of the line after
    /// the last row it wrapped onto, scrolling if that is past the bottom.
    fn print_line(&mut self, text: &str) -> Result<(), Self::Error>;

    /// Replace the cursor's row with `text` and put the cursor at `column`.
    fn rewrite_line(&mut self, text: &str, column: u16) -> Result<(), Self::Error>;

    /// Blank the screen and home the cursor.
    fn clear(&mut self) -> Result<(), Self::Error>;

    /// Push buffered output to the device.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Exclusive, scoped access to a [`Screen`] shared between tasks.
#[derive(Debug)]
pub struct SharedScreen<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedScreen<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: Screen> SharedScreen<S> {
    /// Share `screen`.
    pub fn new(screen: S) -> Self {
        Self { inner: Arc::new(Mutex::new(screen)) }
    }

    /// Run `f` with exclusive access to the screen.
    ///
    /// Must not be called from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        // A panic mid-write leaves at worst a garbled line on screen, which
        // the next write overdraws.
        let mut screen = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut screen)
    }
}

/// In-memory character grid implementing [`Screen`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualScreen {
    rows: Vec<Vec<char>>,
    columns: u16,
    cursor: (u16, u16),
}

impl VirtualScreen {
    /// Blank screen of `columns` by `rows`, cursor at the origin.
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            rows: vec![vec![' '; usize::from(columns)]; usize::from(rows)],
            columns,
            cursor: (0, 0),
        }
    }

    /// Text on `row` with trailing blanks removed.
    pub fn line(&self, row: u16) -> String {
        self.rows
            .get(usize::from(row))
            .map(|cells| cells.iter().collect::<String>().trim_end().to_string())
            .unwrap_or_default()
    }

    /// Whole screen, one line per row, trailing blank rows removed.
    pub fn contents(&self) -> String {
        let lines: Vec<String> = (0..self.height()).map(|row| self.line(row)).collect();
        let used = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |last| last + 1);
        lines[..used].join("\n")
    }

    /// Cursor position as `(column, row)`.
    pub fn cursor(&self) -> (u16, u16) {
        self.cursor
    }

    fn height(&self) -> u16 {
        self.rows.len() as u16
    }

    fn blank_row(&self) -> Vec<char> {
        vec![' '; usize::from(self.columns)]
    }

    fn scroll(&mut self) {
        if !self.rows.is_empty() {
            self.rows.remove(0);
            self.rows.push(self.blank_row());
        }
    }

    /// Row below `row`, scrolling when `row` is the bottom one.
    fn next_row(&mut self, row: u16) -> u16 {
        if row.saturating_add(1) >= self.height() {
            self.scroll();
            row
        } else {
            row + 1
        }
    }

    /// Write from the cursor with terminal wrapping. Returns the final
    /// position; its column equals the width when the last write filled the
    /// row, like a terminal's pending wrap.
    fn put(&mut self, text: &str) -> (u16, u16) {
        let (mut column, mut row) = self.cursor;
        for c in text.chars() {
            if column >= self.columns {
                column = 0;
                row = self.next_row(row);
            }
            if let Some(cell) =
                self.rows.get_mut(usize::from(row)).and_then(|r| r.get_mut(usize::from(column)))
            {
                *cell = c;
            }
            column = column.saturating_add(1);
        }
        (column, row)
    }
}

impl Screen for VirtualScreen {
    type Error = Infallible;

    fn cursor_position(&mut self) -> Result<(u16, u16), Self::Error> {
        Ok(self.cursor)
    }

    fn size(&self) -> Result<(u16, u16), Self::Error> {
        Ok((self.columns, self.height()))
    }

    fn scroll_up(&mut self, rows: u16) -> Result<(), Self::Error> {
        for _ in 0..rows {
            self.scroll();
        }
        Ok(())
    }

    fn insert_lines(&mut self, row: u16, count: u16) -> Result<(), Self::Error> {
        let row = usize::from(row);
        for _ in 0..count {
            if row < self.rows.len() {
                self.rows.insert(row, self.blank_row());
                self.rows.pop();
            }
        }
        Ok(())
    }

    fn write_at(&mut self, column: u16, row: u16, text: &str) -> Result<(), Self::Error> {
        self.cursor = (column, row);
        let (end_column, end_row) = self.put(text);
        self.cursor = (end_column.min(self.columns.saturating_sub(1)), end_row);
        Ok(())
    }

    fn move_cursor(&mut self, column: u16, row: u16) -> Result<(), Self::Error> {
        self.cursor = (column, row);
        Ok(())
    }

    fn print_line(&mut self, text: &str) -> Result<(), Self::Error> {
        let (_, last_row) = self.put(text);
        let row = self.next_row(last_row);
        self.cursor = (0, row);
        Ok(())
    }

    fn rewrite_line(&mut self, text: &str, column: u16) -> Result<(), Self::Error> {
        let row = self.cursor.1;
        let blank = self.blank_row();
        if let Some(cells) = self.rows.get_mut(usize::from(row)) {
            *cells = blank;
        }
        self.write_at(0, row, text)?;
        self.cursor = (column, row);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        let blank = self.blank_row();
        for cells in &mut self.rows {
            cells.clone_from(&blank);
        }
        self.cursor = (0, 0);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
