//! Line editing for the input row.
//!
//! The editor owns the text being typed and the cursor within it. The
//! runtime feeds it keys and redraws the input row from [`LineEditor::view`].

/// Key input events from the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Character input.
    Char(char),
    /// Enter/Return key.
    Enter,
    /// Backspace key.
    Backspace,
    /// Delete key.
    Delete,
    /// Escape key.
    Esc,
    /// Ctrl-C or Ctrl-D.
    Interrupt,
    /// Left arrow.
    Left,
    /// Right arrow.
    Right,
    /// Home key.
    Home,
    /// End key.
    End,
}

/// What the runtime should do after a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The line changed; redraw it.
    Redraw,
    /// Enter was pressed. Carries the finished line; the editor is empty
    /// again.
    Submit(String),
    /// The user asked to leave.
    Quit,
}

/// Single-line text editor with a fixed prompt.
///
/// The cursor is a character index, so multi-byte input edits correctly.
#[derive(Debug, Default)]
pub struct LineEditor {
    prompt: String,
    buffer: String,
    cursor: usize,
}

impl LineEditor {
    /// Empty editor without a prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty editor showing `prompt` before the text.
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    /// Text typed so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Row contents and the terminal column the cursor belongs at.
    pub fn view(&self) -> (String, u16) {
        let column = self.prompt.chars().count().saturating_add(self.cursor);
        (format!("{}{}", self.prompt, self.buffer), u16::try_from(column).unwrap_or(u16::MAX))
    }

    /// [`LineEditor::view`] cut to a row `columns` wide, scrolled
    /// horizontally so the cursor stays visible. Never fills the last
    /// column, so the terminal does not wrap the input row.
    pub fn view_within(&self, columns: u16) -> (String, u16) {
        let visible = usize::from(columns.saturating_sub(1).max(1));
        let text: Vec<char> = self.prompt.chars().chain(self.buffer.chars()).collect();
        let cursor = self.prompt.chars().count().saturating_add(self.cursor);
        if text.len() <= visible {
            return self.view();
        }

        let start = cursor.saturating_sub(visible);
        let end = text.len().min(start + visible);
        let column = u16::try_from(cursor - start).unwrap_or(u16::MAX);
        (text[start..end].iter().collect(), column)
    }

    /// Apply one key.
    pub fn handle_key(&mut self, key: KeyInput) -> EditOutcome {
        match key {
            KeyInput::Char(c) => {
                let at = self.byte_offset(self.cursor);
                self.buffer.insert(at, c);
                self.cursor = self.cursor.saturating_add(1);
            },
            KeyInput::Backspace => {
                if self.cursor > 0 {
                    self.cursor = self.cursor.saturating_sub(1);
                    let at = self.byte_offset(self.cursor);
                    self.buffer.remove(at);
                }
            },
            KeyInput::Delete => {
                if self.cursor < self.len() {
                    let at = self.byte_offset(self.cursor);
                    self.buffer.remove(at);
                }
            },
            KeyInput::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyInput::Right => {
                if self.cursor < self.len() {
                    self.cursor = self.cursor.saturating_add(1);
                }
            },
            KeyInput::Home => self.cursor = 0,
            KeyInput::End => self.cursor = self.len(),
            KeyInput::Enter => {
                self.cursor = 0;
                return EditOutcome::Submit(std::mem::take(&mut self.buffer));
            },
            KeyInput::Esc | KeyInput::Interrupt => return EditOutcome::Quit,
        }
        EditOutcome::Redraw
    }

    fn len(&self) -> usize {
        self.buffer.chars().count()
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.buffer.char_indices().nth(chars).map_or(self.buffer.len(), |(i, _)| i)
    }
}
