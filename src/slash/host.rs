//! The seams between the palette and the document it runs against.
//!
//! Positions are char offsets into the document. `model::buffer::Buffer`
//! implements all of these; tests drive the palette through the same traits.

use ratatui::layout::Rect;

use super::SlashError;

/// Half-open `[from, to)` span of char offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRange {
    pub from: usize,
    pub to: usize,
}

impl TextRange {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single text change, in coordinates of the document *before* the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub at: usize,
    /// Number of chars removed starting at `at`.
    pub removed: usize,
    pub inserted: String,
    /// Cursor after the change was applied.
    pub cursor: usize,
}

impl Change {
    pub fn insert(at: usize, text: impl Into<String>, cursor: usize) -> Self {
        Self {
            at,
            removed: 0,
            inserted: text.into(),
            cursor,
        }
    }

    pub fn delete(range: TextRange, cursor: usize) -> Self {
        Self {
            at: range.from,
            removed: range.len(),
            inserted: String::new(),
            cursor,
        }
    }

    pub fn inserted_len(&self) -> usize {
        self.inserted.chars().count()
    }
}

/// Notifications from the document, delivered in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocEvent {
    Changed(Change),
    CursorMoved(usize),
    FocusLost,
}

/// Read access to the document text.
pub trait DocumentView {
    fn len_chars(&self) -> usize;

    fn char_at(&self, pos: usize) -> Option<char>;

    /// Text in `range`, or `None` if any part of it is out of bounds.
    fn slice(&self, range: TextRange) -> Option<String>;
}

/// Maps a document position to a screen cell. `None` means "not laid out".
pub trait RectResolver {
    fn resolve_rect(&self, pos: usize) -> Option<Rect>;
}

/// An open edit transaction. Dropping it without `commit` rolls every
/// replacement back.
pub trait EditContext: DocumentView {
    fn replace(&mut self, range: TextRange, content: &str) -> Result<(), SlashError>;

    /// Insert at `pos`, leaving positions mapped onto `pos` in front of the
    /// new text (`replace` pushes them behind it).
    fn insert_trailing(&mut self, pos: usize, content: &str) -> Result<(), SlashError>;

    /// Where `pos` (a position from before the transaction began) ended up.
    fn map_pos(&self, pos: usize) -> usize;

    /// The `[start, end)` span of the line containing `pos`, excluding its
    /// line break.
    fn line_span(&self, pos: usize) -> Option<TextRange>;

    fn set_cursor(&mut self, pos: usize);

    fn commit(self);
}

pub trait EditHost: DocumentView {
    type Edit<'a>: EditContext
    where
        Self: 'a;

    fn begin_edit(&mut self) -> Self::Edit<'_>;
}

impl DocumentView for ropey::Rope {
    fn len_chars(&self) -> usize {
        ropey::Rope::len_chars(self)
    }

    fn char_at(&self, pos: usize) -> Option<char> {
        (pos < ropey::Rope::len_chars(self)).then(|| self.char(pos))
    }

    fn slice(&self, range: TextRange) -> Option<String> {
        if range.from > range.to || range.to > ropey::Rope::len_chars(self) {
            return None;
        }
        Some(ropey::Rope::slice(self, range.from..range.to).to_string())
    }
}
