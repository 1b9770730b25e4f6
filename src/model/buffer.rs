use ratatui::layout::Rect;
use ropey::Rope;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;

use super::cursor::CursorState;
use crate::slash::SlashError;
use crate::slash::host::{
    Change, DocEvent, DocumentView, EditContext, EditHost, RectResolver, TextRange,
};

/// Viewport state for scroll tracking.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub top_line: usize,
    pub height: u16,
    pub scroll_off: u16,
    /// Screen area the buffer was last drawn into. `None` until the first frame.
    pub area: Option<Rect>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            top_line: 0,
            height: 24,
            scroll_off: 5,
            area: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    rope: Rope,
    cursor: CursorState,
}

/// Bounded undo stack of whole-document snapshots. Rope clones share
/// structure, so a snapshot costs little more than a pointer.
#[derive(Debug)]
struct History {
    undo: VecDeque<Snapshot>,
    limit: usize,
}

impl History {
    fn push(&mut self, snapshot: Snapshot) {
        self.undo.push_back(snapshot);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self {
            undo: VecDeque::new(),
            limit: 200,
        }
    }
}

/// A single Markdown document backed by a Rope.
pub struct Buffer {
    pub rope: Rope,
    pub path: Option<PathBuf>,
    pub dirty: bool,
    pub cursor: CursorState,
    pub viewport: Viewport,
    pub save_debounce: Option<Instant>,
    history: History,
}

impl Buffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::from_text("")
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            path: None,
            dirty: false,
            cursor: CursorState::default(),
            viewport: Viewport::default(),
            save_debounce: None,
            history: History::default(),
        }
    }

    /// Create a buffer from file contents.
    pub fn from_file(path: PathBuf) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(&path)?;
        let mut buffer = Self::from_text(&text);
        buffer.path = Some(path);
        Ok(buffer)
    }

    #[cfg(test)]
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn set_undo_limit(&mut self, limit: usize) {
        self.history.limit = limit.max(1);
    }

    /// Total number of lines in the buffer.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Get the text of a specific line (without trailing newline).
    pub fn line_text(&self, idx: usize) -> Option<String> {
        if idx >= self.rope.len_lines() {
            return None;
        }
        let line = self.rope.line(idx);
        let mut s: String = line.chunks().collect();
        if s.ends_with('\n') {
            s.pop();
        }
        if s.ends_with('\r') {
            s.pop();
        }
        Some(s)
    }

    /// Line length in chars, excluding the line break.
    pub fn line_len(&self, idx: usize) -> usize {
        self.line_text(idx).map(|l| l.chars().count()).unwrap_or(0)
    }

    /// Char offset of the cursor in the rope.
    pub fn cursor_char(&self) -> usize {
        let row = self.cursor.row.min(self.rope.len_lines().saturating_sub(1));
        (self.rope.line_to_char(row) + self.cursor.col).min(self.rope.len_chars())
    }

    pub fn set_cursor_char(&mut self, pos: usize) {
        let pos = pos.min(self.rope.len_chars());
        let row = self.rope.char_to_line(pos);
        let col = pos - self.rope.line_to_char(row);
        self.cursor.move_to(row, col);
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, ch: char) -> DocEvent {
        if ch == '\n' {
            return self.insert_newline();
        }
        self.record_undo();
        let at = self.cursor_char();
        self.rope.insert_char(at, ch);
        self.cursor.col += 1;
        self.cursor.desired_col = self.cursor.col;
        self.dirty = true;
        DocEvent::Changed(Change::insert(at, ch, at + 1))
    }

    /// Insert a string at the cursor position, leaving the cursor after it.
    pub fn insert_text(&mut self, text: &str) -> DocEvent {
        self.record_undo();
        let at = self.cursor_char();
        self.rope.insert(at, text);
        let cursor = at + text.chars().count();
        self.set_cursor_char(cursor);
        self.dirty = true;
        DocEvent::Changed(Change::insert(at, text, cursor))
    }

    /// Insert a newline at the cursor position.
    pub fn insert_newline(&mut self) -> DocEvent {
        self.record_undo();
        let at = self.cursor_char();
        self.rope.insert_char(at, '\n');
        self.cursor.row += 1;
        self.cursor.col = 0;
        self.cursor.desired_col = 0;
        self.dirty = true;
        DocEvent::Changed(Change::insert(at, '\n', at + 1))
    }

    /// Delete the character before the cursor (backspace).
    pub fn delete_char_before(&mut self) -> Option<DocEvent> {
        let at = self.cursor_char();
        if at == 0 {
            return None;
        }

        self.record_undo();
        self.rope.remove(at - 1..at);
        self.set_cursor_char(at - 1);
        self.dirty = true;
        Some(DocEvent::Changed(Change::delete(
            TextRange::new(at - 1, at),
            at - 1,
        )))
    }

    /// Restore the document to before the most recent edit.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo.pop_back() else {
            return false;
        };
        self.rope = snapshot.rope;
        self.cursor = snapshot.cursor;
        self.clamp_cursor();
        self.dirty = true;
        true
    }

    #[cfg(test)]
    pub fn undo_depth(&self) -> usize {
        self.history.undo.len()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            rope: self.rope.clone(),
            cursor: self.cursor.clone(),
        }
    }

    fn record_undo(&mut self) {
        let snapshot = self.snapshot();
        self.history.push(snapshot);
    }

    /// Ensure the cursor stays within valid bounds.
    pub fn clamp_cursor(&mut self) {
        let max_row = self.rope.len_lines().saturating_sub(1);
        self.cursor.row = self.cursor.row.min(max_row);
        self.cursor.col = self.cursor.col.min(self.line_len(self.cursor.row));
    }

    /// Ensure the viewport keeps the cursor visible.
    pub fn scroll_to_cursor(&mut self) {
        let off = self.viewport.scroll_off as usize;
        let height = (self.viewport.height as usize).max(off * 2 + 1);

        if self.cursor.row < self.viewport.top_line + off {
            self.viewport.top_line = self.cursor.row.saturating_sub(off);
        }
        if self.cursor.row >= self.viewport.top_line + height - off {
            self.viewport.top_line = self.cursor.row + off + 1 - height;
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentView for Buffer {
    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn char_at(&self, pos: usize) -> Option<char> {
        DocumentView::char_at(&self.rope, pos)
    }

    fn slice(&self, range: TextRange) -> Option<String> {
        DocumentView::slice(&self.rope, range)
    }
}

impl RectResolver for Buffer {
    fn resolve_rect(&self, pos: usize) -> Option<Rect> {
        let area = self.viewport.area?;
        if pos > self.rope.len_chars() {
            return None;
        }
        let row = self.rope.char_to_line(pos);
        let col = pos - self.rope.line_to_char(row);
        let visible = row
            .checked_sub(self.viewport.top_line)
            .filter(|r| *r < area.height as usize)?;
        let x = area.x.saturating_add(u16::try_from(col).ok()?);
        if x >= area.x.saturating_add(area.width) {
            return None;
        }
        Some(Rect::new(x, area.y + visible as u16, 1, 1))
    }
}

impl EditHost for Buffer {
    type Edit<'a> = Transaction<'a>;

    fn begin_edit(&mut self) -> Transaction<'_> {
        let snapshot = self.snapshot();
        Transaction {
            buffer: self,
            snapshot: Some(snapshot),
            edits: Vec::new(),
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Edit {
    at: usize,
    removed: usize,
    inserted: usize,
    /// Positions exactly at `at` stay in front of the inserted text.
    sticky_left: bool,
}

/// An atomic edit on a buffer. Committing records one undo step; dropping
/// without commit restores the buffer exactly.
pub struct Transaction<'a> {
    buffer: &'a mut Buffer,
    snapshot: Option<Snapshot>,
    edits: Vec<Edit>,
    cursor: Option<usize>,
}

impl Transaction<'_> {
    fn apply(&mut self, range: TextRange, content: &str, sticky_left: bool) -> Result<(), SlashError> {
        let len = self.buffer.rope.len_chars();
        if range.from > range.to || range.to > len {
            return Err(SlashError::OutOfBounds { pos: range.to, len });
        }
        if range.is_empty() && content.is_empty() {
            return Ok(());
        }

        self.buffer.rope.remove(range.from..range.to);
        self.buffer.rope.insert(range.from, content);
        self.edits.push(Edit {
            at: range.from,
            removed: range.len(),
            inserted: content.chars().count(),
            sticky_left,
        });
        Ok(())
    }
}

impl DocumentView for Transaction<'_> {
    fn len_chars(&self) -> usize {
        self.buffer.rope.len_chars()
    }

    fn char_at(&self, pos: usize) -> Option<char> {
        DocumentView::char_at(&self.buffer.rope, pos)
    }

    fn slice(&self, range: TextRange) -> Option<String> {
        DocumentView::slice(&self.buffer.rope, range)
    }
}

impl EditContext for Transaction<'_> {
    fn replace(&mut self, range: TextRange, content: &str) -> Result<(), SlashError> {
        self.apply(range, content, false)
    }

    fn insert_trailing(&mut self, pos: usize, content: &str) -> Result<(), SlashError> {
        self.apply(TextRange::new(pos, pos), content, true)
    }

    fn map_pos(&self, pos: usize) -> usize {
        self.edits.iter().fold(pos, |pos, edit| {
            if pos < edit.at {
                pos
            } else if pos < edit.at + edit.removed {
                edit.at
            } else if pos == edit.at && edit.sticky_left {
                pos
            } else {
                pos - edit.removed + edit.inserted
            }
        })
    }

    fn line_span(&self, pos: usize) -> Option<TextRange> {
        let rope = &self.buffer.rope;
        if pos > rope.len_chars() {
            return None;
        }
        let row = rope.char_to_line(pos);
        let start = rope.line_to_char(row);
        let line = rope.line(row);
        let mut end = start + line.len_chars();
        for ch in ['\n', '\r'] {
            if end > start && rope.char(end - 1) == ch {
                end -= 1;
            }
        }
        Some(TextRange::new(start, end))
    }

    fn set_cursor(&mut self, pos: usize) {
        self.cursor = Some(pos);
    }

    fn commit(mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        if !self.edits.is_empty() {
            self.buffer.history.push(snapshot);
            self.buffer.dirty = true;
        }
        if let Some(pos) = self.cursor {
            self.buffer.set_cursor_char(pos);
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.buffer.rope = snapshot.rope;
            self.buffer.cursor = snapshot.cursor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_reports_changes_in_char_offsets() {
        let mut buffer = Buffer::from_text("é\n");
        buffer.set_cursor_char(1);
        let event = buffer.insert_char('/');
        assert_eq!(event, DocEvent::Changed(Change::insert(1, '/', 2)));
        assert_eq!(buffer.text(), "é/\n");
        assert_eq!(buffer.cursor_char(), 2);

        let event = buffer.delete_char_before().unwrap();
        assert_eq!(
            event,
            DocEvent::Changed(Change::delete(TextRange::new(1, 2), 1))
        );
        assert_eq!(buffer.text(), "é\n");
    }

    #[test]
    fn backspace_at_line_start_joins_lines() {
        let mut buffer = Buffer::from_text("ab\ncd");
        buffer.cursor.move_to(1, 0);
        buffer.delete_char_before();
        assert_eq!(buffer.text(), "abcd");
        assert_eq!((buffer.cursor.row, buffer.cursor.col), (0, 2));
        assert!(Buffer::new().delete_char_before().is_none());
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut buffer = Buffer::from_text("hello");
        {
            let mut edit = buffer.begin_edit();
            edit.replace(TextRange::new(0, 5), "bye").unwrap();
            assert_eq!(DocumentView::slice(&edit, TextRange::new(0, 3)).unwrap(), "bye");
        }
        assert_eq!(buffer.text(), "hello");
        assert_eq!(buffer.undo_depth(), 0);
        assert!(!buffer.dirty);
    }

    #[test]
    fn committed_transaction_is_one_undo_step() {
        let mut buffer = Buffer::from_text("/h2");
        let mut edit = buffer.begin_edit();
        edit.replace(TextRange::new(0, 3), "").unwrap();
        edit.replace(TextRange::new(0, 0), "## ").unwrap();
        let cursor = edit.map_pos(0);
        edit.set_cursor(cursor);
        edit.commit();

        assert_eq!(buffer.text(), "## ");
        assert_eq!(buffer.cursor_char(), 3);
        assert_eq!(buffer.undo_depth(), 1);
        assert!(buffer.undo());
        assert_eq!(buffer.text(), "/h2");
    }

    #[test]
    fn out_of_range_replace_fails() {
        let mut buffer = Buffer::from_text("abc");
        let mut edit = buffer.begin_edit();
        assert_eq!(
            edit.replace(TextRange::new(2, 9), ""),
            Err(SlashError::OutOfBounds { pos: 9, len: 3 })
        );
    }

    #[test]
    fn map_pos_respects_sticky_inserts() {
        let mut buffer = Buffer::from_text("");
        let mut edit = buffer.begin_edit();
        edit.insert_trailing(0, "\n```").unwrap();
        edit.replace(TextRange::new(0, 0), "```\n").unwrap();
        assert_eq!(edit.map_pos(0), 4);
    }

    #[test]
    fn undo_history_is_bounded() {
        let mut buffer = Buffer::new();
        buffer.set_undo_limit(3);
        for ch in "abcdef".chars() {
            buffer.insert_char(ch);
        }
        assert_eq!(buffer.undo_depth(), 3);
        while buffer.undo() {}
        assert_eq!(buffer.text(), "abc");
    }

    #[test]
    fn rect_needs_a_laid_out_viewport() {
        let mut buffer = Buffer::from_text("one\ntwo");
        assert_eq!(buffer.resolve_rect(5), None);

        buffer.viewport.area = Some(Rect::new(2, 1, 20, 5));
        assert_eq!(buffer.resolve_rect(5), Some(Rect::new(3, 2, 1, 1)));
        assert_eq!(buffer.resolve_rect(99), None);

        buffer.viewport.top_line = 1;
        assert_eq!(buffer.resolve_rect(0), None);
    }
}
