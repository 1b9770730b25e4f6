use std::fmt;

use super::host::{Change, DocEvent, DocumentView, TextRange};

/// Why an open trigger stopped being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    TriggerDeleted,
    CursorLeft,
    Whitespace,
    FocusLost,
    OutOfBounds,
    Dismissed,
    Confirmed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::TriggerDeleted => "trigger deleted",
            CloseReason::CursorLeft => "cursor left the range",
            CloseReason::Whitespace => "whitespace typed",
            CloseReason::FocusLost => "focus lost",
            CloseReason::OutOfBounds => "position out of bounds",
            CloseReason::Dismissed => "dismissed",
            CloseReason::Confirmed => "confirmed",
        };
        f.write_str(text)
    }
}

/// An open trigger: the trigger char at `anchor` followed by `query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerState {
    pub anchor: usize,
    pub query: String,
    pub range: TextRange,
}

impl TriggerState {
    fn open(anchor: usize) -> Self {
        Self {
            anchor,
            query: String::new(),
            range: TextRange::new(anchor, anchor + 1),
        }
    }

    /// The cursor may sit anywhere after the trigger up to the range end.
    pub fn contains_cursor(&self, cursor: usize) -> bool {
        cursor > self.anchor && cursor <= self.range.to
    }

    fn shift(&mut self, delta: isize) {
        self.anchor = self.anchor.saturating_add_signed(delta);
        self.range.from = self.anchor;
        self.range.to = self.range.to.saturating_add_signed(delta);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerUpdate {
    Unchanged,
    Opened,
    Updated,
    Closed(CloseReason),
}

/// Turns document notifications into trigger open/update/close transitions.
#[derive(Debug)]
pub struct QueryTracker {
    trigger: char,
    state: Option<TriggerState>,
}

impl QueryTracker {
    pub fn new(trigger: char) -> Self {
        Self {
            trigger,
            state: None,
        }
    }

    pub fn trigger(&self) -> char {
        self.trigger
    }

    pub fn state(&self) -> Option<&TriggerState> {
        self.state.as_ref()
    }

    pub fn close(&mut self, reason: CloseReason) -> TrackerUpdate {
        match self.state.take() {
            Some(_) => TrackerUpdate::Closed(reason),
            None => TrackerUpdate::Unchanged,
        }
    }

    pub fn handle<D: DocumentView + ?Sized>(&mut self, doc: &D, event: &DocEvent) -> TrackerUpdate {
        match event {
            DocEvent::FocusLost => self.close(CloseReason::FocusLost),
            DocEvent::CursorMoved(cursor) => match &self.state {
                Some(state) if !state.contains_cursor(*cursor) => {
                    self.close(CloseReason::CursorLeft)
                }
                _ => TrackerUpdate::Unchanged,
            },
            DocEvent::Changed(change) => match self.state.take() {
                Some(state) => self.track(doc, state, change),
                None => self.try_open(doc, change),
            },
        }
    }

    fn try_open<D: DocumentView + ?Sized>(&mut self, doc: &D, change: &Change) -> TrackerUpdate {
        let mut inserted = change.inserted.chars();
        let typed_trigger = matches!(
            (inserted.next(), inserted.next()),
            (Some(ch), None) if ch == self.trigger
        );
        if !typed_trigger || change.removed != 0 || change.cursor != change.at + 1 {
            return TrackerUpdate::Unchanged;
        }

        let anchor = change.at;
        if doc.char_at(anchor) != Some(self.trigger) {
            return TrackerUpdate::Unchanged;
        }

        let allowed_prefix = anchor == 0
            || doc
                .char_at(anchor - 1)
                .is_some_and(|ch| ch.is_whitespace());
        if !allowed_prefix {
            return TrackerUpdate::Unchanged;
        }

        self.state = Some(TriggerState::open(anchor));
        TrackerUpdate::Opened
    }

    fn track<D: DocumentView + ?Sized>(
        &mut self,
        doc: &D,
        mut state: TriggerState,
        change: &Change,
    ) -> TrackerUpdate {
        let removed_end = change.at + change.removed;
        if change.removed > 0 && change.at <= state.anchor && removed_end > state.anchor {
            return TrackerUpdate::Closed(CloseReason::TriggerDeleted);
        }

        let mut query_touched = false;
        let mut moved = false;
        if change.at <= state.anchor {
            let delta = change.inserted_len() as isize - change.removed as isize;
            state.shift(delta);
            moved = delta != 0;
        } else if change.at <= state.range.to {
            if change.inserted.chars().any(char::is_whitespace) {
                return TrackerUpdate::Closed(CloseReason::Whitespace);
            }
            state.range.to = change.cursor;
            query_touched = true;
        }

        if state.anchor >= doc.len_chars() {
            return TrackerUpdate::Closed(CloseReason::OutOfBounds);
        }
        if doc.char_at(state.anchor) != Some(self.trigger) {
            return TrackerUpdate::Closed(CloseReason::TriggerDeleted);
        }
        if !state.contains_cursor(change.cursor) {
            return TrackerUpdate::Closed(CloseReason::CursorLeft);
        }

        if query_touched {
            let Some(query) = doc.slice(TextRange::new(state.anchor + 1, state.range.to)) else {
                return TrackerUpdate::Closed(CloseReason::OutOfBounds);
            };
            if query.chars().any(char::is_whitespace) {
                return TrackerUpdate::Closed(CloseReason::Whitespace);
            }
            state.query = query;
        }

        self.state = Some(state);
        if query_touched || moved {
            TrackerUpdate::Updated
        } else {
            TrackerUpdate::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ropey::Rope;

    struct Doc {
        rope: Rope,
        cursor: usize,
    }

    impl Doc {
        fn new(text: &str) -> Self {
            let rope = Rope::from_str(text);
            let cursor = rope.len_chars();
            Self { rope, cursor }
        }

        fn type_char(&mut self, tracker: &mut QueryTracker, ch: char) -> TrackerUpdate {
            let at = self.cursor;
            self.rope.insert_char(at, ch);
            self.cursor += 1;
            tracker.handle(&self.rope, &DocEvent::Changed(Change::insert(at, ch, self.cursor)))
        }

        fn type_str(&mut self, tracker: &mut QueryTracker, text: &str) -> TrackerUpdate {
            let mut last = TrackerUpdate::Unchanged;
            for ch in text.chars() {
                last = self.type_char(tracker, ch);
            }
            last
        }

        fn backspace(&mut self, tracker: &mut QueryTracker) -> TrackerUpdate {
            let range = TextRange::new(self.cursor - 1, self.cursor);
            self.rope.remove(range.from..range.to);
            self.cursor -= 1;
            tracker.handle(&self.rope, &DocEvent::Changed(Change::delete(range, self.cursor)))
        }
    }

    #[test]
    fn opens_on_trigger_at_line_start_and_tracks_query() {
        let mut tracker = QueryTracker::new('/');
        let mut doc = Doc::new("");

        assert_eq!(doc.type_char(&mut tracker, '/'), TrackerUpdate::Opened);
        let state = tracker.state().unwrap();
        assert_eq!(state.range, TextRange::new(0, 1));
        assert_eq!(state.query, "");

        assert_eq!(doc.type_str(&mut tracker, "head"), TrackerUpdate::Updated);
        let state = tracker.state().unwrap();
        assert_eq!(state.query, "head");
        assert_eq!(state.range, TextRange::new(0, 5));

        assert_eq!(doc.backspace(&mut tracker), TrackerUpdate::Updated);
        assert_eq!(tracker.state().unwrap().query, "hea");
    }

    #[test]
    fn needs_whitespace_or_line_start_before_trigger() {
        let mut tracker = QueryTracker::new('/');
        let mut doc = Doc::new("a");
        assert_eq!(doc.type_char(&mut tracker, '/'), TrackerUpdate::Unchanged);

        let mut doc = Doc::new("one\n");
        assert_eq!(doc.type_char(&mut tracker, '/'), TrackerUpdate::Opened);
        assert_eq!(tracker.state().unwrap().anchor, 4);
    }

    #[test]
    fn whitespace_closes() {
        let mut tracker = QueryTracker::new('/');
        let mut doc = Doc::new("");
        doc.type_str(&mut tracker, "/he");
        assert_eq!(
            doc.type_char(&mut tracker, ' '),
            TrackerUpdate::Closed(CloseReason::Whitespace)
        );
        assert!(tracker.state().is_none());

        doc.type_str(&mut tracker, "/x");
        assert_eq!(
            doc.type_char(&mut tracker, '\n'),
            TrackerUpdate::Closed(CloseReason::Whitespace)
        );
    }

    #[test]
    fn deleting_trigger_closes() {
        let mut tracker = QueryTracker::new('/');
        let mut doc = Doc::new("x ");
        doc.type_str(&mut tracker, "/");
        assert_eq!(
            doc.backspace(&mut tracker),
            TrackerUpdate::Closed(CloseReason::TriggerDeleted)
        );
        // typing again after the close does not reopen without a new trigger
        assert_eq!(doc.type_char(&mut tracker, 'h'), TrackerUpdate::Unchanged);
    }

    #[test]
    fn cursor_leaving_range_closes() {
        let mut tracker = QueryTracker::new('/');
        let mut doc = Doc::new("ab ");
        doc.type_str(&mut tracker, "/co");
        assert_eq!(
            tracker.handle(&doc.rope, &DocEvent::CursorMoved(5)),
            TrackerUpdate::Unchanged
        );
        assert_eq!(
            tracker.handle(&doc.rope, &DocEvent::CursorMoved(3)),
            TrackerUpdate::Closed(CloseReason::CursorLeft)
        );
    }

    #[test]
    fn cursor_must_stay_after_trigger() {
        let mut tracker = QueryTracker::new('/');
        let mut doc = Doc::new("");
        doc.type_str(&mut tracker, "/");
        assert_eq!(
            tracker.handle(&doc.rope, &DocEvent::CursorMoved(1)),
            TrackerUpdate::Unchanged
        );
        // the anchor itself sits before the trigger char
        assert_eq!(
            tracker.handle(&doc.rope, &DocEvent::CursorMoved(0)),
            TrackerUpdate::Closed(CloseReason::CursorLeft)
        );
        assert!(tracker.state().is_none());
    }

    #[test]
    fn edits_before_anchor_shift_the_range() {
        let mut tracker = QueryTracker::new('/');
        let mut doc = Doc::new("");
        doc.type_str(&mut tracker, "/h1");

        doc.rope.insert(0, "ab ");
        let update = tracker.handle(
            &doc.rope,
            &DocEvent::Changed(Change::insert(0, "ab ", doc.cursor + 3)),
        );
        assert_eq!(update, TrackerUpdate::Updated);
        let state = tracker.state().unwrap();
        assert_eq!(state.anchor, 3);
        assert_eq!(state.range, TextRange::new(3, 6));
        assert_eq!(state.query, "h1");
    }

    #[test]
    fn focus_loss_and_bad_positions_close() {
        let mut tracker = QueryTracker::new('/');
        let mut doc = Doc::new("");
        doc.type_char(&mut tracker, '/');
        assert_eq!(
            tracker.handle(&doc.rope, &DocEvent::FocusLost),
            TrackerUpdate::Closed(CloseReason::FocusLost)
        );

        doc.type_char(&mut tracker, ' ');
        doc.type_char(&mut tracker, '/');
        let bogus = Change::insert(40, "x", 41);
        assert_eq!(
            tracker.handle(&doc.rope, &DocEvent::Changed(bogus)),
            TrackerUpdate::Closed(CloseReason::CursorLeft)
        );

        let empty = Rope::new();
        doc.type_char(&mut tracker, ' ');
        doc.type_char(&mut tracker, '/');
        let update = tracker.handle(&empty, &DocEvent::Changed(Change::insert(5, "x", 6)));
        assert_eq!(update, TrackerUpdate::Closed(CloseReason::OutOfBounds));
    }
}
