//! Slash-command palette: type the trigger character in the editor, pick a
//! block type from the floating list, and the line is rewritten in place.

pub mod catalog;
pub mod controller;
pub mod error;
pub mod executor;
pub mod filter;
pub mod host;
pub mod overlay;
pub mod tracker;

use crossterm::event::KeyEvent;
use ratatui::Frame;

pub use catalog::Catalog;
pub use controller::{KeyOutcome, PaletteController, PaletteKey};
pub use error::SlashError;
pub use host::{DocEvent, DocumentView, EditHost, RectResolver};
pub use tracker::{CloseReason, QueryTracker, TrackerUpdate, TriggerState};

use crate::model::config::SlashConfig;

/// Editor-side owner of one palette session: the tracker holds the trigger
/// state, the controller holds the view and overlay.
#[derive(Debug)]
pub struct SlashPalette {
    enabled: bool,
    tracker: QueryTracker,
    controller: PaletteController,
}

impl SlashPalette {
    pub fn new(config: &SlashConfig) -> Self {
        Self::with_catalog(
            Catalog::builtin(),
            config.trigger_char(),
            config.max_visible_rows,
            config.enabled,
        )
    }

    pub fn with_catalog(catalog: Catalog, trigger: char, max_rows: u16, enabled: bool) -> Self {
        Self {
            enabled,
            tracker: QueryTracker::new(trigger),
            controller: PaletteController::new(catalog, max_rows),
        }
    }

    pub fn is_open(&self) -> bool {
        self.controller.is_open()
    }

    #[cfg(test)]
    pub fn controller(&self) -> &PaletteController {
        &self.controller
    }

    /// Label of the highlighted entry while the list is showing.
    pub fn selected_label(&self) -> Option<&'static str> {
        self.controller.selected_entry().map(|entry| entry.label)
    }

    pub fn trigger_state(&self) -> Option<&TriggerState> {
        self.tracker.state()
    }

    /// Feed one document notification through the tracker and controller.
    pub fn on_doc_event<D>(&mut self, doc: &D, event: &DocEvent)
    where
        D: DocumentView + RectResolver + ?Sized,
    {
        if !self.enabled {
            return;
        }

        match self.tracker.handle(doc, event) {
            TrackerUpdate::Closed(reason) => {
                tracing::debug!("{}", SlashError::InvalidatedSession(reason));
                self.controller.on_exit();
            }
            TrackerUpdate::Opened | TrackerUpdate::Updated | TrackerUpdate::Unchanged => {
                self.refresh(doc);
            }
        }
    }

    /// Re-resolve the anchor after a layout change. Also retries an open that
    /// failed because the editor had not been drawn yet.
    pub fn refresh<D: RectResolver + ?Sized>(&mut self, doc: &D) {
        let Some(state) = self.tracker.state() else {
            return;
        };
        let anchor = doc.resolve_rect(state.anchor);
        if let Err(err) = self.controller.on_update(state, anchor) {
            tracing::trace!("{err}");
        }
    }

    /// Runs before the editor's own key handling.
    pub fn handle_key<H: EditHost>(&mut self, key: KeyEvent, host: &mut H) -> KeyOutcome {
        let Some(key) = PaletteKey::from_key(key) else {
            return KeyOutcome::NotHandled;
        };
        self.press(key, host)
    }

    pub fn press<H: EditHost>(&mut self, key: PaletteKey, host: &mut H) -> KeyOutcome {
        if !self.controller.is_open() {
            return KeyOutcome::NotHandled;
        }
        let outcome = self.controller.on_key_down(
            key,
            self.tracker.state(),
            self.tracker.trigger(),
            host,
        );
        if let KeyOutcome::Closed(reason) = outcome {
            self.tracker.close(reason);
        }
        outcome
    }

    pub fn handle_click<H: EditHost>(&mut self, column: u16, row: u16, host: &mut H) -> KeyOutcome {
        let outcome = self.controller.on_click(
            column,
            row,
            self.tracker.state(),
            self.tracker.trigger(),
            host,
        );
        if let KeyOutcome::Closed(reason) = outcome {
            self.tracker.close(reason);
        }
        outcome
    }

    /// Drop any session without touching the document.
    pub fn cancel(&mut self, reason: CloseReason) {
        if let TrackerUpdate::Closed(reason) = self.tracker.close(reason) {
            tracing::debug!("{}", SlashError::InvalidatedSession(reason));
        }
        self.controller.on_exit();
    }

    pub fn render(&mut self, frame: &mut Frame) {
        self.controller.render(frame);
    }
}
