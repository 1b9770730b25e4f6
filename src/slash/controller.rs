use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::Rect;

use super::SlashError;
use super::catalog::{Catalog, CommandEntry};
use super::executor;
use super::filter::{self, Matches};
use super::host::EditHost;
use super::overlay::Overlay;
use super::tracker::{CloseReason, TriggerState};

/// What an open palette shows. Rebuilt from scratch on every update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionView {
    /// Catalog indices of the matching entries, in catalog order.
    pub visible: Matches,
    pub selected: usize,
    pub anchor: Rect,
}

impl SuggestionView {
    fn build(catalog: &Catalog, query: &str, anchor: Rect, previous: usize) -> Self {
        let visible = filter::filter(catalog, query);
        let selected = if previous < visible.len() { previous } else { 0 };
        Self {
            visible,
            selected,
            anchor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    fn select_previous(&mut self) {
        let n = self.visible.len();
        if n > 0 {
            self.selected = (self.selected + n - 1) % n;
        }
    }

    fn select_next(&mut self) {
        let n = self.visible.len();
        if n > 0 {
            self.selected = (self.selected + 1) % n;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaletteState {
    Closed,
    Open(SuggestionView),
}

/// The keys an open palette intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteKey {
    Dismiss,
    Previous,
    Next,
    Confirm,
}

impl PaletteKey {
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => Some(PaletteKey::Dismiss),
            KeyCode::Up => Some(PaletteKey::Previous),
            KeyCode::Char('p') if ctrl => Some(PaletteKey::Previous),
            KeyCode::Down | KeyCode::Tab => Some(PaletteKey::Next),
            KeyCode::Char('n') if ctrl => Some(PaletteKey::Next),
            KeyCode::Enter => Some(PaletteKey::Confirm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Let the document handle the key.
    NotHandled,
    Handled,
    /// Handled, and the palette closed because of it.
    Closed(CloseReason),
}

/// Overlay lifecycle counters. `created - destroyed` is 1 while open, else 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStats {
    pub created: usize,
    pub destroyed: usize,
}

/// The `Closed`/`Open` state machine behind the palette.
///
/// The four `on_*` handlers are the only transitions. The controller owns
/// the suggestion view and the overlay; the trigger state is borrowed from
/// the tracker on every call.
#[derive(Debug)]
pub struct PaletteController {
    catalog: Catalog,
    state: PaletteState,
    overlay: Option<Overlay>,
    max_rows: u16,
    stats: OverlayStats,
}

impl PaletteController {
    pub fn new(catalog: Catalog, max_rows: u16) -> Self {
        Self {
            catalog,
            state: PaletteState::Closed,
            overlay: None,
            max_rows,
            stats: OverlayStats::default(),
        }
    }

    #[cfg(test)]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[cfg(test)]
    pub fn state(&self) -> &PaletteState {
        &self.state
    }

    pub fn view(&self) -> Option<&SuggestionView> {
        match &self.state {
            PaletteState::Open(view) => Some(view),
            PaletteState::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, PaletteState::Open(_))
    }

    #[cfg(test)]
    pub fn stats(&self) -> OverlayStats {
        self.stats
    }

    pub fn selected_entry(&self) -> Option<&CommandEntry> {
        let view = self.view()?;
        view.visible
            .get(view.selected)
            .and_then(|&idx| self.catalog.get(idx))
    }

    /// Closed → Open. Without an anchor rect the palette stays closed and the
    /// caller retries on the next update.
    pub fn on_start(&mut self, trigger: &TriggerState, anchor: Option<Rect>) -> Result<(), SlashError> {
        if self.is_open() {
            return self.on_update(trigger, anchor);
        }

        let anchor = anchor.ok_or(SlashError::TransientLayoutFailure)?;
        let view = SuggestionView::build(&self.catalog, &trigger.query, anchor, 0);
        self.overlay = Some(Overlay::new(anchor, self.max_rows));
        self.stats.created += 1;
        self.state = PaletteState::Open(view);
        tracing::debug!(anchor = trigger.anchor, "slash palette opened");
        Ok(())
    }

    /// Open → Open. A closed controller treats this as another start attempt.
    pub fn on_update(&mut self, trigger: &TriggerState, anchor: Option<Rect>) -> Result<(), SlashError> {
        let PaletteState::Open(previous) = &self.state else {
            return self.on_start(trigger, anchor);
        };

        let anchor = anchor.unwrap_or(previous.anchor);
        let view = SuggestionView::build(&self.catalog, &trigger.query, anchor, previous.selected);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.reposition(anchor);
        }
        self.state = PaletteState::Open(view);
        Ok(())
    }

    /// Key capture while open. Closed controllers never handle keys.
    pub fn on_key_down<H: EditHost>(
        &mut self,
        key: PaletteKey,
        trigger: Option<&TriggerState>,
        trigger_char: char,
        host: &mut H,
    ) -> KeyOutcome {
        let PaletteState::Open(view) = &mut self.state else {
            return KeyOutcome::NotHandled;
        };

        match key {
            PaletteKey::Dismiss => {
                self.on_exit();
                KeyOutcome::Closed(CloseReason::Dismissed)
            }
            PaletteKey::Previous => {
                view.select_previous();
                KeyOutcome::Handled
            }
            PaletteKey::Next => {
                view.select_next();
                KeyOutcome::Handled
            }
            PaletteKey::Confirm => {
                if view.is_empty() {
                    return KeyOutcome::NotHandled;
                }
                let selected = view.selected;
                self.confirm(selected, trigger, trigger_char, host)
            }
        }
    }

    /// A pointer press at a screen cell. Clicking a row confirms it.
    pub fn on_click<H: EditHost>(
        &mut self,
        column: u16,
        row: u16,
        trigger: Option<&TriggerState>,
        trigger_char: char,
        host: &mut H,
    ) -> KeyOutcome {
        let (Some(view), Some(overlay)) = (self.view(), self.overlay.as_ref()) else {
            return KeyOutcome::NotHandled;
        };
        match overlay.hit_test(view, column, row) {
            Some(idx) => self.confirm(idx, trigger, trigger_char, host),
            None => KeyOutcome::NotHandled,
        }
    }

    /// Open → Closed. Safe to call in any state; only the first call after
    /// an open destroys the overlay.
    pub fn on_exit(&mut self) {
        if self.overlay.take().is_some() {
            self.stats.destroyed += 1;
            tracing::debug!(
                created = self.stats.created,
                destroyed = self.stats.destroyed,
                "slash palette closed"
            );
        }
        self.state = PaletteState::Closed;
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let Self {
            catalog,
            state,
            overlay,
            ..
        } = self;
        if let (PaletteState::Open(view), Some(overlay)) = (state, overlay.as_mut()) {
            overlay.render(frame, catalog, view);
        }
    }

    fn confirm<H: EditHost>(
        &mut self,
        visible_idx: usize,
        trigger: Option<&TriggerState>,
        trigger_char: char,
        host: &mut H,
    ) -> KeyOutcome {
        let entry = self
            .view()
            .and_then(|view| view.visible.get(visible_idx))
            .and_then(|&idx| self.catalog.get(idx))
            .cloned();

        let result = match (entry, trigger) {
            (Some(entry), Some(trigger)) => {
                executor::execute(&entry, trigger.range, trigger_char, host)
            }
            _ => Err(SlashError::InvalidatedSession(CloseReason::Confirmed)),
        };
        if let Err(err) = result {
            tracing::debug!("slash command aborted: {err}");
        }

        self.on_exit();
        KeyOutcome::Closed(CloseReason::Confirmed)
    }
}
