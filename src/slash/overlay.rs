use ratatui::Frame;
use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use super::catalog::Catalog;
use super::controller::SuggestionView;

const MIN_WIDTH: u16 = 24;
const EMPTY_LABEL: &str = "No matching commands";

/// The floating list drawn next to the trigger. Lives exactly as long as the
/// controller is open.
#[derive(Debug)]
pub struct Overlay {
    anchor: Rect,
    max_rows: u16,
    scroll: usize,
    /// Where the list was last drawn, for pointer hit testing.
    drawn: Option<Rect>,
}

impl Overlay {
    pub fn new(anchor: Rect, max_rows: u16) -> Self {
        Self {
            anchor,
            max_rows: max_rows.max(1),
            scroll: 0,
            drawn: None,
        }
    }

    pub fn reposition(&mut self, anchor: Rect) {
        self.anchor = anchor;
    }

    /// Index into `view.visible` of the row at a screen cell, if any.
    pub fn hit_test(&self, view: &SuggestionView, column: u16, row: u16) -> Option<usize> {
        let area = self.drawn?;
        let inner = Block::default().borders(Borders::ALL).inner(area);
        if !inner.contains(Position::new(column, row)) {
            return None;
        }
        let idx = self.scroll + (row - inner.y) as usize;
        (idx < view.visible.len()).then_some(idx)
    }

    pub fn render(&mut self, frame: &mut Frame, catalog: &Catalog, view: &SuggestionView) {
        let rows = view.visible.len().clamp(1, self.max_rows as usize);
        self.scroll = scroll_for(self.scroll, view.selected, rows, view.visible.len());

        let content_width = view
            .visible
            .iter()
            .filter_map(|&idx| catalog.get(idx))
            .map(|entry| entry.label.chars().count() + entry.description.chars().count() + 6)
            .max()
            .unwrap_or(EMPTY_LABEL.len());
        let width = (content_width as u16).saturating_add(2).max(MIN_WIDTH);
        let height = rows as u16 + 2;
        let area = place(self.anchor, frame.area(), width, height);
        self.drawn = Some(area);

        let lines: Vec<Line> = if view.visible.is_empty() {
            vec![Line::from(Span::styled(
                EMPTY_LABEL,
                Style::default().fg(Color::DarkGray),
            ))]
        } else {
            view.visible
                .iter()
                .enumerate()
                .skip(self.scroll)
                .take(rows)
                .filter_map(|(pos, &idx)| catalog.get(idx).map(|entry| (pos, entry)))
                .map(|(pos, entry)| {
                    let selected = pos == view.selected;
                    let base = if selected {
                        Style::default().fg(Color::Black).bg(Color::Cyan)
                    } else {
                        Style::default().fg(Color::Gray)
                    };
                    let muted = if selected {
                        base
                    } else {
                        Style::default().fg(Color::DarkGray)
                    };
                    Line::from(vec![
                        Span::styled(format!("{} ", entry.icon.glyph()), base.fg(Color::Magenta)),
                        Span::styled(entry.label, base.add_modifier(Modifier::BOLD)),
                        Span::styled(format!("  {}", entry.description), muted),
                    ])
                    .style(base)
                })
                .collect()
        };

        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(lines).block(
                Block::default()
                    .borders(Borders::ALL)
                    .style(Style::default().bg(Color::Rgb(15, 15, 24))),
            ),
            area,
        );
    }
}

/// Below the anchor, left-aligned with it; above it when the bottom does not
/// fit; clamped to `bounds` either way.
pub fn place(anchor: Rect, bounds: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(bounds.width);
    let height = height.min(bounds.height);

    let below = anchor.y.saturating_add(anchor.height);
    let y = if below.saturating_add(height) <= bounds.bottom() {
        below
    } else if anchor.y >= bounds.y.saturating_add(height) {
        anchor.y - height
    } else {
        bounds.bottom().saturating_sub(height).max(bounds.y)
    };

    let x = anchor
        .x
        .min(bounds.right().saturating_sub(width))
        .max(bounds.x);

    Rect::new(x, y, width, height)
}

fn scroll_for(scroll: usize, selected: usize, rows: usize, len: usize) -> usize {
    let max_scroll = len.saturating_sub(rows);
    let scroll = if selected < scroll {
        selected
    } else if selected >= scroll + rows {
        selected + 1 - rows
    } else {
        scroll
    };
    scroll.min(max_scroll)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn places_below_anchor_when_it_fits() {
        let bounds = Rect::new(0, 0, 80, 24);
        let area = place(Rect::new(10, 3, 1, 1), bounds, 30, 6);
        assert_eq!(area, Rect::new(10, 4, 30, 6));
    }

    #[test]
    fn flips_above_near_the_bottom() {
        let bounds = Rect::new(0, 0, 80, 24);
        let area = place(Rect::new(10, 20, 1, 1), bounds, 30, 6);
        assert_eq!(area, Rect::new(10, 14, 30, 6));
    }

    #[test]
    fn clamps_to_right_edge_and_small_frames() {
        let bounds = Rect::new(0, 0, 40, 5);
        let area = place(Rect::new(35, 2, 1, 1), bounds, 30, 8);
        assert_eq!(area, Rect::new(10, 0, 30, 5));
    }

    #[test]
    fn scroll_keeps_selection_visible() {
        assert_eq!(scroll_for(0, 9, 8, 10), 2);
        assert_eq!(scroll_for(2, 0, 8, 10), 0);
        assert_eq!(scroll_for(2, 5, 8, 10), 2);
        assert_eq!(scroll_for(5, 1, 8, 3), 0);
    }
}
