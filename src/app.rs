use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use regex::Regex;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme as SyntectTheme, ThemeSet};
use syntect::parsing::SyntaxSet;

use crate::model::buffer::Buffer;
use crate::model::config::AppConfig;
use crate::model::markdown::{self, BlockMarker};
use crate::model::mode::Mode;
use crate::model::note_list::NoteList;
use crate::msg::{Direction as MoveDir, Msg};
use crate::slash::{CloseReason, DocEvent, KeyOutcome, SlashPalette};

const STATUS_TTL: Duration = Duration::from_secs(4);
const HELP: &str = "commands: w  q  wq  notes  archive  new <name>  undo  help";

#[derive(Default)]
struct RenderCache {
    top: usize,
    bottom: usize,
    lines: Vec<Line<'static>>,
    dirty: bool,
}

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\([^\)]+\)").expect("valid markdown link regex"));
static INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]+`").expect("valid inline code regex"));
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*[^*]+\*\*").expect("valid bold regex"));
static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*[^*\s][^*]*\*").expect("valid italic regex"));
static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static SYNTECT_THEME: LazyLock<SyntectTheme> = LazyLock::new(|| {
    let themes = ThemeSet::load_defaults();
    themes
        .themes
        .get("base16-ocean.dark")
        .cloned()
        .or_else(|| themes.themes.values().next().cloned())
        .expect("at least one syntect theme")
});

pub struct App {
    pub mode: Mode,
    pub buffer: Buffer,
    pub notes: NoteList,
    palette: SlashPalette,
    command_input: String,
    pub config: AppConfig,
    pub should_quit: bool,
    pub event_tx: mpsc::Sender<Msg>,
    status_message: Option<(String, Instant)>,
    render_cache: RenderCache,
    last_saved_file: Option<(PathBuf, Instant)>,
}

impl App {
    pub fn new(config: AppConfig, event_tx: mpsc::Sender<Msg>) -> Result<Self> {
        std::fs::create_dir_all(config.vault_path())?;

        let scratch_path = config.scratch_path();

        let mut buffer = if scratch_path.exists() {
            Buffer::from_file(scratch_path)?
        } else {
            let mut buf = Buffer::new();
            buf.path = Some(scratch_path);
            buf
        };
        buffer.set_undo_limit(config.editor.undo_limit);
        buffer.viewport.scroll_off = config.editor.scroll_off;

        let notes = NoteList::new(config.vault_path(), config.search.max_results)?;
        let palette = SlashPalette::new(&config.slash);

        Ok(Self {
            mode: Mode::Normal,
            buffer,
            notes,
            palette,
            command_input: String::new(),
            config,
            should_quit: false,
            event_tx,
            status_message: None,
            render_cache: RenderCache {
                dirty: true,
                ..Default::default()
            },
            last_saved_file: None,
        })
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Key(key) => self.handle_key(key)?,
            Msg::Mouse(mouse) => self.handle_mouse(mouse),
            Msg::OpenFile(path) => self.open_file(path)?,
            Msg::FileChanged(path) => self.handle_file_changed(path),
            Msg::Tick => self.handle_tick(),
            Msg::Resize(_w, h) => {
                self.buffer.viewport.height = h.saturating_sub(2); // title + status bar
                self.mark_render_dirty();
            }
        }
        Ok(())
    }

    /// Flush the active note synchronously before exit.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(path) = self.buffer.path.clone()
            && (self.buffer.dirty || self.buffer.save_debounce.is_some())
        {
            write_atomic(&path, &self.buffer.rope)?;
            self.buffer.dirty = false;
            self.buffer.save_debounce = None;
        }
        Ok(())
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        match self.mode {
            Mode::Normal => self.handle_key_normal(key),
            Mode::Insert => self.handle_key_insert(key),
            Mode::Command => self.handle_key_command(key),
            Mode::NoteList => self.handle_key_note_list(key),
        }
    }

    fn handle_key_normal(&mut self, key: KeyEvent) -> Result<()> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('o') if ctrl => self.open_note_list(false)?,
            KeyCode::Char('s') if ctrl => self.save_buffer(),
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('i') => self.mode = Mode::Insert,
            KeyCode::Char('a') => {
                self.move_cursor(MoveDir::Right);
                self.mode = Mode::Insert;
            }
            KeyCode::Char('A') => {
                self.move_cursor(MoveDir::LineEnd);
                self.mode = Mode::Insert;
            }
            KeyCode::Char('o') => {
                self.move_cursor(MoveDir::LineEnd);
                self.buffer.insert_newline();
                self.after_edit();
                self.mode = Mode::Insert;
            }
            KeyCode::Char('u') => self.undo(),
            KeyCode::Char(':') => {
                self.mode = Mode::Command;
                self.command_input.clear();
            }
            KeyCode::Char('g') => {
                self.buffer.cursor.move_to(0, 0);
                self.buffer.scroll_to_cursor();
            }
            KeyCode::Char('G') => {
                let last = self.buffer.line_count().saturating_sub(1);
                self.buffer.cursor.move_to(last, 0);
                self.buffer.scroll_to_cursor();
            }
            KeyCode::Char('h') | KeyCode::Left => self.move_cursor(MoveDir::Left),
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(MoveDir::Down),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(MoveDir::Up),
            KeyCode::Char('l') | KeyCode::Right => self.move_cursor(MoveDir::Right),
            KeyCode::Char('0') | KeyCode::Home => self.move_cursor(MoveDir::LineStart),
            KeyCode::Char('$') | KeyCode::End => self.move_cursor(MoveDir::LineEnd),
            _ => {}
        }
        Ok(())
    }

    fn handle_key_command(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                self.command_input.clear();
            }
            KeyCode::Enter => {
                let command = self.command_input.trim().to_string();
                self.mode = Mode::Normal;
                self.command_input.clear();

                if !command.is_empty() {
                    self.run_command(&command)?;
                }
            }
            KeyCode::Backspace => {
                self.command_input.pop();
            }
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                self.command_input.push(ch);
            }
            _ => {}
        }

        Ok(())
    }

    fn run_command(&mut self, command: &str) -> Result<()> {
        let (name, arg) = command
            .split_once(' ')
            .map_or((command, ""), |(name, arg)| (name, arg.trim()));

        match name {
            "w" => self.save_buffer(),
            "q" => self.should_quit = true,
            "wq" => {
                self.save_buffer();
                self.should_quit = true;
            }
            "notes" => self.open_note_list(false)?,
            "archive" => self.open_note_list(true)?,
            "new" => self.create_note(arg)?,
            "undo" => self.undo(),
            "help" => self.set_status(HELP),
            _ => self.set_status(format!("unknown command: {command}")),
        }
        Ok(())
    }

    fn handle_key_insert(&mut self, key: KeyEvent) -> Result<()> {
        // An open palette sees keys before the document does.
        match self.palette.handle_key(key, &mut self.buffer) {
            KeyOutcome::NotHandled => {}
            KeyOutcome::Closed(CloseReason::Confirmed) => {
                self.after_edit();
                return Ok(());
            }
            KeyOutcome::Handled | KeyOutcome::Closed(_) => return Ok(()),
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('z') if ctrl => self.undo(),
            KeyCode::Char('s') if ctrl => self.save_buffer(),
            KeyCode::Esc => self.leave_insert(),
            KeyCode::Enter => {
                let event = self.buffer.insert_newline();
                self.apply_doc_event(event);
            }
            KeyCode::Backspace => {
                if let Some(event) = self.buffer.delete_char_before() {
                    self.apply_doc_event(event);
                }
            }
            KeyCode::Tab => {
                let indent = " ".repeat(self.config.editor.tab_width as usize);
                let event = self.buffer.insert_text(&indent);
                self.apply_doc_event(event);
            }
            KeyCode::Char(ch) if !ctrl => {
                let event = self.buffer.insert_char(ch);
                self.apply_doc_event(event);
            }
            KeyCode::Left => self.move_cursor(MoveDir::Left),
            KeyCode::Right => self.move_cursor(MoveDir::Right),
            KeyCode::Up => self.move_cursor(MoveDir::Up),
            KeyCode::Down => self.move_cursor(MoveDir::Down),
            KeyCode::Home => self.move_cursor(MoveDir::LineStart),
            KeyCode::End => self.move_cursor(MoveDir::LineEnd),
            _ => {}
        }
        Ok(())
    }

    fn handle_key_note_list(&mut self, key: KeyEvent) -> Result<()> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Enter => {
                if let Some(note) = self.notes.selected_note() {
                    let path = note.path.clone();
                    self.mode = Mode::Normal;
                    let _ = self.event_tx.send(Msg::OpenFile(path));
                }
            }
            KeyCode::Tab => self.notes.toggle_archived(),
            KeyCode::Char('a') if ctrl => self.toggle_archive_selected(),
            KeyCode::Char('n') if ctrl => {
                let name = match self.notes.query.trim() {
                    "" => self.next_untitled_name(),
                    query => query.to_string(),
                };
                self.create_note(&name)?;
            }
            KeyCode::Up => self.notes.move_selection(-1),
            KeyCode::Down => self.notes.move_selection(1),
            KeyCode::Backspace => self.notes.pop_query_char(),
            KeyCode::Char(ch) if !ctrl => self.notes.push_query_char(ch),
            _ => {}
        }

        Ok(())
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.mode != Mode::Insert || mouse.kind != MouseEventKind::Down(MouseButton::Left) {
            return;
        }

        let outcome = self
            .palette
            .handle_click(mouse.column, mouse.row, &mut self.buffer);
        if outcome == KeyOutcome::Closed(CloseReason::Confirmed) {
            self.after_edit();
        }
    }

    fn leave_insert(&mut self) {
        self.palette.on_doc_event(&self.buffer, &DocEvent::FocusLost);
        self.mode = Mode::Normal;
    }

    /// Bookkeeping shared by every document mutation.
    fn after_edit(&mut self) {
        self.buffer.scroll_to_cursor();
        self.mark_render_dirty();
        self.schedule_auto_save();
    }

    fn apply_doc_event(&mut self, event: DocEvent) {
        self.after_edit();
        self.palette.on_doc_event(&self.buffer, &event);
    }

    fn undo(&mut self) {
        if self.buffer.undo() {
            self.palette.cancel(CloseReason::Dismissed);
            self.after_edit();
        } else {
            self.set_status("already at oldest change");
        }
    }

    fn move_cursor(&mut self, dir: MoveDir) {
        let prev_top = self.buffer.viewport.top_line;
        match dir {
            MoveDir::Up => {
                if self.buffer.cursor.row > 0 {
                    self.buffer.cursor.row -= 1;
                    self.buffer.cursor.col = self.buffer.cursor.desired_col;
                }
            }
            MoveDir::Down => {
                if self.buffer.cursor.row < self.buffer.line_count().saturating_sub(1) {
                    self.buffer.cursor.row += 1;
                    self.buffer.cursor.col = self.buffer.cursor.desired_col;
                }
            }
            MoveDir::Left => {
                if self.buffer.cursor.col > 0 {
                    self.buffer.cursor.col -= 1;
                    self.buffer.cursor.desired_col = self.buffer.cursor.col;
                }
            }
            MoveDir::Right => {
                let line_len = self.buffer.line_len(self.buffer.cursor.row);
                if self.buffer.cursor.col < line_len {
                    self.buffer.cursor.col += 1;
                    self.buffer.cursor.desired_col = self.buffer.cursor.col;
                }
            }
            MoveDir::LineStart => {
                self.buffer.cursor.col = 0;
                self.buffer.cursor.desired_col = 0;
            }
            MoveDir::LineEnd => {
                let line_len = self.buffer.line_len(self.buffer.cursor.row);
                self.buffer.cursor.col = line_len;
                self.buffer.cursor.desired_col = line_len;
            }
        }
        self.buffer.clamp_cursor();
        self.buffer.scroll_to_cursor();
        if self.buffer.viewport.top_line != prev_top {
            self.mark_render_dirty();
        }

        if self.mode == Mode::Insert {
            let cursor = self.buffer.cursor_char();
            self.palette
                .on_doc_event(&self.buffer, &DocEvent::CursorMoved(cursor));
        }
    }

    fn schedule_auto_save(&mut self) {
        let debounce_ms = self.config.general.auto_save_debounce_ms;
        self.buffer.save_debounce = Some(Instant::now() + Duration::from_millis(debounce_ms));
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();

        if self
            .status_message
            .as_ref()
            .is_some_and(|(_, at)| now.duration_since(*at) >= STATUS_TTL)
        {
            self.status_message = None;
        }

        if let Some(deadline) = self.buffer.save_debounce
            && now >= deadline
        {
            self.save_buffer();
        }
    }

    fn save_buffer(&mut self) {
        let Some(path) = self.buffer.path.clone() else {
            return;
        };

        self.buffer.save_debounce = None;
        self.buffer.dirty = false;
        self.last_saved_file = Some((path.clone(), Instant::now()));

        let rope = self.buffer.rope.clone();
        spawn_buffer_save(path, rope);
    }

    fn handle_file_changed(&mut self, path: PathBuf) {
        if path.extension().is_some_and(|ext| ext == "tmp") {
            return;
        }

        if let Err(err) = self.notes.refresh() {
            tracing::warn!("note list refresh failed: {err}");
        }

        if !self.should_reload_active(&path) {
            return;
        }

        let old_cursor = self.buffer.cursor.clone();
        let old_viewport = self.buffer.viewport.clone();

        match Buffer::from_file(path) {
            Ok(mut reloaded) => {
                reloaded.cursor = old_cursor;
                reloaded.viewport = old_viewport;
                reloaded.set_undo_limit(self.config.editor.undo_limit);
                reloaded.clamp_cursor();
                reloaded.scroll_to_cursor();
                self.palette.cancel(CloseReason::OutOfBounds);
                self.buffer = reloaded;
                self.mark_render_dirty();
            }
            Err(err) => tracing::warn!("reload failed: {err}"),
        }
    }

    fn should_reload_active(&self, path: &Path) -> bool {
        let Some(active) = self.buffer.path.as_ref() else {
            return false;
        };

        if !same_file_path(active, path) || !path.exists() {
            return false;
        }

        if self.buffer.dirty {
            return false;
        }

        if let Some((saved_path, saved_at)) = &self.last_saved_file {
            let recently_saved =
                Instant::now().duration_since(*saved_at) <= Duration::from_millis(1200);
            if recently_saved && same_file_path(saved_path, path) {
                return false;
            }
        }

        true
    }

    fn open_file(&mut self, path: PathBuf) -> Result<()> {
        if self
            .buffer
            .path
            .as_ref()
            .is_some_and(|current| same_file_path(current, &path))
        {
            return Ok(());
        }

        if self.buffer.dirty {
            self.save_buffer();
        }

        let mut buffer = match Buffer::from_file(path) {
            Ok(buffer) => buffer,
            Err(err) => {
                tracing::warn!("open failed: {err}");
                self.set_status(format!("open failed: {err}"));
                return Ok(());
            }
        };
        buffer.set_undo_limit(self.config.editor.undo_limit);
        buffer.viewport.scroll_off = self.config.editor.scroll_off;
        buffer.viewport.height = self.buffer.viewport.height;
        buffer.viewport.area = self.buffer.viewport.area;

        self.palette.cancel(CloseReason::FocusLost);
        self.buffer = buffer;
        self.mode = Mode::Normal;
        self.mark_render_dirty();
        Ok(())
    }

    fn open_note_list(&mut self, archived: bool) -> Result<()> {
        if self.mode == Mode::Insert {
            self.leave_insert();
        }
        self.notes.show_archived = archived;
        self.notes.selected = 0;
        self.notes.refresh()?;
        self.notes.set_query("");
        self.mode = Mode::NoteList;
        Ok(())
    }

    fn create_note(&mut self, name: &str) -> Result<()> {
        match self.notes.create(name) {
            Ok(path) => {
                self.set_status(format!("created {}", path.display()));
                self.open_file(path)?;
            }
            Err(err) => {
                tracing::warn!("create note failed: {err}");
                self.set_status(err.to_string());
            }
        }
        Ok(())
    }

    fn toggle_archive_selected(&mut self) {
        let before = self.notes.selected_note().map(|note| note.path.clone());

        match self.notes.toggle_archive_selected() {
            Ok(Some(target)) => {
                if before.is_some() && before == self.buffer.path {
                    self.buffer.path = Some(target.clone());
                }
                self.set_status(format!("moved to {}", target.display()));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("archive failed: {err}");
                self.set_status(err.to_string());
            }
        }
    }

    fn next_untitled_name(&self) -> String {
        let vault = self.config.vault_path();
        (1..)
            .map(|n| format!("untitled-{n}"))
            .find(|name| !vault.join(format!("{name}.md")).exists())
            .unwrap_or_else(|| "untitled".to_string())
    }

    fn mark_render_dirty(&mut self) {
        self.render_cache.dirty = true;
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // title bar
                Constraint::Min(1),    // editor
                Constraint::Length(1), // status bar
            ])
            .split(frame.area());

        self.render_title_bar(frame, chunks[0]);

        let editor_area = chunks[1];
        self.render_editor(frame, editor_area);

        let cursor_x = self.buffer.cursor.col as u16 + editor_area.x;
        if let Some(row) = self
            .buffer
            .cursor
            .row
            .checked_sub(self.buffer.viewport.top_line)
            .filter(|row| *row < editor_area.height as usize)
        {
            frame.set_cursor_position((cursor_x, editor_area.y + row as u16));
        }

        self.render_status_bar(frame, chunks[2]);

        match self.mode {
            Mode::Insert => {
                // The anchor moves with scrolling and resizes.
                self.palette.refresh(&self.buffer);
                self.palette.render(frame);
            }
            Mode::NoteList => self.render_note_list(frame),
            Mode::Command => self.render_command_overlay(frame),
            Mode::Normal => {}
        }
    }

    fn render_editor(&mut self, frame: &mut Frame, area: Rect) {
        self.buffer.viewport.area = Some(area);
        if self.buffer.viewport.height != area.height {
            self.buffer.viewport.height = area.height;
            self.buffer.scroll_to_cursor();
        }

        let top = self.buffer.viewport.top_line;
        let bottom = (top + area.height as usize).min(self.buffer.line_count());

        let needs_rebuild = self.render_cache.dirty
            || self.render_cache.top != top
            || self.render_cache.bottom != bottom;

        if needs_rebuild {
            let mut code_block_lang = self.code_block_lang_before_line(top);
            self.render_cache.lines = (top..bottom)
                .map(|i| {
                    let text = self.buffer.line_text(i).unwrap_or_default();
                    render_markdown_line(&text, &mut code_block_lang)
                })
                .collect();
            self.render_cache.top = top;
            self.render_cache.bottom = bottom;
            self.render_cache.dirty = false;
        }

        let editor = Paragraph::new(self.render_cache.lines.clone());
        frame.render_widget(editor, area);
    }

    fn code_block_lang_before_line(&self, line_index: usize) -> Option<String> {
        let mut code_block_lang = None;
        for i in 0..line_index {
            let text = self.buffer.line_text(i).unwrap_or_default();
            if let Some(lang) = parse_code_fence_language(&text) {
                if code_block_lang.is_some() {
                    code_block_lang = None;
                } else {
                    code_block_lang = Some(lang);
                }
            }
        }
        code_block_lang
    }

    fn render_title_bar(&self, frame: &mut Frame, area: Rect) {
        let name = self
            .buffer
            .path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "[scratch]".to_string());
        let label = if self.buffer.dirty {
            format!(" {name} ● ")
        } else {
            format!(" {name} ")
        };

        let line = Line::from(vec![
            Span::styled(
                label,
                Style::default()
                    .bg(Color::Rgb(30, 30, 45))
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                "  Ctrl+O: Notes  i: Insert  / (insert): Blocks  u: Undo  : Command (help)  q: Quit ",
                Style::default()
                    .bg(Color::Rgb(20, 20, 30))
                    .fg(Color::DarkGray),
            ),
        ]);

        frame.render_widget(
            Paragraph::new(line).style(Style::default().bg(Color::Rgb(20, 20, 30))),
            area,
        );
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let mode_style = match self.mode {
            Mode::Normal => Style::default()
                .fg(Color::Black)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            Mode::Insert => Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            _ => Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        };

        let mode_span = Span::styled(format!(" {} ", self.mode.label()), mode_style);

        let mut suffix = match self.mode {
            Mode::Command => format!(" | :{}", self.command_input),
            Mode::NoteList => {
                let label = if self.notes.show_archived {
                    "archive"
                } else {
                    "notes"
                };
                format!(" | {label}: {}", self.notes.query)
            }
            Mode::Insert => self.palette_status(),
            Mode::Normal => String::new(),
        };

        if let Some((message, _)) = &self.status_message {
            suffix.push_str(&format!(" | {message}"));
        }

        let info = Span::styled(
            format!(
                " {}:{}{} ",
                self.buffer.cursor.row + 1,
                self.buffer.cursor.col + 1,
                suffix
            ),
            Style::default().fg(Color::Gray).bg(Color::DarkGray),
        );

        let bar = Line::from(vec![mode_span, info]);
        let status = Paragraph::new(bar).style(Style::default().bg(Color::DarkGray));
        frame.render_widget(status, area);
    }

    fn palette_status(&self) -> String {
        let Some(state) = self.palette.trigger_state().filter(|_| self.palette.is_open()) else {
            return String::new();
        };
        match self.palette.selected_label() {
            Some(label) => format!(" | block: {} > {label}", state.query),
            None => format!(" | block: {} (no match)", state.query),
        }
    }

    fn render_note_list(&self, frame: &mut Frame) {
        let area = centered_rect(70, 60, frame.area());
        frame.render_widget(Clear, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(area);

        let input = Paragraph::new(self.notes.query.clone()).block(
            Block::default()
                .title(if self.notes.show_archived {
                    " Archive "
                } else {
                    " Notes "
                })
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Rgb(15, 15, 24))),
        );
        frame.render_widget(input, chunks[0]);

        let rows = chunks[1].height.max(1) as usize;
        let offset = (self.notes.selected + 1).saturating_sub(rows);
        let results: Vec<Line> = if self.notes.result_count() == 0 {
            vec![Line::from(Span::styled(
                "No notes",
                Style::default().fg(Color::DarkGray),
            ))]
        } else {
            self.notes
                .results()
                .enumerate()
                .skip(offset)
                .take(rows)
                .map(|(idx, note)| {
                    if idx == self.notes.selected {
                        let style = Style::default().fg(Color::Black).bg(Color::Cyan);
                        Line::from(vec![
                            Span::styled(format!("> {}", note.title), style.add_modifier(Modifier::BOLD)),
                            Span::styled(format!("  {}", note.summary), style),
                        ])
                    } else {
                        Line::from(vec![
                            Span::styled(format!("  {}", note.title), Style::default().fg(Color::Gray)),
                            Span::styled(
                                format!("  {}", note.summary),
                                Style::default().fg(Color::DarkGray),
                            ),
                        ])
                    }
                })
                .collect()
        };

        let result_block = Paragraph::new(results).block(
            Block::default()
                .borders(Borders::LEFT | Borders::RIGHT)
                .style(Style::default().bg(Color::Rgb(10, 10, 18))),
        );
        frame.render_widget(result_block, chunks[1]);

        let footer = Paragraph::new(
            " Enter: open  Tab: archive view  Ctrl+A: archive/restore  Ctrl+N: new  Esc: close ",
        )
        .block(
            Block::default().borders(Borders::ALL).style(
                Style::default()
                    .bg(Color::Rgb(15, 15, 24))
                    .fg(Color::DarkGray),
            ),
        );
        frame.render_widget(footer, chunks[2]);

        let cursor_x = chunks[0].x + 1 + self.notes.query.chars().count() as u16;
        let cursor_y = chunks[0].y + 1;
        frame.set_cursor_position((cursor_x, cursor_y));
    }

    fn render_command_overlay(&self, frame: &mut Frame) {
        let area = centered_rect(70, 20, frame.area());
        frame.render_widget(Clear, area);

        let prompt = Paragraph::new(format!(":{}", self.command_input)).block(
            Block::default()
                .title(" Command ")
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Rgb(15, 15, 24))),
        );
        frame.render_widget(prompt, area);

        let cursor_x = area.x + 2 + self.command_input.chars().count() as u16;
        let cursor_y = area.y + 1;
        frame.set_cursor_position((cursor_x, cursor_y));
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn same_file_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }

    let a_canon = std::fs::canonicalize(a);
    let b_canon = std::fs::canonicalize(b);
    matches!((a_canon, b_canon), (Ok(ca), Ok(cb)) if ca == cb)
}

/// Write through a sibling `.tmp` file so a crash never leaves half a note.
fn write_atomic(path: &Path, rope: &ropey::Rope) -> Result<()> {
    use std::io::Write;

    let tmp = path.with_extension("tmp");
    let file = std::fs::File::create(&tmp)?;
    let mut writer = std::io::BufWriter::new(file);
    for chunk in rope.chunks() {
        writer.write_all(chunk.as_bytes())?;
    }
    writer.flush()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn spawn_buffer_save(path: PathBuf, rope: ropey::Rope) {
    std::thread::spawn(move || {
        if let Err(e) = write_atomic(&path, &rope) {
            tracing::error!("save failed: {e}");
        }
    });
}

fn render_markdown_line(text: &str, code_block_lang: &mut Option<String>) -> Line<'static> {
    if let Some(lang) = parse_code_fence_language(text) {
        if code_block_lang.is_some() {
            *code_block_lang = None;
        } else {
            *code_block_lang = Some(lang);
        }
        return Line::from(Span::styled(
            text.to_string(),
            Style::default()
                .fg(Color::Rgb(180, 180, 200))
                .bg(Color::Rgb(25, 25, 42))
                .add_modifier(Modifier::BOLD),
        ));
    }

    if let Some(lang) = code_block_lang.as_deref() {
        return render_code_block_line(text, lang);
    }

    if markdown::is_thematic_break(text) {
        return Line::from(Span::styled(
            text.to_string(),
            Style::default().fg(Color::DarkGray),
        ));
    }

    render_inline_markdown(text, base_markdown_style(text))
}

fn render_code_block_line(text: &str, language: &str) -> Line<'static> {
    let plain = || {
        Line::from(Span::styled(
            text.to_string(),
            Style::default()
                .fg(Color::Rgb(200, 200, 200))
                .bg(Color::Rgb(18, 18, 28)),
        ))
    };

    let syntax = SYNTAX_SET
        .find_syntax_by_token(language)
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, &SYNTECT_THEME);

    let Ok(tokens) = highlighter.highlight_line(text, &SYNTAX_SET) else {
        return plain();
    };

    let spans: Vec<Span<'static>> = tokens
        .into_iter()
        .map(|(style, segment)| Span::styled(segment.to_string(), syntect_to_ratatui(style)))
        .collect();

    if spans.is_empty() {
        plain()
    } else {
        Line::from(spans)
    }
}

fn base_markdown_style(text: &str) -> Style {
    match BlockMarker::detect(text.trim_start()).0 {
        BlockMarker::Heading(1) => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        BlockMarker::Heading(2) => Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
        BlockMarker::Heading(_) => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        BlockMarker::Quote => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
        BlockMarker::Task => Style::default().fg(Color::LightGreen),
        BlockMarker::Bullet | BlockMarker::Ordered => Style::default().fg(Color::LightCyan),
        BlockMarker::Paragraph => Style::default().fg(Color::Gray),
    }
}

fn render_inline_markdown(text: &str, base_style: Style) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut cursor = 0;

    while cursor < text.len() {
        let Some((start, end, kind)) = next_markdown_token(text, cursor) else {
            spans.push(Span::styled(text[cursor..].to_string(), base_style));
            break;
        };

        if start > cursor {
            spans.push(Span::styled(text[cursor..start].to_string(), base_style));
        }

        let token_style = match kind {
            TokenKind::Link => base_style
                .fg(Color::Rgb(255, 102, 0))
                .add_modifier(Modifier::UNDERLINED),
            TokenKind::InlineCode => base_style
                .fg(Color::Rgb(220, 220, 220))
                .bg(Color::Rgb(32, 32, 48)),
            TokenKind::Bold => base_style.add_modifier(Modifier::BOLD),
            TokenKind::Italic => base_style.add_modifier(Modifier::ITALIC),
        };

        spans.push(Span::styled(text[start..end].to_string(), token_style));
        cursor = end;
    }

    if spans.is_empty() {
        Line::from(Span::styled(text.to_string(), base_style))
    } else {
        Line::from(spans)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Link,
    InlineCode,
    Bold,
    Italic,
}

fn next_markdown_token(text: &str, start_at: usize) -> Option<(usize, usize, TokenKind)> {
    let candidates = [
        (&*INLINE_CODE_RE, TokenKind::InlineCode),
        (&*LINK_RE, TokenKind::Link),
        (&*BOLD_RE, TokenKind::Bold),
        (&*ITALIC_RE, TokenKind::Italic),
    ];

    // Earliest match wins; ties go to the earlier entry above.
    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(priority, (re, kind))| {
            re.find_at(text, start_at)
                .map(|m| ((m.start(), m.end(), kind), priority))
        })
        .min_by(|((sa, _, _), pa), ((sb, _, _), pb)| sa.cmp(sb).then(pa.cmp(pb)))
        .map(|(hit, _)| hit)
}

fn parse_code_fence_language(line: &str) -> Option<String> {
    if !markdown::is_code_fence(line) {
        return None;
    }

    let lang = line.trim_start().trim_start_matches("```").trim();
    if lang.is_empty() {
        Some("text".to_string())
    } else {
        Some(lang.to_string())
    }
}

fn syntect_to_ratatui(style: syntect::highlighting::Style) -> Style {
    let mut rat_style = Style::default()
        .fg(Color::Rgb(
            style.foreground.r,
            style.foreground.g,
            style.foreground.b,
        ))
        .bg(Color::Rgb(
            style.background.r,
            style.background.g,
            style.background.b,
        ));

    if style.font_style.contains(FontStyle::BOLD) {
        rat_style = rat_style.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        rat_style = rat_style.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        rat_style = rat_style.add_modifier(Modifier::UNDERLINED);
    }

    rat_style
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use tempfile::TempDir;

    fn test_app() -> (App, TempDir, mpsc::Receiver<Msg>) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::from_layers(None).unwrap();
        config.general.vault_path = dir.path().to_string_lossy().to_string();
        let (tx, rx) = mpsc::channel();
        let app = App::new(config, tx).unwrap();
        (app, dir, rx)
    }

    fn key(app: &mut App, code: KeyCode) {
        app.update(Msg::Key(KeyEvent::new(code, KeyModifiers::NONE)))
            .unwrap();
    }

    fn ctrl(app: &mut App, ch: char) {
        app.update(Msg::Key(KeyEvent::new(
            KeyCode::Char(ch),
            KeyModifiers::CONTROL,
        )))
        .unwrap();
    }

    fn type_str(app: &mut App, text: &str) {
        for ch in text.chars() {
            key(app, KeyCode::Char(ch));
        }
    }

    fn draw(app: &mut App) {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| app.view(f)).unwrap();
    }

    #[test]
    fn slash_palette_turns_line_into_heading() {
        let (mut app, _dir, _rx) = test_app();
        key(&mut app, KeyCode::Char('i'));
        type_str(&mut app, "/");
        draw(&mut app);
        assert!(app.palette.is_open());

        type_str(&mut app, "head");
        key(&mut app, KeyCode::Down);
        key(&mut app, KeyCode::Enter);

        assert_eq!(app.buffer.text(), "## ");
        assert_eq!(app.buffer.cursor_char(), 3);
        assert_eq!(app.mode, Mode::Insert);
        assert!(!app.palette.is_open());
        assert!(app.buffer.save_debounce.is_some());
    }

    #[test]
    fn escape_dismisses_palette_before_leaving_insert() {
        let (mut app, _dir, _rx) = test_app();
        key(&mut app, KeyCode::Char('i'));
        type_str(&mut app, "/");
        draw(&mut app);

        key(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, Mode::Insert);
        assert!(!app.palette.is_open());
        assert_eq!(app.buffer.text(), "/");

        key(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn undo_closes_palette() {
        let (mut app, _dir, _rx) = test_app();
        key(&mut app, KeyCode::Char('i'));
        type_str(&mut app, "/");
        draw(&mut app);
        ctrl(&mut app, 'z');
        assert!(!app.palette.is_open());
        assert_eq!(app.buffer.text(), "");
    }

    #[test]
    fn note_list_opens_selected_note() {
        let (mut app, dir, rx) = test_app();
        let note = dir.path().join("plan.md");
        std::fs::write(&note, "# Plan\n\nShip it\n").unwrap();

        ctrl(&mut app, 'o');
        assert_eq!(app.mode, Mode::NoteList);
        type_str(&mut app, "plan");
        key(&mut app, KeyCode::Enter);
        while let Ok(msg) = rx.try_recv() {
            app.update(msg).unwrap();
        }

        assert_eq!(app.buffer.path.as_deref(), Some(note.as_path()));
        assert_eq!(app.buffer.text(), "# Plan\n\nShip it\n");
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn new_command_creates_and_opens_note() {
        let (mut app, dir, _rx) = test_app();
        key(&mut app, KeyCode::Char(':'));
        type_str(&mut app, "new journal");
        key(&mut app, KeyCode::Enter);

        let path = dir.path().join("journal.md");
        assert!(path.exists());
        assert_eq!(app.buffer.path.as_deref(), Some(path.as_path()));
        assert_eq!(app.buffer.text(), "# journal\n\n");
    }

    #[test]
    fn shutdown_flushes_pending_edits() {
        let (mut app, dir, _rx) = test_app();
        key(&mut app, KeyCode::Char('i'));
        type_str(&mut app, "hi");
        app.shutdown().unwrap();
        let saved = std::fs::read_to_string(dir.path().join("scratch.md")).unwrap();
        assert_eq!(saved, "hi");
        assert!(!app.buffer.dirty);
    }

    #[test]
    fn status_shows_highlighted_block() {
        let (mut app, _dir, _rx) = test_app();
        key(&mut app, KeyCode::Char('i'));
        type_str(&mut app, "/h");
        assert_eq!(app.palette_status(), "");

        draw(&mut app);
        assert_eq!(app.palette_status(), " | block: h > Heading 1");
        key(&mut app, KeyCode::Down);
        assert_eq!(app.palette_status(), " | block: h > Heading 2");

        type_str(&mut app, "zz");
        assert_eq!(app.palette_status(), " | block: hzz (no match)");
    }

    #[test]
    fn quit_command_flushes_then_stops() {
        let (mut app, dir, _rx) = test_app();
        key(&mut app, KeyCode::Char('i'));
        type_str(&mut app, "draft");
        key(&mut app, KeyCode::Esc);
        key(&mut app, KeyCode::Char(':'));
        type_str(&mut app, "q");
        key(&mut app, KeyCode::Enter);

        assert!(app.should_quit);
        app.shutdown().unwrap();
        let saved = std::fs::read_to_string(dir.path().join("scratch.md")).unwrap();
        assert_eq!(saved, "draft");
    }

    #[test]
    fn inline_tokens_pick_earliest_match() {
        let hit = next_markdown_token("see `code` and **bold**", 0);
        assert_eq!(hit, Some((4, 10, TokenKind::InlineCode)));
        let hit = next_markdown_token("see `code` and **bold**", 10);
        assert_eq!(hit, Some((15, 23, TokenKind::Bold)));
        assert_eq!(parse_code_fence_language("```rust"), Some("rust".to_string()));
        assert_eq!(parse_code_fence_language("  ```"), Some("text".to_string()));
    }
}
