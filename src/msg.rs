use crossterm::event::{KeyEvent, MouseEvent};
use std::path::PathBuf;

/// Direction for cursor movement.
#[derive(Debug, Clone, Copy)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    LineStart,
    LineEnd,
}

/// All possible messages that drive state transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Input events (raw)
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),

    // -- File I/O
    OpenFile(PathBuf),
    FileChanged(PathBuf),

    // -- System
    Tick,
}
