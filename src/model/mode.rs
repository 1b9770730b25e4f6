/// Application interaction modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Navigation and commands.
    #[default]
    Normal,
    /// Text editing. The slash palette only runs here.
    Insert,
    /// Command line (`:` prefix).
    Command,
    /// Note list overlay with search and archive.
    NoteList,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Insert => "INSERT",
            Mode::Command => "COMMAND",
            Mode::NoteList => "NOTES",
        }
    }
}
