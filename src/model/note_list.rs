use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use ignore::WalkBuilder;
use slotmap::{SlotMap, new_key_type};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::markdown;

pub const ARCHIVE_DIR: &str = "archive";
const SUMMARY_LEN: usize = 60;

new_key_type! {
    pub struct NoteKey;
}

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("note name is empty")]
    EmptyName,
    #[error("invalid note name: {0}")]
    InvalidName(String),
    #[error("a note already exists at {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct NoteEntry {
    pub path: PathBuf,
    pub title: String,
    pub summary: String,
    pub archived: bool,
}

/// Every Markdown note in the vault, plus the filtered view shown in the
/// note list. `archive/` holds archived notes.
pub struct NoteList {
    root: PathBuf,
    notes: SlotMap<NoteKey, NoteEntry>,
    results: Vec<NoteKey>,
    pub query: String,
    pub show_archived: bool,
    pub selected: usize,
    max_results: usize,
}

impl NoteList {
    pub fn new(root: PathBuf, max_results: usize) -> Result<Self, NoteError> {
        let mut list = Self {
            root,
            notes: SlotMap::with_key(),
            results: Vec::new(),
            query: String::new(),
            show_archived: false,
            selected: 0,
            max_results: max_results.max(1),
        };
        list.refresh()?;
        Ok(list)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    /// Re-scan the vault and re-apply the current query.
    pub fn refresh(&mut self) -> Result<(), NoteError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }

        let archive = self.archive_dir();
        self.notes.clear();

        for entry in WalkBuilder::new(&self.root).hidden(false).build().flatten() {
            let path = entry.path();
            let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
            if !is_file || path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }

            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!("skipping unreadable note {}: {err}", path.display());
                    continue;
                }
            };
            let outline = markdown::outline(&text, SUMMARY_LEN);
            let title = outline.title.unwrap_or_else(|| file_title(path));

            self.notes.insert(NoteEntry {
                path: path.to_path_buf(),
                title,
                summary: outline.summary,
                archived: path.starts_with(&archive),
            });
        }

        self.apply_query();
        Ok(())
    }

    pub fn results(&self) -> impl Iterator<Item = &NoteEntry> {
        self.results.iter().filter_map(|key| self.notes.get(*key))
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn selected_note(&self) -> Option<&NoteEntry> {
        self.results
            .get(self.selected)
            .and_then(|key| self.notes.get(*key))
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.apply_query();
    }

    pub fn push_query_char(&mut self, ch: char) {
        self.query.push(ch);
        self.apply_query();
    }

    pub fn pop_query_char(&mut self) {
        self.query.pop();
        self.apply_query();
    }

    pub fn toggle_archived(&mut self) {
        self.show_archived = !self.show_archived;
        self.selected = 0;
        self.apply_query();
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.results.is_empty() {
            self.selected = 0;
            return;
        }

        let max = self.results.len().saturating_sub(1) as isize;
        let next = (self.selected as isize + delta).clamp(0, max);
        self.selected = next as usize;
    }

    /// Move the selected note into `archive/`, or back out of it when the
    /// archive view is showing. Returns the note's new path.
    pub fn toggle_archive_selected(&mut self) -> Result<Option<PathBuf>, NoteError> {
        let Some(note) = self.selected_note() else {
            return Ok(None);
        };
        let Some(name) = note.path.file_name() else {
            return Ok(None);
        };

        let target_dir = if note.archived {
            self.root.clone()
        } else {
            self.archive_dir()
        };
        let target = target_dir.join(name);
        if target.exists() {
            return Err(NoteError::AlreadyExists(target));
        }

        let from = note.path.clone();
        fs::create_dir_all(&target_dir)?;
        fs::rename(&from, &target)?;
        tracing::info!("moved note {} -> {}", from.display(), target.display());

        self.refresh()?;
        Ok(Some(target))
    }

    /// Create `<name>.md` at the vault root with a title heading.
    pub fn create(&mut self, name: &str) -> Result<PathBuf, NoteError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NoteError::EmptyName);
        }
        if Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name) {
            return Err(NoteError::InvalidName(name.to_string()));
        }

        let mut target = self.root.join(name);
        if target.extension().is_none() {
            target.set_extension("md");
        }
        if target.exists() {
            return Err(NoteError::AlreadyExists(target));
        }

        let title = target
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled");
        fs::create_dir_all(&self.root)?;
        fs::write(&target, format!("# {title}\n\n"))?;

        self.refresh()?;
        Ok(target)
    }

    fn apply_query(&mut self) {
        let show_archived = self.show_archived;
        let candidates = self
            .notes
            .iter()
            .filter(|(_, note)| note.archived == show_archived);

        if self.query.is_empty() {
            let mut keys: Vec<(NoteKey, String)> = candidates
                .map(|(key, note)| (key, note.title.to_lowercase()))
                .collect();
            keys.sort_by(|a, b| a.1.cmp(&b.1));
            self.results = keys
                .into_iter()
                .take(self.max_results)
                .map(|(key, _)| key)
                .collect();
        } else {
            let matcher = SkimMatcherV2::default();
            let mut scored: Vec<(i64, NoteKey)> = candidates
                .filter_map(|(key, note)| {
                    let haystack = format!("{} {}", note.title, file_title(&note.path));
                    matcher
                        .fuzzy_match(&haystack, &self.query)
                        .map(|score| (score, key))
                })
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            self.results = scored
                .into_iter()
                .take(self.max_results)
                .map(|(_, key)| key)
                .collect();
        }

        if self.results.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.results.len() {
            self.selected = self.results.len() - 1;
        }
    }
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Untitled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("groceries.md"), "# Groceries\n\nMilk and eggs\n").unwrap();
        fs::write(dir.path().join("ideas.md"), "Untitled thoughts\n").unwrap();
        fs::write(dir.path().join("readme.txt"), "not a note").unwrap();
        fs::create_dir_all(dir.path().join(ARCHIVE_DIR)).unwrap();
        fs::write(dir.path().join(ARCHIVE_DIR).join("old.md"), "# Old plan\n").unwrap();
        dir
    }

    fn titles(list: &NoteList) -> Vec<String> {
        list.results().map(|n| n.title.clone()).collect()
    }

    #[test]
    fn lists_active_notes_with_outline() {
        let dir = vault();
        let list = NoteList::new(dir.path().to_path_buf(), 50).unwrap();

        assert_eq!(list.notes.len(), 3);
        assert_eq!(titles(&list), ["Groceries", "ideas"]);
        let first = list.selected_note().unwrap();
        assert_eq!(first.summary, "Milk and eggs");
        assert!(!first.archived);
    }

    #[test]
    fn archive_view_shows_archived_only() {
        let dir = vault();
        let mut list = NoteList::new(dir.path().to_path_buf(), 50).unwrap();
        list.toggle_archived();
        assert_eq!(titles(&list), ["Old plan"]);
    }

    #[test]
    fn fuzzy_query_filters_and_ranks() {
        let dir = vault();
        let mut list = NoteList::new(dir.path().to_path_buf(), 50).unwrap();
        list.set_query("grc");
        assert_eq!(titles(&list), ["Groceries"]);

        list.set_query("zzz");
        assert_eq!(list.result_count(), 0);
        assert!(list.selected_note().is_none());
    }

    #[test]
    fn archive_and_restore_move_files() {
        let dir = vault();
        let mut list = NoteList::new(dir.path().to_path_buf(), 50).unwrap();

        let moved = list.toggle_archive_selected().unwrap().unwrap();
        assert_eq!(moved, dir.path().join(ARCHIVE_DIR).join("groceries.md"));
        assert!(!dir.path().join("groceries.md").exists());
        assert_eq!(titles(&list), ["ideas"]);

        list.toggle_archived();
        list.set_query("groceries");
        let restored = list.toggle_archive_selected().unwrap().unwrap();
        assert_eq!(restored, dir.path().join("groceries.md"));
        assert!(restored.exists());
    }

    #[test]
    fn create_writes_title_heading() {
        let dir = vault();
        let mut list = NoteList::new(dir.path().to_path_buf(), 50).unwrap();

        let path = list.create("journal").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# journal\n\n");
        assert!(titles(&list).contains(&"journal".to_string()));

        assert!(matches!(list.create("journal"), Err(NoteError::AlreadyExists(_))));
        assert!(matches!(list.create("  "), Err(NoteError::EmptyName)));
        assert!(matches!(list.create("../escape"), Err(NoteError::InvalidName(_))));
    }

    #[test]
    fn results_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("n{i}.md")), "x").unwrap();
        }
        let list = NoteList::new(dir.path().to_path_buf(), 3).unwrap();
        assert_eq!(list.result_count(), 3);
    }
}
