use super::SlashError;
use super::catalog::CommandEntry;
use super::host::{EditContext, EditHost, TextRange};

/// Run `entry` against `range` as one transaction.
///
/// The range must still start with `trigger`; otherwise nothing is touched and
/// `StaleRangeOnExecute` is returned. A failure inside the command drops the
/// transaction, which restores the document.
pub fn execute<H: EditHost>(
    entry: &CommandEntry,
    range: TextRange,
    trigger: char,
    host: &mut H,
) -> Result<(), SlashError> {
    let stale = SlashError::StaleRangeOnExecute {
        from: range.from,
        to: range.to,
    };
    if range.is_empty() || range.to > host.len_chars() {
        return Err(stale);
    }
    if host.char_at(range.from) != Some(trigger) {
        return Err(stale);
    }

    let mut edit = host.begin_edit();
    entry.apply(&mut edit, range)?;
    let focus = edit.map_pos(range.from);
    edit.set_cursor(focus);
    edit.commit();

    tracing::debug!(command = entry.id, from = range.from, to = range.to, "slash command applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::buffer::Buffer;
    use crate::slash::catalog::Catalog;

    fn entry(id: &str) -> CommandEntry {
        Catalog::builtin()
            .list()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .unwrap()
    }

    #[test]
    fn replaces_range_and_focuses_after_marker() {
        let mut buffer = Buffer::from_text("intro\n/head");
        execute(&entry("heading-1"), TextRange::new(6, 11), '/', &mut buffer).unwrap();
        assert_eq!(buffer.text(), "intro\n# ");
        assert_eq!(buffer.cursor_char(), 8);
        assert!(buffer.dirty);
    }

    #[test]
    fn code_block_focus_lands_inside_fence() {
        let mut buffer = Buffer::from_text("/code");
        execute(&entry("code-block"), TextRange::new(0, 5), '/', &mut buffer).unwrap();
        assert_eq!(buffer.text(), "```\n\n```");
        assert_eq!(buffer.cursor_char(), 4);
    }

    #[test]
    fn single_undo_restores_trigger_text() {
        let mut buffer = Buffer::from_text("/quo");
        execute(&entry("blockquote"), TextRange::new(0, 4), '/', &mut buffer).unwrap();
        assert_eq!(buffer.text(), "> ");
        assert!(buffer.undo());
        assert_eq!(buffer.text(), "/quo");
    }

    #[test]
    fn stale_range_aborts_without_edit() {
        let mut buffer = Buffer::from_text("abc");
        let err = execute(&entry("heading-1"), TextRange::new(0, 2), '/', &mut buffer);
        assert_eq!(err, Err(SlashError::StaleRangeOnExecute { from: 0, to: 2 }));

        let err = execute(&entry("heading-1"), TextRange::new(2, 8), '/', &mut buffer);
        assert!(matches!(err, Err(SlashError::StaleRangeOnExecute { .. })));
        assert_eq!(buffer.text(), "abc");
        assert_eq!(buffer.undo_depth(), 0);
    }
}
