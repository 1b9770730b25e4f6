use super::SlashError;
use super::host::{EditContext, TextRange};
use crate::model::markdown::BlockMarker;

/// The structural edits the palette can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCommand {
    Paragraph,
    Heading(u8),
    BulletList,
    OrderedList,
    TaskList,
    Blockquote,
    CodeBlock,
    Divider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconTag {
    Text,
    Heading1,
    Heading2,
    Heading3,
    List,
    ListOrdered,
    CheckSquare,
    Quote,
    Code,
    Minus,
}

impl IconTag {
    /// Two-cell glyph shown in the overlay gutter.
    pub fn glyph(self) -> &'static str {
        match self {
            IconTag::Text => "¶ ",
            IconTag::Heading1 => "H1",
            IconTag::Heading2 => "H2",
            IconTag::Heading3 => "H3",
            IconTag::List => "• ",
            IconTag::ListOrdered => "1.",
            IconTag::CheckSquare => "☐ ",
            IconTag::Quote => "❝ ",
            IconTag::Code => "{}",
            IconTag::Minus => "──",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub icon: IconTag,
    pub command: BlockCommand,
}

impl CommandEntry {
    /// Delete `range` and turn the line it started on into this entry's block.
    pub fn apply<C: EditContext>(&self, ctx: &mut C, range: TextRange) -> Result<(), SlashError> {
        ctx.replace(range, "")?;

        let line = ctx
            .line_span(range.from)
            .ok_or(SlashError::OutOfBounds {
                pos: range.from,
                len: ctx.len_chars(),
            })?;
        let text = ctx.slice(line).unwrap_or_default();
        let (current, marker_len) = BlockMarker::detect(&text);
        let marker = TextRange::new(line.from, line.from + marker_len);

        match self.command {
            BlockCommand::Paragraph => ctx.replace(marker, ""),
            BlockCommand::Heading(level) => {
                ctx.replace(marker, &BlockMarker::Heading(level).prefix())
            }
            BlockCommand::Blockquote => ctx.replace(marker, &BlockMarker::Quote.prefix()),
            BlockCommand::BulletList => toggle(ctx, marker, current, BlockMarker::Bullet),
            BlockCommand::OrderedList => toggle(ctx, marker, current, BlockMarker::Ordered),
            BlockCommand::TaskList => toggle(ctx, marker, current, BlockMarker::Task),
            BlockCommand::CodeBlock => {
                ctx.replace(marker, "")?;
                let line = ctx.line_span(line.from).unwrap_or(line);
                ctx.insert_trailing(line.to, "\n```")?;
                ctx.replace(TextRange::new(line.from, line.from), "```\n")
            }
            BlockCommand::Divider => {
                ctx.replace(TextRange::new(line.from, line.from), "---\n")
            }
        }
    }
}

fn toggle<C: EditContext>(
    ctx: &mut C,
    marker: TextRange,
    current: BlockMarker,
    target: BlockMarker,
) -> Result<(), SlashError> {
    if current == target {
        ctx.replace(marker, "")
    } else {
        ctx.replace(marker, &target.prefix())
    }
}

fn entry(
    id: &'static str,
    label: &'static str,
    description: &'static str,
    icon: IconTag,
    command: BlockCommand,
) -> CommandEntry {
    CommandEntry {
        id,
        label,
        description,
        icon,
        command,
    }
}

/// The ordered, immutable set of palette commands.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CommandEntry>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                entry(
                    "text",
                    "Text",
                    "Plain text paragraph",
                    IconTag::Text,
                    BlockCommand::Paragraph,
                ),
                entry(
                    "heading-1",
                    "Heading 1",
                    "Large section heading",
                    IconTag::Heading1,
                    BlockCommand::Heading(1),
                ),
                entry(
                    "heading-2",
                    "Heading 2",
                    "Medium section heading",
                    IconTag::Heading2,
                    BlockCommand::Heading(2),
                ),
                entry(
                    "heading-3",
                    "Heading 3",
                    "Small section heading",
                    IconTag::Heading3,
                    BlockCommand::Heading(3),
                ),
                entry(
                    "bullet-list",
                    "Bullet List",
                    "Create a simple bulleted list",
                    IconTag::List,
                    BlockCommand::BulletList,
                ),
                entry(
                    "ordered-list",
                    "Ordered List",
                    "Create a numbered list",
                    IconTag::ListOrdered,
                    BlockCommand::OrderedList,
                ),
                entry(
                    "task-list",
                    "Task List",
                    "Track tasks with checkboxes",
                    IconTag::CheckSquare,
                    BlockCommand::TaskList,
                ),
                entry(
                    "blockquote",
                    "Blockquote",
                    "Capture a quote",
                    IconTag::Quote,
                    BlockCommand::Blockquote,
                ),
                entry(
                    "code-block",
                    "Code Block",
                    "Capture a code snippet",
                    IconTag::Code,
                    BlockCommand::CodeBlock,
                ),
                entry(
                    "divider",
                    "Divider",
                    "Visual divider line",
                    IconTag::Minus,
                    BlockCommand::Divider,
                ),
            ],
        }
    }

    pub fn list(&self) -> &[CommandEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&CommandEntry> {
        self.entries.get(index)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::buffer::Buffer;
    use crate::slash::host::EditHost;

    fn run(text: &str, range: TextRange, id: &str) -> String {
        let catalog = Catalog::builtin();
        let entry = catalog.list().iter().find(|e| e.id == id).unwrap();
        let mut buffer = Buffer::from_text(text);
        let mut edit = buffer.begin_edit();
        entry.apply(&mut edit, range).unwrap();
        edit.commit();
        buffer.text()
    }

    #[test]
    fn builtin_order_is_fixed() {
        let labels: Vec<_> = Catalog::builtin().list().iter().map(|e| e.label).collect();
        assert_eq!(
            labels,
            [
                "Text",
                "Heading 1",
                "Heading 2",
                "Heading 3",
                "Bullet List",
                "Ordered List",
                "Task List",
                "Blockquote",
                "Code Block",
                "Divider",
            ]
        );
    }

    #[test]
    fn heading_replaces_existing_marker() {
        assert_eq!(run("- /h2 shopping", TextRange::new(2, 6), "heading-2"), "## shopping");
        assert_eq!(run("/h1", TextRange::new(0, 3), "heading-1"), "# ");
    }

    #[test]
    fn paragraph_strips_marker() {
        assert_eq!(run("> quote /text", TextRange::new(8, 13), "text"), "quote ");
    }

    #[test]
    fn lists_toggle() {
        assert_eq!(run("- item /b", TextRange::new(7, 9), "bullet-list"), "item ");
        assert_eq!(run("item /b", TextRange::new(5, 7), "bullet-list"), "- item ");
        assert_eq!(run("- a/t", TextRange::new(3, 5), "task-list"), "- [ ] a");
        assert_eq!(run("3. x /o", TextRange::new(5, 7), "ordered-list"), "x ");
    }

    #[test]
    fn only_the_range_line_is_touched() {
        let text = "first\n/quote\nlast";
        assert_eq!(
            run(text, TextRange::new(6, 12), "blockquote"),
            "first\n> \nlast"
        );
    }

    #[test]
    fn code_block_fences_the_line() {
        assert_eq!(
            run("a\nlet x/code\nb", TextRange::new(7, 12), "code-block"),
            "a\n```\nlet x\n```\nb"
        );
    }

    #[test]
    fn divider_goes_above_the_line() {
        assert_eq!(run("top\n/div", TextRange::new(4, 8), "divider"), "top\n---\n");
    }
}
