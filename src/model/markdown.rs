use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

/// Line-level Markdown block markers that the editor knows how to rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMarker {
    Paragraph,
    Heading(u8),
    Bullet,
    Ordered,
    Task,
    Quote,
}

impl BlockMarker {
    /// Detect the marker at the start of `line` and how many chars it spans.
    pub fn detect(line: &str) -> (BlockMarker, usize) {
        let hashes = line.chars().take_while(|&c| c == '#').count();
        if (1..=6).contains(&hashes) && line[hashes..].starts_with(' ') {
            return (BlockMarker::Heading(hashes as u8), hashes + 1);
        }

        for task in ["- [ ] ", "- [x] ", "- [X] "] {
            if line.starts_with(task) {
                return (BlockMarker::Task, task.len());
            }
        }

        if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ") {
            return (BlockMarker::Bullet, 2);
        }

        if line.starts_with("> ") {
            return (BlockMarker::Quote, 2);
        }

        let digits = line.chars().take_while(char::is_ascii_digit).count();
        if digits > 0 && line[digits..].starts_with(". ") {
            return (BlockMarker::Ordered, digits + 2);
        }

        (BlockMarker::Paragraph, 0)
    }

    pub fn prefix(self) -> String {
        match self {
            BlockMarker::Paragraph => String::new(),
            BlockMarker::Heading(level) => format!("{} ", "#".repeat(level.clamp(1, 6) as usize)),
            BlockMarker::Bullet => "- ".to_string(),
            BlockMarker::Ordered => "1. ".to_string(),
            BlockMarker::Task => "- [ ] ".to_string(),
            BlockMarker::Quote => "> ".to_string(),
        }
    }
}

pub fn is_code_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

pub fn is_thematic_break(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3
        && ['-', '*', '_']
            .into_iter()
            .any(|mark| trimmed.chars().all(|c| c == mark))
}

/// Title and one-line summary of a note, taken from its Markdown source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteOutline {
    pub title: Option<String>,
    pub summary: String,
}

/// First level-1 heading becomes the title, the first paragraph the summary.
pub fn outline(source: &str, summary_len: usize) -> NoteOutline {
    let mut outline = NoteOutline::default();
    let mut in_title = false;
    let mut in_paragraph = false;
    let mut title = String::new();

    for event in Parser::new(source) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) if outline.title.is_none() => in_title = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if in_title => {
                in_title = false;
                outline.title = Some(title.trim().to_string()).filter(|t| !t.is_empty());
            }
            Event::Start(Tag::Paragraph) if outline.summary.is_empty() => in_paragraph = true,
            Event::End(TagEnd::Paragraph) if in_paragraph => in_paragraph = false,
            Event::Text(text) | Event::Code(text) => {
                if in_title {
                    title.push_str(&text);
                } else if in_paragraph {
                    outline.summary.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak if in_paragraph => outline.summary.push(' '),
            _ => {}
        }

        if outline.title.is_some() && !outline.summary.is_empty() && !in_paragraph {
            break;
        }
    }

    if outline.summary.chars().count() > summary_len {
        outline.summary = outline.summary.chars().take(summary_len).collect();
        outline.summary.push('…');
    }

    outline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_block_markers() {
        assert_eq!(BlockMarker::detect("## Title"), (BlockMarker::Heading(2), 3));
        assert_eq!(BlockMarker::detect("- [ ] todo"), (BlockMarker::Task, 6));
        assert_eq!(BlockMarker::detect("- item"), (BlockMarker::Bullet, 2));
        assert_eq!(BlockMarker::detect("12. item"), (BlockMarker::Ordered, 4));
        assert_eq!(BlockMarker::detect("> quote"), (BlockMarker::Quote, 2));
        assert_eq!(BlockMarker::detect("#hashtag"), (BlockMarker::Paragraph, 0));
        assert_eq!(BlockMarker::detect("plain"), (BlockMarker::Paragraph, 0));
    }

    #[test]
    fn thematic_breaks() {
        assert!(is_thematic_break("---"));
        assert!(is_thematic_break("  ***  "));
        assert!(!is_thematic_break("--"));
        assert!(!is_thematic_break("-*-"));
    }

    #[test]
    fn outline_takes_first_heading_and_paragraph() {
        let src = "# Groceries\n\nMilk, eggs\nand `bread`.\n\n## Later\n\nignored\n";
        let outline = outline(src, 80);
        assert_eq!(outline.title.as_deref(), Some("Groceries"));
        assert_eq!(outline.summary, "Milk, eggs and bread.");
    }

    #[test]
    fn outline_truncates_summary() {
        let outline = outline("abcdefghij", 4);
        assert_eq!(outline.title, None);
        assert_eq!(outline.summary, "abcd…");
    }
}
