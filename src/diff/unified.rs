use regex::Regex;
use std::sync::LazyLock;

use super::{DiffHunk, DiffLine, DiffLineKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedHunk {
    pub header: DiffHunk,
    pub lines: Vec<DiffLine>,
}

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
});

/// Parse pre-formatted unified diff text. File headers and anything before
/// the first hunk are ignored; `\ No newline at end of file` lines are
/// skipped.
pub fn parse_unified_diff(text: &str) -> Vec<UnifiedHunk> {
    let mut hunks: Vec<UnifiedHunk> = Vec::new();
    let mut old_line = 0usize;
    let mut new_line = 0usize;

    for raw in text.lines() {
        if let Some(caps) = HUNK_HEADER.captures(raw) {
            let number = |index: usize, default: usize| {
                caps.get(index)
                    .and_then(|m| m.as_str().parse::<usize>().ok())
                    .unwrap_or(default)
            };
            let old_start = number(1, 1);
            let old_count = number(2, 1);
            let new_start = number(3, 1);
            let new_count = number(4, 1);
            old_line = old_start;
            new_line = new_start;
            hunks.push(UnifiedHunk {
                header: DiffHunk {
                    old_start: old_start.saturating_sub(1),
                    old_count,
                    new_start: new_start.saturating_sub(1),
                    new_count,
                },
                lines: Vec::new(),
            });
            continue;
        }

        let Some(hunk) = hunks.last_mut() else {
            continue;
        };
        let line = match raw.as_bytes().first() {
            Some(b'\\') => continue,
            Some(b'+') => {
                let line = DiffLine {
                    kind: DiffLineKind::Insert,
                    text: raw[1..].to_string(),
                    old_line: None,
                    new_line: Some(new_line),
                };
                new_line += 1;
                line
            }
            Some(b'-') => {
                let line = DiffLine {
                    kind: DiffLineKind::Delete,
                    text: raw[1..].to_string(),
                    old_line: Some(old_line),
                    new_line: None,
                };
                old_line += 1;
                line
            }
            Some(b' ') | None => {
                let line = DiffLine {
                    kind: DiffLineKind::Context,
                    text: raw.get(1..).unwrap_or("").to_string(),
                    old_line: Some(old_line),
                    new_line: Some(new_line),
                };
                old_line += 1;
                new_line += 1;
                line
            }
            Some(_) => {
                tracing::debug!(line = raw, "ignoring unrecognized unified diff line");
                continue;
            }
        };
        hunk.lines.push(line);
    }
    hunks
}
