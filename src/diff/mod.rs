//! Line and word diffs for inline file-edit views.

pub mod lcs;
pub mod render;
pub mod unified;
pub mod word;
pub mod wrap;

pub use lcs::{compute_hunks, diff_lines, hunk_windows, split_lines};
pub use render::{DiffRenderOptions, DiffRenderer, RenderedDiff};
pub use unified::{parse_unified_diff, UnifiedHunk};
pub use word::{tokenize, word_diff, WordDiff, WordSpan};
pub use wrap::wrap_styled_line;

/// A contiguous change region. Starts are 0-based line indexes; a zero count
/// marks a pure insertion or deletion at that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Context,
    Delete,
    Insert,
}

/// One displayed diff line. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

impl DiffLine {
    /// Line number shown in the gutter: the new-side number except for
    /// deletions.
    pub fn display_number(&self) -> Option<usize> {
        match self.kind {
            DiffLineKind::Delete => self.old_line,
            _ => self.new_line.or(self.old_line),
        }
    }
}
