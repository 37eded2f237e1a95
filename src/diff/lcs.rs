use std::ops::Range;

use super::{DiffHunk, DiffLine, DiffLineKind};

/// Split text into lines the way the diff views count them. Empty input has
/// no lines at all rather than one empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.lines().collect()
    }
}

/// Contiguous change runs between `old` and `new`. Deletions directly
/// followed by insertions form a single replace hunk.
pub fn compute_hunks(old: &[&str], new: &[&str]) -> Vec<DiffHunk> {
    let matches = lcs_pairs(old, new);
    let mut hunks = Vec::new();
    let mut old_index = 0usize;
    let mut new_index = 0usize;

    for (old_match, new_match) in matches
        .iter()
        .copied()
        .chain(std::iter::once((old.len(), new.len())))
    {
        if old_match > old_index || new_match > new_index {
            hunks.push(DiffHunk {
                old_start: old_index,
                old_count: old_match - old_index,
                new_start: new_index,
                new_count: new_match - new_index,
            });
        }
        old_index = old_match + 1;
        new_index = new_match + 1;
    }
    hunks
}

/// Every line of both inputs tagged as context, deletion or insertion, with
/// 1-based line numbers on the side(s) it belongs to.
pub fn diff_lines(old: &[&str], new: &[&str]) -> Vec<DiffLine> {
    let mut out = Vec::with_capacity(old.len() + new.len());
    let mut old_index = 0usize;
    let mut new_index = 0usize;

    for (old_match, new_match) in lcs_pairs(old, new)
        .into_iter()
        .chain(std::iter::once((old.len(), new.len())))
    {
        while old_index < old_match {
            out.push(DiffLine {
                kind: DiffLineKind::Delete,
                text: old[old_index].to_string(),
                old_line: Some(old_index + 1),
                new_line: None,
            });
            old_index += 1;
        }
        while new_index < new_match {
            out.push(DiffLine {
                kind: DiffLineKind::Insert,
                text: new[new_index].to_string(),
                old_line: None,
                new_line: Some(new_index + 1),
            });
            new_index += 1;
        }
        if old_match < old.len() && new_match < new.len() {
            out.push(DiffLine {
                kind: DiffLineKind::Context,
                text: old[old_match].to_string(),
                old_line: Some(old_match + 1),
                new_line: Some(new_match + 1),
            });
            old_index = old_match + 1;
            new_index = new_match + 1;
        }
    }
    out
}

/// Ranges of `lines` to show: every change plus `context` lines around it,
/// with overlapping windows merged.
pub fn hunk_windows(lines: &[DiffLine], context: usize) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        if line.kind == DiffLineKind::Context {
            continue;
        }

        let start = index.saturating_sub(context);
        let end = (index + context + 1).min(lines.len());
        if let Some(previous) = ranges.last_mut() {
            if start <= previous.end {
                previous.end = previous.end.max(end);
                continue;
            }
        }
        ranges.push(start..end);
    }

    ranges
}

/// Index pairs of one longest common subsequence, in order.
pub(crate) fn lcs_pairs<T: PartialEq>(old: &[T], new: &[T]) -> Vec<(usize, usize)> {
    let table = lcs_table(old, new);
    let mut pairs = Vec::with_capacity(table[0][0]);
    let mut old_index = 0usize;
    let mut new_index = 0usize;

    while old_index < old.len() && new_index < new.len() {
        if old[old_index] == new[new_index] {
            pairs.push((old_index, new_index));
            old_index += 1;
            new_index += 1;
        } else if table[old_index + 1][new_index] >= table[old_index][new_index + 1] {
            old_index += 1;
        } else {
            new_index += 1;
        }
    }
    pairs
}

/// `table[i][j]` is the LCS length of `old[i..]` and `new[j..]`.
fn lcs_table<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Vec<usize>> {
    let mut table = vec![vec![0usize; new.len() + 1]; old.len() + 1];

    for old_index in (0..old.len()).rev() {
        for new_index in (0..new.len()).rev() {
            table[old_index][new_index] = if old[old_index] == new[new_index] {
                table[old_index + 1][new_index + 1] + 1
            } else {
                table[old_index + 1][new_index].max(table[old_index][new_index + 1])
            };
        }
    }

    table
}
