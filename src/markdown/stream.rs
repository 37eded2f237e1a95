//! Incremental markdown rendering for a single text segment.
//!
//! Raw text is retained in full. Committed chunks are rendered exactly once
//! per width and appended to `rendered`; the trailing open block stays raw
//! until a safe boundary closes it or the stream ends.

use regex::Regex;
use std::ops::Range;
use std::sync::{Arc, LazyLock};

use super::boundary::find_safe_boundary_with;
use super::engine::MarkdownEngine;
use crate::ui::ansi::{safe_cut_point, safe_slice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading,
    Code,
    List,
    Table,
    Quote,
    Rule,
}

#[derive(Debug, Clone)]
struct CommittedChunk {
    raw: Range<usize>,
    rendered_len: usize,
}

#[derive(Debug)]
pub struct StreamingMarkdown {
    engine: Arc<MarkdownEngine>,
    raw: String,
    committed: usize,
    chunks: Vec<CommittedChunk>,
    rendered: String,
    flushed_chunks: usize,
    flushed_bytes: usize,
    min_boundary_bytes: usize,
    /// Link reference definitions from committed chunks, kept in scope for
    /// later chunks.
    definitions: String,
}

impl StreamingMarkdown {
    pub fn new(engine: Arc<MarkdownEngine>, min_boundary_bytes: usize) -> Self {
        Self {
            engine,
            raw: String::new(),
            committed: 0,
            chunks: Vec::new(),
            rendered: String::new(),
            flushed_chunks: 0,
            flushed_bytes: 0,
            min_boundary_bytes,
            definitions: String::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.engine.width()
    }

    pub fn write(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.raw.push_str(delta);
        while let Some(boundary) = self.next_commit_point() {
            self.commit(boundary);
        }
    }

    /// Commit everything still pending. Called at end of stream.
    pub fn flush(&mut self) {
        let remaining = self.raw.len() - self.committed;
        if remaining > 0 {
            self.commit(remaining);
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn pending_markdown(&self) -> &str {
        &self.raw[self.committed..]
    }

    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    pub fn rendered_unflushed(&self) -> &str {
        safe_slice(&self.rendered, self.flushed_bytes)
    }

    pub fn has_unflushed(&self) -> bool {
        self.flushed_chunks < self.chunks.len()
    }

    pub fn mark_flushed(&mut self) {
        self.flushed_chunks = self.chunks.len();
        self.flushed_bytes = self.rendered.len();
    }

    pub fn flushed_chunks(&self) -> usize {
        self.flushed_chunks
    }

    /// Rendered output past the first `chunks` committed chunks.
    pub fn rendered_after(&self, chunks: usize) -> &str {
        let offset: usize = self
            .chunks
            .iter()
            .take(chunks)
            .map(|chunk| chunk.rendered_len)
            .sum();
        &self.rendered[safe_cut_point(&self.rendered, offset)..]
    }

    /// Rebuild the rendered buffer from retained raw chunks at a new width.
    pub fn resize(&mut self, engine: Arc<MarkdownEngine>) {
        if engine.width() == self.engine.width() {
            return;
        }
        self.engine = engine;
        self.rendered.clear();
        self.flushed_bytes = 0;
        let mut definitions = String::new();
        for index in 0..self.chunks.len() {
            let source = &self.raw[self.chunks[index].raw.clone()];
            let rendered = render_chunk(&self.engine, &definitions, source);
            definitions.push_str(&self.engine.reference_definitions(source));
            self.chunks[index].rendered_len = rendered.len();
            self.rendered.push_str(&rendered);
            if index < self.flushed_chunks {
                self.flushed_bytes = self.rendered.len();
            }
        }
        tracing::trace!(
            width = self.engine.width(),
            chunks = self.chunks.len(),
            "re-rendered streaming markdown"
        );
    }

    pub fn pending_block_kind(&self) -> Option<BlockKind> {
        let pending = self.pending_markdown();
        let (_, block) = trailing_block(pending);
        if block.trim().is_empty() {
            return None;
        }
        Some(block_kind(block))
    }

    /// Raw pending text safe to preview in the live view. An open list or a
    /// trailing table is withheld, from its first line on, until it closes.
    pub fn pending_preview(&self) -> &str {
        let pending = self.pending_markdown();
        let (start, block) = trailing_block(pending);
        let table = (block_kind(block) == BlockKind::Table)
            .then(|| table_start(block).map(|offset| start + offset))
            .flatten();
        match [open_list_start(pending), table].into_iter().flatten().min() {
            Some(cut) => &pending[..cut],
            None => pending,
        }
    }

    fn next_commit_point(&self) -> Option<usize> {
        let pending = self.pending_markdown();
        let mut candidate = find_safe_boundary_with(pending, self.min_boundary_bytes)?;
        loop {
            if self.can_commit_at(pending, candidate) {
                return Some(candidate);
            }
            // every boundary ends in "\n\n"; search strictly before this one
            let earlier = candidate.checked_sub(1)?;
            candidate = find_safe_boundary_with(&pending[..earlier], self.min_boundary_bytes)?;
        }
    }

    /// A chunk may be cut at `boundary` only when nothing after it can still
    /// belong to a block before it.
    fn can_commit_at(&self, pending: &str, boundary: usize) -> bool {
        let (prefix, rest) = pending.split_at(boundary);
        let Some(line) = rest
            .split_inclusive('\n')
            .find(|line| !line.trim().is_empty())
        else {
            return false;
        };
        let next_line = line.trim_end();
        if !line.ends_with('\n') && may_become_marker(next_line) {
            return false;
        }
        if next_line.starts_with("    ") || next_line.starts_with('\t') {
            return false;
        }
        if open_list_start(prefix).is_some()
            && (next_line.starts_with(' ') || starts_list_item(next_line))
        {
            return false;
        }
        let (_, block) = trailing_block(prefix);
        if continues_block(block_kind(block), next_line) {
            return false;
        }
        if open_html_block(prefix) || REFERENCE_DEFINITION.is_match(next_line) {
            return false;
        }
        !self
            .engine
            .has_unresolved_references(&self.definitions, prefix)
    }

    fn commit(&mut self, len: usize) {
        let start = self.committed;
        let end = start + len;
        let source = &self.raw[start..end];
        let rendered = render_chunk(&self.engine, &self.definitions, source);
        let definitions = self.engine.reference_definitions(source);
        self.definitions.push_str(&definitions);
        self.rendered.push_str(&rendered);
        self.chunks.push(CommittedChunk {
            raw: start..end,
            rendered_len: rendered.len(),
        });
        self.committed = end;
        tracing::trace!(start, end, "committed markdown chunk");
    }
}

static REFERENCE_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}\[(?:[^\]\\]|\\.)+\]:").expect("valid reference definition regex")
});

fn render_chunk(engine: &MarkdownEngine, definitions: &str, source: &str) -> String {
    match engine.render_with_definitions(definitions, source) {
        Ok(rendered) => rendered,
        Err(err) => {
            tracing::warn!(error = %err, "markdown render failed; showing raw text");
            let trimmed = source.trim_end();
            if trimmed.trim().is_empty() {
                String::new()
            } else {
                format!("{trimmed}\n\n")
            }
        }
    }
}

/// Blank-line separated blocks as (start offset, text), trailing blank
/// lines included. Blank lines inside a fenced code block do not split.
fn blocks(text: &str) -> Vec<(usize, &str)> {
    let mut fence: Option<(char, usize)> = None;
    let mut starts = vec![0usize];
    let mut offset = 0usize;
    let mut blank_run = false;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim();

        if let Some(marker) = fence_of(trimmed) {
            match fence {
                None => fence = Some(marker),
                Some((ch, len)) if ch == marker.0 && marker.1 >= len => fence = None,
                Some(_) => {}
            }
        }
        if fence.is_none() && trimmed.is_empty() {
            blank_run = true;
            continue;
        }
        if blank_run {
            if line_start > 0 {
                starts.push(line_start);
            }
            blank_run = false;
        }
    }

    let mut blocks = Vec::with_capacity(starts.len());
    for (index, &start) in starts.iter().enumerate() {
        let end = starts.get(index + 1).copied().unwrap_or(text.len());
        blocks.push((start, &text[start..end]));
    }
    blocks
}

fn trailing_block(text: &str) -> (usize, &str) {
    blocks(text).pop().unwrap_or((0, text))
}

/// Offset of the first item of a list still open at the end of `text`.
fn open_list_start(text: &str) -> Option<usize> {
    let mut open = None;
    for (start, block) in blocks(text) {
        let Some(first) = block.lines().find(|line| !line.trim().is_empty()) else {
            continue;
        };
        let continues =
            first.starts_with(' ') || first.starts_with('\t') || starts_list_item(first);
        if open.is_some() && continues {
            continue;
        }
        open = first_list_item(block).map(|offset| start + offset);
    }
    open
}

/// Offset of the first list item line in a block, skipping fenced code.
fn first_list_item(block: &str) -> Option<usize> {
    let mut fence: Option<(char, usize)> = None;
    let mut offset = 0usize;
    for line in block.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if let Some(marker) = fence_of(line.trim()) {
            match fence {
                None => fence = Some(marker),
                Some((ch, len)) if ch == marker.0 && marker.1 >= len => fence = None,
                Some(_) => {}
            }
            continue;
        }
        if fence.is_none() && starts_list_item(line) {
            return Some(line_start);
        }
    }
    None
}

/// Offset of the first table line in a block: the header row above the
/// delimiter row, or the first pipe-led row.
fn table_start(block: &str) -> Option<usize> {
    let mut offset = 0usize;
    let mut previous: Option<usize> = None;
    for line in block.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if is_table_separator(line) {
            return Some(previous.unwrap_or(line_start));
        }
        if line.trim_start().starts_with('|') {
            return Some(line_start);
        }
        if !line.trim().is_empty() {
            previous = Some(line_start);
        }
    }
    None
}

/// True when `text` ends inside a raw HTML block that only a closing
/// marker ends (`<pre>`, comments, processing instructions, CDATA).
fn open_html_block(text: &str) -> bool {
    let mut closer: Option<&'static str> = None;
    let mut fence: Option<(char, usize)> = None;
    for line in text.lines() {
        let lower = line.to_ascii_lowercase();
        if let Some(end) = closer {
            if lower.contains(end) {
                closer = None;
            }
            continue;
        }
        if let Some(marker) = fence_of(line.trim()) {
            match fence {
                None => fence = Some(marker),
                Some((ch, len)) if ch == marker.0 && marker.1 >= len => fence = None,
                Some(_) => {}
            }
            continue;
        }
        if fence.is_some() {
            continue;
        }
        let indent = lower.len() - lower.trim_start_matches(' ').len();
        if indent > 3 {
            continue;
        }
        if let Some((opener, end)) = html_block_opener(&lower[indent..]) {
            if !lower[indent + opener..].contains(end) {
                closer = Some(end);
            }
        }
    }
    closer.is_some()
}

/// Length of the opening marker and the closing marker for HTML blocks
/// that may contain blank lines.
fn html_block_opener(line: &str) -> Option<(usize, &'static str)> {
    for (tag, end) in [
        ("<pre", "</pre>"),
        ("<script", "</script>"),
        ("<style", "</style>"),
        ("<textarea", "</textarea>"),
    ] {
        if let Some(rest) = line.strip_prefix(tag) {
            if rest.is_empty() || rest.starts_with(|ch: char| ch == '>' || ch.is_whitespace()) {
                return Some((tag.len(), end));
            }
        }
    }
    if line.starts_with("<!--") {
        return Some((4, "-->"));
    }
    if line.starts_with("<?") {
        return Some((2, "?>"));
    }
    if line.starts_with("<![cdata[") {
        return Some((9, "]]>"));
    }
    if line
        .strip_prefix("<!")
        .is_some_and(|rest| rest.starts_with(|ch: char| ch.is_ascii_alphabetic()))
    {
        return Some((2, ">"));
    }
    None
}

fn fence_of(trimmed: &str) -> Option<(char, usize)> {
    let first = trimmed.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|ch| *ch == first).count();
    (len >= 3).then_some((first, len))
}

fn block_kind(block: &str) -> BlockKind {
    let lines: Vec<&str> = block.lines().filter(|line| !line.trim().is_empty()).collect();
    let Some(first) = lines.first().copied() else {
        return BlockKind::Paragraph;
    };
    let trimmed = first.trim_start();
    if first.starts_with("    ") || first.starts_with('\t') || fence_of(trimmed).is_some() {
        return BlockKind::Code;
    }
    if first_list_item(block).is_some() {
        return BlockKind::List;
    }
    if table_start(block).is_some() {
        return BlockKind::Table;
    }
    if lines.iter().any(|line| line.trim_start().starts_with('>')) {
        return BlockKind::Quote;
    }
    if trimmed.starts_with('#') {
        return BlockKind::Heading;
    }
    if is_thematic_break(trimmed) {
        return BlockKind::Rule;
    }
    BlockKind::Paragraph
}

fn continues_block(kind: BlockKind, next_line: &str) -> bool {
    let trimmed = next_line.trim_start();
    match kind {
        BlockKind::Table => trimmed.starts_with('|'),
        BlockKind::Quote => trimmed.starts_with('>'),
        _ => false,
    }
}

/// A partial line that may still turn into an ordered list marker or a
/// link reference definition.
fn may_become_marker(partial: &str) -> bool {
    let trimmed = partial.trim_start();
    trimmed.starts_with('[')
        || (trimmed.len() <= 9 && trimmed.bytes().all(|b| b.is_ascii_digit()))
}

fn starts_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    is_list_marker(trimmed) && !is_thematic_break(trimmed)
}

fn is_list_marker(trimmed: &str) -> bool {
    let bytes = trimmed.as_bytes();
    match bytes.first() {
        Some(b'-' | b'*' | b'+') => matches!(bytes.get(1), Some(b' ' | b'\t') | None),
        Some(b'0'..=b'9') => {
            let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            digits <= 9
                && matches!(bytes.get(digits), Some(b'.' | b')'))
                && matches!(bytes.get(digits + 1), Some(b' ' | b'\t') | None)
        }
        _ => false,
    }
}

fn is_thematic_break(trimmed: &str) -> bool {
    let compact: String = trimmed.chars().filter(|ch| !ch.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|marker| compact.chars().all(|ch| ch == *marker))
}

fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('-')
        && trimmed.contains('|')
        && trimmed
            .chars()
            .all(|ch| matches!(ch, '|' | '-' | ':' | ' '))
}
