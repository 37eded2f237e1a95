//! Markdown to ANSI rendering at a fixed width.
//!
//! Every rendered document ends with exactly one blank line, so blocks
//! rendered separately and concatenated read the same as one render of the
//! joined source.

use anstyle::Style;
use anyhow::{bail, Result};
use lru::LruCache;
use parking_lot::Mutex;
use pulldown_cmark::{
    BrokenLink, CodeBlockKind, CowStr, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd,
};
use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::ui::ansi::{char_display_width, display_width, truncate_plain};
use crate::ui::style::{self, paint};

const CODE_INDENT: &str = "  ";
const QUOTE_PREFIX: &str = "│ ";
const MAX_RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq)]
struct StyledSpan {
    style: Style,
    text: String,
}

#[derive(Debug)]
enum Container {
    Quote,
    ListItem { marker: String, marker_pending: bool },
}

#[derive(Debug, Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    current_row: Vec<String>,
    current_cell: String,
    header_rows: usize,
    in_head: bool,
}

#[derive(Debug)]
pub struct MarkdownEngine {
    width: usize,
    options: Options,
}

impl MarkdownEngine {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            options: Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn render(&self, source: &str) -> Result<String> {
        if self.width == 0 {
            bail!("markdown engine width must be positive");
        }
        if source.trim().is_empty() {
            return Ok(String::new());
        }

        let mut writer = BlockWriter::new(self.width);
        for event in Parser::new_ext(source, self.options) {
            writer.handle(event);
        }
        Ok(writer.finish())
    }

    /// Render `source` with link reference definitions from earlier text in
    /// scope. Definitions produce no output of their own.
    pub fn render_with_definitions(&self, definitions: &str, source: &str) -> Result<String> {
        if source.trim().is_empty() {
            return Ok(String::new());
        }
        self.render(&with_definitions(definitions, source))
    }

    /// Link reference definitions declared in `source`, one normalized
    /// definition per line.
    pub fn reference_definitions(&self, source: &str) -> String {
        let parser = Parser::new_ext(source, self.options);
        let mut definitions: Vec<String> = parser
            .reference_definitions()
            .iter()
            .map(|(label, def)| {
                let dest = escape_chars(&def.dest, &['<', '>', '&']);
                let mut line = format!("[{label}]: <{dest}>");
                if let Some(title) = def.title.as_ref() {
                    line.push_str(&format!(" \"{}\"", escape_chars(title, &['"', '&'])));
                }
                line.push('\n');
                line
            })
            .collect();
        definitions.sort();
        definitions.concat()
    }

    /// True when `source` uses a full or collapsed reference link whose
    /// label has no definition yet.
    pub fn has_unresolved_references(&self, definitions: &str, source: &str) -> bool {
        let text = with_definitions(definitions, source);
        has_unresolved_references(&text, self.options)
    }
}

fn has_unresolved_references<'a>(text: &'a str, options: Options) -> bool {
    let mut unresolved = false;
    let callback = |link: BrokenLink<'a>| -> Option<(CowStr<'a>, CowStr<'a>)> {
        if matches!(
            link.link_type,
            LinkType::Reference
                | LinkType::ReferenceUnknown
                | LinkType::Collapsed
                | LinkType::CollapsedUnknown
        ) {
            unresolved = true;
        }
        None
    };
    Parser::new_with_broken_link_callback(text, options, Some(callback)).for_each(drop);
    unresolved
}

fn with_definitions<'a>(definitions: &str, source: &'a str) -> Cow<'a, str> {
    if definitions.is_empty() {
        Cow::Borrowed(source)
    } else {
        Cow::Owned(format!("{definitions}\n{source}"))
    }
}

fn escape_chars(text: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '\\' || specials.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

struct BlockWriter {
    width: usize,
    lines: Vec<String>,
    inline: Vec<StyledSpan>,
    style_stack: Vec<Style>,
    containers: Vec<Container>,
    lists: Vec<Option<u64>>,
    link_targets: Vec<String>,
    code_block: Option<String>,
    table: Option<TableState>,
    heading: Option<HeadingLevel>,
    /// `lines.len()` right after the last separator gap was pushed.
    gap_at: Option<usize>,
}

impl BlockWriter {
    fn new(width: usize) -> Self {
        Self {
            width,
            lines: Vec::new(),
            inline: Vec::new(),
            style_stack: vec![Style::new()],
            containers: Vec::new(),
            lists: Vec::new(),
            link_targets: Vec::new(),
            code_block: None,
            table: None,
            heading: None,
            gap_at: None,
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        if let Some(buffer) = self.code_block.as_mut() {
            match event {
                Event::Text(text) => {
                    buffer.push_str(&text);
                    return;
                }
                Event::End(TagEnd::CodeBlock) => {
                    let code = self.code_block.take().unwrap_or_default();
                    self.emit_code_block(&code);
                    return;
                }
                _ => return,
            }
        }
        if self.table.is_some() && self.handle_table_event(&event) {
            return;
        }

        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.push_text(&text),
            Event::Code(code) => self.push_span(style::INLINE_CODE, &code),
            Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html),
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_text("\n"),
            Event::Rule => {
                self.start_block();
                let rule_width = self
                    .width
                    .saturating_sub(self.prefix_width())
                    .clamp(1, MAX_RULE_WIDTH);
                let prefix = self.line_prefix();
                self.lines
                    .push(format!("{prefix}{}", paint(style::RULE, &"─".repeat(rule_width))));
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.push_span(style::LIST_MARKER, marker);
            }
            Event::FootnoteReference(label) => self.push_text(&format!("[^{label}]")),
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph | Tag::HtmlBlock => self.start_block(),
            Tag::Heading { level, .. } => {
                self.start_block();
                self.heading = Some(level);
                let heading_style = if level == HeadingLevel::H1 {
                    style::HEADING_1
                } else {
                    style::HEADING
                };
                self.push_style(heading_style);
            }
            Tag::BlockQuote => {
                self.start_block();
                self.containers.push(Container::Quote);
            }
            Tag::CodeBlock(kind) => {
                self.start_block();
                if let CodeBlockKind::Fenced(lang) = kind {
                    let lang = lang.trim();
                    if !lang.is_empty() {
                        let prefix = self.line_prefix();
                        self.lines
                            .push(format!("{prefix}{}", paint(style::CODE_BLOCK, lang)));
                    }
                }
                self.code_block = Some(String::new());
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.start_block();
                } else {
                    self.flush_inline();
                }
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_inline();
                let marker = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let marker = format!("{next}. ");
                        *next += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.containers.push(Container::ListItem {
                    marker,
                    marker_pending: true,
                });
            }
            Tag::Table(_) => {
                self.start_block();
                self.table = Some(TableState::default());
            }
            Tag::Emphasis => self.push_style(style::EMPHASIS),
            Tag::Strong => self.push_style(style::STRONG),
            Tag::Strikethrough => self.push_style(style::STRIKETHROUGH),
            Tag::Link { dest_url, .. } => {
                self.link_targets.push(dest_url.to_string());
                self.push_style(style::LINK);
            }
            Tag::Image { dest_url, .. } => {
                self.link_targets.push(dest_url.to_string());
                self.push_span(style::LINK_URL, "[image: ");
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::HtmlBlock => self.flush_inline(),
            TagEnd::Heading(_) => {
                self.flush_inline();
                self.pop_style();
                self.heading = None;
            }
            TagEnd::BlockQuote => {
                self.flush_inline();
                self.containers.pop();
            }
            TagEnd::List(_) => {
                self.flush_inline();
                self.lists.pop();
            }
            TagEnd::Item => {
                self.flush_inline();
                self.containers.pop();
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                let target = self.link_targets.pop().unwrap_or_default();
                let label: String = self.inline.iter().map(|span| span.text.as_str()).collect();
                if !target.is_empty() && !label.ends_with(target.as_str()) {
                    self.push_span(style::LINK_URL, &format!(" ({target})"));
                }
            }
            TagEnd::Image => {
                self.link_targets.pop();
                self.push_span(style::LINK_URL, "]");
            }
            _ => {}
        }
    }

    fn handle_table_event(&mut self, event: &Event<'_>) -> bool {
        let Some(table) = self.table.as_mut() else {
            return false;
        };
        match event {
            Event::Start(Tag::TableHead) => table.in_head = true,
            Event::End(TagEnd::TableHead) => {
                table.in_head = false;
                table.rows.push(std::mem::take(&mut table.current_row));
                table.header_rows = table.rows.len();
            }
            Event::Start(Tag::TableRow) | Event::Start(Tag::TableCell) => {}
            Event::End(TagEnd::TableRow) => table.rows.push(std::mem::take(&mut table.current_row)),
            Event::End(TagEnd::TableCell) => {
                let cell = std::mem::take(&mut table.current_cell);
                table.current_row.push(cell.trim().to_string());
            }
            Event::Text(text) | Event::Code(text) => table.current_cell.push_str(text),
            Event::SoftBreak | Event::HardBreak => table.current_cell.push(' '),
            Event::End(TagEnd::Table) => {
                if let Some(table) = self.table.take() {
                    self.emit_table(table);
                }
            }
            _ => {}
        }
        true
    }

    fn push_style(&mut self, over: Style) {
        let base = self.current_style();
        self.style_stack.push(merge_styles(base, over));
    }

    fn pop_style(&mut self) {
        if self.style_stack.len() > 1 {
            self.style_stack.pop();
        }
    }

    fn current_style(&self) -> Style {
        self.style_stack.last().copied().unwrap_or_default()
    }

    fn push_text(&mut self, text: &str) {
        let style = if self.in_quote() && self.heading.is_none() {
            merge_styles(style::QUOTE_TEXT, self.current_style())
        } else {
            self.current_style()
        };
        self.push_span(style, text);
    }

    fn push_span(&mut self, style: Style, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.inline.last_mut() {
            if last.style == style {
                last.text.push_str(text);
                return;
            }
        }
        self.inline.push(StyledSpan {
            style,
            text: text.to_string(),
        });
    }

    fn in_quote(&self) -> bool {
        self.containers
            .iter()
            .any(|container| matches!(container, Container::Quote))
    }

    /// Separate a new block from what came before with one blank line,
    /// except for the first block inside a list item.
    fn start_block(&mut self) {
        self.flush_inline();
        let first_in_item = matches!(
            self.containers.last(),
            Some(Container::ListItem {
                marker_pending: true,
                ..
            })
        );
        if first_in_item {
            return;
        }
        if !self.lines.is_empty() && self.gap_at != Some(self.lines.len()) {
            let gap = self.continuation_prefix();
            self.lines.push(gap.trim_end().to_string());
            self.gap_at = Some(self.lines.len());
        }
    }

    fn flush_inline(&mut self) {
        if self.inline.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.inline);
        let available = self.width.saturating_sub(self.prefix_width()).max(1);
        for line in wrap_spans(&spans, available) {
            let prefix = self.line_prefix();
            let body: String = line
                .iter()
                .map(|span| paint(span.style, &span.text))
                .collect();
            self.lines.push(format!("{prefix}{body}"));
        }
    }

    fn prefix_width(&self) -> usize {
        self.containers
            .iter()
            .map(|container| match container {
                Container::Quote => display_width(QUOTE_PREFIX, 0),
                Container::ListItem { marker, .. } => display_width(marker, 0),
            })
            .sum()
    }

    /// Prefix for the next emitted line. Consumes a pending list marker.
    fn line_prefix(&mut self) -> String {
        let mut prefix = String::new();
        for container in self.containers.iter_mut() {
            match container {
                Container::Quote => prefix.push_str(&paint(style::QUOTE_BAR, QUOTE_PREFIX)),
                Container::ListItem {
                    marker,
                    marker_pending,
                } => {
                    if *marker_pending {
                        prefix.push_str(&paint(style::LIST_MARKER, marker));
                        *marker_pending = false;
                    } else {
                        prefix.push_str(&" ".repeat(display_width(marker, 0)));
                    }
                }
            }
        }
        prefix
    }

    fn continuation_prefix(&self) -> String {
        let mut prefix = String::new();
        for container in &self.containers {
            match container {
                Container::Quote => prefix.push_str(&paint(style::QUOTE_BAR, QUOTE_PREFIX)),
                Container::ListItem { marker, .. } => {
                    prefix.push_str(&" ".repeat(display_width(marker, 0)))
                }
            }
        }
        prefix
    }

    fn emit_code_block(&mut self, code: &str) {
        let available = self
            .width
            .saturating_sub(self.prefix_width() + CODE_INDENT.len())
            .max(1);
        let code = code.strip_suffix('\n').unwrap_or(code);
        for raw_line in code.split('\n') {
            let expanded = raw_line.replace('\t', "    ");
            for chunk in hard_wrap(&expanded, available) {
                let prefix = self.line_prefix();
                let body = paint(style::CODE_BLOCK, &chunk);
                self.lines.push(format!("{prefix}{CODE_INDENT}{body}"));
            }
        }
    }

    fn emit_table(&mut self, table: TableState) {
        let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let mut widths = vec![0usize; columns];
        for row in &table.rows {
            for (index, cell) in row.iter().enumerate() {
                widths[index] = widths[index].max(display_width(cell, 0));
            }
        }

        // borders: "│ " per column plus a closing "│"
        let available = self.width.saturating_sub(self.prefix_width());
        let chrome = columns * 3 + 1;
        let content_budget = available.saturating_sub(chrome).max(columns * 3);
        while widths.iter().sum::<usize>() > content_budget {
            let Some((widest, _)) = widths.iter().enumerate().max_by_key(|(_, width)| **width) else {
                break;
            };
            if widths[widest] <= 3 {
                break;
            }
            widths[widest] -= 1;
        }

        let border = |left: &str, mid: &str, right: &str| {
            let segments: Vec<String> = widths.iter().map(|width| "─".repeat(width + 2)).collect();
            paint(
                style::TABLE_BORDER,
                &format!("{left}{}{right}", segments.join(mid)),
            )
        };
        let bar = paint(style::TABLE_BORDER, "│");

        let top = border("┌", "┬", "┐");
        let prefix = self.line_prefix();
        self.lines.push(format!("{prefix}{top}"));
        for (row_index, row) in table.rows.iter().enumerate() {
            let mut line = bar.clone();
            for (column, width) in widths.iter().enumerate() {
                let cell = row.get(column).map(String::as_str).unwrap_or("");
                let cell = truncate_plain(cell, *width);
                let padding = width.saturating_sub(display_width(&cell, 0));
                let cell_style = if row_index < table.header_rows {
                    style::TABLE_HEADER
                } else {
                    Style::new()
                };
                line.push(' ');
                line.push_str(&paint(cell_style, &cell));
                line.push_str(&" ".repeat(padding + 1));
                line.push_str(&bar);
            }
            let prefix = self.line_prefix();
            self.lines.push(format!("{prefix}{line}"));
            if row_index + 1 == table.header_rows && table.rows.len() > table.header_rows {
                let separator = border("├", "┼", "┤");
                let prefix = self.line_prefix();
                self.lines.push(format!("{prefix}{separator}"));
            }
        }
        let bottom = border("└", "┴", "┘");
        let prefix = self.line_prefix();
        self.lines.push(format!("{prefix}{bottom}"));
    }

    fn finish(mut self) -> String {
        self.flush_inline();
        while self.lines.last().is_some_and(String::is_empty) {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            return String::new();
        }
        let mut out = self.lines.join("\n");
        out.push_str("\n\n");
        out
    }
}

fn merge_styles(base: Style, over: Style) -> Style {
    let mut merged = base.effects(base.get_effects() | over.get_effects());
    if let Some(fg) = over.get_fg_color() {
        merged = merged.fg_color(Some(fg));
    }
    if let Some(bg) = over.get_bg_color() {
        merged = merged.bg_color(Some(bg));
    }
    merged
}

/// Greedy word wrap over styled spans. Explicit `\n` forces a break.
fn wrap_spans(spans: &[StyledSpan], width: usize) -> Vec<Vec<StyledSpan>> {
    let mut lines: Vec<Vec<StyledSpan>> = vec![Vec::new()];
    let mut used = 0usize;

    for span in spans {
        for token in split_tokens(&span.text) {
            if token == "\n" {
                lines.push(Vec::new());
                used = 0;
                continue;
            }
            let token_width = display_width(token, 0);
            let is_space = token.chars().all(char::is_whitespace);

            if used + token_width > width && used > 0 {
                trim_trailing_space(lines.last_mut());
                lines.push(Vec::new());
                used = 0;
                if is_space {
                    continue;
                }
            }
            if is_space && used == 0 && lines.len() > 1 {
                continue;
            }

            if token_width > width {
                for chunk in hard_wrap(token, width) {
                    if used > 0 {
                        lines.push(Vec::new());
                    }
                    used = display_width(&chunk, 0);
                    push_styled(lines.last_mut(), span.style, &chunk);
                }
                continue;
            }

            push_styled(lines.last_mut(), span.style, token);
            used += token_width;
        }
    }

    for line in lines.iter_mut() {
        trim_trailing_space(Some(line));
    }
    while lines.len() > 1 && lines.last().is_some_and(Vec::is_empty) {
        lines.pop();
    }
    lines
}

fn push_styled(line: Option<&mut Vec<StyledSpan>>, style: Style, text: &str) {
    let Some(line) = line else {
        return;
    };
    if let Some(last) = line.last_mut() {
        if last.style == style {
            last.text.push_str(text);
            return;
        }
    }
    line.push(StyledSpan {
        style,
        text: text.to_string(),
    });
}

fn trim_trailing_space(line: Option<&mut Vec<StyledSpan>>) {
    let Some(line) = line else {
        return;
    };
    while let Some(last) = line.last_mut() {
        let trimmed_len = last.text.trim_end_matches(' ').len();
        if trimmed_len == 0 {
            line.pop();
            continue;
        }
        last.text.truncate(trimmed_len);
        break;
    }
}

/// Split into runs of spaces, runs of non-space text, and lone newlines.
fn split_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0usize;
    let mut current_space: Option<bool> = None;
    for (index, ch) in text.char_indices() {
        if ch == '\n' {
            if start < index {
                tokens.push(&text[start..index]);
            }
            tokens.push(&text[index..index + 1]);
            start = index + 1;
            current_space = None;
            continue;
        }
        let is_space = ch == ' ';
        if current_space.is_some_and(|space| space != is_space) {
            tokens.push(&text[start..index]);
            start = index;
        }
        current_space = Some(is_space);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

fn hard_wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut chunks = vec![String::new()];
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = char_display_width(ch);
        if used + ch_width > width && used > 0 {
            chunks.push(String::new());
            used = 0;
        }
        if let Some(chunk) = chunks.last_mut() {
            chunk.push(ch);
        }
        used += ch_width;
    }
    chunks
}

/// Width-keyed pool of render engines shared by every text segment.
pub struct EngineCache {
    engines: Mutex<LruCache<usize, Arc<MarkdownEngine>>>,
    created: AtomicUsize,
}

impl EngineCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            engines: Mutex::new(LruCache::new(capacity)),
            created: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, width: usize) -> Arc<MarkdownEngine> {
        let mut engines = self.engines.lock();
        if let Some(engine) = engines.get(&width) {
            return Arc::clone(engine);
        }
        let engine = Arc::new(MarkdownEngine::new(width));
        self.created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(width, "created markdown engine");
        engines.put(width, Arc::clone(&engine));
        engine
    }

    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn engines_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl Default for EngineCache {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ENGINE_CACHE_CAPACITY)
    }
}
