//! Styled inline diff blocks: a line-number gutter, a change marker, tinted
//! backgrounds, per-token highlighting for similar line pairs, wrapping to the
//! available width, and a cap on rendered rows.

use anstyle::Style;

use super::lcs::{diff_lines, hunk_windows, split_lines};
use super::unified::parse_unified_diff;
use super::word::{word_diff, WordSpan};
use super::wrap::wrap_styled_line;
use super::{DiffLine, DiffLineKind};
use crate::config::{
    DEFAULT_DIFF_CONTEXT_LINES, DEFAULT_MAX_DIFF_LINES, DEFAULT_MAX_DIFF_WIDTH,
    DEFAULT_WORD_DIFF_THRESHOLD,
};
use crate::ui::ansi::{char_display_width, display_width, next_tab_stop};
use crate::ui::style::{self, paint};

const MIN_CONTENT_WIDTH: usize = 10;
/// Marker column plus the space after it.
const MARKER_WIDTH: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct DiffRenderOptions {
    /// Terminal columns available, 0 when unknown.
    pub terminal_width: usize,
    pub max_content_width: usize,
    pub max_lines: usize,
    pub context_lines: usize,
    pub word_diff_threshold: f64,
}

impl Default for DiffRenderOptions {
    fn default() -> Self {
        Self {
            terminal_width: 0,
            max_content_width: DEFAULT_MAX_DIFF_WIDTH,
            max_lines: DEFAULT_MAX_DIFF_LINES,
            context_lines: DEFAULT_DIFF_CONTEXT_LINES,
            word_diff_threshold: DEFAULT_WORD_DIFF_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDiff {
    pub text: String,
    pub added: usize,
    pub removed: usize,
    /// Body rows emitted, wrapped continuation rows included.
    pub rendered_rows: usize,
    /// Diff lines left out once the row cap was reached.
    pub elided_lines: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DiffRenderer {
    options: DiffRenderOptions,
}

struct LineStyles {
    line: Style,
    word: Style,
    sign: Style,
    marker: &'static str,
}

fn styles_for(kind: DiffLineKind) -> LineStyles {
    match kind {
        DiffLineKind::Insert => LineStyles {
            line: style::DIFF_ADD_LINE,
            word: style::DIFF_ADD_WORD,
            sign: style::DIFF_ADD_SIGN,
            marker: "+",
        },
        DiffLineKind::Delete => LineStyles {
            line: style::DIFF_DEL_LINE,
            word: style::DIFF_DEL_WORD,
            sign: style::DIFF_DEL_SIGN,
            marker: "-",
        },
        DiffLineKind::Context => LineStyles {
            line: style::DIFF_CONTEXT,
            word: style::DIFF_CONTEXT,
            sign: style::DIFF_CONTEXT,
            marker: " ",
        },
    }
}

impl DiffRenderer {
    pub fn new(options: DiffRenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiffRenderOptions {
        &self.options
    }

    /// Columns left for line content once the gutter and marker are placed.
    pub fn content_width(&self, gutter_width: usize) -> usize {
        let chrome = gutter_width + 1 + MARKER_WIDTH;
        let budget = if self.options.terminal_width == 0 {
            self.options.max_content_width
        } else {
            self.options
                .max_content_width
                .min(self.options.terminal_width.saturating_sub(chrome))
        };
        budget.max(MIN_CONTENT_WIDTH)
    }

    /// Diff of an edited snippet. `start_line` is the 1-based file line the
    /// snippet begins at, 0 when unknown.
    pub fn render_edit(&self, path: &str, old: &str, new: &str, start_line: usize) -> RenderedDiff {
        let old_lines = split_lines(old);
        let new_lines = split_lines(new);
        let lines = diff_lines(&old_lines, &new_lines);
        let offset = start_line.saturating_sub(1);

        let groups: Vec<Vec<DiffLine>> = hunk_windows(&lines, self.options.context_lines)
            .into_iter()
            .map(|window| {
                lines[window]
                    .iter()
                    .cloned()
                    .map(|mut line| {
                        line.old_line = line.old_line.map(|n| n + offset);
                        line.new_line = line.new_line.map(|n| n + offset);
                        line
                    })
                    .collect()
            })
            .collect();
        self.render_groups(path, &groups)
    }

    pub fn render_unified(&self, path: &str, unified: &str) -> RenderedDiff {
        let groups: Vec<Vec<DiffLine>> = parse_unified_diff(unified)
            .into_iter()
            .map(|hunk| hunk.lines)
            .filter(|lines| !lines.is_empty())
            .collect();
        self.render_groups(path, &groups)
    }

    fn render_groups(&self, path: &str, groups: &[Vec<DiffLine>]) -> RenderedDiff {
        let added = count_kind(groups, DiffLineKind::Insert);
        let removed = count_kind(groups, DiffLineKind::Delete);

        let mut out = vec![format!(
            "{} {}",
            paint(style::DIFF_HEADER, path),
            paint(style::TOOL_INFO, &format!("(+{added} -{removed})"))
        )];
        if added == 0 && removed == 0 {
            out.push(paint(style::DIFF_ELISION, "  (no changes)"));
            return RenderedDiff {
                text: out.join("\n"),
                ..RenderedDiff::default()
            };
        }

        let gutter_width = groups
            .iter()
            .flatten()
            .filter_map(DiffLine::display_number)
            .max()
            .unwrap_or(1)
            .to_string()
            .len();
        let content_width = self.content_width(gutter_width);
        let blank_gutter = " ".repeat(gutter_width + 1);

        let total_lines: usize = groups.iter().map(Vec::len).sum();
        let mut consumed = 0usize;
        let mut rows = 0usize;
        let mut elided = 0usize;

        'groups: for (group_index, group) in groups.iter().enumerate() {
            if group_index > 0 {
                if rows + 1 > self.options.max_lines {
                    elided = total_lines - consumed;
                    break;
                }
                out.push(format!("{blank_gutter}{}", paint(style::DIFF_ELISION, "⋮")));
                rows += 1;
            }

            let word_spans = self.pair_word_diffs(group);
            for (line, words) in group.iter().zip(word_spans.iter()) {
                let rendered =
                    self.render_line(line, words.as_deref(), gutter_width, content_width);
                if rows + rendered.len() > self.options.max_lines {
                    elided = total_lines - consumed;
                    break 'groups;
                }
                rows += rendered.len();
                consumed += 1;
                out.extend(rendered);
            }
        }

        if elided > 0 {
            let noun = if elided == 1 { "line" } else { "lines" };
            out.push(format!(
                "{blank_gutter}{}",
                paint(style::DIFF_ELISION, &format!("… {elided} more {noun}"))
            ));
            tracing::trace!(path, elided, "diff output capped");
        }

        RenderedDiff {
            text: out.join("\n"),
            added,
            removed,
            rendered_rows: rows,
            elided_lines: elided,
        }
    }

    /// Word spans for each line of a group. A run of deletions directly
    /// followed by insertions is paired positionally.
    fn pair_word_diffs(&self, group: &[DiffLine]) -> Vec<Option<Vec<WordSpan>>> {
        let mut spans: Vec<Option<Vec<WordSpan>>> = vec![None; group.len()];
        let mut index = 0usize;
        while index < group.len() {
            if group[index].kind != DiffLineKind::Delete {
                index += 1;
                continue;
            }
            let deletes_start = index;
            while index < group.len() && group[index].kind == DiffLineKind::Delete {
                index += 1;
            }
            let inserts_start = index;
            while index < group.len() && group[index].kind == DiffLineKind::Insert {
                index += 1;
            }
            let pairs = (inserts_start - deletes_start).min(index - inserts_start);
            for offset in 0..pairs {
                let old = deletes_start + offset;
                let new = inserts_start + offset;
                if let Some(diff) = word_diff(
                    &group[old].text,
                    &group[new].text,
                    self.options.word_diff_threshold,
                ) {
                    spans[old] = Some(diff.old);
                    spans[new] = Some(diff.new);
                }
            }
        }
        spans
    }

    fn render_line(
        &self,
        line: &DiffLine,
        words: Option<&[WordSpan]>,
        gutter_width: usize,
        content_width: usize,
    ) -> Vec<String> {
        let styles = styles_for(line.kind);
        let number = line
            .display_number()
            .map(|n| n.to_string())
            .unwrap_or_default();
        let gutter = paint(style::DIFF_GUTTER, &format!("{number:>gutter_width$} "));
        let blank_gutter = " ".repeat(gutter_width + 1);

        let mut col = 0usize;
        let content = match words {
            Some(spans) => spans
                .iter()
                .map(|span| {
                    let span_style = if span.changed { styles.word } else { styles.line };
                    paint(span_style, &expand_tabs(&span.text, &mut col))
                })
                .collect::<String>(),
            None => paint(styles.line, &expand_tabs(&line.text, &mut col)),
        };

        wrap_styled_line(&content, content_width)
            .into_iter()
            .enumerate()
            .map(|(row, text)| {
                let lead = if row == 0 {
                    format!(
                        "{gutter}{}{}",
                        paint(styles.sign, styles.marker),
                        paint(styles.line, " ")
                    )
                } else {
                    format!("{blank_gutter}{}", paint(styles.line, "  "))
                };
                let mut row_text = format!("{lead}{text}");
                if line.kind != DiffLineKind::Context {
                    let used = display_width(&text, 0);
                    let pad = content_width.saturating_sub(used);
                    row_text.push_str(&paint(styles.line, &" ".repeat(pad)));
                }
                row_text
            })
            .collect()
    }
}

fn count_kind(groups: &[Vec<DiffLine>], kind: DiffLineKind) -> usize {
    groups
        .iter()
        .flatten()
        .filter(|line| line.kind == kind)
        .count()
}

fn expand_tabs(text: &str, col: &mut usize) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '\t' {
            let next = next_tab_stop(*col);
            out.push_str(&" ".repeat(next - *col));
            *col = next;
        } else {
            out.push(ch);
            *col += char_display_width(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::ansi::strip_ansi;

    fn renderer(terminal_width: usize) -> DiffRenderer {
        DiffRenderer::new(DiffRenderOptions {
            terminal_width,
            ..DiffRenderOptions::default()
        })
    }

    #[test]
    fn test_render_edit_shows_gutter_and_markers() {
        let rendered = renderer(80).render_edit("src/a.rs", "a\nb\nc", "a\nB\nc", 0);
        let plain = strip_ansi(&rendered.text);
        let lines: Vec<&str> = plain.lines().map(str::trim_end).collect();
        assert_eq!(lines[0], "src/a.rs (+1 -1)");
        assert_eq!(lines[1], "1   a");
        assert_eq!(lines[2], "2 - b");
        assert_eq!(lines[3], "2 + B");
        assert_eq!(lines[4], "3   c");
        assert_eq!(rendered.added, 1);
        assert_eq!(rendered.removed, 1);
        assert!(!rendered.text.ends_with('\n'));
    }

    #[test]
    fn test_start_line_offsets_numbers_and_widens_gutter() {
        let rendered = renderer(80).render_edit("f", "x\ny", "x\nz", 99);
        let plain = strip_ansi(&rendered.text);
        assert!(plain.contains(" 99   x"));
        assert!(plain.contains("100 - y"));
        assert!(plain.contains("100 + z"));
    }

    #[test]
    fn test_output_is_capped_with_elision_count() {
        let new: String = (1..=60).map(|n| format!("line {n}\n")).collect();
        let rendered = renderer(80).render_edit("big.txt", "", &new, 0);
        assert_eq!(rendered.rendered_rows, 50);
        assert_eq!(rendered.elided_lines, 10);
        assert!(strip_ansi(&rendered.text).ends_with("… 10 more lines"));
    }

    #[test]
    fn test_long_lines_wrap_within_terminal_width() {
        let long = "word ".repeat(40);
        let rendered = renderer(40).render_edit("w", "short", long.trim_end(), 0);
        assert!(rendered.rendered_rows > 2);
        for line in rendered.text.lines().skip(1) {
            assert!(display_width(line, 0) <= 40, "{:?}", strip_ansi(line));
        }
    }

    #[test]
    fn test_similar_pair_gets_word_highlight() {
        let rendered = renderer(80).render_edit("f", "let x = 1;", "let x = 2;", 0);
        let word_bg = style::DIFF_ADD_WORD.render().to_string();
        assert!(rendered.text.contains(&word_bg));

        let unrelated = renderer(80).render_edit("f", "alpha beta", "gamma delta", 0);
        assert!(!unrelated.text.contains(&word_bg));
    }

    #[test]
    fn test_render_unified_uses_header_numbers() {
        let unified = "@@ -10,2 +10,2 @@\n keep\n-old\n+new\n";
        let plain = strip_ansi(&renderer(80).render_unified("u", unified).text);
        assert!(plain.contains("10   keep"));
        assert!(plain.contains("11 - old"));
        assert!(plain.contains("11 + new"));
    }

    #[test]
    fn test_identical_input_reports_no_changes() {
        let rendered = renderer(80).render_edit("same", "a\nb", "a\nb", 0);
        assert!(strip_ansi(&rendered.text).contains("(no changes)"));
        assert_eq!(rendered.rendered_rows, 0);
    }
}
