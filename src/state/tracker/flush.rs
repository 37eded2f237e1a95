use std::time::Instant;

use super::super::segment::{segment_separator, Segment, SegmentKind};
use super::core::render_diff_source;
use super::SegmentTracker;
use crate::ui::render::{join_blocks, wave_target, RenderFn, SegmentRenderer};
use crate::ui::style::{self, paint};

impl SegmentTracker {
    /// Text for the terminal's permanent scrollback: every complete segment
    /// from the flushed prefix up to the first incomplete one, holding back
    /// the last `min_keep` segments. The caller prints the result followed by
    /// a newline; the tracker accounts for that newline so the concatenation
    /// of all prints matches a single-pass render.
    ///
    /// `already_printed_lines` leading lines of this output were emitted by
    /// the caller and are left out.
    pub fn flush_to_scrollback(
        &mut self,
        width: usize,
        already_printed_lines: usize,
        min_keep: usize,
        render_fn: &RenderFn,
    ) -> String {
        self.refresh_width(width);

        let start = self.flushed_count;
        let keep_from = self.segments.len().saturating_sub(min_keep);
        let mut end = start;
        while end < keep_from && self.segments[end].is_complete() {
            end += 1;
        }
        if end <= start {
            return String::new();
        }

        let blocks: Vec<(SegmentKind, String)> = {
            let renderer = self.scrollback_renderer(width, render_fn);
            self.segments[start..end]
                .iter()
                .map(|segment| {
                    let block = match segment {
                        Segment::Text(text) => text.unflushed_block(render_fn),
                        other => renderer.block(other, false),
                    };
                    (segment.kind(), block)
                })
                .collect()
        };
        let (chunk, last) = join_blocks(self.last_emitted, blocks);

        for segment in &mut self.segments[start..end] {
            segment.mark_flushed();
        }
        self.flushed_count = end;
        self.last_emitted = last;
        tracing::trace!(from = start, to = end, bytes = chunk.len(), "flushed segments");

        if chunk.is_empty() {
            return String::new();
        }
        let out = self.settle_newlines(&chunk);
        skip_printed_lines(out, already_printed_lines)
    }

    /// Move committed blocks of the open text tail to scrollback before the
    /// segment completes. Only applies when everything before it is flushed.
    pub fn flush_streaming_text(&mut self, width: usize) -> String {
        self.refresh_width(width);

        let Some(index) = self.segments.len().checked_sub(1) else {
            return String::new();
        };
        if index != self.flushed_count {
            return String::new();
        }
        let last_emitted = self.last_emitted;
        let Some(Segment::Text(text)) = self.segments.get_mut(index) else {
            return String::new();
        };
        if text.is_complete() {
            return String::new();
        }
        let separator = match last_emitted {
            Some(prev) if !text.lead_printed() => segment_separator(prev, SegmentKind::Text),
            _ => "",
        };
        let Some(renderer) = text.renderer_mut() else {
            return String::new();
        };
        let unflushed = renderer.rendered_unflushed();
        if unflushed.is_empty() {
            return String::new();
        }
        let chunk = format!("{separator}{unflushed}");
        renderer.mark_flushed();
        text.set_lead_printed();
        self.last_emitted = Some(SegmentKind::Text);
        tracing::trace!(bytes = chunk.len(), "flushed streaming text");

        self.settle_newlines(&chunk)
    }

    /// Live view of everything not yet in scrollback, ending with the
    /// phase or retry status when one is set.
    pub fn render_unflushed(
        &mut self,
        width: usize,
        render_fn: &RenderFn,
        include_images: bool,
    ) -> String {
        self.refresh_width(width);

        let renderer = SegmentRenderer::new(width, render_fn)
            .with_wave(self.wave.position())
            .with_images(include_images, self.images.as_deref())
            .with_subagents(self.subagents.as_deref(), Instant::now());
        let target = wave_target(&self.segments);
        let start = self.flushed_count;
        let blocks = self.segments[start..]
            .iter()
            .enumerate()
            .map(|(offset, segment)| {
                let block = match segment {
                    Segment::Text(text) => text.unflushed_block(render_fn),
                    other => renderer.block(other, Some(start + offset) == target),
                };
                (segment.kind(), block)
            });
        let (mut out, _) = join_blocks(self.last_emitted, blocks);

        if self.newline_debt && out.starts_with('\n') {
            out.remove(0);
        }
        if let Some(status) = self.status.as_deref() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&paint(style::STATUS_LINE, status));
        }
        out
    }

    /// Single-pass render of the whole turn with this tracker's image and
    /// width settings.
    pub fn render_all(&mut self, width: usize, render_fn: &RenderFn) -> String {
        self.refresh_width(width);
        self.scrollback_renderer(width, render_fn)
            .with_wave(self.wave.position())
            .render(&self.segments)
    }

    fn scrollback_renderer<'a>(&'a self, width: usize, render_fn: &'a RenderFn) -> SegmentRenderer<'a> {
        SegmentRenderer::new(width, render_fn).with_images(self.images.is_some(), self.images.as_deref())
    }

    /// Account for the newline the caller's print appends: it stands in for
    /// the chunk's own trailing newline, or is owed by the next chunk.
    fn settle_newlines(&mut self, chunk: &str) -> String {
        let mut out = chunk;
        if self.newline_debt {
            out = out.strip_prefix('\n').unwrap_or(out);
        }
        match out.strip_suffix('\n') {
            Some(trimmed) => {
                self.newline_debt = false;
                trimmed.to_string()
            }
            None => {
                self.newline_debt = true;
                out.to_string()
            }
        }
    }

    /// Re-render unflushed segments laid out for another width.
    pub(super) fn refresh_width(&mut self, width: usize) {
        if width == 0 {
            return;
        }
        let start = self.flushed_count;
        for segment in &mut self.segments[start..] {
            match segment {
                Segment::Text(text) => {
                    let resized = match text.renderer_mut() {
                        Some(renderer) if renderer.width() != width => {
                            renderer.resize(self.engines.get(width));
                            true
                        }
                        _ => false,
                    };
                    if resized {
                        text.refresh_rendered();
                    }
                }
                Segment::Diff(diff) if diff.width != width => {
                    diff.rendered =
                        render_diff_source(&self.diff_options, width, &diff.path, &diff.source);
                    diff.width = width;
                }
                _ => {}
            }
        }
    }
}

/// Drop the first `lines` lines of what a print of `out` would show.
fn skip_printed_lines(out: String, lines: usize) -> String {
    if lines == 0 {
        return out;
    }
    let printed = format!("{out}\n");
    let mut rest = printed.as_str();
    for _ in 0..lines {
        match rest.find('\n') {
            Some(index) => rest = &rest[index + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    rest.strip_suffix('\n').unwrap_or(rest).to_string()
}
