use std::path::PathBuf;
use std::time::Instant;

use super::super::segment::{
    DiffSegment, DiffSource, ImageSegment, PlainResultSegment, Segment, TextSegment, ToolSegment,
    ToolStatus,
};
use super::super::subagent::SubagentEvent;
use super::super::wave::WavePosition;
use super::SegmentTracker;
use crate::diff::{DiffRenderOptions, DiffRenderer};
use crate::markdown::StreamingMarkdown;
use crate::stream::StreamEvent;
use crate::ui::render::{tool_label, wave_target, RenderFn};

pub(crate) const NO_RESPONSE_PLACEHOLDER: &str = "(no response)";

impl SegmentTracker {
    /// Append assistant text to the open text segment, starting a new one
    /// when the tail is anything else.
    pub fn add_text(&mut self, delta: &str, width: usize) {
        if delta.is_empty() {
            return;
        }
        self.status = None;

        if let Some(Segment::Text(text)) = self.segments.last_mut() {
            if !text.is_complete() {
                if let Some(renderer) = text.renderer_mut() {
                    if width > 0 && renderer.width() != width {
                        renderer.resize(self.engines.get(width));
                    }
                }
                text.append(delta);
                return;
            }
        }

        let mut text = TextSegment::new(self.new_text_renderer(width));
        text.append(delta);
        self.segments.push(Segment::Text(text));
    }

    fn new_text_renderer(&self, width: usize) -> Option<StreamingMarkdown> {
        if width == 0 || self.plain_output {
            return None;
        }
        Some(StreamingMarkdown::new(
            self.engines.get(width),
            self.min_boundary_bytes,
        ))
    }

    /// Returns false when `call_id` is already pending.
    pub fn handle_tool_start(&mut self, call_id: &str, name: &str, info: &str, args_raw: &str) -> bool {
        let duplicate = self.segments.iter().any(|segment| {
            matches!(segment, Segment::Tool(tool)
                if tool.call_id == call_id && tool.status == ToolStatus::Pending)
        });
        if duplicate {
            tracing::debug!(call_id, "ignoring duplicate tool start");
            return false;
        }

        self.status = None;
        self.push_segment(Segment::Tool(ToolSegment {
            call_id: call_id.to_string(),
            name: name.to_string(),
            info: info.to_string(),
            args_raw: args_raw.to_string(),
            status: ToolStatus::Pending,
            flushed: false,
        }));
        true
    }

    /// Returns false when no pending tool matches `call_id`.
    pub fn handle_tool_end(&mut self, call_id: &str, success: bool) -> bool {
        self.finish_tool(call_id, success, "")
    }

    fn finish_tool(&mut self, call_id: &str, success: bool, info: &str) -> bool {
        let found = self.segments.iter_mut().rev().find_map(|segment| match segment {
            Segment::Tool(tool) if tool.call_id == call_id && tool.status == ToolStatus::Pending => {
                Some(tool)
            }
            _ => None,
        });
        let Some(tool) = found else {
            tracing::debug!(call_id, "tool end without a pending start");
            return false;
        };

        tool.status = if success {
            ToolStatus::Success
        } else {
            ToolStatus::Error
        };
        if tool.info.is_empty() && !info.is_empty() {
            tool.info = info.to_string();
        }
        if let Some(registry) = self.subagents.as_ref() {
            registry.remove(call_id);
        }
        if wave_target(&self.segments).is_none() {
            self.wave.reset();
        }
        true
    }

    /// Route sub-agent progress to the attached registry. Returns false when
    /// there is no registry or the owning tool already finished.
    pub fn apply_subagent_event(&mut self, call_id: &str, event: SubagentEvent) -> bool {
        let Some(registry) = self.subagents.as_ref() else {
            tracing::trace!(call_id, "no sub-agent registry attached");
            return false;
        };
        registry.apply(call_id, event, Instant::now())
    }

    /// Mark every pending tool as failed. Used when the turn is cut short.
    pub fn cancel_pending_tools(&mut self) -> usize {
        let mut cancelled = 0;
        for segment in &mut self.segments {
            if let Segment::Tool(tool) = segment {
                if tool.status == ToolStatus::Pending {
                    tool.status = ToolStatus::Error;
                    cancelled += 1;
                }
            }
        }
        if cancelled > 0 {
            self.wave.reset();
        }
        cancelled
    }

    /// Complete every open text segment.
    pub fn complete_text(&mut self, render_fn: &RenderFn) {
        for segment in &mut self.segments {
            if let Segment::Text(text) = segment {
                text.complete_with(render_fn);
            }
        }
    }

    pub fn add_plain_result(&mut self, text: &str) {
        self.push_segment(Segment::PlainResult(PlainResultSegment {
            text: text.to_string(),
            is_error: false,
            flushed: false,
        }));
    }

    pub fn add_error(&mut self, message: &str) {
        self.push_segment(Segment::PlainResult(PlainResultSegment {
            text: format!("Error: {message}"),
            is_error: true,
            flushed: false,
        }));
    }

    pub fn add_diff(&mut self, path: &str, old: &str, new: &str, start_line: usize, width: usize) {
        let source = DiffSource::Edit {
            old: old.to_string(),
            new: new.to_string(),
            start_line,
        };
        let rendered = render_diff_source(&self.diff_options, width, path, &source);
        self.push_segment(Segment::Diff(DiffSegment {
            path: path.to_string(),
            source,
            rendered,
            width,
            flushed: false,
        }));
    }

    pub fn add_unified_diff(&mut self, path: &str, unified: &str, width: usize) {
        let source = DiffSource::Unified(unified.to_string());
        let rendered = render_diff_source(&self.diff_options, width, path, &source);
        self.push_segment(Segment::Diff(DiffSegment {
            path: path.to_string(),
            source,
            rendered,
            width,
            flushed: false,
        }));
    }

    pub fn add_image(&mut self, path: impl Into<PathBuf>) {
        self.push_segment(Segment::Image(ImageSegment {
            path: path.into(),
            flushed: false,
        }));
    }

    /// Feed one adapter event. Returns true for terminal events.
    pub fn apply_event(&mut self, event: StreamEvent, width: usize) -> bool {
        match event {
            StreamEvent::Text(delta) => self.add_text(&delta, width),
            StreamEvent::ToolStart {
                call_id,
                name,
                info,
                args_raw,
            } => {
                self.handle_tool_start(&call_id, &name, &info, &args_raw);
            }
            StreamEvent::ToolEnd {
                call_id,
                info,
                success,
                ..
            } => {
                self.finish_tool(&call_id, success, &info);
            }
            StreamEvent::Usage(usage) => self.usage.accumulate(&usage),
            StreamEvent::Phase(label) => self.status = Some(label),
            StreamEvent::Retry {
                attempt,
                max,
                wait_secs,
            } => {
                self.status = Some(format!("Retrying ({attempt}/{max}) in {wait_secs}s"));
            }
            StreamEvent::Image(path) => self.add_image(path),
            StreamEvent::Diff {
                path,
                old,
                new,
                start_line,
            } => self.add_diff(&path, &old, &new, start_line, width),
            StreamEvent::Subagent { call_id, event } => {
                self.apply_subagent_event(&call_id, event);
            }
            StreamEvent::Done { total_tokens } => {
                self.total_tokens = Some(total_tokens);
                self.status = None;
                return true;
            }
            StreamEvent::Error(err) => {
                self.status = None;
                self.add_error(&err.to_string());
                return true;
            }
        }
        false
    }

    /// Close out the turn. A turn that produced nothing displayable gets a
    /// placeholder line.
    pub fn finish_turn(&mut self, render_fn: &RenderFn) {
        self.complete_text(render_fn);
        self.status = None;
        if !self.segments.iter().any(Segment::has_content) {
            self.add_plain_result(NO_RESPONSE_PLACEHOLDER);
        }
    }

    /// Advance the wave over the active pending tool.
    pub fn tick_wave(&mut self, now: Instant) -> WavePosition {
        let label_len = match wave_target(&self.segments).map(|index| &self.segments[index]) {
            Some(Segment::Tool(tool)) => tool_label(tool).chars().count(),
            _ => {
                self.wave.reset();
                return WavePosition::Paused;
            }
        };
        self.wave.tick(now, label_len)
    }

    /// Append a segment, completing an open text tail first.
    pub(super) fn push_segment(&mut self, segment: Segment) {
        if !matches!(segment, Segment::Text(_)) {
            if let Some(Segment::Text(text)) = self.segments.last_mut() {
                text.complete_with(self.text_render_fn.as_ref());
            }
        }
        self.segments.push(segment);
    }
}

pub(super) fn render_diff_source(
    options: &DiffRenderOptions,
    width: usize,
    path: &str,
    source: &DiffSource,
) -> String {
    let renderer = DiffRenderer::new(DiffRenderOptions {
        terminal_width: width,
        ..options.clone()
    });
    let rendered = match source {
        DiffSource::Edit {
            old,
            new,
            start_line,
        } => renderer.render_edit(path, old, new, *start_line),
        DiffSource::Unified(unified) => renderer.render_unified(path, unified),
    };
    rendered.text
}
