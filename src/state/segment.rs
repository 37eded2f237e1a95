use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::markdown::StreamingMarkdown;
use crate::ui::render::{normalize_text_block, RenderFn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Text,
    Tool,
    Diff,
    Image,
    PlainResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Success,
    Error,
}

/// Separator placed between two adjacent displayed segments. A text block
/// already ends with its own blank line, so nothing is added after text.
pub fn segment_separator(prev: SegmentKind, curr: SegmentKind) -> &'static str {
    match (prev, curr) {
        (SegmentKind::Text, _) => "",
        (_, SegmentKind::Text) => "\n\n",
        _ => "\n",
    }
}

#[derive(Debug)]
pub struct TextSegment {
    raw: String,
    renderer: Option<StreamingMarkdown>,
    rendered: Option<String>,
    complete: bool,
    flushed: bool,
    /// Leading blocks were already printed by a streaming flush.
    lead_printed: bool,
}

impl TextSegment {
    pub(crate) fn new(renderer: Option<StreamingMarkdown>) -> Self {
        Self {
            raw: String::new(),
            renderer,
            rendered: None,
            complete: false,
            flushed: false,
            lead_printed: false,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    pub fn renderer(&self) -> Option<&StreamingMarkdown> {
        self.renderer.as_ref()
    }

    pub(crate) fn renderer_mut(&mut self) -> Option<&mut StreamingMarkdown> {
        self.renderer.as_mut()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn lead_printed(&self) -> bool {
        self.lead_printed
    }

    pub(crate) fn set_lead_printed(&mut self) {
        self.lead_printed = true;
    }

    pub(crate) fn append(&mut self, delta: &str) {
        self.raw.push_str(delta);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.write(delta);
        }
    }

    /// Finalize the rendered cache. The streaming renderer is flushed when
    /// attached; otherwise `render_fn` renders the whole buffer, falling back
    /// to the raw text if it fails.
    pub(crate) fn complete_with(&mut self, render_fn: &RenderFn) {
        if self.complete {
            return;
        }
        self.complete = true;
        self.rendered = Some(match self.renderer.as_mut() {
            Some(renderer) => {
                renderer.flush();
                renderer.rendered().to_string()
            }
            None => match render_fn(&self.raw) {
                Ok(rendered) => normalize_text_block(&rendered),
                Err(err) => {
                    tracing::warn!(error = %err, "text render failed; showing raw text");
                    normalize_text_block(&self.raw)
                }
            },
        });
    }

    /// Refresh the rendered cache after the renderer was resized.
    pub(crate) fn refresh_rendered(&mut self) {
        if !self.complete {
            return;
        }
        if let Some(renderer) = self.renderer.as_ref() {
            self.rendered = Some(renderer.rendered().to_string());
        }
    }

    /// The full text block as the single-pass renderer shows it.
    pub fn block(&self, render_fn: &RenderFn) -> String {
        if let Some(rendered) = self.rendered.as_ref() {
            return rendered.clone();
        }
        match self.renderer.as_ref() {
            Some(renderer) => live_text(renderer.rendered(), renderer.pending_markdown()),
            None => match render_fn(&self.raw) {
                Ok(rendered) => normalize_text_block(&rendered),
                Err(_) => normalize_text_block(&self.raw),
            },
        }
    }

    /// Text not yet printed to scrollback. For a complete segment this is
    /// the rendered block minus any streamed prefix.
    pub fn unflushed_block(&self, render_fn: &RenderFn) -> String {
        match self.renderer.as_ref() {
            Some(renderer) if self.lead_printed => {
                if self.complete {
                    renderer.rendered_after(renderer.flushed_chunks()).to_string()
                } else {
                    live_text(renderer.rendered_unflushed(), renderer.pending_preview())
                }
            }
            Some(renderer) if !self.complete => {
                live_text(renderer.rendered_unflushed(), renderer.pending_preview())
            }
            _ => self.block(render_fn),
        }
    }
}

fn live_text(rendered: &str, pending: &str) -> String {
    let pending = pending.trim_end();
    if pending.trim().is_empty() {
        return rendered.to_string();
    }
    format!("{rendered}{pending}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSegment {
    pub call_id: String,
    pub name: String,
    pub info: String,
    pub args_raw: String,
    pub status: ToolStatus,
    pub(crate) flushed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSource {
    Edit {
        old: String,
        new: String,
        start_line: usize,
    },
    Unified(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSegment {
    pub path: String,
    pub source: DiffSource,
    pub rendered: String,
    pub width: usize,
    pub(crate) flushed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSegment {
    pub path: PathBuf,
    pub(crate) flushed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainResultSegment {
    pub text: String,
    pub is_error: bool,
    pub(crate) flushed: bool,
}

/// One displayable unit of the transcript.
#[derive(Debug)]
pub enum Segment {
    /// Assistant markdown text, append-only while open.
    Text(TextSegment),
    /// Tool invocation with its lifecycle status.
    Tool(ToolSegment),
    /// Pre-rendered file edit diff.
    Diff(DiffSegment),
    /// Image produced by a tool.
    Image(ImageSegment),
    /// Plain text result or error line.
    PlainResult(PlainResultSegment),
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Text(_) => SegmentKind::Text,
            Segment::Tool(_) => SegmentKind::Tool,
            Segment::Diff(_) => SegmentKind::Diff,
            Segment::Image(_) => SegmentKind::Image,
            Segment::PlainResult(_) => SegmentKind::PlainResult,
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Segment::Text(text) => text.complete,
            Segment::Tool(tool) => tool.status != ToolStatus::Pending,
            Segment::Diff(_) | Segment::Image(_) | Segment::PlainResult(_) => true,
        }
    }

    pub fn is_flushed(&self) -> bool {
        match self {
            Segment::Text(text) => text.flushed,
            Segment::Tool(tool) => tool.flushed,
            Segment::Diff(diff) => diff.flushed,
            Segment::Image(image) => image.flushed,
            Segment::PlainResult(result) => result.flushed,
        }
    }

    /// Mark printed to scrollback. Refused for incomplete segments; never
    /// reverts.
    pub(crate) fn mark_flushed(&mut self) -> bool {
        if !self.is_complete() {
            return false;
        }
        match self {
            Segment::Text(text) => {
                text.flushed = true;
                if let Some(renderer) = text.renderer.as_mut() {
                    renderer.mark_flushed();
                }
            }
            Segment::Tool(tool) => tool.flushed = true,
            Segment::Diff(diff) => diff.flushed = true,
            Segment::Image(image) => image.flushed = true,
            Segment::PlainResult(result) => result.flushed = true,
        }
        true
    }

    /// Whether the segment shows anything at all once rendered.
    pub fn has_content(&self) -> bool {
        match self {
            Segment::Text(text) => !text.raw.trim().is_empty(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::render::plain_render_fn;

    #[test]
    fn test_separator_table() {
        use SegmentKind::*;
        assert_eq!(segment_separator(Text, Text), "");
        assert_eq!(segment_separator(Text, Tool), "");
        assert_eq!(segment_separator(Tool, Text), "\n\n");
        assert_eq!(segment_separator(PlainResult, Text), "\n\n");
        assert_eq!(segment_separator(Tool, Tool), "\n");
        assert_eq!(segment_separator(Tool, PlainResult), "\n");
        assert_eq!(segment_separator(Diff, Image), "\n");
    }

    #[test]
    fn test_incomplete_segment_cannot_be_flushed() {
        let mut segment = Segment::Tool(ToolSegment {
            call_id: "c1".to_string(),
            name: "bash".to_string(),
            info: String::new(),
            args_raw: String::new(),
            status: ToolStatus::Pending,
            flushed: false,
        });
        assert!(!segment.mark_flushed());
        assert!(!segment.is_flushed());
        if let Segment::Tool(tool) = &mut segment {
            tool.status = ToolStatus::Success;
        }
        assert!(segment.mark_flushed());
        assert!(segment.is_flushed());
    }

    #[test]
    fn test_plain_text_completion_normalizes_spacing() {
        let render = plain_render_fn();
        let mut text = TextSegment::new(None);
        text.append("Hello");
        assert_eq!(text.block(render.as_ref()), "Hello\n\n");
        text.complete_with(render.as_ref());
        assert_eq!(text.rendered(), Some("Hello\n\n"));
    }

    #[test]
    fn test_failed_render_falls_back_to_raw() {
        let failing = |_: &str| -> anyhow::Result<String> { Err(anyhow::anyhow!("boom")) };
        let mut text = TextSegment::new(None);
        text.append("raw *text*");
        text.complete_with(&failing);
        assert_eq!(text.rendered(), Some("raw *text*\n\n"));
    }
}
