//! Pure rendering of segments into terminal text. Nothing here mutates
//! segment state; the tracker owns lifecycle.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::markdown::{EngineCache, MarkdownEngine};
use crate::state::segment::{
    segment_separator, PlainResultSegment, Segment, SegmentKind, ToolSegment, ToolStatus,
};
use crate::state::subagent::SubagentRegistry;
use crate::state::wave::WavePosition;
use crate::ui::ansi::{display_width, truncate_plain};
use crate::ui::image_cache::{image_placeholder, ImageCache};
use crate::ui::style::{self, paint};

/// Renders a whole markdown document. Used for text that has no streaming
/// renderer attached (plain mode, or width 0).
pub type RenderFn = dyn Fn(&str) -> Result<String> + Send + Sync;

const PENDING_ICON: &str = "○";
const SUCCESS_ICON: &str = "✓";
const ERROR_ICON: &str = "✗";
const ICON_WIDTH: usize = 2;
const SUBAGENT_PREFIX: &str = "  └ ";

pub fn plain_render_fn() -> Box<RenderFn> {
    Box::new(|text: &str| -> Result<String> { Ok(text.to_string()) })
}

pub fn markdown_render_fn(engine: Arc<MarkdownEngine>) -> Box<RenderFn> {
    Box::new(move |text: &str| -> Result<String> { engine.render(text) })
}

/// Whole-document render function bound to one terminal width. Width 0
/// renders plain text.
pub struct WidthRenderFn {
    engines: Arc<EngineCache>,
    width: usize,
    render_fn: Arc<RenderFn>,
}

impl WidthRenderFn {
    pub fn new(engines: Arc<EngineCache>, width: usize) -> Self {
        let render_fn = build_render_fn(&engines, width);
        Self {
            engines,
            width,
            render_fn,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self) -> &Arc<RenderFn> {
        &self.render_fn
    }

    /// Rebind to `width`. Returns true when the function was rebuilt.
    pub fn update(&mut self, width: usize) -> bool {
        if width == self.width {
            return false;
        }
        self.width = width;
        self.render_fn = build_render_fn(&self.engines, width);
        true
    }
}

fn build_render_fn(engines: &EngineCache, width: usize) -> Arc<RenderFn> {
    if width == 0 {
        Arc::from(plain_render_fn())
    } else {
        Arc::from(markdown_render_fn(engines.get(width)))
    }
}

/// Give a text block the same shape the markdown engine produces: content
/// followed by exactly one blank line. Blank text becomes empty.
pub fn normalize_text_block(text: &str) -> String {
    let trimmed = text.trim_end_matches(['\n', '\r']);
    if trimmed.trim().is_empty() {
        return String::new();
    }
    format!("{trimmed}\n\n")
}

pub fn tool_label(tool: &ToolSegment) -> String {
    if tool.info.is_empty() {
        tool.name.clone()
    } else {
        format!("{} {}", tool.name, tool.info)
    }
}

/// Tool indicator line. `wave` is only honored while the tool is pending.
pub fn render_tool(tool: &ToolSegment, wave: Option<WavePosition>, width: usize) -> String {
    match tool.status {
        ToolStatus::Pending => {
            let mut label = tool_label(tool);
            if width > ICON_WIDTH {
                label = truncate_plain(&label, width - ICON_WIDTH);
            }
            let body = match wave {
                Some(WavePosition::At(position)) => wave_label(&label, position),
                _ => paint(style::TOOL_PENDING, &label),
            };
            format!("{} {body}", paint(style::TOOL_PENDING, PENDING_ICON))
        }
        ToolStatus::Success | ToolStatus::Error => {
            let icon = if tool.status == ToolStatus::Success {
                paint(style::TOOL_SUCCESS, SUCCESS_ICON)
            } else {
                paint(style::TOOL_ERROR, ERROR_ICON)
            };
            let mut line = format!("{icon} {}", paint(style::TOOL_NAME, &tool.name));
            if !tool.info.is_empty() {
                let used = ICON_WIDTH + display_width(&tool.name, 0) + 1;
                let info = if width == 0 {
                    tool.info.clone()
                } else if width > used {
                    truncate_plain(&tool.info, width - used)
                } else {
                    String::new()
                };
                if !info.is_empty() {
                    line.push(' ');
                    line.push_str(&paint(style::TOOL_INFO, &info));
                }
            }
            line
        }
    }
}

fn wave_label(label: &str, position: usize) -> String {
    let Some((start, ch)) = label.char_indices().nth(position) else {
        return paint(style::TOOL_PENDING, label);
    };
    let end = start + ch.len_utf8();
    format!(
        "{}{}{}",
        paint(style::TOOL_PENDING, &label[..start]),
        paint(style::TOOL_WAVE, &label[start..end]),
        paint(style::TOOL_PENDING, &label[end..])
    )
}

pub fn render_plain_result(result: &PlainResultSegment) -> String {
    let text = result.text.trim_end_matches('\n');
    let style = if result.is_error {
        style::ERROR_TEXT
    } else {
        style::PLAIN_RESULT
    };
    text.lines()
        .map(|line| paint(style, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Index of the tool the wave animates: the most recent pending one.
pub fn wave_target(segments: &[Segment]) -> Option<usize> {
    segments
        .iter()
        .rposition(|segment| matches!(segment, Segment::Tool(tool) if tool.status == ToolStatus::Pending))
}

/// Joins rendered blocks, skipping empty ones, with the separator each
/// adjacent pair calls for. `prev` is the kind of whatever was displayed
/// right before the first block.
pub fn join_blocks<I>(prev: Option<SegmentKind>, blocks: I) -> (String, Option<SegmentKind>)
where
    I: IntoIterator<Item = (SegmentKind, String)>,
{
    let mut out = String::new();
    let mut last = prev;
    for (kind, block) in blocks {
        if block.is_empty() {
            continue;
        }
        if let Some(prev) = last {
            out.push_str(segment_separator(prev, kind));
        }
        out.push_str(&block);
        last = Some(kind);
    }
    (out, last)
}

/// Settings for one rendering pass.
pub struct SegmentRenderer<'a> {
    width: usize,
    render_fn: &'a RenderFn,
    wave: WavePosition,
    include_images: bool,
    images: Option<&'a ImageCache>,
    subagents: Option<&'a SubagentRegistry>,
    now: Instant,
}

impl<'a> SegmentRenderer<'a> {
    pub fn new(width: usize, render_fn: &'a RenderFn) -> Self {
        Self {
            width,
            render_fn,
            wave: WavePosition::Paused,
            include_images: false,
            images: None,
            subagents: None,
            now: Instant::now(),
        }
    }

    pub fn with_wave(mut self, wave: WavePosition) -> Self {
        self.wave = wave;
        self
    }

    pub fn with_images(mut self, include_images: bool, images: Option<&'a ImageCache>) -> Self {
        self.include_images = include_images;
        self.images = images;
        self
    }

    pub fn with_subagents(mut self, subagents: Option<&'a SubagentRegistry>, now: Instant) -> Self {
        self.subagents = subagents;
        self.now = now;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn render_fn(&self) -> &'a RenderFn {
        self.render_fn
    }

    /// Full block for one segment, without separators.
    pub fn block(&self, segment: &Segment, animated: bool) -> String {
        match segment {
            Segment::Text(text) => text.block(self.render_fn),
            Segment::Tool(tool) => self.tool_block(tool, animated),
            Segment::Diff(diff) => diff.rendered.trim_end_matches('\n').to_string(),
            Segment::Image(image) => self.image_block(&image.path),
            Segment::PlainResult(result) => render_plain_result(result),
        }
    }

    pub fn tool_block(&self, tool: &ToolSegment, animated: bool) -> String {
        let wave = animated.then_some(self.wave);
        let mut line = render_tool(tool, wave, self.width);
        if tool.status == ToolStatus::Pending {
            let summary = self
                .subagents
                .and_then(|registry| registry.summary(&tool.call_id, self.now));
            if let Some(mut summary) = summary {
                let prefix_width = display_width(SUBAGENT_PREFIX, 0);
                if self.width > prefix_width {
                    summary = truncate_plain(&summary, self.width - prefix_width);
                }
                line.push('\n');
                line.push_str(&paint(style::TOOL_INFO, &format!("{SUBAGENT_PREFIX}{summary}")));
            }
        }
        line
    }

    pub fn image_block(&self, path: &Path) -> String {
        match (self.include_images, self.images) {
            (true, Some(cache)) => cache.get(path, self.width).to_string(),
            _ => image_placeholder(path),
        }
    }

    pub fn render(&self, segments: &[Segment]) -> String {
        let target = wave_target(segments);
        let blocks = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| (segment.kind(), self.block(segment, Some(index) == target)));
        join_blocks(None, blocks).0
    }
}

/// Render every segment in one pass, as the transcript would read if it
/// had never been streamed.
pub fn render_segments(
    segments: &[Segment],
    width: usize,
    wave: WavePosition,
    render_fn: &RenderFn,
    include_images: bool,
    images: Option<&ImageCache>,
) -> String {
    SegmentRenderer::new(width, render_fn)
        .with_wave(wave)
        .with_images(include_images, images)
        .render(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::segment::ToolSegment;
    use crate::test_support::plain;
    use crate::ui::image_cache::ImageRenderer;

    fn tool(name: &str, info: &str, status: ToolStatus) -> ToolSegment {
        ToolSegment {
            call_id: format!("call_{name}"),
            name: name.to_string(),
            info: info.to_string(),
            args_raw: String::new(),
            status,
            flushed: false,
        }
    }

    #[test]
    fn test_normalize_text_block() {
        assert_eq!(normalize_text_block("hi"), "hi\n\n");
        assert_eq!(normalize_text_block("hi\n\n\n\n"), "hi\n\n");
        assert_eq!(normalize_text_block("  \n\n"), "");
        assert_eq!(normalize_text_block(""), "");
    }

    #[test]
    fn test_tool_lines_by_status() {
        let pending = tool("bash", "ls -la", ToolStatus::Pending);
        assert_eq!(plain(&render_tool(&pending, None, 80)), "○ bash ls -la");
        let done = tool("bash", "ls -la", ToolStatus::Success);
        assert_eq!(plain(&render_tool(&done, None, 80)), "✓ bash ls -la");
        let failed = tool("read", "", ToolStatus::Error);
        assert_eq!(plain(&render_tool(&failed, None, 80)), "✗ read");
    }

    #[test]
    fn test_wave_highlights_one_cell() {
        let pending = tool("grep", "", ToolStatus::Pending);
        let line = render_tool(&pending, Some(WavePosition::At(1)), 80);
        assert_eq!(plain(&line), "○ grep");
        let highlighted = paint(style::TOOL_WAVE, "r");
        assert!(line.contains(&highlighted));
        let paused = render_tool(&pending, Some(WavePosition::Paused), 80);
        assert!(!paused.contains(&highlighted));
    }

    #[test]
    fn test_long_labels_are_truncated_to_width() {
        let pending = tool("bash", "cargo test --workspace --all-features", ToolStatus::Pending);
        let line = plain(&render_tool(&pending, None, 20));
        assert_eq!(display_width(&line, 0), 20);
        assert!(line.ends_with("..."));
    }

    #[test]
    fn test_join_blocks_skips_empty_and_separates() {
        let blocks = vec![
            (SegmentKind::Text, "intro\n\n".to_string()),
            (SegmentKind::Tool, "tool a".to_string()),
            (SegmentKind::Text, String::new()),
            (SegmentKind::Tool, "tool b".to_string()),
            (SegmentKind::Text, "outro\n\n".to_string()),
        ];
        let (joined, last) = join_blocks(None, blocks);
        assert_eq!(joined, "intro\n\ntool a\ntool b\n\noutro\n\n");
        assert_eq!(last, Some(SegmentKind::Text));
    }

    #[test]
    fn test_only_last_pending_tool_animates() {
        let segments = vec![
            Segment::Tool(tool("read", "", ToolStatus::Pending)),
            Segment::Tool(tool("grep", "", ToolStatus::Pending)),
        ];
        assert_eq!(wave_target(&segments), Some(1));
        let render = plain_render_fn();
        let out = render_segments(&segments, 80, WavePosition::At(0), render.as_ref(), false, None);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(!lines[0].contains(&paint(style::TOOL_WAVE, "r")));
        assert!(lines[1].contains(&paint(style::TOOL_WAVE, "g")));
    }

    #[test]
    fn test_plain_result_and_image_placeholder() {
        let render = plain_render_fn();
        let segments = vec![
            Segment::PlainResult(PlainResultSegment {
                text: "Error: boom\n".to_string(),
                is_error: true,
                flushed: false,
            }),
            Segment::Image(crate::state::segment::ImageSegment {
                path: "out.png".into(),
                flushed: false,
            }),
        ];
        let out = render_segments(&segments, 80, WavePosition::Paused, render.as_ref(), true, None);
        assert_eq!(plain(&out), "Error: boom\n[image: out.png]");
    }

    struct SizedRenderer;

    impl ImageRenderer for SizedRenderer {
        fn render(&self, path: &Path, width: usize) -> Result<String> {
            Ok(format!("<{} fit to {width}>", path.display()))
        }
    }

    #[test]
    fn test_images_render_through_the_cache() {
        let render = plain_render_fn();
        let cache = ImageCache::new(4, Arc::new(SizedRenderer));
        let segments = vec![Segment::Image(crate::state::segment::ImageSegment {
            path: "chart.png".into(),
            flushed: false,
        })];
        let out = render_segments(
            &segments,
            60,
            WavePosition::Paused,
            render.as_ref(),
            true,
            Some(&cache),
        );
        assert_eq!(out, "<chart.png fit to 60>");
        assert_eq!(cache.len(), 1);

        let out = render_segments(
            &segments,
            60,
            WavePosition::Paused,
            render.as_ref(),
            false,
            Some(&cache),
        );
        assert_eq!(out, "[image: chart.png]");
    }

    #[test]
    fn test_width_render_fn_rebuilds_on_resize() {
        let engines = Arc::new(EngineCache::default());
        let mut render = WidthRenderFn::new(Arc::clone(&engines), 40);
        let text = "alpha beta gamma delta";
        assert_eq!(plain(&(render.get())(text).expect("render")), "alpha beta gamma delta\n\n");

        assert!(!render.update(40));
        assert!(render.update(11));
        assert_eq!(render.width(), 11);
        assert_eq!(plain(&(render.get())(text).expect("render")), "alpha beta\ngamma delta\n\n");

        assert!(render.update(0));
        assert_eq!((render.get())("**raw**").expect("render"), "**raw**");
    }
}
