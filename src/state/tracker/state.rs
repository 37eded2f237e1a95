use std::sync::Arc;

use super::super::segment::{Segment, SegmentKind};
use super::super::subagent::SubagentRegistry;
use super::super::wave::{WaveAnimation, WavePosition};
use crate::config::RenderConfig;
use crate::diff::DiffRenderOptions;
use crate::markdown::EngineCache;
use crate::stream::Usage;
use crate::ui::image_cache::ImageCache;
use crate::ui::render::{plain_render_fn, RenderFn};

/// Ordered segments of the current turn and how much of them has reached
/// scrollback. Flushing only ever advances over a complete prefix.
pub struct SegmentTracker {
    pub(super) segments: Vec<Segment>,
    pub(super) engines: Arc<EngineCache>,
    pub(super) images: Option<Arc<ImageCache>>,
    pub(super) subagents: Option<Arc<SubagentRegistry>>,
    /// Completes text implicitly closed by a following non-text segment
    /// when no streaming renderer is attached.
    pub(super) text_render_fn: Arc<RenderFn>,
    pub(super) wave: WaveAnimation,
    pub(super) diff_options: DiffRenderOptions,
    pub(super) min_boundary_bytes: usize,
    pub(super) plain_output: bool,
    pub(super) flushed_count: usize,
    /// The last print ended with a newline the content did not have.
    pub(super) newline_debt: bool,
    pub(super) last_emitted: Option<SegmentKind>,
    pub(super) status: Option<String>,
    pub(super) usage: Usage,
    pub(super) total_tokens: Option<u64>,
}

impl Default for SegmentTracker {
    fn default() -> Self {
        Self::new(&RenderConfig::default(), Arc::new(EngineCache::default()))
    }
}

impl SegmentTracker {
    pub fn new(config: &RenderConfig, engines: Arc<EngineCache>) -> Self {
        Self {
            segments: Vec::new(),
            engines,
            images: None,
            subagents: None,
            text_render_fn: Arc::from(plain_render_fn()),
            wave: WaveAnimation::new(config.wave_tick, config.wave_pause),
            diff_options: config.diff_options(0),
            min_boundary_bytes: config.safe_boundary_min_bytes,
            plain_output: config.plain_output,
            flushed_count: 0,
            newline_debt: false,
            last_emitted: None,
            status: None,
            usage: Usage::default(),
            total_tokens: None,
        }
    }

    pub fn with_images(mut self, images: Arc<ImageCache>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_subagents(mut self, subagents: Arc<SubagentRegistry>) -> Self {
        self.subagents = Some(subagents);
        self
    }

    pub fn with_text_render_fn(mut self, render_fn: Arc<RenderFn>) -> Self {
        self.text_render_fn = render_fn;
        self
    }

    pub fn set_text_render_fn(&mut self, render_fn: Arc<RenderFn>) {
        self.text_render_fn = render_fn;
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn flushed_count(&self) -> usize {
        self.flushed_count
    }

    pub fn has_unflushed(&self) -> bool {
        self.flushed_count < self.segments.len()
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn total_tokens(&self) -> Option<u64> {
        self.total_tokens
    }

    pub fn status_line(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn wave_position(&self) -> WavePosition {
        self.wave.position()
    }

    pub fn wave_tick_interval(&self) -> std::time::Duration {
        self.wave.tick_interval()
    }

    pub fn subagents(&self) -> Option<&Arc<SubagentRegistry>> {
        self.subagents.as_ref()
    }

    pub fn engines(&self) -> &Arc<EngineCache> {
        &self.engines
    }
}
