use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::{env_f64, env_flag, env_millis, env_usize};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;
pub const DEFAULT_WAVE_TICK: Duration = Duration::from_millis(50);
pub const DEFAULT_WAVE_PAUSE: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_DIFF_LINES: usize = 50;
pub const DEFAULT_MAX_DIFF_WIDTH: usize = 90;
pub const DEFAULT_DIFF_CONTEXT_LINES: usize = 2;
pub const DEFAULT_SUBAGENT_TEXT_CAP: usize = 64 * 1024;
pub const DEFAULT_WORD_DIFF_THRESHOLD: f64 = 0.5;
pub const DEFAULT_ENGINE_CACHE_CAPACITY: usize = 8;
pub const DEFAULT_IMAGE_CACHE_CAPACITY: usize = 32;
pub const DEFAULT_MIN_KEEP_SEGMENTS: usize = 1;

const CHANNEL_CAPACITY_ENV: &str = "VEX_STREAM_BUFFER";
const WAVE_TICK_ENV: &str = "VEX_WAVE_TICK_MS";
const WAVE_PAUSE_ENV: &str = "VEX_WAVE_PAUSE_MS";
const MAX_DIFF_LINES_ENV: &str = "VEX_MAX_DIFF_LINES";
const MAX_DIFF_WIDTH_ENV: &str = "VEX_MAX_DIFF_WIDTH";
const DIFF_CONTEXT_LINES_ENV: &str = "VEX_DIFF_CONTEXT_LINES";
const SUBAGENT_TEXT_CAP_ENV: &str = "VEX_SUBAGENT_TEXT_CAP";
const WORD_DIFF_THRESHOLD_ENV: &str = "VEX_WORD_DIFF_THRESHOLD";
const SAFE_BOUNDARY_MIN_BYTES_ENV: &str = "VEX_SAFE_BOUNDARY_MIN_BYTES";
const ENGINE_CACHE_ENV: &str = "VEX_ENGINE_CACHE";
const IMAGE_CACHE_ENV: &str = "VEX_IMAGE_CACHE";
const MIN_KEEP_SEGMENTS_ENV: &str = "VEX_MIN_KEEP_SEGMENTS";
const PLAIN_OUTPUT_ENV: &str = "VEX_PLAIN_OUTPUT";

/// Tunables for the rendering core. Every field has a default; the
/// environment only overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub channel_capacity: usize,
    pub wave_tick: Duration,
    pub wave_pause: Duration,
    pub max_diff_lines: usize,
    pub max_diff_width: usize,
    pub diff_context_lines: usize,
    pub subagent_text_cap: usize,
    pub word_diff_threshold: f64,
    pub safe_boundary_min_bytes: usize,
    pub engine_cache_capacity: usize,
    pub image_cache_capacity: usize,
    pub min_keep_segments: usize,
    pub plain_output: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            wave_tick: DEFAULT_WAVE_TICK,
            wave_pause: DEFAULT_WAVE_PAUSE,
            max_diff_lines: DEFAULT_MAX_DIFF_LINES,
            max_diff_width: DEFAULT_MAX_DIFF_WIDTH,
            diff_context_lines: DEFAULT_DIFF_CONTEXT_LINES,
            subagent_text_cap: DEFAULT_SUBAGENT_TEXT_CAP,
            word_diff_threshold: DEFAULT_WORD_DIFF_THRESHOLD,
            safe_boundary_min_bytes: crate::markdown::boundary::SAFE_BOUNDARY_MIN_BYTES,
            engine_cache_capacity: DEFAULT_ENGINE_CACHE_CAPACITY,
            image_cache_capacity: DEFAULT_IMAGE_CACHE_CAPACITY,
            min_keep_segments: DEFAULT_MIN_KEEP_SEGMENTS,
            plain_output: false,
        }
    }
}

impl RenderConfig {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            channel_capacity: env_usize(CHANNEL_CAPACITY_ENV).unwrap_or(defaults.channel_capacity),
            wave_tick: env_millis(WAVE_TICK_ENV).unwrap_or(defaults.wave_tick),
            wave_pause: env_millis(WAVE_PAUSE_ENV).unwrap_or(defaults.wave_pause),
            max_diff_lines: env_usize(MAX_DIFF_LINES_ENV).unwrap_or(defaults.max_diff_lines),
            max_diff_width: env_usize(MAX_DIFF_WIDTH_ENV).unwrap_or(defaults.max_diff_width),
            diff_context_lines: env_usize(DIFF_CONTEXT_LINES_ENV)
                .unwrap_or(defaults.diff_context_lines),
            subagent_text_cap: env_usize(SUBAGENT_TEXT_CAP_ENV)
                .unwrap_or(defaults.subagent_text_cap),
            word_diff_threshold: env_f64(WORD_DIFF_THRESHOLD_ENV)
                .unwrap_or(defaults.word_diff_threshold),
            safe_boundary_min_bytes: env_usize(SAFE_BOUNDARY_MIN_BYTES_ENV)
                .unwrap_or(defaults.safe_boundary_min_bytes),
            engine_cache_capacity: env_usize(ENGINE_CACHE_ENV)
                .unwrap_or(defaults.engine_cache_capacity),
            image_cache_capacity: env_usize(IMAGE_CACHE_ENV)
                .unwrap_or(defaults.image_cache_capacity),
            min_keep_segments: env_usize(MIN_KEEP_SEGMENTS_ENV)
                .unwrap_or(defaults.min_keep_segments),
            plain_output: env_flag(PLAIN_OUTPUT_ENV).unwrap_or(defaults.plain_output),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            bail!("Invalid {CHANNEL_CAPACITY_ENV}: channel capacity must be at least 1");
        }
        if self.wave_tick.is_zero() {
            bail!("Invalid {WAVE_TICK_ENV}: wave tick interval must be non-zero");
        }
        if self.max_diff_width < 20 {
            bail!(
                "Invalid {MAX_DIFF_WIDTH_ENV} '{}': diff content width must be at least 20 columns",
                self.max_diff_width
            );
        }
        if !(0.0..=1.0).contains(&self.word_diff_threshold) {
            bail!(
                "Invalid {WORD_DIFF_THRESHOLD_ENV} '{}': expected a ratio between 0 and 1",
                self.word_diff_threshold
            );
        }
        if self.engine_cache_capacity == 0 || self.image_cache_capacity == 0 {
            bail!("Render caches need a capacity of at least 1 entry");
        }
        Ok(())
    }

    pub fn diff_options(&self, terminal_width: usize) -> crate::diff::render::DiffRenderOptions {
        crate::diff::render::DiffRenderOptions {
            terminal_width,
            max_content_width: self.max_diff_width,
            max_lines: self.max_diff_lines,
            context_lines: self.diff_context_lines,
            word_diff_threshold: self.word_diff_threshold,
        }
    }
}
