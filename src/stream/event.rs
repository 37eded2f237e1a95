use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{ProviderError, SubagentEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl Usage {
    /// Totals saturate at `u64::MAX` rather than wrap.
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_write_tokens = self.cache_write_tokens.saturating_add(other.cache_write_tokens);
    }

    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_write_tokens)
    }
}

/// Normalized event consumed by the segment tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    ToolStart {
        call_id: String,
        name: String,
        info: String,
        args_raw: String,
    },
    ToolEnd {
        call_id: String,
        name: String,
        info: String,
        success: bool,
    },
    Usage(Usage),
    Phase(String),
    Retry {
        attempt: u32,
        max: u32,
        wait_secs: u64,
    },
    Image(PathBuf),
    Diff {
        path: String,
        old: String,
        new: String,
        start_line: usize,
    },
    Subagent {
        call_id: String,
        event: SubagentEvent,
    },
    /// Terminal event. Carries the running output-token total.
    Done {
        total_tokens: u64,
    },
    /// Terminal event.
    Error(ProviderError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error(_))
    }
}
