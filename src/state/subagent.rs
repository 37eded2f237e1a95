use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::DEFAULT_SUBAGENT_TEXT_CAP;
use crate::stream::SeenSet;
use crate::util::floor_char_boundary;

pub use crate::types::SubagentEvent;

/// Live progress of a sub-agent running under a tool call.
#[derive(Debug, Clone)]
pub struct SubagentProgress {
    text: String,
    truncated: bool,
    cap: usize,
    active_tools: Vec<String>,
    completed_tools: Vec<String>,
    tokens: u64,
    tool_calls: usize,
    started_at: Instant,
    ended_at: Option<Instant>,
}

impl SubagentProgress {
    pub fn new(cap: usize, now: Instant) -> Self {
        Self {
            text: String::new(),
            truncated: false,
            cap,
            active_tools: Vec::new(),
            completed_tools: Vec::new(),
            tokens: 0,
            tool_calls: 0,
            started_at: now,
            ended_at: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn active_tools(&self) -> &[String] {
        &self.active_tools
    }

    pub fn completed_tools(&self) -> &[String] {
        &self.completed_tools
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_calls
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Keeps the most recent `cap` bytes.
    pub fn append_text(&mut self, delta: &str) {
        self.text.push_str(delta);
        if self.text.len() > self.cap {
            let excess = self.text.len() - self.cap;
            let mut cut = floor_char_boundary(&self.text, excess);
            if cut < excess {
                cut = self.text[cut..]
                    .char_indices()
                    .nth(1)
                    .map(|(offset, _)| cut + offset)
                    .unwrap_or(self.text.len());
            }
            self.text.drain(..cut);
            self.truncated = true;
        }
    }

    pub fn apply(&mut self, event: SubagentEvent, now: Instant) {
        match event {
            SubagentEvent::Text(delta) => self.append_text(&delta),
            SubagentEvent::ToolStarted(name) => {
                self.tool_calls += 1;
                self.active_tools.push(name);
            }
            SubagentEvent::ToolFinished(name) => {
                if let Some(index) = self.active_tools.iter().position(|tool| *tool == name) {
                    self.active_tools.remove(index);
                }
                self.completed_tools.push(name);
            }
            SubagentEvent::Tokens(count) => self.tokens = self.tokens.saturating_add(count),
            SubagentEvent::Finished => {
                if self.ended_at.is_none() {
                    self.ended_at = Some(now);
                }
                self.active_tools.clear();
            }
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.ended_at
            .unwrap_or(now)
            .saturating_duration_since(self.started_at)
    }

    pub fn last_line(&self) -> Option<&str> {
        self.text
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }

    /// One-line summary shown under the owning tool.
    pub fn summary(&self, now: Instant) -> String {
        let mut parts = Vec::new();
        if let Some(active) = self.active_tools.last() {
            parts.push(format!("running {active}"));
        }
        if self.tool_calls > 0 {
            let noun = if self.tool_calls == 1 { "tool call" } else { "tool calls" };
            parts.push(format!("{} {noun}", self.tool_calls));
        }
        if self.tokens > 0 {
            parts.push(format!("{} tokens", format_tokens(self.tokens)));
        }
        parts.push(format!("{}s", self.elapsed(now).as_secs()));
        if self.active_tools.is_empty() {
            if let Some(line) = self.last_line() {
                parts.push(line.to_string());
            }
        }
        parts.join(" · ")
    }
}

fn format_tokens(tokens: u64) -> String {
    if tokens >= 1000 {
        format!("{:.1}k", tokens as f64 / 1000.0)
    } else {
        tokens.to_string()
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<String, SubagentProgress>,
    removed: SeenSet,
}

/// Progress of all running sub-agents keyed by the owning tool call id.
/// Shared between the event consumer and the renderer.
#[derive(Debug)]
pub struct SubagentRegistry {
    inner: RwLock<RegistryInner>,
    text_cap: usize,
}

impl Default for SubagentRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SUBAGENT_TEXT_CAP)
    }
}

impl SubagentRegistry {
    pub fn new(text_cap: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            text_cap,
        }
    }

    /// Apply a progress event. The entry is created on first sight; events
    /// for a removed call id are dropped so a late straggler cannot bring it
    /// back.
    pub fn apply(&self, call_id: &str, event: SubagentEvent, now: Instant) -> bool {
        let mut inner = self.inner.write();
        if inner.removed.was_seen(call_id) {
            tracing::debug!(call_id, "dropping progress for removed sub-agent");
            return false;
        }
        let cap = self.text_cap;
        inner
            .entries
            .entry(call_id.to_string())
            .or_insert_with(|| SubagentProgress::new(cap, now))
            .apply(event, now);
        true
    }

    pub fn remove(&self, call_id: &str) -> Option<SubagentProgress> {
        let mut inner = self.inner.write();
        inner.removed.mark_seen(call_id);
        inner.entries.remove(call_id)
    }

    pub fn snapshot(&self, call_id: &str) -> Option<SubagentProgress> {
        self.inner.read().entries.get(call_id).cloned()
    }

    pub fn summary(&self, call_id: &str, now: Instant) -> Option<String> {
        self.inner
            .read()
            .entries
            .get(call_id)
            .map(|progress| progress.summary(now))
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
