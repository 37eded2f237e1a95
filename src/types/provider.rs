use serde::{Deserialize, Serialize};

/// One decoded event from the provider feed. The `type` tag selects the
/// variant; unrecognized tags decode to `Unknown` and are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    TextDelta {
        text: String,
    },
    ToolCallStart {
        id: String,
        name: String,
        #[serde(default)]
        info: String,
        #[serde(default)]
        arguments: String,
    },
    ToolCallEnd {
        id: String,
        name: String,
        #[serde(default)]
        info: String,
        #[serde(default = "default_success")]
        success: bool,
        #[serde(default)]
        output: Option<String>,
    },
    Usage {
        #[serde(default)]
        input_tokens: u64,
        #[serde(default)]
        output_tokens: u64,
        #[serde(default)]
        cache_read_tokens: u64,
        #[serde(default)]
        cache_write_tokens: u64,
    },
    Phase {
        label: String,
    },
    Retry {
        attempt: u32,
        max: u32,
        #[serde(default)]
        wait_secs: u64,
    },
    Error {
        message: String,
        #[serde(default)]
        code: Option<u16>,
    },
    /// Progress from a sub-agent running under tool call `id`.
    Subagent {
        id: String,
        event: SubagentEvent,
    },
    #[serde(other)]
    Unknown,
}

/// One progress update from a sub-agent, e.g.
/// `{"kind":"tool_started","value":"grep"}` or `{"kind":"finished"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SubagentEvent {
    Text(String),
    ToolStarted(String),
    ToolFinished(String),
    Tokens(u64),
    Finished,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Provider returned {code}: {message}")]
    Status { code: u16, message: String },
}
