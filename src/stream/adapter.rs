//! Normalizes the provider feed into `StreamEvent`s on a bounded channel.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::event::{StreamEvent, Usage};
use super::markers::{extract_markers, ToolMarker};
use super::seen::SeenSet;
use crate::api::ProviderStream;
use crate::types::{ProviderError, ProviderEvent};
use crate::util::floor_char_boundary;

pub const MAX_TEXT_EVENT_BYTES: usize = 4096;

/// Per-stream translation state: dedup sets and running usage totals.
#[derive(Debug, Default)]
pub struct StreamAdapter {
    seen_starts: SeenSet,
    seen_ends: SeenSet,
    usage: Usage,
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.usage.output_tokens
    }

    pub fn done_event(&self) -> StreamEvent {
        StreamEvent::Done {
            total_tokens: self.total_output_tokens(),
        }
    }

    /// Translate one provider event. An `Err` ends the stream.
    pub fn translate(&mut self, event: ProviderEvent) -> Result<Vec<StreamEvent>, ProviderError> {
        let events = match event {
            ProviderEvent::TextDelta { text } => split_text(&text)
                .into_iter()
                .map(|chunk| StreamEvent::Text(chunk.to_string()))
                .collect(),
            ProviderEvent::ToolCallStart {
                id,
                name,
                info,
                arguments,
            } => {
                if !self.seen_starts.first_sighting(&id) {
                    tracing::debug!(call_id = %id, "dropping duplicate tool start");
                    return Ok(Vec::new());
                }
                vec![StreamEvent::ToolStart {
                    call_id: id,
                    name,
                    info,
                    args_raw: arguments,
                }]
            }
            ProviderEvent::ToolCallEnd {
                id,
                name,
                info,
                success,
                output,
            } => {
                if !self.seen_ends.first_sighting(&id) {
                    tracing::debug!(call_id = %id, "dropping duplicate tool end");
                    return Ok(Vec::new());
                }
                let mut events = vec![StreamEvent::ToolEnd {
                    call_id: id,
                    name,
                    info,
                    success,
                }];
                if let Some(output) = output {
                    events.extend(extract_markers(&output).into_iter().map(marker_event));
                }
                events
            }
            ProviderEvent::Usage {
                input_tokens,
                output_tokens,
                cache_read_tokens,
                cache_write_tokens,
            } => {
                let usage = Usage {
                    input_tokens,
                    output_tokens,
                    cache_read_tokens,
                    cache_write_tokens,
                };
                self.usage.accumulate(&usage);
                vec![StreamEvent::Usage(usage)]
            }
            ProviderEvent::Phase { label } => vec![StreamEvent::Phase(label)],
            ProviderEvent::Retry {
                attempt,
                max,
                wait_secs,
            } => vec![StreamEvent::Retry {
                attempt,
                max,
                wait_secs,
            }],
            ProviderEvent::Error { message, code } => {
                return Err(match code {
                    Some(code) => ProviderError::Status { code, message },
                    None => ProviderError::Transport(message),
                });
            }
            ProviderEvent::Subagent { id, event } => vec![StreamEvent::Subagent {
                call_id: id,
                event,
            }],
            ProviderEvent::Unknown => {
                tracing::trace!("ignoring unknown provider event");
                Vec::new()
            }
        };
        Ok(events)
    }
}

fn marker_event(marker: ToolMarker) -> StreamEvent {
    match marker {
        ToolMarker::Image(path) => StreamEvent::Image(path),
        ToolMarker::Diff {
            path,
            old,
            new,
            start_line,
        } => StreamEvent::Diff {
            path,
            old,
            new,
            start_line,
        },
    }
}

/// Split a text delta into pieces of at most `MAX_TEXT_EVENT_BYTES`, cut on
/// char boundaries. Never yields an empty piece.
pub fn split_text(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() <= MAX_TEXT_EVENT_BYTES {
            chunks.push(rest);
            break;
        }
        let mut cut = floor_char_boundary(rest, MAX_TEXT_EVENT_BYTES);
        if cut == 0 {
            cut = rest
                .char_indices()
                .nth(1)
                .map(|(index, _)| index)
                .unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

/// Run the adapter on its own task and return the receiving end of a
/// bounded channel. Sends wait for the consumer; nothing is dropped.
///
/// The channel always ends with exactly one `Done` or `Error`. Once `cancel`
/// fires, read errors are reported as `Done`.
pub fn process_stream(
    cancel: CancellationToken,
    stream: ProviderStream,
    capacity: usize,
) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(run_adapter(cancel, stream, tx));
    rx
}

async fn run_adapter(
    cancel: CancellationToken,
    mut stream: ProviderStream,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut adapter = StreamAdapter::new();

    let terminal = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break adapter.done_event(),
            next = stream.next() => next,
        };

        let failure = match next {
            None => break adapter.done_event(),
            Some(Ok(event)) => match adapter.translate(event) {
                Ok(events) => {
                    for event in events {
                        if tx.send(event).await.is_err() {
                            tracing::debug!("stream consumer went away");
                            return;
                        }
                    }
                    continue;
                }
                Err(err) => err,
            },
            Some(Err(err)) => err,
        };

        if cancel.is_cancelled() {
            tracing::debug!(error = %failure, "read error after cancellation");
            break adapter.done_event();
        }
        tracing::warn!(error = %failure, "provider stream failed");
        break StreamEvent::Error(failure);
    };

    if tx.send(terminal).await.is_err() {
        tracing::debug!("stream consumer went away before the final event");
    }
}
