use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

use super::sse::SseParser;
use crate::types::{ProviderError, ProviderEvent};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// The pull-based provider feed the stream adapter consumes. The end of the
/// stream is the end of the response.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent, ProviderError>> + Send>>;

pub fn provider_stream_from_events(
    events: Vec<Result<ProviderEvent, ProviderError>>,
) -> ProviderStream {
    Box::pin(stream::iter(events))
}

struct SseState {
    bytes: ByteStream,
    parser: SseParser,
    ready: VecDeque<ProviderEvent>,
    finished: bool,
}

/// Decode an SSE byte stream into provider events.
pub fn provider_stream_from_bytes(bytes: ByteStream) -> ProviderStream {
    let state = SseState {
        bytes,
        parser: SseParser::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.ready.extend(state.parser.process(&chunk)),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.parser.finish());
                }
            }
        }
    }))
}
