use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;
use std::sync::Arc;

use super::provider::{provider_stream_from_bytes, ByteStream, ProviderStream};
use crate::types::ProviderError;

/// Scripted provider that replays canned SSE responses, one per call.
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<Vec<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
        }
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    /// Raw SSE bytes for the next response. Each configured chunk is framed
    /// as its own event.
    pub fn next_byte_stream(&self) -> Result<ByteStream> {
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            return Err(anyhow!("MockProvider: No more responses configured"));
        }
        let sse_chunks = responses.remove(0);

        let byte_chunks: Vec<Result<Bytes, ProviderError>> = sse_chunks
            .into_iter()
            .map(|s| {
                let framed = if s.ends_with("\n\n") {
                    s
                } else {
                    format!("{s}\n\n")
                };
                Ok(Bytes::from(framed))
            })
            .collect();

        Ok(Box::pin(stream::iter(byte_chunks)))
    }

    pub fn next_stream(&self) -> Result<ProviderStream> {
        Ok(provider_stream_from_bytes(self.next_byte_stream()?))
    }
}
