use crate::types::ProviderEvent;

/// Incremental server-sent-events decoder. Bytes may arrive split at any
/// point; complete frames are decoded as they close.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence cut by the chunk boundary.
    partial: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<ProviderEvent> {
        let mut bytes = std::mem::take(&mut self.partial);
        bytes.extend_from_slice(chunk);
        let incomplete = match std::str::from_utf8(&bytes) {
            Err(err) if err.error_len().is_none() => Some(err.valid_up_to()),
            _ => None,
        };
        if let Some(valid) = incomplete {
            self.partial = bytes.split_off(valid);
        }
        self.buffer.push_str(&String::from_utf8_lossy(&bytes));
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let frame_end = start + end + 2;
            if let Some(event) = decode_frame(&self.buffer[start..frame_end]) {
                events.push(event);
            }
            start = frame_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }

    /// Decode a trailing frame that was never terminated by a blank line.
    pub fn finish(&mut self) -> Vec<ProviderEvent> {
        let mut rest = std::mem::take(&mut self.buffer);
        if !self.partial.is_empty() {
            rest.push_str(&String::from_utf8_lossy(&std::mem::take(&mut self.partial)));
        }
        decode_frame(&rest).into_iter().collect()
    }
}

fn decode_frame(frame: &str) -> Option<ProviderEvent> {
    let mut event_type = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event_type = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data.is_empty() {
        return None;
    }
    let payload = data.join("\n");
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<ProviderEvent>(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(
                error = %err,
                event_type = event_type.unwrap_or(""),
                data = payload,
                "SSE parse error"
            );
            None
        }
    }
}
