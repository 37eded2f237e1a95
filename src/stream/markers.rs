//! Image and diff markers embedded in tool output.
//!
//! `__IMAGE__:<path>` and `__DIFF__:<base64 JSON {file, old, new, line}>`
//! must start a line. Anything malformed is dropped.

use aho_corasick::AhoCorasick;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::LazyLock;

pub const IMAGE_MARKER: &str = "__IMAGE__:";
pub const DIFF_MARKER: &str = "__DIFF__:";
pub const MAX_MARKER_PAYLOAD_BYTES: usize = 1024 * 1024;

static MARKERS: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new([IMAGE_MARKER, DIFF_MARKER]).expect("valid marker patterns")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolMarker {
    Image(PathBuf),
    Diff {
        path: String,
        old: String,
        new: String,
        start_line: usize,
    },
}

#[derive(Debug, Deserialize)]
struct DiffPayload {
    file: String,
    #[serde(default)]
    old: String,
    #[serde(default)]
    new: String,
    #[serde(default)]
    line: usize,
}

pub fn extract_markers(output: &str) -> Vec<ToolMarker> {
    let mut markers = Vec::new();
    for found in MARKERS.find_iter(output) {
        let line_start = output[..found.start()]
            .rfind('\n')
            .map(|index| index + 1)
            .unwrap_or(0);
        if !output[line_start..found.start()].trim().is_empty() {
            continue;
        }
        let rest = &output[found.end()..];
        let payload = rest.split('\n').next().unwrap_or("").trim();

        let marker = match found.pattern().as_usize() {
            0 => decode_image(payload),
            _ => decode_diff(payload),
        };
        if let Some(marker) = marker {
            markers.push(marker);
        }
    }
    markers
}

fn decode_image(payload: &str) -> Option<ToolMarker> {
    if payload.is_empty() || payload.len() > MAX_MARKER_PAYLOAD_BYTES {
        tracing::warn!(len = payload.len(), "dropping image marker with bad path");
        return None;
    }
    Some(ToolMarker::Image(PathBuf::from(payload)))
}

fn decode_diff(payload: &str) -> Option<ToolMarker> {
    if payload.is_empty() || payload.len() > MAX_MARKER_PAYLOAD_BYTES {
        tracing::warn!(len = payload.len(), "dropping diff marker with bad payload size");
        return None;
    }
    let decoded = match STANDARD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
    {
        Ok(decoded) => decoded,
        Err(err) => {
            tracing::warn!(error = %err, "dropping diff marker with invalid base64");
            return None;
        }
    };
    let diff: DiffPayload = match serde_json::from_slice(&decoded) {
        Ok(diff) => diff,
        Err(err) => {
            tracing::warn!(error = %err, "dropping diff marker with invalid JSON");
            return None;
        }
    };
    if diff.file.trim().is_empty() || (diff.old.is_empty() && diff.new.is_empty()) {
        tracing::warn!("dropping diff marker with empty fields");
        return None;
    }
    Some(ToolMarker::Diff {
        path: diff.file,
        old: diff.old,
        new: diff.new,
        start_line: diff.line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(json: &str) -> String {
        STANDARD.encode(json)
    }

    #[test]
    fn test_extracts_image_and_diff_in_order() {
        let diff = encode(r#"{"file":"src/a.rs","old":"a","new":"b","line":3}"#);
        let output = format!("wrote file\n__IMAGE__:/tmp/shot.png\n__DIFF__:{diff}\ndone");
        assert_eq!(
            extract_markers(&output),
            vec![
                ToolMarker::Image(PathBuf::from("/tmp/shot.png")),
                ToolMarker::Diff {
                    path: "src/a.rs".to_string(),
                    old: "a".to_string(),
                    new: "b".to_string(),
                    start_line: 3,
                },
            ]
        );
    }

    #[test]
    fn test_malformed_markers_are_dropped() {
        let missing_file = encode(r#"{"file":"","old":"a","new":"b"}"#);
        let empty_sides = encode(r#"{"file":"x.rs"}"#);
        let output = format!(
            "__DIFF__:not base64!!\n__DIFF__:{}\n__DIFF__:{missing_file}\n__DIFF__:{empty_sides}\n__IMAGE__:\n",
            encode("not json")
        );
        assert!(extract_markers(&output).is_empty());
    }

    #[test]
    fn test_marker_must_start_a_line() {
        let output = "see __IMAGE__:/tmp/x.png inline\n  __IMAGE__:/tmp/y.png";
        assert_eq!(
            extract_markers(output),
            vec![ToolMarker::Image(PathBuf::from("/tmp/y.png"))]
        );
    }

    #[test]
    fn test_oversized_payload_is_dropped() {
        let output = format!("__IMAGE__:{}", "x".repeat(MAX_MARKER_PAYLOAD_BYTES + 1));
        assert!(extract_markers(&output).is_empty());
    }
}
