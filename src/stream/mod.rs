pub mod adapter;
pub mod event;
pub mod markers;
pub mod seen;

pub use adapter::{process_stream, split_text, StreamAdapter, MAX_TEXT_EVENT_BYTES};
pub use event::{StreamEvent, Usage};
pub use markers::{extract_markers, ToolMarker};
pub use seen::SeenSet;
