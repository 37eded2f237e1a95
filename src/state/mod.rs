pub mod segment;
pub mod subagent;
pub mod tracker;
pub mod wave;

pub use segment::{segment_separator, Segment, SegmentKind, ToolStatus};
pub use subagent::{SubagentEvent, SubagentProgress, SubagentRegistry};
pub use tracker::SegmentTracker;
pub use wave::{WaveAnimation, WavePosition};
