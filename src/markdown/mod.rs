pub mod boundary;
pub mod engine;
pub mod stream;

pub use boundary::{find_safe_boundary, find_safe_boundary_with, SAFE_BOUNDARY_MIN_BYTES};
pub use engine::{EngineCache, MarkdownEngine};
pub use stream::{BlockKind, StreamingMarkdown};
