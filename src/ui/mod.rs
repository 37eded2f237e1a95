pub mod ansi;
pub mod image_cache;
pub mod render;
pub mod style;

pub use image_cache::{ImageCache, ImageRenderer, PlaceholderImageRenderer};
pub use render::{render_segments, RenderFn, SegmentRenderer, WidthRenderFn};
