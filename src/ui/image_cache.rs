use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DEFAULT_IMAGE_CACHE_CAPACITY;

/// Turns an image file into terminal output at a given width.
pub trait ImageRenderer: Send + Sync {
    fn render(&self, path: &Path, width: usize) -> Result<String>;
}

pub fn image_placeholder(path: &Path) -> String {
    format!("[image: {}]", path.display())
}

/// Renders the textual placeholder. Used when the terminal has no inline
/// image protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderImageRenderer;

impl ImageRenderer for PlaceholderImageRenderer {
    fn render(&self, path: &Path, _width: usize) -> Result<String> {
        Ok(image_placeholder(path))
    }
}

/// Rendered images keyed by path and width.
pub struct ImageCache {
    entries: Mutex<LruCache<(PathBuf, usize), Arc<str>>>,
    renderer: Arc<dyn ImageRenderer>,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_CACHE_CAPACITY, Arc::new(PlaceholderImageRenderer))
    }
}

impl ImageCache {
    pub fn new(capacity: usize, renderer: Arc<dyn ImageRenderer>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            renderer,
        }
    }

    /// Cached rendering of `path`. A failed render yields the placeholder
    /// and is not cached, so the next frame retries.
    pub fn get(&self, path: &Path, width: usize) -> Arc<str> {
        let key = (path.to_path_buf(), width);
        if let Some(hit) = self.entries.lock().get(&key) {
            return Arc::clone(hit);
        }

        match self.renderer.render(path, width) {
            Ok(rendered) => {
                let rendered: Arc<str> = Arc::from(rendered.trim_end_matches('\n'));
                self.entries.lock().put(key, Arc::clone(&rendered));
                rendered
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "image render failed");
                Arc::from(image_placeholder(path))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
