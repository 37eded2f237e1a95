use std::collections::HashSet;

/// Call IDs already observed. Used for tool start/end dedup and for
/// subagent tombstones.
#[derive(Debug, Default, Clone)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`. Returns true when it had not been seen before.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string())
    }

    pub fn was_seen(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Like `mark_seen`, except an empty ID is never deduplicated.
    pub fn first_sighting(&mut self, id: &str) -> bool {
        id.is_empty() || self.mark_seen(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
