use std::collections::HashSet;

use parking_lot::Mutex;

/// URLs already handed to the backend in the current configuration epoch.
///
/// Only grows, except through [`DedupStore::clear`].
#[derive(Debug, Default)]
pub struct DedupStore {
    urls: Mutex<HashSet<String>>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.lock().contains(url)
    }

    /// Atomic test-and-add. Returns `true` if the URL was not present before.
    pub fn insert(&self, url: &str) -> bool {
        let mut urls = self.urls.lock();
        if urls.contains(url) {
            return false;
        }
        urls.insert(url.to_string())
    }

    pub fn clear(&self) {
        self.urls.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.urls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
