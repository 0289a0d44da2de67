use std::collections::HashMap;

/// Bounded set of image URLs that have already been loaded once.
///
/// Owned by a single viewer; cleared on every new extraction and on forced restart.
/// When full, the least recently touched URL is evicted.
#[derive(Debug)]
pub struct PrefetchCache {
    entries: HashMap<String, u64>,
    access_counter: u64,
    capacity: usize,
}

impl PrefetchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            access_counter: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn insert(&mut self, url: &str) {
        self.access_counter = self.access_counter.wrapping_add(1);
        if let Some(last_access) = self.entries.get_mut(url) {
            *last_access = self.access_counter;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(url.to_owned(), self.access_counter);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_counter = 0;
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, last_access)| **last_access)
            .map(|(url, _)| url.clone());
        if let Some(url) = oldest {
            self.entries.remove(&url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PrefetchCache;

    #[test]
    fn evicts_least_recently_touched() {
        let mut cache = PrefetchCache::new(2);
        cache.insert("/api/proxy/a.jpg");
        cache.insert("/api/proxy/b.jpg");
        cache.insert("/api/proxy/a.jpg");
        cache.insert("/api/proxy/c.jpg");

        assert!(cache.contains("/api/proxy/a.jpg"));
        assert!(!cache.contains("/api/proxy/b.jpg"));
        assert!(cache.contains("/api/proxy/c.jpg"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut cache = PrefetchCache::new(8);
        cache.insert("/cbr/1.jpg");
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.contains("/cbr/1.jpg"));
    }
}
