use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::models::Pagination;

/// Last fetched page of a resource together with its request lifecycle flags.
#[derive(Debug, Clone)]
pub struct CachedCollection<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    pub filters: BTreeMap<String, String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_fetch_time: Option<Instant>,
    pub cache_timeout: Duration,
}

impl<T> CachedCollection<T> {
    pub fn new(cache_timeout: Duration) -> Self {
        Self {
            items: Vec::new(),
            pagination: Pagination::default(),
            filters: BTreeMap::new(),
            is_loading: false,
            error: None,
            last_fetch_time: None,
            cache_timeout,
        }
    }

    /// A listing may be served from memory only when it was stamped within the
    /// timeout and actually holds items.
    pub fn is_fresh(&self, now: Instant) -> bool {
        match self.last_fetch_time {
            Some(fetched) => {
                !self.items.is_empty()
                    && now.saturating_duration_since(fetched) < self.cache_timeout
            }
            None => false,
        }
    }

    pub fn invalidate(&mut self) {
        self.last_fetch_time = None;
    }

    /// Merges new filter values (blank values remove the key), rewinds to the
    /// first page and forces the next read to hit the network.
    pub fn update_filters(&mut self, filters: BTreeMap<String, String>) {
        for (key, value) in filters {
            if value.trim().is_empty() {
                self.filters.remove(&key);
            } else {
                self.filters.insert(key, value);
            }
        }
        self.pagination.page = 1;
        self.invalidate();
    }

    pub fn set_page(&mut self, page: u32) {
        self.pagination.page = page.max(1);
        self.invalidate();
    }

    pub fn replace(&mut self, items: Vec<T>, pagination: Pagination, now: Instant) {
        self.items = items;
        self.pagination = pagination;
        self.error = None;
        self.last_fetch_time = Some(now);
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.cache_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(timeout: Duration, fetched: Instant) -> CachedCollection<u32> {
        let mut cache = CachedCollection::new(timeout);
        cache.replace(vec![1, 2, 3], Pagination::synthesized(1, 3, 3), fetched);
        cache
    }

    #[test]
    fn fresh_inside_window_stale_after() {
        let t0 = Instant::now();
        let cache = filled(Duration::from_millis(120_000), t0);
        assert!(cache.is_fresh(t0 + Duration::from_millis(119_999)));
        assert!(!cache.is_fresh(t0 + Duration::from_millis(120_000)));
    }

    #[test]
    fn empty_items_never_fresh() {
        let t0 = Instant::now();
        let mut cache = filled(Duration::from_secs(60), t0);
        cache.items.clear();
        assert!(!cache.is_fresh(t0));
    }

    #[test]
    fn filter_change_rewinds_and_invalidates() {
        let t0 = Instant::now();
        let mut cache = filled(Duration::from_secs(60), t0);
        cache.pagination.page = 4;

        cache.update_filters(BTreeMap::from([("search".to_string(), "react".to_string())]));

        assert_eq!(cache.pagination.page, 1);
        assert_eq!(cache.last_fetch_time, None);
        assert_eq!(cache.filters.get("search").map(String::as_str), Some("react"));
        assert!(!cache.is_fresh(t0));

        cache.update_filters(BTreeMap::from([("search".to_string(), String::new())]));
        assert!(cache.filters.is_empty());
    }
}
