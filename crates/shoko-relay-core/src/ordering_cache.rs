use dashmap::DashMap;

/// Key for ordering lookups: (TMDB episode id, ordering id)
type OrderingKey = (u64, String);

/// Memoized TMDB alternate-ordering lookups.
///
/// Scanning an episode's alternate orderings is the expensive part of ordering
/// selection, and the same (episode, ordering) pairs are asked for repeatedly while
/// a series is mapped. Entries are never invalidated; TMDB links are treated as
/// stable for the lifetime of the cache.
#[derive(Debug, Default)]
pub struct OrderingCache {
    /// Does the episode appear in the ordering?
    membership: DashMap<OrderingKey, bool>,
    /// Episode coordinates inside the ordering: (season, episode)
    coords: DashMap<OrderingKey, (Option<i32>, i32)>,
}

impl OrderingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn membership_or_insert_with<F>(&self, episode_id: u64, ordering_id: &str, compute: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let key = (episode_id, ordering_id.to_string());
        if let Some(hit) = self.membership.get(&key) {
            return *hit;
        }
        *self.membership.entry(key).or_insert_with(compute)
    }

    pub fn coords_or_insert_with<F>(&self, episode_id: u64, ordering_id: &str, compute: F) -> (Option<i32>, i32)
    where
        F: FnOnce() -> (Option<i32>, i32),
    {
        let key = (episode_id, ordering_id.to_string());
        if let Some(hit) = self.coords.get(&key) {
            return *hit;
        }
        *self.coords.entry(key).or_insert_with(compute)
    }

    pub fn len(&self) -> usize {
        self.membership.len() + self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.membership.clear();
        self.coords.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_membership_is_computed_once() {
        let cache = OrderingCache::new();
        let calls = Cell::new(0);

        for _ in 0..3 {
            let found = cache.membership_or_insert_with(7, "group-a", || {
                calls.set(calls.get() + 1);
                true
            });
            assert!(found);
        }
        assert_eq!(calls.get(), 1);

        // Different ordering id is a different entry
        assert!(!cache.membership_or_insert_with(7, "group-b", || false));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear() {
        let cache = OrderingCache::new();
        cache.coords_or_insert_with(1, "x", || (Some(2), 3));
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.coords_or_insert_with(1, "x", || (None, 9)), (None, 9));
    }
}
