use std::sync::atomic::{AtomicU64, Ordering};

use crate::entity::EntityId;

pub const DEFAULT_PLACEHOLDER_PREFIX: &str = "temp-";

/// Issues placeholder ids: `temp-1`, `temp-2`, ...
///
/// Counter-based so that invocations within the same millisecond never
/// collide. Ids are never reused for the lifetime of the generator.
#[derive(Debug)]
pub struct PlaceholderIds {
    prefix: String,
    next: AtomicU64,
}

impl PlaceholderIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next_id(&self) -> EntityId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        EntityId::new(format!("{}{}", self.prefix, n))
    }
}

impl Default for PlaceholderIds {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_are_sequential_and_prefixed() {
        let ids = PlaceholderIds::default();
        assert_eq!(ids.next_id().as_str(), "temp-1");
        assert_eq!(ids.next_id().as_str(), "temp-2");
        assert!(ids.next_id().is_placeholder_tag(ids.prefix()));
    }

    #[test]
    fn ids_never_collide_across_threads() {
        let ids = Arc::new(PlaceholderIds::new("p-"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
