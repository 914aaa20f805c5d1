use indexmap::IndexMap;
use tracing::debug;

use crate::occurrence::{LemmaId, OccurrenceBook, OccurrenceKind, Site};

/// Unique lemma keys in first-seen order. Ids are never reused, even after a
/// lemma is dropped for lack of a gloss.
#[derive(Debug, Clone, Default)]
pub struct LemmaRegistry {
    lemmas: IndexMap<String, LemmaId>,
    occurrences: OccurrenceBook,
    next_id: LemmaId,
}

impl LemmaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `key` must already be normalized (see [`crate::lemma_key`]).
    pub fn record_mention(&mut self, key: &str, site: Site) -> LemmaId {
        let id = self.intern(key);
        self.occurrences
            .record(site, OccurrenceKind::Lemma(key.to_string()));
        id
    }

    fn intern(&mut self, key: &str) -> LemmaId {
        if let Some(&id) = self.lemmas.get(key) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.lemmas.insert(key.to_string(), id);
        id
    }

    pub fn id(&self, key: &str) -> Option<LemmaId> {
        self.lemmas.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lemmas.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<LemmaId> {
        let removed = self.lemmas.shift_remove(key);
        if removed.is_some() {
            debug!(lemma = key, "lemma dropped");
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, LemmaId)> {
        self.lemmas.iter().map(|(key, id)| (key.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.lemmas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lemmas.is_empty()
    }

    pub fn occurrences(&self) -> &OccurrenceBook {
        &self.occurrences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Site {
        Site::new("ch1.xhtml", (0, 20), (0, 3))
    }

    #[test]
    fn get_or_insert_preserves_first_seen_order() {
        let mut registry = LemmaRegistry::new();
        assert_eq!(registry.record_mention("walk", site()), 0);
        assert_eq!(registry.record_mention("run", site()), 1);
        assert_eq!(registry.record_mention("walk", site()), 0);
        let keys: Vec<_> = registry.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["walk", "run"]);
        assert_eq!(registry.occurrences().len(), 3);
    }

    #[test]
    fn removal_keeps_remaining_ids() {
        let mut registry = LemmaRegistry::new();
        registry.record_mention("a", site());
        registry.record_mention("b", site());
        registry.record_mention("c", site());
        assert_eq!(registry.remove("b"), Some(1));
        assert_eq!(registry.remove("b"), None);
        let entries: Vec<_> = registry.iter().collect();
        assert_eq!(entries, vec![("a", 0), ("c", 2)]);
        assert_eq!(registry.record_mention("d", site()), 3);
    }
}
