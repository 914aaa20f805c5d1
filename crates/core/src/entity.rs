use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::occurrence::{EntityId, OccurrenceBook, OccurrenceKind, Site};
use crate::similarity::{extract_one, FUZZ_THRESHOLD};

pub const PERSON_LABELS: [&str; 2] = ["PERSON", "PER"];

pub fn is_person_label(label: &str) -> bool {
    PERSON_LABELS.contains(&label)
}

/// Labels match when equal, or when both name people.
pub fn labels_compatible(left: &str, right: &str) -> bool {
    left == right || (is_person_label(left) && is_person_label(right))
}

/// Whether `full` is a more complete name for the referent of `partial`:
/// compatible labels, strictly longer, and containing `partial` as whole
/// words.
pub fn is_full_name(partial: &str, partial_label: &str, full: &str, full_label: &str) -> bool {
    if !labels_compatible(partial_label, full_label) || full.len() <= partial.len() {
        return false;
    }
    let partial_words: Vec<&str> = partial.split_whitespace().collect();
    let full_words: Vec<&str> = full.split_whitespace().collect();
    !partial_words.is_empty()
        && full_words
            .windows(partial_words.len())
            .any(|window| window == partial_words.as_slice())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Person,
    Term,
}

impl EntityCategory {
    pub fn of_label(label: &str) -> Self {
        if is_person_label(label) {
            EntityCategory::Person
        } else {
            EntityCategory::Term
        }
    }

    /// Numeric category used by the relational output.
    pub fn code(self) -> i64 {
        match self {
            EntityCategory::Person => 1,
            EntityCategory::Term => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Current canonical surface form; changes under full-name promotion.
    pub name: String,
    pub label: String,
    pub quote: String,
    pub mention_count: u32,
}

impl Entity {
    pub fn category(&self) -> EntityCategory {
        EntityCategory::of_label(&self.label)
    }
}

/// How a mention was attached to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionOutcome {
    Exact,
    Merged { promoted: bool },
    Created,
}

/// Deduplicates recognized mentions into entities.
///
/// Entities are stored by id; every surface form ever attached to an entity
/// stays in the alias map, so full-name promotion only moves the canonical
/// name and never reinserts records.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: IndexMap<EntityId, Entity>,
    aliases: HashMap<String, EntityId>,
    protected: HashSet<String>,
    removed: BTreeSet<EntityId>,
    occurrences: OccurrenceBook,
    next_id: EntityId,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: IndexMap::new(),
            aliases: HashMap::new(),
            protected: HashSet::new(),
            removed: BTreeSet::new(),
            occurrences: OccurrenceBook::new(),
            next_id: 0,
        }
    }

    /// Names that are never fuzzily merged into another entity, typically the
    /// user's custom entries.
    pub fn with_protected_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn record_mention(&mut self, surface: &str, label: &str, quote: &str, site: Site) -> EntityId {
        let (id, _) = self.attach(surface, label, quote);
        self.occurrences.record(site, OccurrenceKind::Entity(id));
        id
    }

    /// Resolves a mention to an entity id without recording an occurrence.
    pub fn attach(&mut self, surface: &str, label: &str, quote: &str) -> (EntityId, MentionOutcome) {
        if let Some(&id) = self.aliases.get(surface) {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.mention_count += 1;
                return (id, MentionOutcome::Exact);
            }
        }

        if !self.protected.contains(surface) {
            if let Some((id, promoted)) = self.fuzzy_attach(surface, label) {
                return (id, MentionOutcome::Merged { promoted });
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(
            id,
            Entity {
                id,
                name: surface.to_string(),
                label: label.to_string(),
                quote: quote.to_string(),
                mention_count: 1,
            },
        );
        self.aliases.insert(surface.to_string(), id);
        debug!(entity = surface, id, label, "new entity");
        (id, MentionOutcome::Created)
    }

    fn fuzzy_attach(&mut self, surface: &str, label: &str) -> Option<(EntityId, bool)> {
        let (matched, score) = extract_one(
            surface,
            self.entities.values().map(|entity| entity.name.as_str()),
            FUZZ_THRESHOLD,
        )?;
        let id = *self.aliases.get(matched)?;
        let entity = self.entities.get_mut(&id)?;
        entity.mention_count += 1;
        let promoted = !self.protected.contains(&entity.name)
            && is_full_name(&entity.name, &entity.label, surface, label);
        debug!(
            mention = surface,
            matched = entity.name.as_str(),
            score,
            promoted,
            "fuzzy merge"
        );
        if promoted {
            entity.name = surface.to_string();
        }
        self.aliases.insert(surface.to_string(), id);
        Some((id, promoted))
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn lookup(&self, surface: &str) -> Option<&Entity> {
        self.aliases.get(surface).and_then(|id| self.entities.get(id))
    }

    /// Surviving entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.contains(name)
    }

    pub fn occurrences(&self) -> &OccurrenceBook {
        &self.occurrences
    }

    pub fn removed_ids(&self) -> &BTreeSet<EntityId> {
        &self.removed
    }

    pub fn is_removed(&self, id: EntityId) -> bool {
        self.removed.contains(&id)
    }

    /// Drops the entity and remembers its id so anchors can be suppressed
    /// without renumbering the survivors.
    pub(crate) fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.shift_remove(&id)?;
        self.aliases.retain(|_, alias_id| *alias_id != id);
        self.removed.insert(id);
        Some(entity)
    }

    pub fn count_by_category(&self, category: EntityCategory) -> usize {
        self.iter().filter(|e| e.category() == category).count()
    }

    /// Ids of the `limit` most mentioned entities in a category; ties keep id
    /// order.
    pub fn top_mentioned(&self, category: EntityCategory, limit: usize) -> Vec<EntityId> {
        let mut ranked: Vec<&Entity> = self.iter().filter(|e| e.category() == category).collect();
        ranked.sort_by(|a, b| b.mention_count.cmp(&a.mention_count).then(a.id.cmp(&b.id)));
        ranked.into_iter().take(limit).map(|e| e.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(start: usize) -> Site {
        Site::new("ch1.xhtml", (0, 200), (start, start + 5))
    }

    #[test]
    fn first_mention_creates_entity() {
        let mut registry = EntityRegistry::new();
        let id = registry.record_mention("Paris", "GPE", "Paris in spring.", site(0));
        assert_eq!(id, 0);
        assert_eq!(registry.get(0).unwrap().mention_count, 1);
        assert_eq!(registry.occurrences().len(), 1);
    }

    #[test]
    fn short_then_full_name_promotes_key() {
        let mut registry = EntityRegistry::new();
        let first = registry.record_mention("Obama", "PERSON", "Obama spoke.", site(0));
        let second = registry.record_mention("Barack Obama", "PERSON", "Barack Obama left.", site(10));
        assert_eq!(first, second);
        let entity = registry.get(first).unwrap();
        assert_eq!(entity.name, "Barack Obama");
        assert_eq!(entity.mention_count, 2);
        assert_eq!(entity.quote, "Obama spoke.");
        assert_eq!(registry.lookup("Obama").unwrap().id, first);
    }

    #[test]
    fn full_then_short_name_keeps_full_key() {
        let mut registry = EntityRegistry::new();
        let first = registry.record_mention("Barack Obama", "PERSON", "q", site(0));
        let second = registry.record_mention("Obama", "PERSON", "q", site(10));
        assert_eq!(first, second);
        assert_eq!(registry.get(first).unwrap().name, "Barack Obama");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn misspelled_name_merges_into_existing_entity() {
        let mut registry = EntityRegistry::new();
        let first = registry.record_mention("John Smith", "PERSON", "q", site(0));
        let second = registry.record_mention("Jhon Smith", "PERSON", "q", site(10));
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(first).unwrap().name, "John Smith");
        assert_eq!(registry.get(first).unwrap().mention_count, 2);
    }

    #[test]
    fn incompatible_label_merges_without_promotion() {
        let mut registry = EntityRegistry::new();
        let id = registry.record_mention("Washington", "GPE", "q", site(0));
        let (merged, outcome) = registry.attach("George Washington", "PERSON", "q");
        assert_eq!(id, merged);
        assert_eq!(outcome, MentionOutcome::Merged { promoted: false });
        assert_eq!(registry.get(id).unwrap().name, "Washington");
    }

    #[test]
    fn protected_names_are_never_merged() {
        let mut registry = EntityRegistry::new().with_protected_names(["Obama"]);
        registry.record_mention("Barack Obama", "PERSON", "q", site(0));
        let id = registry.record_mention("Obama", "PERSON", "q", site(10));
        assert_eq!(id, 1);
        assert_eq!(registry.len(), 2);
        // Exact hits on a protected name still count.
        assert_eq!(registry.record_mention("Obama", "PERSON", "q", site(20)), 1);
        assert_eq!(registry.get(1).unwrap().mention_count, 2);
    }

    #[test]
    fn protected_names_are_never_promoted_away() {
        let mut registry = EntityRegistry::new().with_protected_names(["Dumbledore"]);
        let id = registry.record_mention("Dumbledore", "PERSON", "q", site(0));
        let merged = registry.record_mention("Albus Dumbledore", "PERSON", "q", site(10));
        assert_eq!(id, merged);
        assert_eq!(registry.get(id).unwrap().name, "Dumbledore");
    }

    #[test]
    fn full_name_requires_whole_words() {
        assert!(is_full_name("Obama", "PERSON", "Barack Obama", "PER"));
        assert!(!is_full_name("Barack Obama", "PERSON", "Obama", "PERSON"));
        assert!(!is_full_name("Bam", "PERSON", "Bambi Bamford", "PERSON"));
        assert!(!is_full_name("Paris", "GPE", "Paris Hilton", "PERSON"));
    }

    #[test]
    fn top_mentioned_ranks_by_count_then_id() {
        let mut registry = EntityRegistry::new();
        for name in ["Alice", "Bob", "Bob", "Carol", "Carol", "Carol"] {
            registry.attach(name, "PERSON", "q");
        }
        registry.attach("Paris", "GPE", "q");
        assert_eq!(registry.top_mentioned(EntityCategory::Person, 2), vec![2, 1]);
        assert_eq!(registry.top_mentioned(EntityCategory::Term, 10), vec![3]);
        assert_eq!(registry.count_by_category(EntityCategory::Person), 3);
    }
}
