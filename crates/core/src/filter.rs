use tracing::{debug, info};

use crate::entity::{Entity, EntityRegistry};
use crate::occurrence::EntityId;

/// Drops entities mentioned fewer than `min_count` times. Protected (custom)
/// names and entities for which `has_description` holds are kept regardless
/// of frequency. Returns the removed ids in ascending order.
pub fn remove_entities<F>(registry: &mut EntityRegistry, min_count: u32, has_description: F) -> Vec<EntityId>
where
    F: Fn(&Entity) -> bool,
{
    let doomed: Vec<EntityId> = registry
        .iter()
        .filter(|entity| entity.mention_count < min_count)
        .filter(|entity| !registry.is_protected(&entity.name) && !has_description(entity))
        .map(|entity| entity.id)
        .collect();
    for &id in &doomed {
        if let Some(entity) = registry.remove(id) {
            debug!(entity = entity.name.as_str(), id, count = entity.mention_count, "entity filtered");
        }
    }
    info!(removed = doomed.len(), kept = registry.len(), min_count, "entity filter applied");
    doomed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::Site;

    fn registry() -> EntityRegistry {
        let mut registry = EntityRegistry::new().with_protected_names(["Hogwarts"]);
        let site = || Site::new("ch1.xhtml", (0, 10), (0, 5));
        for name in ["Harry", "Harry", "Harry", "Ron", "Hogwarts", "London"] {
            let label = if name == "Harry" || name == "Ron" { "PERSON" } else { "GPE" };
            registry.record_mention(name, label, "q", site());
        }
        registry
    }

    #[test]
    fn rare_entities_are_removed_and_ids_kept() {
        let mut registry = registry();
        let removed = remove_entities(&mut registry, 2, |_| false);
        assert_eq!(removed, vec![1, 3]);
        assert!(registry.is_removed(1));
        assert!(registry.get(1).is_none());
        assert_eq!(registry.lookup("Harry").unwrap().id, 0);
        assert_eq!(registry.lookup("Hogwarts").unwrap().id, 2);
        assert!(registry.lookup("Ron").is_none());
    }

    #[test]
    fn cached_descriptions_override_frequency() {
        let mut registry = registry();
        let removed = remove_entities(&mut registry, 2, |entity| entity.name == "London");
        assert_eq!(removed, vec![1]);
        assert!(registry.lookup("London").is_some());
    }

    #[test]
    fn threshold_of_one_removes_nothing() {
        let mut registry = registry();
        assert!(remove_entities(&mut registry, 1, |_| false).is_empty());
        assert_eq!(registry.len(), 4);
    }
}
