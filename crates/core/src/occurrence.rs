use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type EntityId = u32;
pub type LemmaId = u32;

/// Identifies one independently rewritten text region, usually the path of a
/// document inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RegionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "ref")]
pub enum OccurrenceKind {
    Entity(EntityId),
    Lemma(String),
}

/// One annotation site.
///
/// `paragraph_start..paragraph_end` are byte offsets into the raw, unmodified
/// region text. `word_start..word_end` are byte offsets into the paragraph
/// text after markup unescaping, which is what the tagger saw.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub paragraph_start: usize,
    pub paragraph_end: usize,
    pub word_start: usize,
    pub word_end: usize,
    pub kind: OccurrenceKind,
}

impl Occurrence {
    pub fn entity(paragraph: (usize, usize), word: (usize, usize), id: EntityId) -> Self {
        Self::new(paragraph, word, OccurrenceKind::Entity(id))
    }

    pub fn lemma(paragraph: (usize, usize), word: (usize, usize), key: impl Into<String>) -> Self {
        Self::new(paragraph, word, OccurrenceKind::Lemma(key.into()))
    }

    fn new(paragraph: (usize, usize), word: (usize, usize), kind: OccurrenceKind) -> Self {
        Self {
            paragraph_start: paragraph.0,
            paragraph_end: paragraph.1,
            word_start: word.0,
            word_end: word.1,
            kind,
        }
    }

    pub fn key(&self) -> (usize, usize) {
        (self.paragraph_start, self.word_start)
    }

    /// Checks the ordering invariant that does not depend on the region text.
    pub fn is_well_formed(&self) -> bool {
        self.paragraph_start <= self.paragraph_end
            && self.word_start <= self.word_end
            && self.word_end <= self.paragraph_end - self.paragraph_start
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        match self.kind {
            OccurrenceKind::Entity(id) => Some(id),
            OccurrenceKind::Lemma(_) => None,
        }
    }

    pub fn lemma_key(&self) -> Option<&str> {
        match &self.kind {
            OccurrenceKind::Lemma(key) => Some(key.as_str()),
            OccurrenceKind::Entity(_) => None,
        }
    }
}

/// Where a mention was found: the region plus paragraph and word bounds, in
/// the same coordinates as [`Occurrence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub region: RegionId,
    pub paragraph: (usize, usize),
    pub word: (usize, usize),
}

impl Site {
    pub fn new(region: impl Into<RegionId>, paragraph: (usize, usize), word: (usize, usize)) -> Self {
        Self {
            region: region.into(),
            paragraph,
            word,
        }
    }
}

/// Occurrences grouped by region, regions kept in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceBook {
    regions: IndexMap<RegionId, Vec<Occurrence>>,
}

impl OccurrenceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, region: RegionId, occurrence: Occurrence) {
        self.regions.entry(region).or_default().push(occurrence);
    }

    pub fn record(&mut self, site: Site, kind: OccurrenceKind) {
        let occurrence = Occurrence::new(site.paragraph, site.word, kind);
        self.push(site.region, occurrence);
    }

    /// Merges both books into one, keeping every region's list sorted.
    pub fn merged(&self, other: &OccurrenceBook) -> OccurrenceBook {
        let mut merged = self.clone();
        for (region, occurrences) in other.iter() {
            merged
                .regions
                .entry(region.clone())
                .or_default()
                .extend_from_slice(occurrences);
        }
        for occurrences in merged.regions.values_mut() {
            occurrences.sort_by_key(Occurrence::key);
        }
        merged
    }

    pub fn regions(&self) -> impl Iterator<Item = &RegionId> {
        self.regions.keys()
    }

    pub fn len(&self) -> usize {
        self.regions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.values().all(Vec::is_empty)
    }

    pub fn occurrences(&self, region: &RegionId) -> &[Occurrence] {
        self.regions.get(region).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entity and lemma occurrences are pushed by independent registries, so
    /// the rewriter needs them merged back into reading order.
    pub fn sorted(&self, region: &RegionId) -> Vec<Occurrence> {
        let mut occurrences = self.occurrences(region).to_vec();
        occurrences.sort_by_key(Occurrence::key);
        occurrences
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegionId, &[Occurrence])> {
        self.regions
            .iter()
            .map(|(region, occurrences)| (region, occurrences.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_merges_entities_and_lemmas_by_position() {
        let mut book = OccurrenceBook::new();
        let region = RegionId::new("ch1.xhtml");
        book.push(region.clone(), Occurrence::entity((50, 90), (3, 8), 0));
        book.push(region.clone(), Occurrence::entity((10, 40), (0, 5), 1));
        book.push(region.clone(), Occurrence::lemma((10, 40), (12, 16), "walk"));
        book.push(region.clone(), Occurrence::lemma((50, 90), (0, 2), "go"));

        let keys: Vec<_> = book.sorted(&region).iter().map(Occurrence::key).collect();
        assert_eq!(keys, vec![(10, 0), (10, 12), (50, 0), (50, 3)]);
        assert_eq!(book.len(), 4);
    }

    #[test]
    fn unknown_region_has_no_occurrences() {
        let book = OccurrenceBook::new();
        assert!(book.occurrences(&RegionId::new("missing")).is_empty());
        assert!(book.is_empty());
    }

    #[test]
    fn well_formed_rejects_word_past_paragraph() {
        assert!(Occurrence::entity((0, 10), (2, 10), 0).is_well_formed());
        assert!(!Occurrence::entity((0, 10), (2, 11), 0).is_well_formed());
        assert!(!Occurrence::lemma((5, 4), (0, 0), "x").is_well_formed());
    }
}
