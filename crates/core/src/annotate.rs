//! Per-book orchestration: tagger mentions in, rewritten regions and footnote
//! pages out.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::custom::CustomOverrides;
use crate::entity::{EntityCategory, EntityRegistry};
use crate::error::{GlossError, Result};
use crate::filter::remove_entities;
use crate::footnotes::{word_wise_page, x_ray_page, FootnotePage, PageImage};
use crate::gloss::{GlossCache, GlossSource};
use crate::knowledge::KnowledgeBase;
use crate::lemma::LemmaRegistry;
use crate::markup::css_rules;
use crate::normalization::lemma_key;
use crate::occurrence::{EntityId, OccurrenceKind, RegionId, Site};
use crate::prefs::Prefs;
use crate::regions::TextRegion;
use crate::rewrite::{RewriteStats, Rewriter};

const TOP_MENTIONED: usize = 10;

/// One tagger result. A mention with a label is an entity; without one it is
/// a lemma candidate and `text` is its lemma.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub text: String,
    #[serde(default)]
    pub label: Option<String>,
    pub region: RegionId,
    pub paragraph: (usize, usize),
    pub word: (usize, usize),
    /// Sentence the entity was found in; the mention text when absent.
    #[serde(default)]
    pub quote: Option<String>,
    /// Tagger part-of-speech tag such as `VERB`.
    #[serde(default)]
    pub pos: Option<String>,
}

impl Mention {
    fn site(&self) -> Site {
        Site::new(self.region.clone(), self.paragraph, self.word)
    }
}

/// Counts and top-mentioned ids per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XRaySummary {
    pub people: usize,
    pub terms: usize,
    pub top_people: Vec<EntityId>,
    pub top_terms: Vec<EntityId>,
}

impl XRaySummary {
    pub fn of(entities: &EntityRegistry) -> Self {
        Self {
            people: entities.count_by_category(EntityCategory::Person),
            terms: entities.count_by_category(EntityCategory::Term),
            top_people: entities.top_mentioned(EntityCategory::Person, TOP_MENTIONED),
            top_terms: entities.top_mentioned(EntityCategory::Term, TOP_MENTIONED),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenRegion {
    pub id: RegionId,
    pub text: String,
}

/// Everything an emission adapter needs to assemble the output book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedBook {
    pub regions: Vec<RewrittenRegion>,
    pub x_ray: Option<FootnotePage>,
    pub word_wise: Option<FootnotePage>,
    pub summary: XRaySummary,
    pub stats: RewriteStats,
}

impl AnnotatedBook {
    pub fn pages(&self) -> impl Iterator<Item = &FootnotePage> {
        self.x_ray.iter().chain(self.word_wise.iter())
    }

    pub fn images(&self) -> impl Iterator<Item = &PageImage> {
        self.pages().flat_map(|page| page.images.iter())
    }
}

pub struct Annotator {
    prefs: Prefs,
    custom: CustomOverrides,
    entities: EntityRegistry,
    lemmas: LemmaRegistry,
    omitted: usize,
}

impl Annotator {
    pub fn new(prefs: Prefs, custom: CustomOverrides) -> Self {
        let entities = EntityRegistry::new().with_protected_names(custom.names().map(str::to_string));
        Self {
            prefs,
            custom,
            entities,
            lemmas: LemmaRegistry::new(),
            omitted: 0,
        }
    }

    pub fn prefs(&self) -> &Prefs {
        &self.prefs
    }

    pub fn custom(&self) -> &CustomOverrides {
        &self.custom
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn lemmas(&self) -> &LemmaRegistry {
        &self.lemmas
    }

    /// Records one mention. Returns `None` when a custom entry marks the
    /// entity as omitted.
    pub fn ingest(&mut self, mention: &Mention) -> Option<OccurrenceKind> {
        let Some(label) = mention.label.as_deref() else {
            let pos = if self.prefs.use_pos {
                mention.pos.as_deref()
            } else {
                None
            };
            let key = lemma_key(&mention.text, pos);
            self.lemmas.record_mention(&key, mention.site());
            return Some(OccurrenceKind::Lemma(key));
        };

        let (name, label) = match self.custom.canonical_name(&mention.text) {
            Some(name) => {
                if self.custom.is_omitted(name) {
                    self.omitted += 1;
                    return None;
                }
                let label = self.custom.get(name).map_or(label, |entry| entry.label.as_str());
                (name.to_string(), label.to_string())
            }
            None => (mention.text.clone(), label.to_string()),
        };
        let quote = mention.quote.as_deref().unwrap_or(&mention.text);
        let id = self
            .entities
            .record_mention(&name, &label, quote, mention.site());
        Some(OccurrenceKind::Entity(id))
    }

    pub fn ingest_all<'m, I>(&mut self, mentions: I) -> usize
    where
        I: IntoIterator<Item = &'m Mention>,
    {
        let mut count = 0;
        for mention in mentions {
            if self.ingest(mention).is_some() {
                count += 1;
            }
        }
        info!(
            recorded = count,
            omitted = self.omitted,
            entities = self.entities.len(),
            lemmas = self.lemmas.len(),
            "mentions ingested"
        );
        count
    }

    /// Applies the mention-count filter when the configured minimum is above
    /// one. Entities with a cached summary survive.
    pub fn apply_filter(&mut self, knowledge: &KnowledgeBase) -> Vec<EntityId> {
        if self.prefs.minimal_x_ray_count <= 1 {
            return Vec::new();
        }
        remove_entities(&mut self.entities, self.prefs.minimal_x_ray_count, |entity| {
            knowledge.has_summary(&entity.name)
        })
    }

    pub fn summary(&self) -> XRaySummary {
        XRaySummary::of(&self.entities)
    }

    /// Filters, rewrites every region and builds the pages. Regions without
    /// occurrences come back as their cleaned text. `image_prefix` is the
    /// path from a page to the image folder.
    pub fn finish<S: GlossSource>(
        &mut self,
        regions: &[TextRegion],
        knowledge: &KnowledgeBase,
        glosses: &mut GlossCache<S>,
        image_prefix: &str,
    ) -> Result<AnnotatedBook> {
        self.apply_filter(knowledge);

        let book = self.entities.occurrences().merged(self.lemmas.occurrences());
        let known: HashSet<&RegionId> = regions.iter().map(|region| &region.id).collect();
        if let Some(region) = book.regions().find(|region| !known.contains(region)) {
            return Err(GlossError::malformed(format!(
                "occurrences refer to unknown region {region}"
            )));
        }
        let css = css_rules(!self.lemmas.is_empty(), self.prefs.remove_link_styles);

        let mut rewriter = Rewriter::new(
            self.entities.removed_ids(),
            &mut self.lemmas,
            glosses,
            &self.prefs.lemma_lang,
        )
        .with_css(css);
        let mut rewritten = Vec::with_capacity(regions.len());
        for region in regions {
            let occurrences = book.occurrences(&region.id);
            let text = if occurrences.is_empty() {
                region.text.clone()
            } else {
                let text = rewriter.rewrite_document(&region.id, &region.text, occurrences)?;
                debug!(region = region.id.as_str(), "region annotated");
                text
            };
            rewritten.push(RewrittenRegion {
                id: region.id.clone(),
                text,
            });
        }
        rewriter.log_totals();
        let stats = rewriter.totals();

        let x_ray = (!self.entities.is_empty()).then(|| {
            x_ray_page(&self.entities, &self.custom, knowledge, &self.prefs, image_prefix)
        });
        let word_wise = if self.lemmas.is_empty() {
            None
        } else {
            Some(word_wise_page(&self.lemmas, glosses, &self.prefs)?)
        };

        Ok(AnnotatedBook {
            regions: rewritten,
            x_ray,
            word_wise,
            summary: self.summary(),
            stats,
        })
    }
}
