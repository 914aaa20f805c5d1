mod annotate;
mod custom;
mod entity;
mod error;
mod facts;
mod filter;
mod footnotes;
mod gloss;
mod knowledge;
mod lemma;
mod markup;
mod normalization;
mod occurrence;
mod prefs;
mod regions;
mod rewrite;
mod similarity;

pub use annotate::{AnnotatedBook, Annotator, Mention, RewrittenRegion, XRaySummary};
pub use custom::{CustomEntry, CustomOverrides};
pub use entity::{
    is_full_name, is_person_label, labels_compatible, Entity, EntityCategory, EntityRegistry,
    MentionOutcome, PERSON_LABELS,
};
pub use error::{GlossError, Result};
pub use facts::{inception_text, regime_type, WIKIDATA_ITEM_URL};
pub use filter::remove_entities;
pub use footnotes::{
    resolve_description, word_wise_page, x_ray_page, Description, FootnotePage, PageImage,
};
pub use gloss::{GlossCache, GlossRow, GlossSource, MemoryGlossary};
pub use knowledge::{
    Capability, Citation, DescriptionSource, FactsRecord, JsonCache, KnowledgeBase,
    KnowledgeRecord, KnowledgeSource, MemorySource, SummaryRecord,
};
pub use lemma::LemmaRegistry;
pub use markup::{css_rules, OPS_NS, WORD_WISE_PAGE, XHTML_NS, X_RAY_PAGE};
pub use normalization::{
    dictionary_pos, escape_attr, escape_text, is_cjk, lemma_key, process_for_match,
    raw_offset, split_lemma_key, strip_invisible, unescape_text,
};
pub use occurrence::{
    EntityId, LemmaId, Occurrence, OccurrenceBook, OccurrenceKind, RegionId, Site,
};
pub use prefs::Prefs;
pub use regions::{extract_paragraphs, Paragraph, TextRegion};
pub use rewrite::{finish_document, RewriteStats, Rewriter};
pub use similarity::{extract_one, token_set_ratio, FUZZ_THRESHOLD};
