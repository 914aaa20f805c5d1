//! Single-pass insertion of inline references into a text region.
//!
//! Bytes outside annotated paragraphs are copied verbatim. An annotated
//! paragraph is unescaped once, because word offsets refer to the decoded
//! text, and re-escaped piecewise around the inserted markup.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::{GlossError, Result};
use crate::gloss::{GlossCache, GlossSource};
use crate::lemma::LemmaRegistry;
use crate::markup::{self, OPS_NS, XHTML_NS};
use crate::normalization::{escape_text, is_cjk, unescape_text};
use crate::occurrence::{EntityId, Occurrence, OccurrenceKind, RegionId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub entity_anchors: usize,
    pub lemma_anchors: usize,
    pub lemma_rubies: usize,
    pub unresolved_lemmas: usize,
    pub skipped_overlaps: usize,
}

impl RewriteStats {
    fn absorb(&mut self, other: RewriteStats) {
        self.entity_anchors += other.entity_anchors;
        self.lemma_anchors += other.lemma_anchors;
        self.lemma_rubies += other.lemma_rubies;
        self.unresolved_lemmas += other.unresolved_lemmas;
        self.skipped_overlaps += other.skipped_overlaps;
    }
}

/// The paragraph currently being re-emitted.
struct OpenParagraph {
    start: usize,
    end: usize,
    decoded: String,
    /// Decoded bytes already written.
    emitted: usize,
}

pub struct Rewriter<'a, S> {
    removed: &'a BTreeSet<EntityId>,
    lemmas: &'a mut LemmaRegistry,
    glosses: &'a mut GlossCache<S>,
    cjk: bool,
    css: String,
    totals: RewriteStats,
}

impl<'a, S: GlossSource> Rewriter<'a, S> {
    pub fn new(
        removed: &'a BTreeSet<EntityId>,
        lemmas: &'a mut LemmaRegistry,
        glosses: &'a mut GlossCache<S>,
        lemma_lang: &str,
    ) -> Self {
        Self {
            removed,
            lemmas,
            glosses,
            cjk: is_cjk(lemma_lang),
            css: String::new(),
            totals: RewriteStats::default(),
        }
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = css.into();
        self
    }

    pub fn totals(&self) -> RewriteStats {
        self.totals
    }

    /// Rewrites one region and applies the document-level edits.
    /// `occurrences` must be sorted by `(paragraph_start, word_start)`.
    pub fn rewrite_document(
        &mut self,
        region: &RegionId,
        text: &str,
        occurrences: &[Occurrence],
    ) -> Result<String> {
        let body = self.rewrite_region(region, text, occurrences)?;
        finish_document(body, &self.css)
            .map_err(|err| GlossError::malformed(format!("{region}: {err}")))
    }

    /// The linear pass alone, without namespace or style injection.
    pub fn rewrite_region(
        &mut self,
        region: &RegionId,
        text: &str,
        occurrences: &[Occurrence],
    ) -> Result<String> {
        let mut stats = RewriteStats::default();
        let mut out = String::with_capacity(text.len() + occurrences.len() * 96);
        let mut copied = 0usize;
        let mut open: Option<OpenParagraph> = None;

        for occurrence in occurrences {
            if let Some(id) = occurrence.entity_id() {
                if self.removed.contains(&id) {
                    continue;
                }
            }
            if !occurrence.is_well_formed() || occurrence.paragraph_end > text.len() {
                return Err(invalid_offsets(region, occurrence));
            }

            let same_paragraph = open.as_ref().is_some_and(|p| {
                p.start == occurrence.paragraph_start && p.end == occurrence.paragraph_end
            });
            if !same_paragraph {
                if let Some(paragraph) = open.take() {
                    out.push_str(&escape_text(&paragraph.decoded[paragraph.emitted..]));
                    copied = paragraph.end;
                }
                if occurrence.paragraph_start < copied {
                    return Err(GlossError::malformed(format!(
                        "{region}: paragraph {}..{} overlaps text already written up to {copied}",
                        occurrence.paragraph_start, occurrence.paragraph_end
                    )));
                }
                let between = text
                    .get(copied..occurrence.paragraph_start)
                    .ok_or_else(|| invalid_offsets(region, occurrence))?;
                out.push_str(between);
                let raw = text
                    .get(occurrence.paragraph_start..occurrence.paragraph_end)
                    .ok_or_else(|| invalid_offsets(region, occurrence))?;
                open = Some(OpenParagraph {
                    start: occurrence.paragraph_start,
                    end: occurrence.paragraph_end,
                    decoded: unescape_text(raw).into_owned(),
                    emitted: 0,
                });
            }

            let Some(paragraph) = open.as_mut() else {
                continue;
            };
            if occurrence.word_start < paragraph.emitted || occurrence.word_start == occurrence.word_end {
                debug!(
                    region = region.as_str(),
                    word_start = occurrence.word_start,
                    "skipping overlapping or empty occurrence"
                );
                stats.skipped_overlaps += 1;
                continue;
            }
            let (Some(before), Some(word)) = (
                paragraph.decoded.get(paragraph.emitted..occurrence.word_start),
                paragraph.decoded.get(occurrence.word_start..occurrence.word_end),
            ) else {
                return Err(invalid_offsets(region, occurrence));
            };
            out.push_str(&escape_text(before));
            let fragment = match &occurrence.kind {
                OccurrenceKind::Entity(id) => {
                    stats.entity_anchors += 1;
                    markup::entity_anchor(*id, word)
                }
                OccurrenceKind::Lemma(key) => self.lemma_fragment(key, word, &mut stats)?,
            };
            out.push_str(&fragment);
            paragraph.emitted = occurrence.word_end;
        }

        if let Some(paragraph) = open.take() {
            out.push_str(&escape_text(&paragraph.decoded[paragraph.emitted..]));
            copied = paragraph.end;
        }
        out.push_str(&text[copied..]);

        debug!(
            region = region.as_str(),
            entities = stats.entity_anchors,
            lemmas = stats.lemma_anchors + stats.lemma_rubies,
            "region rewritten"
        );
        self.totals.absorb(stats);
        Ok(out)
    }

    /// Gloss lookup failures surface here first, so a lemma without glosses
    /// is dropped from the registry on the spot and rendered as plain text.
    fn lemma_fragment(&mut self, key: &str, word: &str, stats: &mut RewriteStats) -> Result<String> {
        let Some(id) = self.lemmas.id(key) else {
            return Ok(escape_text(word).into_owned());
        };
        let gloss = self
            .glosses
            .resolve(key)?
            .first()
            .map(|row| row.inline_gloss().to_string());
        let Some(gloss) = gloss else {
            self.lemmas.remove(key);
            stats.unresolved_lemmas += 1;
            return Ok(escape_text(word).into_owned());
        };
        let ratio = gloss.chars().count() as f64 / word.chars().count().max(1) as f64;
        if ratio > markup::ruby_ratio_limit(self.cjk) {
            stats.lemma_anchors += 1;
            Ok(markup::lemma_anchor(id, word))
        } else {
            stats.lemma_rubies += 1;
            Ok(markup::lemma_ruby(id, word, &gloss))
        }
    }

    pub fn log_totals(&self) {
        let totals = self.totals;
        info!(
            entity_anchors = totals.entity_anchors,
            lemma_anchors = totals.lemma_anchors,
            lemma_rubies = totals.lemma_rubies,
            unresolved_lemmas = totals.unresolved_lemmas,
            "rewrite finished"
        );
    }
}

fn invalid_offsets(region: &RegionId, occurrence: &Occurrence) -> GlossError {
    GlossError::InvalidOffsets {
        region: region.to_string(),
        paragraph_start: occurrence.paragraph_start,
        paragraph_end: occurrence.paragraph_end,
        word_start: occurrence.word_start,
        word_end: occurrence.word_end,
    }
}

/// Declares the `epub` namespace and injects `css` before `</head>`, each at
/// most once.
pub fn finish_document(mut text: String, css: &str) -> Result<String> {
    if !text.contains(OPS_NS) {
        let declaration = format!(r#"xmlns="{XHTML_NS}""#);
        let Some(pos) = text.find(&declaration) else {
            return Err(GlossError::malformed("missing XHTML namespace declaration"));
        };
        text.insert_str(pos + declaration.len(), &format!(r#" xmlns:epub="{OPS_NS}""#));
    }
    if !css.is_empty() {
        let style = format!("<style>{css}</style>");
        if !text.contains(&style) {
            let Some(pos) = text.find("</head>") else {
                return Err(GlossError::malformed("missing </head> to inject styles before"));
            };
            text.insert_str(pos, &style);
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gloss::{GlossRow, MemoryGlossary};
    use crate::occurrence::Site;

    fn glossary() -> MemoryGlossary {
        MemoryGlossary::new()
            .with(
                "walk",
                None,
                GlossRow {
                    short_gloss: "go".into(),
                    full_gloss: "move on foot".into(),
                    ..Default::default()
                },
            )
            .with(
                "悠闲漫步",
                None,
                GlossRow {
                    short_gloss: "walk slowly".into(),
                    full_gloss: "walk slowly and without hurry".into(),
                    ..Default::default()
                },
            )
            .with(
                "dog",
                None,
                GlossRow {
                    short_gloss: "a domesticated carnivorous mammal".into(),
                    full_gloss: "a domesticated carnivorous mammal".into(),
                    ..Default::default()
                },
            )
    }

    fn rewrite(text: &str, occurrences: &[Occurrence], removed: &BTreeSet<EntityId>, lemmas: &mut LemmaRegistry) -> Result<String> {
        rewrite_in("en", text, occurrences, removed, lemmas)
    }

    fn rewrite_in(
        lang: &str,
        text: &str,
        occurrences: &[Occurrence],
        removed: &BTreeSet<EntityId>,
        lemmas: &mut LemmaRegistry,
    ) -> Result<String> {
        let glossary = glossary();
        let mut cache = GlossCache::new(&glossary, false);
        let mut rewriter = Rewriter::new(removed, lemmas, &mut cache, lang);
        rewriter.rewrite_region(&RegionId::new("r"), text, occurrences)
    }

    /// "悠闲漫步" is 4 chars against an 11-char gloss, a ratio of 2.75.
    fn rewrite_stroll(lang: &str) -> String {
        let text = "<p>他们悠闲漫步。</p>";
        let mut lemmas = LemmaRegistry::new();
        lemmas.record_mention("悠闲漫步", Site::new("r", (3, 24), (6, 18)));
        let occurrences = lemmas.occurrences().sorted(&RegionId::new("r"));
        rewrite_in(lang, text, &occurrences, &BTreeSet::new(), &mut lemmas).unwrap()
    }

    #[test]
    fn region_without_occurrences_is_unchanged() {
        let text = "<p>Tom &amp; Jerry&#8217;s</p>";
        let mut lemmas = LemmaRegistry::new();
        assert_eq!(rewrite(text, &[], &BTreeSet::new(), &mut lemmas).unwrap(), text);
    }

    #[test]
    fn entity_words_are_wrapped_and_rest_preserved() {
        let text = "<p>Tom &amp; Jerry met.</p><p>Bye</p>";
        let occurrences = [
            Occurrence::entity((3, 23), (0, 3), 0),
            Occurrence::entity((3, 23), (6, 11), 1),
        ];
        let mut lemmas = LemmaRegistry::new();
        let out = rewrite(text, &occurrences, &BTreeSet::new(), &mut lemmas).unwrap();
        assert_eq!(
            out,
            "<p><a class=\"x-ray\" epub:type=\"noteref\" href=\"x_ray.xhtml#0\">Tom</a> &amp; \
             <a class=\"x-ray\" epub:type=\"noteref\" href=\"x_ray.xhtml#1\">Jerry</a> met.</p><p>Bye</p>"
        );
    }

    #[test]
    fn removed_entities_leave_text_untouched() {
        let text = "<p>Tom met Jerry.</p>";
        let occurrences = [
            Occurrence::entity((3, 17), (0, 3), 0),
            Occurrence::entity((3, 17), (8, 13), 1),
        ];
        let removed = BTreeSet::from([0]);
        let mut lemmas = LemmaRegistry::new();
        let out = rewrite(text, &occurrences, &removed, &mut lemmas).unwrap();
        assert!(!out.contains("x_ray.xhtml#0"));
        assert!(out.starts_with("<p>Tom met <a class=\"x-ray\""));
        assert!(out.ends_with("Jerry</a>.</p>"));
    }

    #[test]
    fn lemma_without_gloss_is_dropped_and_left_plain() {
        let text = "<p>They fly and walk.</p>";
        let mut lemmas = LemmaRegistry::new();
        lemmas.record_mention("fly", Site::new("r", (3, 21), (5, 8)));
        lemmas.record_mention("walk", Site::new("r", (3, 21), (13, 17)));
        let occurrences = lemmas.occurrences().sorted(&RegionId::new("r"));
        let out = rewrite(text, &occurrences, &BTreeSet::new(), &mut lemmas).unwrap();
        assert!(!lemmas.contains("fly"));
        assert!(lemmas.contains("walk"));
        assert!(out.starts_with("<p>They fly and <ruby class=\"wordwise\">"));
        assert!(out.contains("<rt>go</rt>"));
    }

    #[test]
    fn long_gloss_renders_as_plain_footnote_link() {
        let text = "<p>A dog.</p>";
        let mut lemmas = LemmaRegistry::new();
        lemmas.record_mention("dog", Site::new("r", (3, 9), (2, 5)));
        let occurrences = lemmas.occurrences().sorted(&RegionId::new("r"));
        let out = rewrite(text, &occurrences, &BTreeSet::new(), &mut lemmas).unwrap();
        assert_eq!(
            out,
            "<p>A <a class=\"wordwise\" epub:type=\"noteref\" href=\"word_wise.xhtml#0\">dog</a>.</p>"
        );
    }

    #[test]
    fn cjk_languages_allow_longer_ruby_glosses() {
        assert_eq!(
            rewrite_stroll("zh"),
            "<p>他们<ruby class=\"wordwise\"><a epub:type=\"noteref\" href=\"word_wise.xhtml#0\">悠闲漫步</a>\
             <rp>(</rp><rt>walk slowly</rt><rp>)</rp></ruby>。</p>"
        );
        assert_eq!(
            rewrite_stroll("en"),
            "<p>他们<a class=\"wordwise\" epub:type=\"noteref\" href=\"word_wise.xhtml#0\">悠闲漫步</a>。</p>"
        );
    }

    #[test]
    fn stray_ampersand_keeps_word_offsets_aligned() {
        let text = "<p>Fish & chips with Ahab.</p>";
        let occurrences = [Occurrence::entity((3, 26), (18, 22), 0)];
        let mut lemmas = LemmaRegistry::new();
        let out = rewrite(text, &occurrences, &BTreeSet::new(), &mut lemmas).unwrap();
        assert_eq!(
            out,
            "<p>Fish &amp; chips with <a class=\"x-ray\" epub:type=\"noteref\" href=\"x_ray.xhtml#0\">Ahab</a>.</p>"
        );
    }

    #[test]
    fn overlapping_occurrence_is_skipped() {
        let text = "<p>New York City</p>";
        let occurrences = [
            Occurrence::entity((3, 16), (0, 8), 0),
            Occurrence::entity((3, 16), (4, 13), 1),
        ];
        let mut lemmas = LemmaRegistry::new();
        let out = rewrite(text, &occurrences, &BTreeSet::new(), &mut lemmas).unwrap();
        assert!(out.contains("#0\">New York</a> City</p>"));
        assert!(!out.contains("#1"));
    }

    #[test]
    fn offsets_off_char_boundary_are_rejected() {
        let text = "<p>Café</p>";
        let occurrences = [Occurrence::entity((3, 8), (0, 4), 0)];
        let mut lemmas = LemmaRegistry::new();
        let err = rewrite(text, &occurrences, &BTreeSet::new(), &mut lemmas).unwrap_err();
        assert!(matches!(err, GlossError::InvalidOffsets { .. }));
    }

    #[test]
    fn paragraphs_out_of_order_are_malformed() {
        let text = "<p>One two</p><p>Three</p>";
        let occurrences = [
            Occurrence::entity((17, 22), (0, 5), 0),
            Occurrence::entity((3, 10), (0, 3), 1),
        ];
        let mut lemmas = LemmaRegistry::new();
        let err = rewrite(text, &occurrences, &BTreeSet::new(), &mut lemmas).unwrap_err();
        assert!(matches!(err, GlossError::MalformedInput(_)));
    }

    #[test]
    fn finish_document_injects_once() {
        let doc = format!(r#"<html xmlns="{XHTML_NS}"><head><title>t</title></head><body/></html>"#);
        let once = finish_document(doc, "a {color: red;}").unwrap();
        assert!(once.contains(&format!(r#"xmlns:epub="{OPS_NS}""#)));
        assert!(once.contains("<style>a {color: red;}</style></head>"));
        let twice = finish_document(once.clone(), "a {color: red;}").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn finish_document_requires_markers() {
        let no_head = format!(r#"<html xmlns="{XHTML_NS}"><body/></html>"#);
        assert!(finish_document(no_head.clone(), "").is_ok());
        assert!(matches!(
            finish_document(no_head, "a {}"),
            Err(GlossError::MalformedInput(_))
        ));
        assert!(matches!(
            finish_document("<html><head></head></html>".into(), ""),
            Err(GlossError::MalformedInput(_))
        ));
    }
}
