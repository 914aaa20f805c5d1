//! Footnote pages referenced by the inline anchors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::custom::{CustomEntry, CustomOverrides};
use crate::entity::{is_person_label, Entity, EntityRegistry};
use crate::error::Result;
use crate::facts::{inception_text, regime_type, WIKIDATA_ITEM_URL};
use crate::gloss::{GlossCache, GlossSource};
use crate::knowledge::{Citation, FactsRecord, KnowledgeBase, SummaryRecord};
use crate::lemma::LemmaRegistry;
use crate::markup;
use crate::normalization::{escape_attr, escape_text, split_lemma_key};
use crate::prefs::Prefs;

/// An image a page refers to, to be copied into the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageImage {
    pub filename: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootnotePage {
    pub filename: String,
    pub xhtml: String,
    pub images: Vec<PageImage>,
}

/// Where an entity's footnote text comes from, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum Description<'a> {
    Custom(&'a CustomEntry),
    Knowledge {
        summary: SummaryRecord,
        facts: Option<FactsRecord>,
    },
    Quote(&'a str),
}

impl Description<'_> {
    /// Plain-text rendering for sinks without markup.
    pub fn plain_text(&self) -> String {
        match self {
            Description::Custom(entry) => entry.description.clone(),
            Description::Knowledge { summary, facts } => {
                let mut text = summary.intro.clone();
                if let Some(score) = facts.as_ref().and_then(|facts| facts.democracy_index) {
                    text.push('\n');
                    text.push_str(regime_type(score));
                }
                text
            }
            Description::Quote(quote) => (*quote).to_string(),
        }
    }

    pub fn is_external(&self) -> bool {
        !matches!(self, Description::Quote(_))
    }
}

/// Custom description first, then the knowledge base (people only when
/// `search_people` is set), then the book quote. An empty custom description
/// does not count.
pub fn resolve_description<'a>(
    entity: &'a Entity,
    custom: &'a CustomOverrides,
    knowledge: &KnowledgeBase,
    prefs: &Prefs,
) -> Description<'a> {
    if let Some(entry) = custom.get(&entity.name) {
        if !entry.description.trim().is_empty() {
            return Description::Custom(entry);
        }
    }
    if prefs.search_people || !is_person_label(&entity.label) {
        if let Some(summary) = knowledge.summary(&entity.name) {
            let facts = summary
                .item_id
                .as_deref()
                .and_then(|item_id| knowledge.facts(item_id));
            return Description::Knowledge { summary, facts };
        }
    }
    Description::Quote(&entity.quote)
}

fn source_paragraph(citation: &Citation, entity_name: &str) -> String {
    match &citation.link {
        Some(link) => format!(
            r#"<p>Source: <a href="{}{}">{}</a></p>"#,
            escape_attr(link),
            urlencoding::encode(entity_name),
            escape_text(&citation.name)
        ),
        None => format!("<p>Source: {}</p>", escape_text(&citation.name)),
    }
}

/// Builds `x_ray.xhtml`. `image_prefix` is the path from the page to the
/// image folder, such as `../Images/`.
pub fn x_ray_page(
    entities: &EntityRegistry,
    custom: &CustomOverrides,
    knowledge: &KnowledgeBase,
    prefs: &Prefs,
    image_prefix: &str,
) -> FootnotePage {
    let lang = prefs.lemma_lang.as_str();
    let mut xhtml = markup::page_header("X-Ray", lang);
    let mut images: Vec<PageImage> = Vec::new();

    for entity in entities.iter() {
        xhtml.push_str(&format!(r#"<aside id="{}" epub:type="footnote">"#, entity.id));
        match resolve_description(entity, custom, knowledge, prefs) {
            Description::Custom(entry) => {
                xhtml.push_str(&markup::paragraphs(&entry.description));
                if let Some(citation) = entry.source.citation(prefs, lang) {
                    xhtml.push_str(&source_paragraph(&citation, &entity.name));
                }
            }
            Description::Knowledge { summary, facts } => {
                xhtml.push_str(&markup::paragraphs(&summary.intro));
                if let Some(citation) = knowledge.summary_source().citation(prefs, lang) {
                    xhtml.push_str(&source_paragraph(&citation, &entity.name));
                }
                if let (Some(facts), Some(item_id)) = (facts, summary.item_id.as_deref()) {
                    let mut cited = false;
                    if let Some(inception) = facts.inception.as_deref() {
                        xhtml.push_str(&format!("<p>{}</p>", escape_text(&inception_text(inception))));
                        cited = true;
                    }
                    if let Some(filename) = facts.map_filename.as_deref() {
                        if let Some(path) = knowledge.image(filename) {
                            xhtml.push_str(&format!(
                                r#"<img style="max-width:100%" src="{}{}"/>"#,
                                escape_attr(image_prefix),
                                escape_attr(filename)
                            ));
                            if !images.iter().any(|image| image.filename == filename) {
                                images.push(PageImage {
                                    filename: filename.to_string(),
                                    path,
                                });
                            }
                            cited = true;
                        }
                    }
                    if let Some(score) = facts.democracy_index {
                        xhtml.push_str(&format!("<p>{}</p>", regime_type(score)));
                        cited = true;
                    }
                    if cited {
                        xhtml.push_str(&format!(
                            r#"<p>Source: <a href="{WIKIDATA_ITEM_URL}{}">Wikidata</a></p>"#,
                            escape_attr(item_id)
                        ));
                    }
                }
            }
            Description::Quote(quote) => {
                xhtml.push_str(&format!("<p>{}</p>", escape_text(quote)));
            }
        }
        xhtml.push_str("</aside>");
    }
    xhtml.push_str(markup::PAGE_FOOTER);
    debug!(entities = entities.len(), images = images.len(), "x-ray page built");

    FootnotePage {
        filename: markup::X_RAY_PAGE.to_string(),
        xhtml,
        images,
    }
}

/// Builds `word_wise.xhtml` in lemma insertion order. Lemmas without gloss
/// rows get no footnote.
pub fn word_wise_page<S: GlossSource>(
    lemmas: &LemmaRegistry,
    glosses: &mut GlossCache<S>,
    prefs: &Prefs,
) -> Result<FootnotePage> {
    let mut xhtml = markup::page_header("Word Wise", &prefs.lemma_lang);
    let use_pos = glosses.use_pos();
    let mut written = 0usize;

    for (key, id) in lemmas.iter() {
        let rows = glosses.resolve(key)?;
        if rows.is_empty() {
            continue;
        }
        let (lemma, pos) = if use_pos {
            split_lemma_key(key)
        } else {
            (key, None)
        };
        xhtml.push_str(&format!(r#"<aside id="{id}" epub:type="footnote">"#));
        if let Some(pos) = pos {
            xhtml.push_str(&format!("<p>{}</p>", escape_text(pos)));
        }
        let mut pronounced = false;
        for row in rows {
            if let Some(ipa) = row.pronunciation.as_deref().filter(|ipa| !ipa.is_empty()) {
                if !pronounced {
                    xhtml.push_str(&format!("<p>{}</p>", escape_text(ipa)));
                    pronounced = true;
                }
            }
            xhtml.push_str(&format!("<p>{}</p>", escape_text(&row.full_gloss)));
            if let Some(example) = row.example.as_deref().filter(|example| !example.is_empty()) {
                xhtml.push_str(&format!("<p><i>{}</i></p>", escape_text(example)));
            }
            xhtml.push_str("<hr/>");
        }
        xhtml.push_str(&format!(
            r#"<p>Source: <a href="https://{}.wiktionary.org/wiki/{}">Wiktionary</a></p></aside>"#,
            escape_attr(&prefs.gloss_lang),
            urlencoding::encode(lemma)
        ));
        written += 1;
    }
    xhtml.push_str(markup::PAGE_FOOTER);
    debug!(lemmas = written, "word wise page built");

    Ok(FootnotePage {
        filename: markup::WORD_WISE_PAGE.to_string(),
        xhtml,
        images: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gloss::{GlossRow, MemoryGlossary};
    use crate::knowledge::{Capability, DescriptionSource, KnowledgeRecord, MemorySource};
    use crate::occurrence::Site;

    fn site() -> Site {
        Site::new("ch1.xhtml", (0, 10), (0, 5))
    }

    fn knowledge() -> KnowledgeBase {
        KnowledgeBase::new()
            .with_source(Box::new(MemorySource::new(Capability::Summary).with(
                "Paris",
                KnowledgeRecord::Summary(SummaryRecord {
                    intro: "Paris is the capital of France.".into(),
                    item_id: Some("Q90".into()),
                }),
            ).with(
                "Obama",
                KnowledgeRecord::Summary(SummaryRecord {
                    intro: "Barack Obama is a politician.".into(),
                    item_id: None,
                }),
            )))
            .with_source(Box::new(MemorySource::new(Capability::StructuredData).with(
                "Q90",
                KnowledgeRecord::Facts(FactsRecord {
                    inception: Some("+1790-01-01T00:00:00Z".into()),
                    map_filename: Some("paris.svg".into()),
                    democracy_index: None,
                }),
            )))
            .with_source(Box::new(
                MemorySource::new(Capability::Images)
                    .with("paris.svg", KnowledgeRecord::Image(PathBuf::from("/cache/paris.svg"))),
            ))
    }

    #[test]
    fn people_fall_back_to_quotes_unless_searched() {
        let mut registry = EntityRegistry::new();
        registry.record_mention("Obama", "PERSON", "Obama & co spoke.", site());
        let custom = CustomOverrides::new();
        let kb = knowledge();
        let prefs = Prefs::default();
        let page = x_ray_page(&registry, &custom, &kb, &prefs, "");
        assert!(page.xhtml.contains(r#"<aside id="0" epub:type="footnote"><p>Obama &amp; co spoke.</p></aside>"#));

        let prefs = Prefs {
            search_people: true,
            ..Prefs::default()
        };
        let page = x_ray_page(&registry, &custom, &kb, &prefs, "");
        assert!(page.xhtml.contains("<p>Barack Obama is a politician.</p>"));
        assert!(page.xhtml.contains(r#"href="https://en.wikipedia.org/wiki/Obama""#));
        assert!(!page.xhtml.contains("Wikidata"));
    }

    #[test]
    fn facts_add_image_and_wikidata_citation() {
        let mut registry = EntityRegistry::new();
        registry.record_mention("Paris", "GPE", "q", site());
        let page = x_ray_page(&registry, &CustomOverrides::new(), &knowledge(), &Prefs::default(), "../Images/");
        assert!(page.xhtml.contains("<p>Inception: January 1, 1790</p>"));
        assert!(page.xhtml.contains(r#"<img style="max-width:100%" src="../Images/paris.svg"/>"#));
        assert!(page.xhtml.contains(r#"<a href="https://www.wikidata.org/wiki/Q90">Wikidata</a>"#));
        assert_eq!(
            page.images,
            vec![PageImage {
                filename: "paris.svg".into(),
                path: PathBuf::from("/cache/paris.svg"),
            }]
        );
    }

    #[test]
    fn custom_description_wins_and_empty_one_falls_through() {
        let mut registry = EntityRegistry::new();
        registry.record_mention("Paris", "GPE", "q", site());
        registry.record_mention("Hogwarts", "FAC", "Hogwarts castle.", site());
        let custom: CustomOverrides = [
            CustomEntry {
                name: "Paris".into(),
                label: "GPE".into(),
                aliases: vec![],
                description: "City of light.\nSecond line.".into(),
                source: DescriptionSource::BookQuote,
                omit: false,
            },
            CustomEntry {
                name: "Hogwarts".into(),
                label: "FAC".into(),
                aliases: vec![],
                description: String::new(),
                source: DescriptionSource::Wikipedia,
                omit: false,
            },
        ]
        .into_iter()
        .collect();
        let page = x_ray_page(&registry, &custom, &knowledge(), &Prefs::default(), "");
        assert!(page.xhtml.contains(
            r#"<aside id="0" epub:type="footnote"><p>City of light.</p><p>Second line.</p></aside>"#
        ));
        assert!(page.xhtml.contains(r#"<aside id="1" epub:type="footnote"><p>Hogwarts castle.</p></aside>"#));
        assert!(page.images.is_empty());
    }

    #[test]
    fn word_wise_page_renders_senses_once_per_lemma() {
        let glossary = MemoryGlossary::new()
            .with(
                "run",
                Some("verb"),
                GlossRow {
                    short_gloss: "move fast".into(),
                    full_gloss: "to move swiftly on foot".into(),
                    example: Some("She runs daily.".into()),
                    pronunciation: Some("/ɹʌn/".into()),
                },
            )
            .with(
                "run",
                Some("verb"),
                GlossRow {
                    short_gloss: "operate".into(),
                    full_gloss: "to operate a machine".into(),
                    example: None,
                    pronunciation: Some("/rʌn/".into()),
                },
            );
        let mut lemmas = LemmaRegistry::new();
        lemmas.record_mention("run_VERB", site());
        lemmas.record_mention("fly_VERB", site());
        let mut cache = GlossCache::new(&glossary, true);
        let prefs = Prefs {
            use_pos: true,
            ..Prefs::default()
        };
        let page = word_wise_page(&lemmas, &mut cache, &prefs).unwrap();
        insta::assert_snapshot!(
            page.xhtml.lines().nth(4).unwrap_or_default(),
            @r#"<aside id="0" epub:type="footnote"><p>VERB</p><p>/ɹʌn/</p><p>to move swiftly on foot</p><p><i>She runs daily.</i></p><hr/><p>to operate a machine</p><hr/><p>Source: <a href="https://en.wiktionary.org/wiki/run">Wiktionary</a></p></aside></body></html>"#
        );
        assert!(!page.xhtml.contains(r#"id="1""#));
    }
}
