use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use inkgloss_core::{
    AnnotatedBook, Annotator, FootnotePage, GlossCache, KnowledgeBase, MemoryGlossary,
    PageImage, RegionId, TextRegion,
};
use inkgloss_epub::EpubContainer;
use inkgloss_index::read_mentions;
use inkgloss_store::{find_excerpt_images, DictionaryStore, XRayDatabase, XRayInput, XRayReport};
use tracing::info;

use crate::config::RunConfig;

/// One change an annotated book asks of its container.
#[derive(Debug)]
enum BookEdit<'a> {
    Document { name: &'a str, text: &'a str },
    Page(&'a FootnotePage),
    Image(&'a PageImage),
}

pub fn annotate_from_config(path: &str) -> Result<()> {
    let cfg = RunConfig::load(path)?;
    let mut epub = EpubContainer::open(&cfg.book)?;
    let regions = epub.regions()?;
    let mut knowledge = cfg.knowledge.open()?;

    let book = annotate(&cfg, &regions, &knowledge, &epub.image_prefix())?;
    let edits = install_book(&book, |edit| match edit {
        BookEdit::Document { name, text } => epub.replace_document(name, text.to_string()),
        BookEdit::Page(page) => {
            epub.add_page(page);
            Ok(())
        }
        BookEdit::Image(image) => epub.add_image_file(&image.filename, &image.path),
    })?;
    if edits > 0 {
        epub.patch_opf()?;
        epub.write_atomic()?;
    }
    knowledge.close().context("failed to close knowledge caches")?;
    info!(
        book = cfg.book.as_str(),
        people = book.summary.people,
        terms = book.summary.terms,
        entity_anchors = book.stats.entity_anchors,
        lemma_anchors = book.stats.lemma_anchors + book.stats.lemma_rubies,
        "book annotated"
    );
    Ok(())
}

pub fn x_ray_db_from_config(path: &str, out: &str) -> Result<()> {
    let cfg = RunConfig::load(path)?;
    let epub = EpubContainer::open(&cfg.book)?;
    let regions = epub.regions()?;
    let mut knowledge = cfg.knowledge.open()?;
    let report = write_x_ray_db(&cfg, &regions, &knowledge, Path::new(out))?;
    knowledge.close().context("failed to close knowledge caches")?;
    info!(
        out,
        entities = report.entities,
        occurrences = report.occurrences,
        erl = report.erl,
        "x-ray database ready"
    );
    Ok(())
}

fn ingest(cfg: &RunConfig) -> Result<Annotator> {
    let mentions = read_mentions(Path::new(&cfg.mentions))?;
    let mut annotator = Annotator::new(cfg.prefs.clone(), cfg.load_custom()?);
    annotator.ingest_all(&mentions);
    Ok(annotator)
}

/// Rewrites the regions against the configured dictionary. Without one,
/// every lemma goes unresolved and only X-Ray survives.
fn annotate(
    cfg: &RunConfig,
    regions: &[TextRegion],
    knowledge: &KnowledgeBase,
    image_prefix: &str,
) -> Result<AnnotatedBook> {
    let mut annotator = ingest(cfg)?;
    let prefs = annotator.prefs().clone();
    let book = match &cfg.dictionary {
        Some(path) => {
            let store = DictionaryStore::open(path, &prefs.lemma_lang, prefs.ipa_column.as_deref())?;
            let mut glosses = GlossCache::new(store, prefs.use_pos);
            annotator.finish(regions, knowledge, &mut glosses, image_prefix)?
        }
        None => {
            let mut glosses = GlossCache::new(MemoryGlossary::new(), prefs.use_pos);
            annotator.finish(regions, knowledge, &mut glosses, image_prefix)?
        }
    };
    Ok(book)
}

/// Hands every rewritten region, page and image to `apply`. Returns the
/// number of edits.
fn install_book<F>(book: &AnnotatedBook, mut apply: F) -> Result<usize>
where
    F: FnMut(BookEdit<'_>) -> Result<()>,
{
    let mut edits = 0;
    for region in &book.regions {
        apply(BookEdit::Document {
            name: region.id.as_str(),
            text: &region.text,
        })
        .with_context(|| format!("failed to replace {}", region.id))?;
        edits += 1;
    }
    for page in book.pages() {
        apply(BookEdit::Page(page))?;
        edits += 1;
    }
    for image in book.images() {
        apply(BookEdit::Image(image))?;
        edits += 1;
    }
    Ok(edits)
}

fn write_x_ray_db(
    cfg: &RunConfig,
    regions: &[TextRegion],
    knowledge: &KnowledgeBase,
    out: &Path,
) -> Result<XRayReport> {
    let mut annotator = ingest(cfg)?;
    annotator.apply_filter(knowledge);

    let offsets = EpubContainer::region_offsets(regions);
    let texts: HashMap<RegionId, &str> = regions
        .iter()
        .map(|region| (region.id.clone(), region.text.as_str()))
        .collect();
    let excerpt_images = find_excerpt_images(
        regions
            .iter()
            .filter_map(|region| Some((*offsets.get(&region.id)?, region.text.as_str()))),
    );
    let dir = out
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut db = XRayDatabase::create_in(dir)?;
    let report = db.write(&XRayInput {
        entities: annotator.entities(),
        custom: annotator.custom(),
        knowledge,
        prefs: annotator.prefs(),
        region_offsets: &offsets,
        region_texts: &texts,
        excerpt_images: &excerpt_images,
    })?;
    db.persist(out)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    use inkgloss_core::{Capability, KnowledgeRecord, MemorySource, Prefs, SummaryRecord};

    const REGION: &str = "OEBPS/Text/c1.xhtml";
    const CHAPTER: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>1</title></head><body><p>Ahab met Starbuck. Ahab left.</p><img src="../Images/whale.png"/></body></html>"#;

    fn write_mentions(dir: &Path, region: &TextRegion) -> String {
        let paragraph = &region.paragraphs[0];
        let mention = |text: &str, label: Option<&str>, start: usize| {
            serde_json::json!({
                "text": text,
                "label": label,
                "region": REGION,
                "paragraph": [paragraph.start, paragraph.end],
                "word": [start, start + text.len()],
            })
            .to_string()
        };
        let lines = [
            mention("Ahab", Some("PERSON"), 0),
            mention("Starbuck", Some("PERSON"), 9),
            mention("Ahab", Some("PERSON"), 19),
            mention("left", None, 24),
        ];
        let path = dir.join("mentions.jsonl");
        fs::write(&path, lines.join("\n")).unwrap();
        path.display().to_string()
    }

    fn config(dir: &Path, region: &TextRegion) -> RunConfig {
        RunConfig {
            book: dir.join("book.epub").display().to_string(),
            mentions: write_mentions(dir, region),
            dictionary: None,
            custom: None,
            knowledge: Default::default(),
            prefs: Prefs::default(),
        }
    }

    #[test]
    fn annotate_without_dictionary_links_entities_only() {
        let dir = tempfile::tempdir().unwrap();
        let region = TextRegion::extract(REGION, CHAPTER);
        let cfg = config(dir.path(), &region);
        let book = annotate(&cfg, &[region], &KnowledgeBase::new(), "../Images/").unwrap();

        assert_eq!(book.regions.len(), 1);
        let text = &book.regions[0].text;
        assert_eq!(text.matches(r#"epub:type="noteref""#).count(), 3);
        assert!(text.contains("</a> left.</p>"));
        assert!(book.word_wise.is_none());
        let x_ray = book.x_ray.as_ref().unwrap();
        assert!(x_ray.xhtml.contains("Ahab"));
        assert_eq!(book.summary.people, 2);
    }

    #[test]
    fn install_book_hands_over_every_edit() {
        let dir = tempfile::tempdir().unwrap();
        let region = TextRegion::extract(REGION, CHAPTER);
        let cfg = config(dir.path(), &region);
        let book = annotate(&cfg, &[region], &KnowledgeBase::new(), "../Images/").unwrap();

        let documents: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let pages: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let edits = install_book(&book, |edit| {
            match edit {
                BookEdit::Document { name, text } => {
                    assert!(text.contains("noteref"));
                    documents.borrow_mut().push(name.to_string());
                }
                BookEdit::Page(page) => pages.borrow_mut().push(page.filename.clone()),
                BookEdit::Image(image) => panic!("unexpected image {}", image.filename),
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(edits, 2);
        assert_eq!(documents.into_inner(), vec![REGION.to_string()]);
        assert_eq!(pages.into_inner(), vec!["x_ray.xhtml".to_string()]);
    }

    #[test]
    fn install_book_writes_back_regions_without_mentions() {
        let dir = tempfile::tempdir().unwrap();
        let region = TextRegion::extract(REGION, CHAPTER);
        let cfg = config(dir.path(), &region);
        let plain = TextRegion::extract(
            "OEBPS/Text/c2.xhtml",
            "<html><body><p>Sperm\u{00AD}aceti by the barrel.</p></body></html>",
        );
        let book = annotate(&cfg, &[region, plain], &KnowledgeBase::new(), "").unwrap();

        let documents: RefCell<Vec<(String, String)>> = RefCell::new(Vec::new());
        let edits = install_book(&book, |edit| {
            if let BookEdit::Document { name, text } = edit {
                documents.borrow_mut().push((name.to_string(), text.to_string()));
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(edits, 3);
        let documents = documents.into_inner();
        assert_eq!(documents[1].0, "OEBPS/Text/c2.xhtml");
        assert_eq!(
            documents[1].1,
            "<html><body><p>Spermaceti by the barrel.</p></body></html>"
        );
    }

    #[test]
    fn install_book_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let region = TextRegion::extract(REGION, CHAPTER);
        let cfg = config(dir.path(), &region);
        let book = annotate(&cfg, &[region], &KnowledgeBase::new(), "").unwrap();

        let calls = RefCell::new(0);
        let err = install_book(&book, |_| {
            *calls.borrow_mut() += 1;
            anyhow::bail!("read-only container")
        })
        .unwrap_err();
        assert_eq!(*calls.borrow(), 1);
        assert!(format!("{err:#}").contains("read-only container"));
    }

    #[test]
    fn x_ray_db_is_filtered_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let region = TextRegion::extract(REGION, CHAPTER);
        let mut cfg = config(dir.path(), &region);
        cfg.prefs.minimal_x_ray_count = 2;
        let knowledge = KnowledgeBase::new().with_source(Box::new(
            MemorySource::new(Capability::Summary).with(
                "Starbuck",
                KnowledgeRecord::Summary(SummaryRecord {
                    intro: "First mate.".to_string(),
                    item_id: None,
                }),
            ),
        ));
        let out = dir.path().join("XRAY.book.db");
        let report = write_x_ray_db(&cfg, &[region], &knowledge, &out).unwrap();

        assert_eq!(report.entities, 2);
        assert_eq!(report.occurrences, 3);
        assert!(out.exists());
        assert!(fs::metadata(&out).unwrap().len() > 0);
    }
}
