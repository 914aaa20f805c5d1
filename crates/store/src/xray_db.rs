//! Relational X-Ray output: entities, occurrences, descriptions and book
//! metadata in one SQLite file.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use inkgloss_core::{
    raw_offset, resolve_description, CustomOverrides, Description, EntityCategory,
    EntityRegistry, KnowledgeBase, Occurrence, Prefs, RegionId, XRaySummary,
};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, Transaction};
use tempfile::NamedTempFile;
use tracing::info;

static IMG_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<img [^>]+/>").unwrap());
static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"src="([^"]+)""#).unwrap());

const SCHEMA: &str = r#"
    CREATE TABLE entity (
        id INTEGER PRIMARY KEY,
        label TEXT,
        type INTEGER,
        count INTEGER
    );
    CREATE TABLE occurrence (
        entity INTEGER,
        start INTEGER,
        length INTEGER
    );
    CREATE TABLE entity_description (
        text TEXT,
        source_wildcard TEXT,
        source INTEGER,
        entity INTEGER PRIMARY KEY
    );
    CREATE TABLE type (
        id INTEGER PRIMARY KEY,
        label INTEGER,
        singular_label INTEGER,
        icon INTEGER,
        top_mentioned_entities TEXT
    );
    CREATE TABLE book_metadata (
        erl INTEGER,
        has_images INTEGER,
        num_people INTEGER,
        num_terms INTEGER,
        num_images INTEGER,
        preview_images TEXT
    );
    CREATE TABLE excerpt_image (
        id INTEGER PRIMARY KEY,
        start INTEGER,
        image TEXT,
        goto INTEGER
    );
"#;

const INDICES: &str = r#"
    CREATE INDEX idx_occurrence_start ON occurrence(start ASC);
    CREATE INDEX idx_entity_type ON entity(type ASC);
"#;

/// An `<img>` found in the book markup, positioned in book coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptImage {
    pub id: i64,
    pub start: usize,
    pub image: String,
}

/// Image tags across `documents`, each given with its starting position in
/// the book. Repeated sources are listed once.
pub fn find_excerpt_images<'a, I>(documents: I) -> Vec<ExcerptImage>
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for (base, text) in documents {
        for tag in IMG_TAG_RE.find_iter(text) {
            let Some(src) = IMG_SRC_RE.captures(tag.as_str()).and_then(|caps| caps.get(1)) else {
                continue;
            };
            if !seen.insert(src.as_str().to_string()) {
                continue;
            }
            images.push(ExcerptImage {
                id: images.len() as i64,
                start: base + tag.start(),
                image: src.as_str().to_string(),
            });
        }
    }
    images
}

pub struct XRayInput<'a> {
    pub entities: &'a EntityRegistry,
    pub custom: &'a CustomOverrides,
    pub knowledge: &'a KnowledgeBase,
    pub prefs: &'a Prefs,
    /// Position of each region's first byte in the book.
    pub region_offsets: &'a HashMap<RegionId, usize>,
    /// Cleaned region markup, used to map word offsets back into it.
    pub region_texts: &'a HashMap<RegionId, &'a str>,
    pub excerpt_images: &'a [ExcerptImage],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XRayReport {
    pub entities: usize,
    pub occurrences: usize,
    pub erl: usize,
    pub summary: XRaySummary,
}

/// A database under construction in a temporary file next to its target.
pub struct XRayDatabase {
    file: NamedTempFile,
    conn: Connection,
}

impl XRayDatabase {
    pub fn create_in(dir: &Path) -> Result<Self> {
        let file = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temporary database in {}", dir.display()))?;
        let conn = Connection::open(file.path())?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { file, conn })
    }

    /// Entity ids are stored one-based.
    pub fn write(&mut self, input: &XRayInput<'_>) -> Result<XRayReport> {
        let tx = self.conn.transaction()?;
        let summary = XRaySummary::of(input.entities);
        insert_entities(&tx, input)?;
        let (occurrences, erl) = insert_occurrences(&tx, input)?;
        insert_descriptions(&tx, input)?;
        insert_types(&tx, &summary)?;
        insert_metadata(&tx, erl, &summary, input.excerpt_images)?;
        tx.execute_batch(INDICES)?;
        tx.commit()?;

        let report = XRayReport {
            entities: input.entities.len(),
            occurrences,
            erl,
            summary,
        };
        info!(
            entities = report.entities,
            occurrences = report.occurrences,
            images = input.excerpt_images.len(),
            "x-ray database written"
        );
        Ok(report)
    }

    /// Moves the finished database over `path`.
    pub fn persist(self, path: &Path) -> Result<()> {
        let Self { file, conn } = self;
        conn.close()
            .map_err(|(_, err)| err)
            .context("failed to close x-ray database")?;
        file.persist(path)
            .with_context(|| format!("failed to install {}", path.display()))?;
        Ok(())
    }
}

fn db_id(id: u32) -> i64 {
    i64::from(id) + 1
}

fn insert_entities(tx: &Transaction<'_>, input: &XRayInput<'_>) -> Result<()> {
    let mut stmt = tx.prepare("INSERT INTO entity (id, label, type, count) VALUES (?1, ?2, ?3, ?4)")?;
    for entity in input.entities.iter() {
        stmt.execute(params![
            db_id(entity.id),
            entity.name,
            entity.category().code(),
            entity.mention_count
        ])?;
    }
    Ok(())
}

fn insert_occurrences(tx: &Transaction<'_>, input: &XRayInput<'_>) -> Result<(usize, usize)> {
    let mut rows = Vec::new();
    for (region, occurrences) in input.entities.occurrences().iter() {
        let base = input.region_offsets.get(region).copied().unwrap_or(0);
        let text = input.region_texts.get(region).copied();
        for occurrence in occurrences {
            let Some(id) = occurrence.entity_id() else {
                continue;
            };
            if input.entities.is_removed(id) {
                continue;
            }
            let (start, length) = markup_span(text, occurrence);
            rows.push((base + start, length, id));
        }
    }
    rows.sort_unstable();

    let mut stmt = tx.prepare("INSERT INTO occurrence (entity, start, length) VALUES (?1, ?2, ?3)")?;
    let mut erl = 0;
    for &(start, length, id) in &rows {
        stmt.execute(params![db_id(id), start as i64, length as i64])?;
        erl = erl.max((start + length).saturating_sub(1));
    }
    Ok((rows.len(), erl))
}

/// Region-relative start and length of an occurrence in the markup. Word
/// offsets count unescaped text, so each `&amp;` before the word shifts it.
/// Without the region text the unescaped offsets are used as they are.
fn markup_span(text: Option<&str>, occurrence: &Occurrence) -> (usize, usize) {
    let paragraph = text.and_then(|text| text.get(occurrence.paragraph_start..occurrence.paragraph_end));
    match paragraph {
        Some(paragraph) => {
            let start = raw_offset(paragraph, occurrence.word_start);
            let end = raw_offset(paragraph, occurrence.word_end);
            (occurrence.paragraph_start + start, end.saturating_sub(start))
        }
        None => (
            occurrence.paragraph_start + occurrence.word_start,
            occurrence.word_end - occurrence.word_start,
        ),
    }
}

fn insert_descriptions(tx: &Transaction<'_>, input: &XRayInput<'_>) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO entity_description (text, source_wildcard, source, entity) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for entity in input.entities.iter() {
        let description = resolve_description(entity, input.custom, input.knowledge, input.prefs);
        let source: Option<i64> = match &description {
            Description::Custom(entry) => entry.source.code().map(i64::from),
            Description::Knowledge { .. } => input.knowledge.summary_source().code().map(i64::from),
            Description::Quote(_) => None,
        };
        stmt.execute(params![
            description.plain_text(),
            entity.name,
            source,
            db_id(entity.id)
        ])?;
    }
    Ok(())
}

fn top_list(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| db_id(*id).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn insert_types(tx: &Transaction<'_>, summary: &XRaySummary) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO type (id, label, singular_label, icon, top_mentioned_entities) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    stmt.execute(params![
        EntityCategory::Person.code(),
        14,
        15,
        1,
        top_list(&summary.top_people)
    ])?;
    stmt.execute(params![
        EntityCategory::Term.code(),
        16,
        17,
        2,
        top_list(&summary.top_terms)
    ])?;
    Ok(())
}

fn insert_metadata(
    tx: &Transaction<'_>,
    erl: usize,
    summary: &XRaySummary,
    images: &[ExcerptImage],
) -> Result<()> {
    let mut stmt = tx.prepare("INSERT INTO excerpt_image (id, start, image, goto) VALUES (?1, ?2, ?3, ?4)")?;
    for image in images {
        stmt.execute(params![image.id, image.start as i64, image.image, image.start as i64])?;
    }
    let preview_images = (!images.is_empty()).then(|| {
        images
            .iter()
            .map(|image| image.id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    });
    tx.execute(
        "INSERT INTO book_metadata (erl, has_images, num_people, num_terms, num_images, preview_images) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            erl as i64,
            !images.is_empty(),
            summary.people as i64,
            summary.terms as i64,
            images.len() as i64,
            preview_images
        ],
    )?;
    Ok(())
}
