//! Read-side interface to the external knowledge caches.
//!
//! Encyclopedia summaries, structured facts and downloaded images all sit
//! behind [`KnowledgeSource`]; the core only ever asks a present/absent
//! question of a fully populated cache. Fetching and retry policy belong to
//! whoever fills the caches.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{GlossError, Result};
use crate::prefs::Prefs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Summary,
    StructuredData,
    Images,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub intro: String,
    #[serde(default)]
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactsRecord {
    #[serde(default)]
    pub inception: Option<String>,
    #[serde(default)]
    pub map_filename: Option<String>,
    #[serde(default)]
    pub democracy_index: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeRecord {
    Summary(SummaryRecord),
    Facts(FactsRecord),
    Image(PathBuf),
}

pub trait KnowledgeSource {
    fn capability(&self) -> Capability;

    fn lookup(&self, key: &str) -> Option<KnowledgeRecord>;

    /// Flushes pending writes.
    fn save_cache(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.save_cache()
    }
}

/// Where a footnote description came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionSource {
    BookQuote,
    Wikipedia,
    MediaWiki,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub name: String,
    /// Page URL prefix; the percent-encoded entity name is appended.
    pub link: Option<String>,
}

impl DescriptionSource {
    /// Numeric code used by the custom override file.
    pub fn from_code(code: Option<u8>) -> Self {
        match code {
            Some(1) => DescriptionSource::Wikipedia,
            Some(2) => DescriptionSource::MediaWiki,
            _ => DescriptionSource::BookQuote,
        }
    }

    pub fn code(self) -> Option<u8> {
        match self {
            DescriptionSource::BookQuote => None,
            DescriptionSource::Wikipedia => Some(1),
            DescriptionSource::MediaWiki => Some(2),
        }
    }

    pub fn citation(self, prefs: &Prefs, lang: &str) -> Option<Citation> {
        match self {
            DescriptionSource::BookQuote => None,
            DescriptionSource::Wikipedia => Some(Citation {
                name: "Wikipedia".to_string(),
                link: Some(format!("https://{lang}.wikipedia.org/wiki/")),
            }),
            DescriptionSource::MediaWiki => {
                let base = prefs.mediawiki_url.as_deref().map(|url| url.trim_end_matches('/'));
                let name = base
                    .map(|url| {
                        let host = url.split_once("://").map_or(url, |(_, rest)| rest);
                        host.split('/').next().unwrap_or(host).to_string()
                    })
                    .filter(|host| !host.is_empty())
                    .unwrap_or_else(|| "MediaWiki".to_string());
                Some(Citation {
                    name,
                    link: base.map(|url| format!("{url}/wiki/")),
                })
            }
        }
    }
}

/// One optional source per capability.
#[derive(Default)]
pub struct KnowledgeBase {
    summaries: Option<Box<dyn KnowledgeSource>>,
    facts: Option<Box<dyn KnowledgeSource>>,
    images: Option<Box<dyn KnowledgeSource>>,
    summary_source: Option<DescriptionSource>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots the source by its capability, replacing any previous one.
    pub fn with_source(mut self, source: Box<dyn KnowledgeSource>) -> Self {
        match source.capability() {
            Capability::Summary => self.summaries = Some(source),
            Capability::StructuredData => self.facts = Some(source),
            Capability::Images => self.images = Some(source),
        }
        self
    }

    pub fn with_summary_source(mut self, source: DescriptionSource) -> Self {
        self.summary_source = Some(source);
        self
    }

    /// The source summaries are cited as; Wikipedia unless configured.
    pub fn summary_source(&self) -> DescriptionSource {
        self.summary_source.unwrap_or(DescriptionSource::Wikipedia)
    }

    pub fn has_summaries(&self) -> bool {
        self.summaries.is_some()
    }

    pub fn has_facts(&self) -> bool {
        self.facts.is_some()
    }

    pub fn summary(&self, key: &str) -> Option<SummaryRecord> {
        match self.summaries.as_ref()?.lookup(key)? {
            KnowledgeRecord::Summary(record) => Some(record),
            _ => None,
        }
    }

    pub fn has_summary(&self, key: &str) -> bool {
        self.summary(key).is_some()
    }

    pub fn facts(&self, item_id: &str) -> Option<FactsRecord> {
        match self.facts.as_ref()?.lookup(item_id)? {
            KnowledgeRecord::Facts(record) => Some(record),
            _ => None,
        }
    }

    pub fn image(&self, filename: &str) -> Option<PathBuf> {
        match self.images.as_ref()?.lookup(filename)? {
            KnowledgeRecord::Image(path) => Some(path),
            _ => None,
        }
    }

    fn sources_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn KnowledgeSource>> {
        [&mut self.summaries, &mut self.facts, &mut self.images]
            .into_iter()
            .flatten()
    }

    pub fn save_cache(&mut self) -> Result<()> {
        for source in self.sources_mut() {
            source.save_cache()?;
        }
        Ok(())
    }

    /// Closes every source; the first failure is returned after all were
    /// attempted.
    pub fn close(&mut self) -> Result<()> {
        let mut first_err = None;
        for source in self.sources_mut() {
            if let Err(err) = source.close() {
                warn!("failed to close knowledge source: {err}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// A cache persisted as one JSON object keyed by entity name, item id or
/// image filename. `null` values record known misses.
pub struct JsonCache {
    path: PathBuf,
    capability: Capability,
    entries: IndexMap<String, Value>,
    dirty: bool,
}

impl JsonCache {
    pub fn open(path: impl AsRef<Path>, capability: Capability) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                IndexMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            IndexMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened json cache");
        Ok(Self {
            path,
            capability,
            entries,
            dirty: false,
        })
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn decode(&self, value: &Value) -> Option<KnowledgeRecord> {
        match (self.capability, value) {
            (_, Value::Null) => None,
            (Capability::Summary, Value::String(intro)) => {
                Some(KnowledgeRecord::Summary(SummaryRecord {
                    intro: intro.clone(),
                    item_id: None,
                }))
            }
            (Capability::Summary, value) => serde_json::from_value(value.clone())
                .ok()
                .map(KnowledgeRecord::Summary),
            (Capability::StructuredData, value) => serde_json::from_value(value.clone())
                .ok()
                .map(KnowledgeRecord::Facts),
            (Capability::Images, Value::String(file)) => {
                let file = Path::new(file);
                let resolved = if file.is_absolute() {
                    file.to_path_buf()
                } else {
                    self.path
                        .parent()
                        .map_or_else(|| file.to_path_buf(), |dir| dir.join(file))
                };
                resolved.exists().then_some(KnowledgeRecord::Image(resolved))
            }
            (Capability::Images, _) => None,
        }
    }
}

impl KnowledgeSource for JsonCache {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn lookup(&self, key: &str) -> Option<KnowledgeRecord> {
        self.entries.get(key).and_then(|value| self.decode(value))
    }

    fn save_cache(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec(&self.entries)?)?;
        tmp.persist(&self.path)
            .map_err(|err| GlossError::Io(err.error))?;
        self.dirty = false;
        Ok(())
    }
}

/// In-memory source, for pre-populated runs and tests.
#[derive(Debug, Clone)]
pub struct MemorySource {
    capability: Capability,
    records: HashMap<String, KnowledgeRecord>,
}

impl MemorySource {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            records: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, record: KnowledgeRecord) -> Self {
        self.records.insert(key.into(), record);
        self
    }
}

impl KnowledgeSource for MemorySource {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn lookup(&self, key: &str) -> Option<KnowledgeRecord> {
        self.records.get(key).cloned()
    }
}
