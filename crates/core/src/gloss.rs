use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::normalization::{dictionary_pos, split_lemma_key};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlossRow {
    pub short_gloss: String,
    pub full_gloss: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub pronunciation: Option<String>,
}

impl GlossRow {
    /// Text shown inline above the word.
    pub fn inline_gloss(&self) -> &str {
        if self.short_gloss.is_empty() {
            &self.full_gloss
        } else {
            &self.short_gloss
        }
    }
}

/// Read-only dictionary lookups. `pos` is a dictionary part-of-speech heading
/// (`noun`, `verb`, ...), present only in part-of-speech mode. An empty
/// result means the lemma has no gloss.
pub trait GlossSource {
    fn lookup(&self, lemma: &str, pos: Option<&str>) -> Result<Vec<GlossRow>>;
}

impl<T: GlossSource + ?Sized> GlossSource for &T {
    fn lookup(&self, lemma: &str, pos: Option<&str>) -> Result<Vec<GlossRow>> {
        (**self).lookup(lemma, pos)
    }
}

impl<T: GlossSource + ?Sized> GlossSource for Box<T> {
    fn lookup(&self, lemma: &str, pos: Option<&str>) -> Result<Vec<GlossRow>> {
        (**self).lookup(lemma, pos)
    }
}

/// Answers each lemma key once; the rewriter and the footnote page share it.
pub struct GlossCache<S> {
    source: S,
    use_pos: bool,
    memo: HashMap<String, Vec<GlossRow>>,
}

impl<S: GlossSource> GlossCache<S> {
    pub fn new(source: S, use_pos: bool) -> Self {
        Self {
            source,
            use_pos,
            memo: HashMap::new(),
        }
    }

    pub fn use_pos(&self) -> bool {
        self.use_pos
    }

    pub fn resolve(&mut self, key: &str) -> Result<&[GlossRow]> {
        if !self.memo.contains_key(key) {
            let rows = if self.use_pos {
                let (lemma, pos) = split_lemma_key(key);
                self.source.lookup(lemma, pos.map(dictionary_pos))?
            } else {
                self.source.lookup(key, None)?
            };
            self.memo.insert(key.to_string(), rows);
        }
        Ok(self.memo.get(key).map(Vec::as_slice).unwrap_or(&[]))
    }
}

/// Dictionary held in memory, keyed by `(lemma, pos)`; a `None` pos entry
/// answers lookups for any part of speech.
#[derive(Debug, Clone, Default)]
pub struct MemoryGlossary {
    rows: HashMap<(String, Option<String>), Vec<GlossRow>>,
}

impl MemoryGlossary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, lemma: &str, pos: Option<&str>, row: GlossRow) -> Self {
        self.rows
            .entry((lemma.to_string(), pos.map(str::to_string)))
            .or_default()
            .push(row);
        self
    }
}

impl GlossSource for MemoryGlossary {
    fn lookup(&self, lemma: &str, pos: Option<&str>) -> Result<Vec<GlossRow>> {
        let exact = self.rows.get(&(lemma.to_string(), pos.map(str::to_string)));
        let any = || self.rows.get(&(lemma.to_string(), None));
        Ok(exact.or_else(any).cloned().unwrap_or_default())
    }
}
