use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{GlossError, Result};
use crate::knowledge::DescriptionSource;

type CustomRow = (String, String, String, String, Option<u8>, bool);

/// One user-maintained entity. On disk it is the 6-element array
/// `[name, label, aliases, description, source, omit]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CustomRow", into = "CustomRow")]
pub struct CustomEntry {
    pub name: String,
    pub label: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub source: DescriptionSource,
    pub omit: bool,
}

impl From<CustomRow> for CustomEntry {
    fn from((name, label, aliases, description, source, omit): CustomRow) -> Self {
        Self {
            name,
            label,
            aliases: aliases
                .split(',')
                .map(str::trim)
                .filter(|alias| !alias.is_empty())
                .map(str::to_string)
                .collect(),
            description,
            source: DescriptionSource::from_code(source),
            omit,
        }
    }
}

impl From<CustomEntry> for CustomRow {
    fn from(entry: CustomEntry) -> Self {
        (
            entry.name,
            entry.label,
            entry.aliases.join(","),
            entry.description,
            entry.source.code(),
            entry.omit,
        )
    }
}

/// Custom entities keyed by name, in file order.
#[derive(Debug, Clone, Default)]
pub struct CustomOverrides {
    entries: IndexMap<String, CustomEntry>,
    aliases: HashMap<String, String>,
}

impl CustomOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// A missing file is an empty set of overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(path)?;
        let entries: Vec<CustomEntry> = serde_json::from_str(&raw)?;
        Ok(entries.into_iter().collect())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let rows: Vec<&CustomEntry> = self.entries.values().collect();
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(&rows)?.as_bytes())?;
        tmp.persist(path).map_err(|err| GlossError::Io(err.error))?;
        Ok(())
    }

    pub fn insert(&mut self, entry: CustomEntry) -> Option<CustomEntry> {
        let previous = self.remove(&entry.name);
        for alias in &entry.aliases {
            self.aliases.insert(alias.clone(), entry.name.clone());
        }
        self.entries.insert(entry.name.clone(), entry);
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<CustomEntry> {
        let removed = self.entries.shift_remove(name)?;
        self.aliases.retain(|_, target| target != name);
        Some(removed)
    }

    pub fn get(&self, name: &str) -> Option<&CustomEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The custom name a surface form stands for, through the name itself or
    /// one of its aliases.
    pub fn canonical_name(&self, surface: &str) -> Option<&str> {
        if let Some((name, _)) = self.entries.get_key_value(surface) {
            return Some(name.as_str());
        }
        self.aliases.get(surface).map(String::as_str)
    }

    pub fn is_omitted(&self, name: &str) -> bool {
        self.get(name).is_some_and(|entry| entry.omit)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CustomEntry> for CustomOverrides {
    fn from_iter<I: IntoIterator<Item = CustomEntry>>(iter: I) -> Self {
        let mut overrides = Self::new();
        for entry in iter {
            overrides.insert(entry);
        }
        overrides
    }
}
