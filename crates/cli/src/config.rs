use std::env;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use inkgloss_core::{
    Capability, CustomOverrides, DescriptionSource, JsonCache, KnowledgeBase, Prefs,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// The EPUB to annotate or to read regions from.
    pub book: String,
    /// JSONL mention records produced by the tagger.
    pub mentions: String,
    #[serde(default)]
    pub dictionary: Option<String>,
    #[serde(default)]
    pub custom: Option<String>,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub prefs: Prefs,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub summaries: Option<String>,
    #[serde(default)]
    pub facts: Option<String>,
    #[serde(default)]
    pub images: Option<String>,
    /// Description source code summaries are cited as (1 Wikipedia, 2
    /// MediaWiki).
    #[serde(default)]
    pub summary_source: Option<u8>,
}

impl RunConfig {
    pub fn load(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
        let mut cfg: RunConfig = serde_yaml::from_str(&raw).context("invalid inkgloss config")?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(lang) = lookup("INKGLOSS_LEMMA_LANG") {
            self.prefs.lemma_lang = lang.trim().to_string();
        }
        if let Some(lang) = lookup("INKGLOSS_GLOSS_LANG") {
            self.prefs.gloss_lang = lang.trim().to_string();
        }
        if let Some(count) = lookup("INKGLOSS_MIN_COUNT") {
            self.prefs.minimal_x_ray_count = count
                .trim()
                .parse()
                .map_err(|_| anyhow!("INKGLOSS_MIN_COUNT must be a number, got {count:?}"))?;
        }
        Ok(())
    }

    /// Custom overrides; empty when no file is configured or it does not exist.
    pub fn load_custom(&self) -> Result<CustomOverrides> {
        match &self.custom {
            Some(path) => CustomOverrides::load(path)
                .with_context(|| format!("failed to load custom overrides {path}")),
            None => Ok(CustomOverrides::new()),
        }
    }
}

impl KnowledgeConfig {
    /// A knowledge base over whichever caches are configured.
    pub fn open(&self) -> Result<KnowledgeBase> {
        let mut kb = KnowledgeBase::new();
        for (path, capability) in [
            (&self.summaries, Capability::Summary),
            (&self.facts, Capability::StructuredData),
            (&self.images, Capability::Images),
        ] {
            if let Some(path) = path {
                let cache = JsonCache::open(Path::new(path), capability)
                    .with_context(|| format!("failed to open cache {path}"))?;
                kb = kb.with_source(Box::new(cache));
            }
        }
        if let Some(code) = self.summary_source {
            kb = kb.with_summary_source(DescriptionSource::from_code(Some(code)));
        }
        Ok(kb)
    }
}
