//! JSON Lines records exchanged with the external tagger: paragraphs go out,
//! mentions come back.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use inkgloss_core::{Mention, TextRegion};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub type MentionRecord = Mention;

/// One paragraph for the tagger. Mentions found in `text` are reported back
/// with `start..end` as their paragraph bounds.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ParagraphRecord {
    pub region: String,
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl ParagraphRecord {
    pub fn from_region(region: &TextRegion) -> Vec<Self> {
        region
            .paragraphs
            .iter()
            .enumerate()
            .map(|(index, paragraph)| Self {
                region: region.id.to_string(),
                index,
                start: paragraph.start,
                end: paragraph.end,
                text: paragraph.text.clone(),
            })
            .collect()
    }
}

pub struct JsonlWriter<W> {
    writer: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut buf = serde_json::to_vec(record)?;
        buf.push(b'\n');
        self.writer.write_all(&buf)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

pub struct JsonlReader<R> {
    reader: R,
}

impl<R: BufRead> JsonlReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Parses every non-blank line.
    pub fn read_records<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for (idx, line) in self.reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .with_context(|| format!("invalid record on line {}", idx + 1))?;
            records.push(record);
        }
        Ok(records)
    }
}

pub fn read_mentions(path: &Path) -> Result<Vec<MentionRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    JsonlReader::new(BufReader::new(file))
        .read_records()
        .with_context(|| format!("failed to read mentions from {}", path.display()))
}
