use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use inkgloss_core::TextRegion;
use inkgloss_epub::EpubContainer;
use inkgloss_index::{JsonlWriter, ParagraphRecord};
use tracing::info;

pub fn run(book: String, output: Option<String>) -> Result<()> {
    let epub = EpubContainer::open(&book)?;
    let regions = epub.regions()?;
    let written = match output {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("failed to create {path}"))?;
            write_regions(&regions, BufWriter::new(file))?
        }
        None => write_regions(&regions, io::stdout().lock())?,
    };
    info!(book = book.as_str(), regions = regions.len(), paragraphs = written, "regions written");
    Ok(())
}

/// One JSONL record per paragraph, in reading order.
fn write_regions<W: Write>(regions: &[TextRegion], writer: W) -> Result<usize> {
    let mut writer = JsonlWriter::new(writer);
    let mut written = 0;
    for region in regions {
        for record in ParagraphRecord::from_region(region) {
            writer.write_record(&record)?;
            written += 1;
        }
    }
    writer.into_inner().flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_paragraph_becomes_a_line() {
        let first = TextRegion::extract(
            "OEBPS/c1.xhtml",
            "<html><body><p>Call me Ishmael.</p><p>Some years ago.</p></body></html>",
        );
        let second = TextRegion::extract(
            "OEBPS/c2.xhtml",
            "<html><body><p>Never mind how long.</p></body></html>",
        );
        let mut out = Vec::new();
        let written = write_regions(&[first, second], &mut out).unwrap();
        assert_eq!(written, 3);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["region"], "OEBPS/c1.xhtml");
        assert_eq!(lines[1]["text"], "Some years ago.");
        assert_eq!(lines[2]["region"], "OEBPS/c2.xhtml");
        assert_eq!(lines[2]["index"], 0);
    }
}
