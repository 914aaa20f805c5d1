use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::normalization::{strip_invisible, unescape_text};
use crate::occurrence::RegionId;

static BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<body.{3,}?</body>").unwrap());
static TEXT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">[^<]{2,}<").unwrap());

/// A run of character data between two tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Byte bounds into the cleaned region text, tags excluded.
    pub start: usize,
    pub end: usize,
    /// Unescaped text; word offsets handed back by a tagger index into it.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRegion {
    pub id: RegionId,
    /// The text the paragraph bounds refer to; this exact text must be given
    /// to the rewriter.
    pub text: String,
    pub paragraphs: Vec<Paragraph>,
}

impl TextRegion {
    /// Cleans `raw` of invisible characters and collects its paragraphs.
    pub fn extract(id: impl Into<RegionId>, raw: &str) -> Self {
        let text = strip_invisible(raw).into_owned();
        let paragraphs = extract_paragraphs(&text);
        Self {
            id: id.into(),
            text,
            paragraphs,
        }
    }
}

/// Paragraphs inside every `<body>` element of `text`. Whitespace-only runs
/// are skipped.
pub fn extract_paragraphs(text: &str) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    for body in BODY_RE.find_iter(text) {
        for run in TEXT_RUN_RE.find_iter(body.as_str()) {
            let start = body.start() + run.start() + 1;
            let end = body.start() + run.end() - 1;
            let raw = &text[start..end];
            if raw.trim().is_empty() {
                continue;
            }
            paragraphs.push(Paragraph {
                start,
                end,
                text: unescape_text(raw).into_owned(),
            });
        }
    }
    paragraphs
}
