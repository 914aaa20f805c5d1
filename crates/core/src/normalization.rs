use std::borrow::Cow;

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, partial_escape, resolve_html5_entity};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

const CJK_LANGS: [&str; 3] = ["zh", "ja", "ko"];

/// Folds a surface form into the space the fuzzy scorer compares in:
/// NFKC, lowercase, every non-alphanumeric char replaced by a space,
/// whitespace collapsed.
pub fn process_for_match(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut prev_space = true;
    for ch in raw.nfkc().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            result.push(ch);
            prev_space = false;
        } else if !prev_space {
            result.push(' ');
            prev_space = true;
        }
    }
    if result.ends_with(' ') {
        result.pop();
    }
    result
}

/// Escapes text content. Quotes are left alone since they are legal in
/// character data.
pub fn escape_text(raw: &str) -> Cow<'_, str> {
    partial_escape(raw)
}

pub fn escape_attr(raw: &str) -> Cow<'_, str> {
    escape(raw)
}

/// Decodes character and entity references, HTML5 named entities included.
/// References that do not resolve, such as a bare `&`, are kept verbatim.
pub fn unescape_text(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    let mut decoded = String::with_capacity(raw.len());
    decode_spans(raw, |_, _, piece| decoded.push_str(piece));
    Cow::Owned(decoded)
}

/// Byte offset in `raw` of the character at `offset` in its decoded form.
/// An offset inside a decoded reference maps to the reference's `&`.
pub fn raw_offset(raw: &str, offset: usize) -> usize {
    let mut decoded_pos = 0;
    let mut found = None;
    decode_spans(raw, |start, end, piece| {
        if found.is_some() {
            return;
        }
        if offset < decoded_pos + piece.len() {
            let literal = &raw[start..end] == piece;
            found = Some(if literal {
                start + (offset - decoded_pos)
            } else {
                start
            });
        }
        decoded_pos += piece.len();
    });
    found.unwrap_or(raw.len())
}

/// Walks `raw` as literal runs and resolved references, handing each piece
/// to `emit` with its raw byte span.
fn decode_spans<F>(raw: &str, mut emit: F)
where
    F: FnMut(usize, usize, &str),
{
    let mut run_start = 0;
    let mut pos = 0;
    while let Some(rel) = raw[pos..].find('&') {
        let amp = pos + rel;
        match resolve_reference(&raw[amp..]) {
            Some((len, piece)) => {
                if run_start < amp {
                    emit(run_start, amp, &raw[run_start..amp]);
                }
                emit(amp, amp + len, &piece);
                pos = amp + len;
                run_start = pos;
            }
            None => pos = amp + 1,
        }
    }
    if run_start < raw.len() {
        emit(run_start, raw.len(), &raw[run_start..]);
    }
}

/// Resolves the reference `text` starts with. Returns its raw length and
/// replacement.
fn resolve_reference(text: &str) -> Option<(usize, Cow<'static, str>)> {
    let end = 1 + text[1..].find(|c: char| c == ';' || c == '&' || c == '<' || c.is_whitespace())?;
    if text.as_bytes()[end] != b';' {
        return None;
    }
    let name = &text[1..end];
    let piece = match name.strip_prefix('#') {
        Some(number) => {
            let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None if number.bytes().all(|b| b.is_ascii_digit()) => number.parse().ok()?,
                None => return None,
            };
            Cow::Owned(char::from_u32(code)?.to_string())
        }
        None => Cow::Borrowed(resolve_html5_entity(name)?),
    };
    Some((end + 1, piece))
}

/// Removes soft hyphens, byte order marks and word joiners, in literal or
/// entity form. Text regions are located after this pass, so offsets handed
/// to the tagger refer to the cleaned text.
pub fn strip_invisible(text: &str) -> Cow<'_, str> {
    static INVISIBLE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\x{ad}|&shy;|&#xad;|&#173;|\x{feff}|\x{2060}|&NoBreak;").unwrap()
    });
    INVISIBLE_RE.replace_all(text, "")
}

pub fn is_cjk(lang: &str) -> bool {
    CJK_LANGS.contains(&lang)
}

/// Builds the lemma registry key. In part-of-speech mode the tag is appended
/// after an underscore, e.g. `run_VERB`.
pub fn lemma_key(lemma: &str, pos: Option<&str>) -> String {
    let folded = lemma.trim().to_lowercase();
    match pos {
        Some(pos) if !pos.is_empty() => format!("{folded}_{pos}"),
        _ => folded,
    }
}

/// Inverse of [`lemma_key`] for keys built in part-of-speech mode.
pub fn split_lemma_key(key: &str) -> (&str, Option<&str>) {
    match key.rsplit_once('_') {
        Some((lemma, pos)) if !lemma.is_empty() => (lemma, Some(pos)),
        _ => (key, None),
    }
}

/// Maps universal POS tags onto the headings the dictionary is keyed by.
pub fn dictionary_pos(pos: &str) -> &'static str {
    match pos {
        "NOUN" => "noun",
        "ADJ" => "adj",
        "VERB" => "verb",
        "ADV" => "adv",
        _ => "other",
    }
}
