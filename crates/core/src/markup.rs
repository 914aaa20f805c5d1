use crate::normalization::{escape_attr, escape_text};
use crate::occurrence::{EntityId, LemmaId};

pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const OPS_NS: &str = "http://www.idpf.org/2007/ops";

pub const X_RAY_PAGE: &str = "x_ray.xhtml";
pub const WORD_WISE_PAGE: &str = "word_wise.xhtml";

/// Gloss-to-word length ratio above which a gloss is too long to sit over
/// the word and only a footnote link is rendered.
pub fn ruby_ratio_limit(cjk: bool) -> f64 {
    if cjk {
        3.0
    } else {
        2.5
    }
}

pub fn entity_anchor(id: EntityId, word: &str) -> String {
    format!(
        r#"<a class="x-ray" epub:type="noteref" href="{X_RAY_PAGE}#{id}">{}</a>"#,
        escape_text(word)
    )
}

pub fn lemma_anchor(id: LemmaId, word: &str) -> String {
    format!(
        r#"<a class="wordwise" epub:type="noteref" href="{WORD_WISE_PAGE}#{id}">{}</a>"#,
        escape_text(word)
    )
}

pub fn lemma_ruby(id: LemmaId, word: &str, gloss: &str) -> String {
    format!(
        r#"<ruby class="wordwise"><a epub:type="noteref" href="{WORD_WISE_PAGE}#{id}">{}</a><rp>(</rp><rt>{}</rt><rp>)</rp></ruby>"#,
        escape_text(word),
        escape_text(gloss)
    )
}

/// Style rules injected into every rewritten document; empty when nothing
/// needs styling.
pub fn css_rules(has_lemmas: bool, remove_link_styles: bool) -> String {
    let mut css = String::new();
    if has_lemmas {
        css.push_str("body {line-height: 2.5;} ");
        css.push_str("ruby.wordwise {text-decoration: overline;} ");
        css.push_str("ruby.wordwise a {text-decoration: none;} ");
    }
    if remove_link_styles {
        css.push_str("a.x-ray, a.wordwise, ruby.wordwise a {text-decoration: none; color: inherit;} ");
    }
    css.trim_end().to_string()
}

/// Opening of a generated footnote page, through `<body>`.
pub fn page_header(title: &str, lang: &str) -> String {
    let lang = escape_attr(lang);
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="{XHTML_NS}" xmlns:epub="{OPS_NS}" lang="{lang}" xml:lang="{lang}">
<head><title>{title}</title><meta charset="utf-8"/></head>
<body>
"#
    )
}

pub const PAGE_FOOTER: &str = "</body></html>\n";

/// One `<p>` per line of `text`.
pub fn paragraphs(text: &str) -> String {
    text.lines()
        .map(|line| format!("<p>{}</p>", escape_text(line)))
        .collect()
}
