use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    /// Look people up in the knowledge base instead of quoting the book.
    pub search_people: bool,
    /// Entities mentioned fewer times are dropped unless whitelisted.
    pub minimal_x_ray_count: u32,
    /// Lemma keys carry a part-of-speech suffix.
    pub use_pos: bool,
    pub remove_link_styles: bool,
    /// Pronunciation column for dictionaries carrying several; `ipa` when unset.
    pub ipa_column: Option<String>,
    /// Base URL of a non-Wikipedia MediaWiki server.
    pub mediawiki_url: Option<String>,
    /// Language of the book text.
    pub lemma_lang: String,
    /// Language of the glosses.
    pub gloss_lang: String,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            search_people: false,
            minimal_x_ray_count: 1,
            use_pos: false,
            remove_link_styles: false,
            ipa_column: None,
            mediawiki_url: None,
            lemma_lang: "en".to_string(),
            gloss_lang: "en".to_string(),
        }
    }
}
