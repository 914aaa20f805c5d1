//! Rendering of structured-data facts attached to encyclopedia summaries.

use chrono::NaiveDate;

pub const WIKIDATA_ITEM_URL: &str = "https://www.wikidata.org/wiki/";

/// `Inception: March 31, 1889` for ISO-like dates such as
/// `+1889-03-31T00:00:00Z`; anything unparsable is shown as given.
pub fn inception_text(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('+');
    let date = trimmed.split('T').next().unwrap_or(trimmed);
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(date) => format!("Inception: {}", date.format("%B %-d, %Y")),
        Err(_) => format!("Inception: {}", raw.trim()),
    }
}

/// Regime type for a Democracy Index score.
pub fn regime_type(score: f64) -> &'static str {
    if score >= 8.0 {
        "Full democracy"
    } else if score >= 6.0 {
        "Flawed democracy"
    } else if score >= 4.0 {
        "Hybrid regime"
    } else {
        "Authoritarian regime"
    }
}
