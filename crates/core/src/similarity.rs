use std::collections::BTreeSet;

use crate::normalization::process_for_match;

/// Minimum token-set score (0-100) for two surface forms to be merged.
pub const FUZZ_THRESHOLD: f64 = 85.0;

/// Order-insensitive similarity of two surface forms, 0 to 100.
///
/// Both sides are processed with [`process_for_match`] and split into token
/// sets. When the shared tokens cover one side completely the score is 100
/// ("Obama" against "Barack Obama"). Otherwise the best pairwise ratio among
/// the sorted intersection and the intersection extended by either side's
/// leftover tokens is used.
pub fn token_set_ratio(left: &str, right: &str) -> f64 {
    let left = process_for_match(left);
    let right = process_for_match(right);
    let left_tokens: BTreeSet<&str> = left.split(' ').filter(|t| !t.is_empty()).collect();
    let right_tokens: BTreeSet<&str> = right.split(' ').filter(|t| !t.is_empty()).collect();
    if left_tokens.is_empty() || right_tokens.is_empty() {
        return 0.0;
    }

    let shared: Vec<&str> = left_tokens.intersection(&right_tokens).copied().collect();
    let only_left: Vec<&str> = left_tokens.difference(&right_tokens).copied().collect();
    let only_right: Vec<&str> = right_tokens.difference(&left_tokens).copied().collect();
    if !shared.is_empty() && (only_left.is_empty() || only_right.is_empty()) {
        return 100.0;
    }

    let sect = shared.join(" ");
    let with_left = join_nonempty(&sect, &only_left.join(" "));
    let with_right = join_nonempty(&sect, &only_right.join(" "));
    let mut best = ratio(&with_left, &with_right);
    if !sect.is_empty() {
        best = best
            .max(ratio(&sect, &with_left))
            .max(ratio(&sect, &with_right));
    }
    best
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}

/// Indel similarity, `2 * LCS / (len_left + len_right)` scaled to 0-100.
fn ratio(left: &str, right: &str) -> f64 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    let total = left.len() + right.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * longest_common_subsequence(&left, &right) as f64 / total as f64
}

fn longest_common_subsequence(left: &[char], right: &[char]) -> usize {
    let mut row = vec![0usize; right.len() + 1];
    for &l in left {
        let mut diagonal = 0;
        for (j, &r) in right.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if l == r {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[right.len()]
}

/// Returns the best candidate scoring at least `cutoff`. Equal scores keep
/// the earliest candidate.
pub fn extract_one<'a, I>(query: &str, candidates: I, cutoff: f64) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let score = token_set_ratio(query, candidate);
        if score < cutoff {
            continue;
        }
        if best.map_or(true, |(_, current)| score > current) {
            best = Some((candidate, score));
            if score >= 100.0 {
                break;
            }
        }
    }
    best
}
