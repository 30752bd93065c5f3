use std::collections::HashSet;

/// Characters that separate description tokens.
const TOKEN_SEPARATORS: [char; 6] = [' ', '-', '/', '\\', '.', ','];

/// Phrases that mark a description as an internal transfer.
pub const DEFAULT_TRANSFER_KEYWORDS: &[&str] = &[
    "transfer",
    "xfer",
    "between accounts",
    "internal transfer",
    "payment to",
];

/// Case-insensitive substring check against `keywords`, which are expected
/// to be lowercase already. Blank descriptions never match.
pub fn contains_keyword<S: AsRef<str>>(description: &str, keywords: &[S]) -> bool {
    let normalized = description.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    keywords
        .iter()
        .any(|k| normalized.contains(k.as_ref()))
}

/// Lowercase word set of a description. Tokens shorter than `min_len`
/// characters are dropped.
pub fn tokenize(description: &str, min_len: usize) -> HashSet<String> {
    description
        .to_lowercase()
        .split(TOKEN_SEPARATORS)
        .map(str::trim)
        .filter(|t| !t.is_empty() && t.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets in `[0.0, 1.0]`.
/// An empty side scores zero rather than one.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

pub fn token_overlap(s1: &str, s2: &str, min_len: usize) -> f32 {
    jaccard(&tokenize(s1, min_len), &tokenize(s2, min_len))
}
