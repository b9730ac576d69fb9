//! Text normalization and whole-token matching.
//!
//! Subjects, interests, regions, and course names all pass through the same
//! pipeline before comparison: lowercase -> NFD decompose -> strip combining
//! marks -> replace punctuation with spaces -> collapse whitespace. Keyword
//! matching is token-based so that "science" never fires inside "sciences".

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("token regex is valid"));

/// Normalize a string for matching comparison.
///
/// "Économics & Finance" -> "economics finance"
pub fn normalize(s: &str) -> String {
    let stripped: String = s
        .to_lowercase()
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a string into normalized lowercase tokens.
pub fn tokens(s: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(&normalize(s))
        .map(|m| m.as_str().to_owned())
        .collect()
}

/// Whether `needle` occurs in `haystack` as a contiguous run of whole tokens.
pub fn contains_tokens(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window.iter().zip(needle).all(|(a, b)| a == b))
}

/// Remove every occurrence of the given phrases from a token stream.
///
/// Longer phrases win when several match at the same position.
pub fn mask_phrases(haystack: &[String], phrases: &[Vec<String>]) -> Vec<String> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        let skip = phrases
            .iter()
            .filter(|p| {
                !p.is_empty()
                    && i + p.len() <= haystack.len()
                    && haystack[i..i + p.len()].iter().zip(p.iter()).all(|(a, b)| a == b)
            })
            .map(|p| p.len())
            .max();
        match skip {
            Some(len) => i += len,
            None => {
                out.push(haystack[i].clone());
                i += 1;
            }
        }
    }
    out
}

/// Capitalize the first letter of each word, for display in reason strings.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
