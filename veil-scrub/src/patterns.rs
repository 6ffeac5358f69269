//! Regex-source construction for the scrub methods.
//!
//! Everything here produces pattern *sources*; compilation happens once per
//! scrubber in [`crate::scrubber`]. Boundary semantics:
//! word boundaries use `\b`, numeric boundaries use lookaround
//! (`(?<!\d)` / `(?!\d)`), so a nine-digit hospital number inside a longer
//! digit run is left alone when numeric boundaries are on.

use smallvec::SmallVec;

use veil_core::config::ScrubOptions;

use crate::fuzzy::fuzzy_pattern;

/// Wrap a pattern in word boundaries.
pub fn at_word_boundaries(source: &str) -> String {
    format!(r"\b(?:{source})\b")
}

/// Wrap a pattern in numeric boundaries: not preceded or followed by a
/// digit.
pub fn at_numeric_boundaries(source: &str) -> String {
    format!(r"(?<!\d)(?:{source})(?!\d)")
}

fn escape(text: &str) -> String {
    fancy_regex::escape(text).into_owned()
}

/// A literal, fuzzed when long enough and errors are allowed.
fn literal(token: &str, options: &ScrubOptions) -> String {
    let max_errors = options.effective_string_max_regex_errors();
    if max_errors > 0 && token.chars().count() >= options.effective_min_string_length_for_errors()
    {
        fuzzy_pattern(token, max_errors)
    } else {
        escape(token)
    }
}

/// Patterns for a `Words` scrub source: one per whitespace-separated token,
/// each with the configured suffixes attached optionally. Tokens shorter
/// than the minimum scrub length are omitted entirely.
pub fn word_patterns(value: &str, options: &ScrubOptions) -> Vec<String> {
    let min_len = options.effective_min_string_length_to_scrub_with();
    let suffix_group = suffix_group(options);
    let mut patterns = Vec::new();
    for token in value.split_whitespace() {
        if token.chars().count() < min_len {
            continue;
        }
        let mut source = literal(token, options);
        if let Some(suffixes) = &suffix_group {
            source.push_str(suffixes);
        }
        patterns.push(wrap_string_boundaries(&source, options));
    }
    patterns
}

/// Pattern for a `Phrase` scrub source: internal whitespace collapses to
/// `\s+`, the phrase matches as a whole. Returns `None` when the phrase is
/// shorter than the minimum scrub length.
pub fn phrase_pattern(value: &str, options: &ScrubOptions) -> Option<String> {
    let tokens: SmallVec<[&str; 8]> = value.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    let joined_len: usize = tokens.iter().map(|t| t.chars().count()).sum();
    if joined_len < options.effective_min_string_length_to_scrub_with() {
        return None;
    }
    let source = tokens
        .iter()
        .map(|t| literal(t, options))
        .collect::<Vec<_>>()
        .join(r"\s+");
    Some(wrap_string_boundaries(&source, options))
}

/// `PhraseUnlessNumeric`: as phrase, unless the value is a pure number.
pub fn phrase_unless_numeric_pattern(value: &str, options: &ScrubOptions) -> Option<String> {
    let collapsed: String = value.split_whitespace().collect::<Vec<_>>().join("");
    if !collapsed.is_empty() && collapsed.parse::<f64>().is_ok() {
        return None;
    }
    phrase_pattern(value, options)
}

/// Pattern for a `Number` scrub source: the digit sequence of the value,
/// tolerating optional single whitespace between digits (phone-number
/// spacing). Non-digit characters in the value are ignored.
pub fn number_pattern(value: &str, options: &ScrubOptions) -> Option<String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let source = spaced_chars(&digits);
    let mut wrapped = source;
    if options.effective_numbers_at_numeric_boundaries() {
        wrapped = at_numeric_boundaries(&wrapped);
    }
    if options.effective_numbers_at_word_boundaries() {
        wrapped = at_word_boundaries(&wrapped);
    }
    Some(wrapped)
}

/// Pattern for a `Code` scrub source (e.g. a postcode): the exact
/// alphanumeric content with optional single whitespace between characters.
pub fn code_pattern(value: &str, options: &ScrubOptions) -> Option<String> {
    let code: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if code.is_empty() {
        return None;
    }
    let source = spaced_chars(&code);
    let mut wrapped = source;
    if options.effective_codes_at_numeric_boundaries() {
        wrapped = at_numeric_boundaries(&wrapped);
    }
    if options.effective_codes_at_word_boundaries() {
        wrapped = at_word_boundaries(&wrapped);
    }
    Some(wrapped)
}

/// Join the characters of `text`, escaped, with optional single whitespace
/// between them.
fn spaced_chars(text: &str) -> String {
    let escaped: Vec<String> = text.chars().map(|c| escape(&c.to_string())).collect();
    escaped.join(r"\s?")
}

fn wrap_string_boundaries(source: &str, options: &ScrubOptions) -> String {
    if options.effective_strings_at_word_boundaries() {
        at_word_boundaries(source)
    } else {
        source.to_string()
    }
}

fn suffix_group(options: &ScrubOptions) -> Option<String> {
    if options.scrub_string_suffixes.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = options
        .scrub_string_suffixes
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| escape(s))
        .collect();
    if alternatives.is_empty() {
        None
    } else {
        Some(format!("(?:{})?", alternatives.join("|")))
    }
}
