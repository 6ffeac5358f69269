//! Scrubber behaviour: replacement texts, boundary semantics, fuzzy
//! matching, word lists, and the run-wide nonspecific rules.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_REPLACE_NONSPECIFIC, DEFAULT_REPLACE_PATIENT, DEFAULT_REPLACE_THIRD_PARTY,
    DEFAULT_THIRDPARTY_XREF_MAX_DEPTH,
};

/// Options controlling scrubber construction and application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubOptions {
    /// Replacement for patient identifiers. Default `[__PPP__]`.
    pub replace_patient_with: Option<String>,
    /// Replacement for third-party identifiers. Default `[__TTT__]`.
    pub replace_third_party_with: Option<String>,
    /// Replacement for nonspecific matches. Default `[~~~]`.
    pub replace_nonspecific_with: Option<String>,
    /// Replacement template for dates matched by `scrub_all_dates`. May
    /// contain blur directives from `{%b, %B, %m, %Y, %y}` only; when absent,
    /// dates fall back to the nonspecific replacement.
    pub replace_all_dates_with: Option<String>,

    /// Anchor string rules at word boundaries. Default true.
    pub anonymise_strings_at_word_boundaries_only: Option<bool>,
    /// Anchor number rules at word boundaries. Default false.
    pub anonymise_numbers_at_word_boundaries_only: Option<bool>,
    /// Anchor number rules at numeric boundaries. Default true.
    pub anonymise_numbers_at_numeric_boundaries_only: Option<bool>,
    /// Anchor code rules at word boundaries. Default true.
    pub anonymise_codes_at_word_boundaries_only: Option<bool>,
    /// Anchor code rules at numeric boundaries. Default true.
    pub anonymise_codes_at_numeric_boundaries_only: Option<bool>,
    /// Anchor date rules at word boundaries. Default true.
    pub anonymise_dates_at_word_boundaries_only: Option<bool>,

    /// Suffixes appended to every token of a `Words` rule (e.g. possessive
    /// `s`). Default empty.
    pub scrub_string_suffixes: Vec<String>,

    /// Maximum approximate-match edits for string rules. Default 0.
    pub string_max_regex_errors: Option<u32>,
    /// Minimum string length before approximate matching applies. Default 3.
    pub min_string_length_for_errors: Option<usize>,
    /// Strings shorter than this are never scrubbed. Default 2.
    pub min_string_length_to_scrub_with: Option<usize>,

    /// Files of words never scrubbed even when patient-derived.
    pub allowlist_filenames: Vec<String>,
    /// Files of words/phrases always scrubbed for every patient.
    pub denylist_filenames: Vec<String>,
    /// Treat each denylist line as a whole phrase rather than a word.
    /// Default false.
    pub denylist_files_as_phrases: Option<bool>,
    /// Treat each denylist line as a regular expression. Default false.
    pub denylist_use_regex: Option<bool>,

    /// Scrub every digit run of exactly these lengths, for every patient.
    pub scrub_all_numbers_of_n_digits: Vec<usize>,
    /// Scrub everything shaped like a UK postcode. Default false.
    pub scrub_all_uk_postcodes: Option<bool>,
    /// Scrub everything shaped like a date. Default false.
    pub scrub_all_dates: Option<bool>,
    /// Scrub everything shaped like an email address. Default false.
    pub scrub_all_email_addresses: Option<bool>,
    /// Extra regular expressions applied verbatim as nonspecific rules.
    pub extra_regexes: Vec<String>,

    /// Apply nonspecific rules before patient/third-party rules.
    /// Default false.
    pub nonspecific_scrubber_first: Option<bool>,

    /// Recursion bound for `ThirdPartyXrefPid` expansion. Default 1.
    pub thirdparty_xref_max_depth: Option<u32>,
}

impl ScrubOptions {
    pub fn effective_replace_patient_with(&self) -> &str {
        self.replace_patient_with
            .as_deref()
            .unwrap_or(DEFAULT_REPLACE_PATIENT)
    }

    pub fn effective_replace_third_party_with(&self) -> &str {
        self.replace_third_party_with
            .as_deref()
            .unwrap_or(DEFAULT_REPLACE_THIRD_PARTY)
    }

    pub fn effective_replace_nonspecific_with(&self) -> &str {
        self.replace_nonspecific_with
            .as_deref()
            .unwrap_or(DEFAULT_REPLACE_NONSPECIFIC)
    }

    pub fn effective_strings_at_word_boundaries(&self) -> bool {
        self.anonymise_strings_at_word_boundaries_only.unwrap_or(true)
    }

    pub fn effective_numbers_at_word_boundaries(&self) -> bool {
        self.anonymise_numbers_at_word_boundaries_only
            .unwrap_or(false)
    }

    pub fn effective_numbers_at_numeric_boundaries(&self) -> bool {
        self.anonymise_numbers_at_numeric_boundaries_only
            .unwrap_or(true)
    }

    pub fn effective_codes_at_word_boundaries(&self) -> bool {
        self.anonymise_codes_at_word_boundaries_only.unwrap_or(true)
    }

    pub fn effective_codes_at_numeric_boundaries(&self) -> bool {
        self.anonymise_codes_at_numeric_boundaries_only
            .unwrap_or(true)
    }

    pub fn effective_dates_at_word_boundaries(&self) -> bool {
        self.anonymise_dates_at_word_boundaries_only.unwrap_or(true)
    }

    pub fn effective_string_max_regex_errors(&self) -> u32 {
        self.string_max_regex_errors.unwrap_or(0)
    }

    pub fn effective_min_string_length_for_errors(&self) -> usize {
        self.min_string_length_for_errors.unwrap_or(3)
    }

    pub fn effective_min_string_length_to_scrub_with(&self) -> usize {
        self.min_string_length_to_scrub_with.unwrap_or(2)
    }

    pub fn effective_denylist_files_as_phrases(&self) -> bool {
        self.denylist_files_as_phrases.unwrap_or(false)
    }

    pub fn effective_denylist_use_regex(&self) -> bool {
        self.denylist_use_regex.unwrap_or(false)
    }

    pub fn effective_scrub_all_uk_postcodes(&self) -> bool {
        self.scrub_all_uk_postcodes.unwrap_or(false)
    }

    pub fn effective_scrub_all_dates(&self) -> bool {
        self.scrub_all_dates.unwrap_or(false)
    }

    pub fn effective_scrub_all_email_addresses(&self) -> bool {
        self.scrub_all_email_addresses.unwrap_or(false)
    }

    pub fn effective_nonspecific_scrubber_first(&self) -> bool {
        self.nonspecific_scrubber_first.unwrap_or(false)
    }

    pub fn effective_thirdparty_xref_max_depth(&self) -> u32 {
        self.thirdparty_xref_max_depth
            .unwrap_or(DEFAULT_THIRDPARTY_XREF_MAX_DEPTH)
    }
}
