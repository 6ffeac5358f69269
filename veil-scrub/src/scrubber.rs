//! The per-patient scrubber: compiled rewrite rules applied in a
//! deterministic order.

use std::sync::Arc;

use veil_core::config::ScrubOptions;
use veil_core::errors::ScrubError;

use crate::nonspecific::NonspecificScrubber;

/// One compiled rewrite rule. Patterns are compiled case-insensitive.
pub struct ScrubRule {
    source: String,
    regex: fancy_regex::Regex,
}

impl ScrubRule {
    pub fn compile(source: &str) -> Result<Self, ScrubError> {
        let regex =
            fancy_regex::Regex::new(&format!("(?i){source}")).map_err(|e| ScrubError::Pattern {
                pattern: source.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// The uncompiled pattern source; digest material.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Replace all matches, left to right on the evolving string.
    pub fn apply(&self, text: &str, replacement: &str) -> String {
        self.regex.replace_all(text, replacement).into_owned()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text).unwrap_or(false)
    }
}

impl std::fmt::Debug for ScrubRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrubRule").field("source", &self.source).finish()
    }
}

/// A built scrubber: patient rules, third-party rules, and the shared
/// nonspecific rules, plus the digest that keys change detection.
pub struct Scrubber {
    patient: Vec<ScrubRule>,
    thirdparty: Vec<ScrubRule>,
    nonspecific: Arc<NonspecificScrubber>,
    repl_patient: String,
    repl_thirdparty: String,
    nonspecific_first: bool,
    digest: String,
}

impl Scrubber {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        patient: Vec<ScrubRule>,
        thirdparty: Vec<ScrubRule>,
        nonspecific: Arc<NonspecificScrubber>,
        repl_patient: String,
        repl_thirdparty: String,
        nonspecific_first: bool,
        digest: String,
    ) -> Self {
        Self {
            patient,
            thirdparty,
            nonspecific,
            repl_patient,
            repl_thirdparty,
            nonspecific_first,
            digest,
        }
    }

    /// A scrubber with no patient or third-party rules: only the run-wide
    /// nonspecific rules apply. Used for free text in tables that belong to
    /// no patient.
    pub fn nonspecific_only(
        nonspecific: Arc<NonspecificScrubber>,
        options: &ScrubOptions,
    ) -> Self {
        Self::new(
            Vec::new(),
            Vec::new(),
            nonspecific,
            options.effective_replace_patient_with().to_string(),
            options.effective_replace_third_party_with().to_string(),
            options.effective_nonspecific_scrubber_first(),
            String::new(),
        )
    }

    /// Scrub one free-text value.
    pub fn scrub(&self, text: &str) -> String {
        let mut current = text.to_string();
        if self.nonspecific_first {
            current = self.nonspecific.apply(&current);
            current = apply_group(&self.patient, &current, &self.repl_patient);
            current = apply_group(&self.thirdparty, &current, &self.repl_thirdparty);
        } else {
            current = apply_group(&self.patient, &current, &self.repl_patient);
            current = apply_group(&self.thirdparty, &current, &self.repl_thirdparty);
            current = self.nonspecific.apply(&current);
        }
        current
    }

    /// Deterministic fingerprint of this scrubber's source material. Stored
    /// per patient; a change forces a full rewrite of the patient's rows.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn patient_rule_count(&self) -> usize {
        self.patient.len()
    }

    pub fn thirdparty_rule_count(&self) -> usize {
        self.thirdparty.len()
    }
}

impl std::fmt::Debug for Scrubber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scrubber")
            .field("patient_rules", &self.patient.len())
            .field("thirdparty_rules", &self.thirdparty.len())
            .field("digest", &self.digest)
            .finish()
    }
}

fn apply_group(rules: &[ScrubRule], text: &str, replacement: &str) -> String {
    let mut current = text.to_string();
    for rule in rules {
        current = rule.apply(&current, replacement);
    }
    current
}
