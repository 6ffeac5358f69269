//! The nonspecific scrubber: rules that apply to every patient, compiled
//! once per run.
//!
//! Rule order within the pass: denylist, email addresses, UK postcodes,
//! dates, n-digit numbers, extra regexes. Dates run before the bare-number
//! rules so a year is blurred as part of its date rather than eaten as four
//! digits.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use veil_core::config::ScrubOptions;
use veil_core::errors::ScrubError;

use crate::dates::DateScrubber;
use crate::patterns::{at_numeric_boundaries, at_word_boundaries, phrase_pattern};
use crate::scrubber::ScrubRule;

const EMAIL: &str = r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}";
const UK_POSTCODE: &str = r"[A-Za-z]{1,2}[0-9][A-Za-z0-9]?\s*[0-9][A-Za-z]{2}";

/// Run-wide rules shared by every patient's scrubber.
pub struct NonspecificScrubber {
    denylist_plain: Option<AhoCorasick>,
    denylist_rules: Vec<ScrubRule>,
    /// Emails and postcodes; applied before the date pass.
    text_rules: Vec<ScrubRule>,
    date_scrubber: Option<DateScrubber>,
    /// Digit-length rules and extra regexes; applied after the date pass.
    number_rules: Vec<ScrubRule>,
    replacement: String,
    digest_material: Vec<String>,
}

impl NonspecificScrubber {
    /// Compile from options and the already-loaded denylist entries.
    pub fn build(
        options: &ScrubOptions,
        denylist_entries: &[String],
    ) -> Result<Self, ScrubError> {
        let replacement = options.effective_replace_nonspecific_with().to_string();
        let mut digest_material = Vec::new();
        digest_material.push(format!("replacement\x1f{replacement}"));

        let mut denylist_plain = None;
        let mut denylist_rules = Vec::new();
        if !denylist_entries.is_empty() {
            if options.effective_denylist_use_regex() {
                for entry in denylist_entries {
                    denylist_rules.push(ScrubRule::compile(entry)?);
                    digest_material.push(format!("denylist-re\x1f{entry}"));
                }
            } else if options.effective_denylist_files_as_phrases() {
                for entry in denylist_entries {
                    if let Some(source) = phrase_pattern(entry, options) {
                        denylist_rules.push(ScrubRule::compile(&source)?);
                        digest_material.push(format!("denylist-phrase\x1f{source}"));
                    }
                }
            } else {
                // Word mode: one automaton over all entries, boundary-checked
                // at match time.
                let automaton = AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(denylist_entries)
                    .map_err(|e| ScrubError::Pattern {
                        pattern: "denylist automaton".to_string(),
                        message: e.to_string(),
                    })?;
                denylist_plain = Some(automaton);
                for entry in denylist_entries {
                    digest_material.push(format!("denylist-word\x1f{entry}"));
                }
            }
        }

        let mut text_rules = Vec::new();
        if options.effective_scrub_all_email_addresses() {
            digest_material.push(format!("rule\x1f{EMAIL}"));
            text_rules.push(ScrubRule::compile(EMAIL)?);
        }
        if options.effective_scrub_all_uk_postcodes() {
            let source = at_word_boundaries(UK_POSTCODE);
            digest_material.push(format!("rule\x1f{source}"));
            text_rules.push(ScrubRule::compile(&source)?);
        }

        let date_scrubber = if options.effective_scrub_all_dates() {
            digest_material.push(format!(
                "dates\x1f{}",
                options.replace_all_dates_with.as_deref().unwrap_or("")
            ));
            Some(DateScrubber::new(options, &replacement)?)
        } else {
            None
        };

        let mut number_rules = Vec::new();
        for n in &options.scrub_all_numbers_of_n_digits {
            if *n == 0 {
                continue;
            }
            let source = at_numeric_boundaries(&format!(r"\d{{{n}}}"));
            digest_material.push(format!("rule\x1f{source}"));
            number_rules.push(ScrubRule::compile(&source)?);
        }
        for extra in &options.extra_regexes {
            digest_material.push(format!("rule\x1f{extra}"));
            number_rules.push(ScrubRule::compile(extra)?);
        }

        digest_material.sort_unstable();
        Ok(Self {
            denylist_plain,
            denylist_rules,
            text_rules,
            date_scrubber,
            number_rules,
            replacement,
            digest_material,
        })
    }

    /// Apply every nonspecific rule to `text`.
    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        if let Some(automaton) = &self.denylist_plain {
            current = self.apply_automaton(automaton, &current);
        }
        for rule in &self.denylist_rules {
            current = rule.apply(&current, &self.replacement);
        }
        for rule in &self.text_rules {
            current = rule.apply(&current, &self.replacement);
        }
        if let Some(dates) = &self.date_scrubber {
            current = dates.apply(&current);
        }
        for rule in &self.number_rules {
            current = rule.apply(&current, &self.replacement);
        }
        current
    }

    /// Sorted material contributing to scrubber digests: any change to the
    /// nonspecific rules re-fingerprints every patient.
    pub fn digest_material(&self) -> &[String] {
        &self.digest_material
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replace automaton matches that sit at word boundaries.
    fn apply_automaton(&self, automaton: &AhoCorasick, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in automaton.find_iter(text) {
            let boundary_left = m.start() == 0
                || !text[..m.start()]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_alphanumeric());
            let boundary_right = m.end() == text.len()
                || !text[m.end()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphanumeric());
            out.push_str(&text[last..m.start()]);
            if boundary_left && boundary_right {
                out.push_str(&self.replacement);
            } else {
                out.push_str(&text[m.start()..m.end()]);
            }
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ScrubOptions {
        ScrubOptions::default()
    }

    #[test]
    fn denylist_word_mode_respects_boundaries() {
        let ns = NonspecificScrubber::build(
            &options(),
            &["addenbrooke".to_string(), "ward".to_string()],
        )
        .unwrap();
        assert_eq!(
            ns.apply("seen on Ward 3 at Addenbrooke site; forward referral"),
            "seen on [~~~] 3 at [~~~] site; forward referral"
        );
    }

    #[test]
    fn denylist_regex_mode_uses_entries_verbatim() {
        let mut opts = options();
        opts.denylist_use_regex = Some(true);
        let ns = NonspecificScrubber::build(&opts, &[r"\bward\s+\d+\b".to_string()]).unwrap();
        assert_eq!(ns.apply("on ward 3 today"), "on [~~~] today");
    }

    #[test]
    fn denylist_phrase_mode_matches_whole_phrases() {
        let mut opts = options();
        opts.denylist_files_as_phrases = Some(true);
        let ns =
            NonspecificScrubber::build(&opts, &["fulbourn hospital".to_string()]).unwrap();
        assert_eq!(
            ns.apply("moved to Fulbourn  Hospital site"),
            "moved to [~~~] site"
        );
        assert_eq!(ns.apply("fulbourn road"), "fulbourn road");
    }

    #[test]
    fn emails_and_postcodes() {
        let mut opts = options();
        opts.scrub_all_email_addresses = Some(true);
        opts.scrub_all_uk_postcodes = Some(true);
        let ns = NonspecificScrubber::build(&opts, &[]).unwrap();
        assert_eq!(
            ns.apply("contact j.smith@example.org at CB2 0QQ"),
            "contact [~~~] at [~~~]"
        );
    }

    #[test]
    fn n_digit_numbers_at_numeric_boundaries() {
        let mut opts = options();
        opts.scrub_all_numbers_of_n_digits = vec![10];
        let ns = NonspecificScrubber::build(&opts, &[]).unwrap();
        assert_eq!(ns.apply("nhs 0123456789."), "nhs [~~~].");
        assert_eq!(
            ns.apply("serial 01234567891 stays"),
            "serial 01234567891 stays",
            "eleven digits is not a ten-digit number"
        );
    }

    #[test]
    fn dates_run_before_number_rules() {
        let mut opts = options();
        opts.scrub_all_dates = Some(true);
        opts.scrub_all_numbers_of_n_digits = vec![4];
        let ns = NonspecificScrubber::build(&opts, &[]).unwrap();
        // The year is consumed as part of its date, not as a bare 4-digit
        // number that would leave "2 Sep" behind.
        assert_eq!(
            ns.apply("seen 2 Sep 1990, pin 4321"),
            "seen [~~~], pin [~~~]"
        );
    }

    #[test]
    fn digest_material_is_sorted_and_complete() {
        let mut opts = options();
        opts.scrub_all_email_addresses = Some(true);
        let ns = NonspecificScrubber::build(&opts, &["zeta".into(), "alpha".into()]).unwrap();
        let material = ns.digest_material();
        let mut sorted = material.to_vec();
        sorted.sort_unstable();
        assert_eq!(material, sorted.as_slice());
        assert!(material.iter().any(|m| m.contains("alpha")));
        assert!(material.iter().any(|m| m.starts_with("rule\x1f")));
    }
}
