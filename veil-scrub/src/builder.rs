//! Per-patient scrubber construction.
//!
//! Gathers the patient's identifying values from every scrub-source column
//! across every source database, expands third-party cross-references with a
//! worklist (bounded depth, visited set), filters the allowlist, compiles
//! the rule lists, and fingerprints the result.

use std::sync::Arc;

use veil_core::config::ScrubOptions;
use veil_core::errors::{RunError, ScrubError};
use veil_core::hashing::KeyedHasher;
use veil_core::traits::source::SourceDatabase;
use veil_core::types::column::{ScrubMethod, ScrubSourceRole};
use veil_core::{DataDictionary, FxHashMap, FxHashSet, Value};

use crate::dates::{date_value_pattern, parse_source_date};
use crate::nonspecific::NonspecificScrubber;
use crate::patterns::{
    code_pattern, number_pattern, phrase_pattern, phrase_unless_numeric_pattern, word_patterns,
};
use crate::scrubber::{ScrubRule, Scrubber};

/// Result of building a patient's scrubber.
pub enum BuiltScrubber {
    Ready(Scrubber),
    /// A `REQUIRED_SCRUBBER` column yielded nothing; the patient must be
    /// skipped for this run.
    MissingRequired { column: String },
}

/// Builds scrubbers; one instance per worker, shared inputs borrowed from
/// the run.
pub struct ScrubberBuilder<'a> {
    dd: &'a DataDictionary,
    options: &'a ScrubOptions,
    allowlist: &'a FxHashSet<String>,
    nonspecific: Arc<NonspecificScrubber>,
    digest_hasher: &'a KeyedHasher,
}

/// One gathered identifying value, tagged with how to compile it.
#[derive(Debug)]
struct GatheredValue {
    method: ScrubMethod,
    text: String,
}

impl<'a> ScrubberBuilder<'a> {
    pub fn new(
        dd: &'a DataDictionary,
        options: &'a ScrubOptions,
        allowlist: &'a FxHashSet<String>,
        nonspecific: Arc<NonspecificScrubber>,
        digest_hasher: &'a KeyedHasher,
    ) -> Self {
        Self {
            dd,
            options,
            allowlist,
            nonspecific,
            digest_hasher,
        }
    }

    /// Build the scrubber for one patient. `sources` maps database tags to
    /// this worker's open source connections.
    pub fn build_for_patient(
        &self,
        sources: &FxHashMap<String, Box<dyn SourceDatabase>>,
        pid: &Value,
    ) -> Result<BuiltScrubber, RunError> {
        let mut patient_values: Vec<GatheredValue> = Vec::new();
        let mut thirdparty_values: Vec<GatheredValue> = Vec::new();
        let mut required_missing: Option<String> = None;

        // Worklist of (pid, depth); depth 0 is the patient, deeper levels
        // are cross-referenced third parties. The visited set makes cycles
        // a non-issue.
        let max_depth = self.options.effective_thirdparty_xref_max_depth();
        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut worklist: Vec<(Value, u32)> = vec![(pid.clone(), 0)];
        if let Some(key) = pid.as_text() {
            visited.insert(key);
        }

        // Tag order is sorted so rule order (and with it, scrub output on
        // pathological overlaps) is identical from run to run.
        let mut tags: Vec<&String> = sources.keys().collect();
        tags.sort_unstable();

        while let Some((current_pid, depth)) = worklist.pop() {
            for tag in &tags {
                let source = &sources[tag.as_str()];
                for spec in self.dd.scrub_source_columns(tag) {
                    let Some(pid_col) = self.dd.primary_pid_column(tag, &spec.src_table) else {
                        tracing::warn!(
                            column = %spec.locator(),
                            "scrub-source column in a table without a primary PID; ignored"
                        );
                        continue;
                    };
                    let values = source
                        .distinct_nonnull_values(
                            &spec.src_table,
                            &spec.src_field,
                            &pid_col.src_field,
                            &current_pid,
                        )
                        .map_err(RunError::Storage)?;

                    let yielded = !values.is_empty();
                    match (spec.scrub_src, depth) {
                        (ScrubSourceRole::Patient, 0) => {
                            collect(&mut patient_values, spec.effective_scrub_method(), &values);
                        }
                        // A cross-referenced patient's own identifiers are
                        // third-party information here.
                        (ScrubSourceRole::Patient, _) => {
                            collect(
                                &mut thirdparty_values,
                                spec.effective_scrub_method(),
                                &values,
                            );
                        }
                        (ScrubSourceRole::ThirdParty, 0) => {
                            collect(
                                &mut thirdparty_values,
                                spec.effective_scrub_method(),
                                &values,
                            );
                        }
                        // Third parties of third parties are out of scope.
                        (ScrubSourceRole::ThirdParty, _) => {}
                        (ScrubSourceRole::ThirdPartyXrefPid, _) => {
                            if depth + 1 <= max_depth {
                                for value in &values {
                                    let Some(key) = value.as_text() else { continue };
                                    if visited.insert(key) {
                                        worklist.push((value.clone(), depth + 1));
                                    }
                                }
                            }
                        }
                        (ScrubSourceRole::None, _) => {}
                    }

                    if depth == 0
                        && spec.flags.required_scrubber
                        && !yielded
                        && required_missing.is_none()
                    {
                        required_missing = Some(spec.locator());
                    }
                }
            }
        }

        if let Some(column) = required_missing {
            return Ok(BuiltScrubber::MissingRequired { column });
        }

        let patient_rules = self.compile_rules(&patient_values)?;
        let thirdparty_rules = self.compile_rules(&thirdparty_values)?;
        let digest = self.digest(&patient_rules, &thirdparty_rules);

        Ok(BuiltScrubber::Ready(Scrubber::new(
            patient_rules,
            thirdparty_rules,
            Arc::clone(&self.nonspecific),
            self.options.effective_replace_patient_with().to_string(),
            self.options
                .effective_replace_third_party_with()
                .to_string(),
            self.options.effective_nonspecific_scrubber_first(),
            digest,
        )))
    }

    /// Compile gathered values into deduplicated rules, allowlist applied.
    fn compile_rules(&self, values: &[GatheredValue]) -> Result<Vec<ScrubRule>, ScrubError> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut rules = Vec::new();
        for gathered in values {
            for source in self.pattern_sources(gathered) {
                if seen.insert(source.clone()) {
                    rules.push(ScrubRule::compile(&source)?);
                }
            }
        }
        Ok(rules)
    }

    fn pattern_sources(&self, gathered: &GatheredValue) -> Vec<String> {
        let text = gathered.text.as_str();
        match gathered.method {
            ScrubMethod::Words => {
                let kept: Vec<&str> = text
                    .split_whitespace()
                    .filter(|token| !self.allowlist.contains(&token.to_lowercase()))
                    .collect();
                word_patterns(&kept.join(" "), self.options)
            }
            ScrubMethod::Phrase => {
                if self.allowlisted(text) {
                    return Vec::new();
                }
                phrase_pattern(text, self.options).into_iter().collect()
            }
            ScrubMethod::PhraseUnlessNumeric => {
                if self.allowlisted(text) {
                    return Vec::new();
                }
                phrase_unless_numeric_pattern(text, self.options)
                    .into_iter()
                    .collect()
            }
            ScrubMethod::Number => number_pattern(text, self.options).into_iter().collect(),
            ScrubMethod::Code => code_pattern(text, self.options).into_iter().collect(),
            ScrubMethod::Date => match parse_source_date(text) {
                Some(date) => vec![date_value_pattern(date, self.options)],
                None => {
                    tracing::debug!(value = %text, "scrub-source date did not parse; skipped");
                    Vec::new()
                }
            },
        }
    }

    fn allowlisted(&self, text: &str) -> bool {
        self.allowlist.contains(&text.trim().to_lowercase())
    }

    /// Keyed digest over the sorted canonical pattern material of all three
    /// rule groups.
    fn digest(&self, patient: &[ScrubRule], thirdparty: &[ScrubRule]) -> String {
        let mut lines: Vec<String> = Vec::new();
        for rule in patient {
            lines.push(format!(
                "p\x1f{}\x1f{}",
                rule.source(),
                self.options.effective_replace_patient_with()
            ));
        }
        for rule in thirdparty {
            lines.push(format!(
                "t\x1f{}\x1f{}",
                rule.source(),
                self.options.effective_replace_third_party_with()
            ));
        }
        for line in self.nonspecific.digest_material() {
            lines.push(format!("n\x1f{line}"));
        }
        lines.sort_unstable();
        self.digest_hasher.hash(&lines.join("\n"))
    }
}

fn collect(into: &mut Vec<GatheredValue>, method: ScrubMethod, values: &[Value]) {
    for value in values {
        if let Some(text) = value.as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                into.push(GatheredValue {
                    method,
                    text: trimmed.to_string(),
                });
            }
        }
    }
}
