//! End-to-end scrubber scenarios: word boundaries and suffixes, phrase
//! versus word methods, and date blurring, driven through the real builder
//! over an in-memory source database.

use std::sync::Arc;

use veil_core::config::ScrubOptions;
use veil_core::errors::StorageError;
use veil_core::hashing::{HashAlgorithm, KeyedHasher};
use veil_core::traits::source::{RowFilter, SourceDatabase, SourceRow};
use veil_core::{DataDictionary, FxHashMap, FxHashSet, Value};
use veil_scrub::builder::{BuiltScrubber, ScrubberBuilder};
use veil_scrub::nonspecific::NonspecificScrubber;
use veil_scrub::scrubber::Scrubber;

// ─── In-memory source double ───────────────────────────────────────────────

/// Table rows keyed by (table, column): pid text → distinct values.
struct MemorySource {
    tag: String,
    values: FxHashMap<(String, String, String), Vec<Value>>,
}

impl MemorySource {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            values: FxHashMap::default(),
        }
    }

    fn insert(&mut self, table: &str, column: &str, pid: &str, value: Value) {
        self.values
            .entry((table.to_string(), column.to_string(), pid.to_string()))
            .or_default()
            .push(value);
    }
}

impl SourceDatabase for MemorySource {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn fetch_rows<'a>(
        &'a self,
        _table: &str,
        _columns: &[String],
        _filter: RowFilter<'_>,
    ) -> Result<Box<dyn Iterator<Item = Result<SourceRow, StorageError>> + 'a>, StorageError>
    {
        Ok(Box::new(std::iter::empty()))
    }

    fn distinct_nonnull_values(
        &self,
        table: &str,
        column: &str,
        _pid_column: &str,
        pid: &Value,
    ) -> Result<Vec<Value>, StorageError> {
        let key = (
            table.to_string(),
            column.to_string(),
            pid.as_text().unwrap_or_default(),
        );
        Ok(self.values.get(&key).cloned().unwrap_or_default())
    }

    fn distinct_pids(
        &self,
        _table: &str,
        _pid_column: &str,
    ) -> Result<Vec<Value>, StorageError> {
        Ok(Vec::new())
    }

    fn integer_pk_range(
        &self,
        _table: &str,
        _pk_column: &str,
    ) -> Result<Option<(i64, i64)>, StorageError> {
        Ok(None)
    }
}

// ─── Fixture ───────────────────────────────────────────────────────────────

const DD: &str = "src_db\tsrc_table\tsrc_field\tsrc_datatype\tsrc_flags\tscrub_src\tscrub_method\t\
    decision\tinclusion_values\texclusion_values\talter_method\tdest_table\tdest_field\t\
    dest_datatype\tindex\tindexlen\tcomment\n\
    ephr\tpatients\tpid\tint\tKP*\tpatient\tnumber\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tpatients\tforename\ttext\t\tpatient\twords\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tpatients\tsurname\ttext\t\tpatient\twords\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tpatients\taddress\ttext\t\tpatient\tphrase\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tpatients\tlandmark\ttext\t\tpatient\twords\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tpatients\tspouse\ttext\t\tthirdparty\twords\tomit\t\t\t\t\t\t\t\t\t";

fn build_scrubber(
    options: &ScrubOptions,
    fill: impl FnOnce(&mut MemorySource),
) -> Scrubber {
    let dd = DataDictionary::load_from_str(DD).unwrap();
    let mut source = MemorySource::new("ephr");
    fill(&mut source);

    let mut sources: FxHashMap<String, Box<dyn SourceDatabase>> = FxHashMap::default();
    sources.insert("ephr".to_string(), Box::new(source));

    let allowlist = FxHashSet::default();
    let nonspecific = Arc::new(NonspecificScrubber::build(options, &[]).unwrap());
    let digest_hasher = KeyedHasher::new("rows", HashAlgorithm::HmacMd5, "digest-key").unwrap();
    let builder = ScrubberBuilder::new(&dd, options, &allowlist, nonspecific, &digest_hasher);

    match builder
        .build_for_patient(&sources, &Value::Integer(1))
        .unwrap()
    {
        BuiltScrubber::Ready(scrubber) => scrubber,
        BuiltScrubber::MissingRequired { column } => {
            panic!("unexpected missing required scrubber: {column}")
        }
    }
}

// ─── S1: word scrub with boundaries ────────────────────────────────────────

#[test]
fn word_scrub_honours_boundaries_and_suffixes() {
    let mut options = ScrubOptions::default();
    options.scrub_string_suffixes = vec!["s".to_string()];
    options.anonymise_strings_at_word_boundaries_only = Some(true);

    let scrubber = build_scrubber(&options, |source| {
        source.insert("patients", "forename", "1", Value::Text("John".into()));
        source.insert("patients", "surname", "1", Value::Text("Smith".into()));
        source.insert("patients", "spouse", "1", Value::Text("Jane".into()));
    });

    assert_eq!(
        scrubber.scrub("I saw John and Johnson in clinic with Jane; the Smiths arrived."),
        "I saw [__PPP__] and Johnson in clinic with [__TTT__]; the [__PPP__] arrived."
    );
}

// ─── S2: phrase vs words ───────────────────────────────────────────────────

#[test]
fn phrase_replaces_wholly_while_words_replace_tokens() {
    let options = ScrubOptions::default();
    let scrubber = build_scrubber(&options, |source| {
        source.insert(
            "patients",
            "address",
            "1",
            Value::Text("5 Tree Avenue".into()),
        );
        source.insert("patients", "landmark", "1", Value::Text("Oak".into()));
    });

    let out = scrubber.scrub("at 5 Tree Avenue near the oak");
    assert_eq!(out, "at [__PPP__] near the [__PPP__]");

    // The phrase's component words alone are not scrubbed.
    let partial = scrubber.scrub("a tree on the avenue");
    assert_eq!(partial, "a tree on the avenue");
}

// ─── S3: date blurring ─────────────────────────────────────────────────────

#[test]
fn all_dates_blur_to_month_and_year() {
    let mut options = ScrubOptions::default();
    options.scrub_all_dates = Some(true);
    options.replace_all_dates_with = Some("[%b %Y]".to_string());

    let scrubber = build_scrubber(&options, |_| {});
    assert_eq!(
        scrubber.scrub("Seen on 2 Sep 1990 and 03.09.1990."),
        "Seen on [Sep 1990] and [Sep 1990]."
    );
}

// ─── Third-party isolation ─────────────────────────────────────────────────

#[test]
fn another_patients_details_are_untouched() {
    let options = ScrubOptions::default();
    let scrubber = build_scrubber(&options, |source| {
        source.insert("patients", "surname", "1", Value::Text("Smith".into()));
        // Patient 2 exists in the source but is not cross-referenced.
        source.insert("patients", "surname", "2", Value::Text("Jones".into()));
    });

    assert_eq!(
        scrubber.scrub("Smith discussed Jones"),
        "[__PPP__] discussed Jones"
    );
}

// ─── Digest stability ──────────────────────────────────────────────────────

#[test]
fn digest_changes_when_an_alias_is_added() {
    let options = ScrubOptions::default();
    let before = build_scrubber(&options, |source| {
        source.insert("patients", "forename", "1", Value::Text("John".into()));
    });
    let same = build_scrubber(&options, |source| {
        source.insert("patients", "forename", "1", Value::Text("John".into()));
    });
    let after = build_scrubber(&options, |source| {
        source.insert("patients", "forename", "1", Value::Text("John".into()));
        source.insert("patients", "forename", "1", Value::Text("Jono".into()));
    });

    assert_eq!(before.digest(), same.digest());
    assert_ne!(before.digest(), after.digest());
}
