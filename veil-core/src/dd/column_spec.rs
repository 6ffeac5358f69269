//! One data-dictionary entry.

use crate::types::column::{
    AlterMethod, ColumnFlags, Decision, IndexDirective, ScrubMethod, ScrubSourceRole,
    SourceDatatype,
};
use crate::types::value::Value;

/// How one source column is treated, end to end.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub src_db: String,
    pub src_table: String,
    pub src_field: String,
    pub src_datatype: SourceDatatype,
    pub flags: ColumnFlags,
    pub scrub_src: ScrubSourceRole,
    pub scrub_method: Option<ScrubMethod>,
    pub decision: Decision,
    pub inclusion_values: Option<Vec<String>>,
    pub exclusion_values: Option<Vec<String>>,
    pub alter: Vec<AlterMethod>,
    pub dest_table: String,
    pub dest_field: String,
    pub dest_datatype: String,
    pub index: IndexDirective,
    pub index_len: Option<u32>,
    pub comment: String,
}

impl ColumnSpec {
    pub fn included(&self) -> bool {
        self.decision.include()
    }

    /// The scrub method, with the blank-cell default applied.
    pub fn effective_scrub_method(&self) -> ScrubMethod {
        self.scrub_method
            .unwrap_or_else(|| ScrubMethod::default_for(self.src_datatype))
    }

    /// Whether this column's free text passes through the patient's
    /// scrubber.
    pub fn scrubbed(&self) -> bool {
        self.alter.contains(&AlterMethod::Scrub)
    }

    /// Row filter: inclusion/exclusion literal sets, evaluated on the raw
    /// source value before any alter method. A row failing the filter on any
    /// column is dropped entirely.
    pub fn passes_filters(&self, value: &Value) -> bool {
        let text = value.as_text();
        if let Some(inclusion) = &self.inclusion_values {
            match &text {
                Some(t) if inclusion.iter().any(|v| v == t) => {}
                _ => return false,
            }
        }
        if let Some(exclusion) = &self.exclusion_values {
            if let Some(t) = &text {
                if exclusion.iter().any(|v| v == t) {
                    return false;
                }
            }
        }
        true
    }

    /// Locator string for error messages.
    pub fn locator(&self) -> String {
        format!("{}.{}.{}", self.src_db, self.src_table, self.src_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ColumnSpec {
        ColumnSpec {
            src_db: "ephr".into(),
            src_table: "notes".into(),
            src_field: "note".into(),
            src_datatype: SourceDatatype::Text,
            flags: ColumnFlags::default(),
            scrub_src: ScrubSourceRole::None,
            scrub_method: None,
            decision: Decision::Include,
            inclusion_values: None,
            exclusion_values: None,
            alter: vec![AlterMethod::Scrub],
            dest_table: "notes".into(),
            dest_field: "note".into(),
            dest_datatype: "TEXT".into(),
            index: IndexDirective::None,
            index_len: None,
            comment: String::new(),
        }
    }

    #[test]
    fn filters_apply_to_raw_values() {
        let mut s = spec();
        s.inclusion_values = Some(vec!["final".into()]);
        assert!(s.passes_filters(&Value::Text("final".into())));
        assert!(!s.passes_filters(&Value::Text("draft".into())));
        assert!(!s.passes_filters(&Value::Null));

        let mut s = spec();
        s.exclusion_values = Some(vec!["draft".into()]);
        assert!(s.passes_filters(&Value::Text("final".into())));
        assert!(s.passes_filters(&Value::Null));
        assert!(!s.passes_filters(&Value::Text("draft".into())));
    }

    #[test]
    fn scrubbed_follows_alter_list() {
        assert!(spec().scrubbed());
        let mut s = spec();
        s.alter.clear();
        assert!(!s.scrubbed());
    }
}
