//! Phase 1: parse dictionary text into `ColumnSpec`s.
//!
//! One header row (case-insensitive names, arbitrary order), tab- or
//! comma-separated (sniffed from the header line). Blank lines and lines
//! whose first cell starts with `#` are ignored. Cells are not quoted; a
//! dictionary whose literals contain the delimiter should be exported with
//! the other one.

use crate::errors::ConfigError;
use crate::types::collections::FxHashMap;
use crate::types::column::{
    AlterMethod, ColumnFlags, Decision, IndexDirective, ScrubMethod, ScrubSourceRole,
    SourceDatatype,
};

use super::column_spec::ColumnSpec;

/// Recognised header names. `indexlen` and `comment` are optional.
const REQUIRED_HEADERS: &[&str] = &[
    "src_db",
    "src_table",
    "src_field",
    "src_datatype",
    "src_flags",
    "scrub_src",
    "scrub_method",
    "decision",
    "inclusion_values",
    "exclusion_values",
    "alter_method",
    "dest_table",
    "dest_field",
    "dest_datatype",
    "index",
];

pub fn parse_dictionary(text: &str) -> Result<Vec<ColumnSpec>, ConfigError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header_line) = lines.next().ok_or_else(|| ConfigError::Parse {
        message: "data dictionary is empty".to_string(),
    })?;
    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };

    let headers: FxHashMap<String, usize> = header_line
        .split(delimiter)
        .enumerate()
        .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
        .collect();
    for required in REQUIRED_HEADERS {
        if !headers.contains_key(*required) {
            return Err(ConfigError::MissingHeader {
                header: (*required).to_string(),
            });
        }
    }

    let mut specs = Vec::new();
    for (line_no, line) in lines {
        let cells: Vec<&str> = line.split(delimiter).map(str::trim).collect();
        if cells.first().is_some_and(|c| c.starts_with('#')) {
            continue;
        }
        specs.push(parse_row(&headers, &cells).map_err(|e| e.at_line(line_no))?);
    }
    Ok(specs)
}

fn parse_row(
    headers: &FxHashMap<String, usize>,
    cells: &[&str],
) -> Result<ColumnSpec, ConfigError> {
    let cell = |name: &str| -> &str {
        headers
            .get(name)
            .and_then(|&i| cells.get(i).copied())
            .unwrap_or("")
    };

    let src_table = cell("src_table").to_string();
    let src_field = cell("src_field").to_string();

    // Empty destination cells default to the source names.
    let dest_table = non_empty_or(cell("dest_table"), &src_table);
    let dest_field = non_empty_or(cell("dest_field"), &src_field);

    let index_len = match cell("indexlen") {
        "" => None,
        raw => Some(raw.parse::<u32>().map_err(|_| ConfigError::UnknownToken {
            cell: "indexlen".to_string(),
            token: raw.to_string(),
        })?),
    };

    let mut spec = ColumnSpec {
        src_db: cell("src_db").to_string(),
        src_table,
        src_field,
        src_datatype: SourceDatatype::parse(cell("src_datatype"))?,
        flags: ColumnFlags::parse(cell("src_flags"))?,
        scrub_src: ScrubSourceRole::parse(cell("scrub_src"))?,
        scrub_method: ScrubMethod::parse(cell("scrub_method"))?,
        decision: Decision::parse(cell("decision"))?,
        inclusion_values: parse_value_set(cell("inclusion_values")),
        exclusion_values: parse_value_set(cell("exclusion_values")),
        alter: AlterMethod::parse_list(cell("alter_method"))?,
        dest_table,
        dest_field,
        dest_datatype: cell("dest_datatype").to_string(),
        index: IndexDirective::parse(cell("index"))?,
        index_len,
        comment: cell("comment").to_string(),
    };

    // A source-hashed or constant PK must be uniquely indexed at the
    // destination; the flag forces it regardless of the index cell.
    if spec.flags.hashed() {
        spec.index = IndexDirective::Unique;
    }
    Ok(spec)
}

fn non_empty_or(cell: &str, fallback: &str) -> String {
    if cell.is_empty() {
        fallback.to_string()
    } else {
        cell.to_string()
    }
}

fn parse_value_set(cell: &str) -> Option<Vec<String>> {
    if cell.is_empty() {
        return None;
    }
    Some(
        cell.split(';')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "src_db\tsrc_table\tsrc_field\tsrc_datatype\tsrc_flags\tscrub_src\t\
        scrub_method\tdecision\tinclusion_values\texclusion_values\talter_method\t\
        dest_table\tdest_field\tdest_datatype\tindex\tindexlen\tcomment";

    #[test]
    fn parses_a_minimal_row() {
        let text = format!(
            "{HEADER}\n\
             ephr\tnotes\tnote_id\tint\tKH\t\t\tinclude\t\t\t\t\t\tINT\t\t\t\n\
             \n\
             # a comment line\n\
             ephr\tnotes\tnote\ttext\t\t\t\tinclude\t\t\tscrub\t\t\tTEXT\t\t\t"
        );
        let specs = parse_dictionary(&text).unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].flags.pk);
        assert!(specs[0].flags.add_source_hash);
        // Hashed PK forces a unique destination index.
        assert_eq!(specs[0].index, IndexDirective::Unique);
        // Empty dest cells default to source names.
        assert_eq!(specs[0].dest_table, "notes");
        assert_eq!(specs[0].dest_field, "note_id");
        assert!(specs[1].scrubbed());
    }

    #[test]
    fn header_names_are_case_insensitive_and_reorderable() {
        let text = "SRC_FIELD,src_table,src_db,Src_Datatype,src_flags,scrub_src,scrub_method,\
                    decision,inclusion_values,exclusion_values,alter_method,dest_table,\
                    dest_field,dest_datatype,index\n\
                    pid,patients,ephr,int,KP,patient,number,include,,,,,,INT,";
        let specs = parse_dictionary(text).unwrap();
        assert_eq!(specs[0].src_db, "ephr");
        assert_eq!(specs[0].src_field, "pid");
        assert!(specs[0].flags.primary_pid);
    }

    #[test]
    fn missing_header_fails() {
        let text = "src_db,src_table,src_field\nephr,notes,note";
        assert!(matches!(
            parse_dictionary(text),
            Err(ConfigError::MissingHeader { .. })
        ));
    }

    #[test]
    fn unknown_token_reports_line() {
        let text = format!("{HEADER}\nephr\tnotes\tn\ttext\tZ\t\t\tinclude\t\t\t\t\t\t\t\t\t");
        match parse_dictionary(&text) {
            Err(ConfigError::Dictionary { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected dictionary error, got {other:?}"),
        }
    }

    #[test]
    fn value_sets_split_on_semicolons() {
        let text = format!(
            "{HEADER}\nephr\tnotes\tstatus\ttext\t\t\t\tinclude\tfinal;amended\t\t\t\t\tTEXT\t\t\t"
        );
        let specs = parse_dictionary(&text).unwrap();
        assert_eq!(
            specs[0].inclusion_values,
            Some(vec!["final".to_string(), "amended".to_string()])
        );
    }
}
