//! Destination DDL generation from the data dictionary.
//!
//! Every destination table gets the DD-declared columns plus the engine's
//! surface columns: a write timestamp on every table, a source-content hash
//! on hashed tables, and a TRID beside every research-ID column. Research-ID
//! and hash columns are sized to the configured digest widths.

use veil_core::constants::{SOURCE_HASH_COLUMN, TIMESTAMP_COLUMN, TRID_COLUMN};
use veil_core::dd::ColumnSpec;
use veil_core::hashing::HasherSet;
use veil_core::types::column::{IndexDirective, ScrubSourceRole, SourceDatatype};
use veil_core::DataDictionary;

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL type for a destination column: the DD's declared type, or one mapped
/// from the source datatype, or a digest-width CHAR for identifier columns.
fn column_type(spec: &ColumnSpec, hashers: &HasherSet) -> String {
    if spec.flags.primary_pid || spec.scrub_src == ScrubSourceRole::ThirdPartyXrefPid {
        return format!("CHAR({})", hashers.pid.digest_len());
    }
    if spec.flags.master_pid {
        return format!("CHAR({})", hashers.mpid.digest_len());
    }
    if !spec.dest_datatype.is_empty() {
        return spec.dest_datatype.clone();
    }
    match spec.src_datatype {
        SourceDatatype::Integer => "INTEGER".to_string(),
        SourceDatatype::Float => "REAL".to_string(),
        SourceDatatype::Blob => "BLOB".to_string(),
        SourceDatatype::Date | SourceDatatype::Text | SourceDatatype::Other => {
            "TEXT".to_string()
        }
    }
}

/// `CREATE TABLE` for one destination table.
pub fn create_table_sql(
    dd: &DataDictionary,
    dest_table: &str,
    hashers: &HasherSet,
) -> String {
    let columns = dd.dest_columns(dest_table);
    let mut defs: Vec<String> = Vec::new();
    let mut has_rid = false;
    for spec in &columns {
        let mut def = format!("{} {}", quote_ident(&spec.dest_field), column_type(spec, hashers));
        if spec.flags.pk {
            def.push_str(" PRIMARY KEY");
        }
        defs.push(def);
        if spec.flags.primary_pid {
            has_rid = true;
        }
    }
    if has_rid {
        defs.push(format!("{} INTEGER", quote_ident(TRID_COLUMN)));
    }
    if let Some((db, table)) = dd.src_for_dest(dest_table) {
        if dd.table_is_hashed(db, table) {
            defs.push(format!(
                "{} CHAR({})",
                quote_ident(SOURCE_HASH_COLUMN),
                hashers.rows.digest_len()
            ));
        }
    }
    defs.push(format!("{} TEXT NOT NULL", quote_ident(TIMESTAMP_COLUMN)));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(dest_table),
        defs.join(", ")
    )
}

pub fn drop_table_sql(dest_table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(dest_table))
}

/// Index statements for one destination table, honouring the DD directives.
/// The backend has no inline FULLTEXT; those columns get a normal index and
/// keep the directive in the plan for vendor backends.
pub fn index_sql(dd: &DataDictionary, dest_table: &str) -> Vec<String> {
    let mut statements = Vec::new();
    for spec in dd.dest_columns(dest_table) {
        let unique = match spec.index {
            IndexDirective::None => continue,
            IndexDirective::Unique => "UNIQUE ",
            IndexDirective::Normal | IndexDirective::FullText => "",
        };
        // PKs are already uniquely indexed by the table definition.
        if spec.flags.pk {
            continue;
        }
        statements.push(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            unique,
            quote_ident(&format!("idx_{}_{}", dest_table, spec.dest_field)),
            quote_ident(dest_table),
            quote_ident(&spec.dest_field),
        ));
    }
    statements
}

/// The ordered column list written for one destination table: DD columns,
/// then TRID (patient tables), then the source hash (hashed tables), then
/// the timestamp.
pub fn write_columns(dd: &DataDictionary, dest_table: &str) -> Vec<String> {
    let columns = dd.dest_columns(dest_table);
    let mut names: Vec<String> = columns.iter().map(|s| s.dest_field.clone()).collect();
    if columns.iter().any(|s| s.flags.primary_pid) {
        names.push(TRID_COLUMN.to_string());
    }
    if let Some((db, table)) = dd.src_for_dest(dest_table) {
        if dd.table_is_hashed(db, table) {
            names.push(SOURCE_HASH_COLUMN.to_string());
        }
    }
    names.push(TIMESTAMP_COLUMN.to_string());
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    use veil_core::hashing::{HashAlgorithm, HasherSet, KeyedHasher};
    use veil_core::FxHashMap;

    const HEADER: &str = "src_db\tsrc_table\tsrc_field\tsrc_datatype\tsrc_flags\tscrub_src\t\
        scrub_method\tdecision\tinclusion_values\texclusion_values\talter_method\t\
        dest_table\tdest_field\tdest_datatype\tindex\tindexlen\tcomment";

    fn hashers() -> HasherSet {
        HasherSet::new(
            KeyedHasher::new("pid", HashAlgorithm::HmacSha256, "a").unwrap(),
            KeyedHasher::new("mpid", HashAlgorithm::HmacSha512, "b").unwrap(),
            KeyedHasher::new("rows", HashAlgorithm::HmacMd5, "c").unwrap(),
            FxHashMap::default(),
        )
    }

    fn dd() -> DataDictionary {
        let text = format!(
            "{HEADER}\n\
             ephr\tnotes\tnote_id\tint\tKH\t\t\tinclude\t\t\t\t\t\t\t\t\t\n\
             ephr\tnotes\tpid\tint\tP*\tpatient\tnumber\tinclude\t\t\t\t\trid\t\t\t\t\n\
             ephr\tnotes\tnote\ttext\t\t\t\tinclude\t\t\tscrub\t\t\t\tfulltext\t\t"
        );
        DataDictionary::load_from_str(&text).unwrap()
    }

    #[test]
    fn create_table_adds_surface_columns() {
        let sql = create_table_sql(&dd(), "notes", &hashers());
        assert!(sql.contains("\"note_id\" INTEGER PRIMARY KEY"), "{sql}");
        assert!(sql.contains("\"rid\" CHAR(64)"), "{sql}");
        assert!(sql.contains("\"trid\" INTEGER"), "{sql}");
        assert!(sql.contains("\"_src_hash\" CHAR(32)"), "{sql}");
        assert!(sql.contains("\"_when_processed_utc\" TEXT NOT NULL"), "{sql}");
    }

    #[test]
    fn write_columns_order_matches_surface() {
        let names = write_columns(&dd(), "notes");
        assert_eq!(
            names,
            vec![
                "note_id".to_string(),
                "rid".to_string(),
                "note".to_string(),
                "trid".to_string(),
                "_src_hash".to_string(),
                "_when_processed_utc".to_string(),
            ]
        );
    }

    #[test]
    fn fulltext_downgrades_to_normal_index() {
        // The hashed PK is indexed by the table definition; the only
        // statement left is the fulltext column, downgraded to normal.
        let statements = index_sql(&dd(), "notes");
        assert_eq!(statements.len(), 1, "{statements:?}");
        assert!(statements[0].contains("\"idx_notes_note\""));
        assert!(!statements[0].contains("UNIQUE"));
    }

    #[test]
    fn drop_is_idempotent_sql() {
        assert_eq!(drop_table_sql("notes"), "DROP TABLE IF EXISTS \"notes\"");
    }
}
