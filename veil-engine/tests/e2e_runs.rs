//! End-to-end run scenarios over real SQLite source/destination/admin
//! databases: incremental no-op, scrubber-change rewrite, opt-out
//! propagation, and the required-scrubber skip.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;

use veil_core::config::VeilConfig;
use veil_core::events::CountingEventHandler;
use veil_core::traits::admin::AdminStore;
use veil_core::traits::extractor::PlainTextExtractor;
use veil_core::DataDictionary;
use veil_engine::{Orchestrator, RunMode};
use veil_storage::{AdminStoreEngine, SqliteDatabases};

const DD: &str = "src_db\tsrc_table\tsrc_field\tsrc_datatype\tsrc_flags\tscrub_src\tscrub_method\t\
    decision\tinclusion_values\texclusion_values\talter_method\tdest_table\tdest_field\t\
    dest_datatype\tindex\tindexlen\tcomment\n\
    ephr\tpatients\tpid\tint\tKP*\tpatient\tnumber\tinclude\t\t\t\tpatients\trid\t\t\t\t\n\
    ephr\tpatients\tmpid\tint\tM\t\t\tinclude\t\t\t\tpatients\tmrid\t\t\t\t\n\
    ephr\tpatients\tforename\ttext\t\tpatient\twords\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tpatients\tsurname\ttext\tR\tpatient\twords\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tpatients\tnickname\ttext\t\tpatient\twords\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tpatients\twithdrawn\ttext\t!\t\t\tomit\t\t\t\t\t\t\t\t\t\n\
    ephr\tnotes\tnote_id\tint\tKH\t\t\tinclude\t\t\t\tnotes\tnote_id\t\t\t\t\n\
    ephr\tnotes\tpid\tint\tP\tpatient\tnumber\tinclude\t\t\t\tnotes\trid\t\t\t\t\n\
    ephr\tnotes\tnote\ttext\t\t\t\tinclude\t\t\tscrub\tnotes\tnote\t\tnormal\t\t";

struct Fixture {
    _dir: tempfile::TempDir,
    source_path: PathBuf,
    dest_path: PathBuf,
    admin_path: PathBuf,
    optout_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("source.db");
        let dest_path = dir.path().join("dest.db");
        let admin_path = dir.path().join("admin.db");
        let optout_path = dir.path().join("optout_pids.txt");

        let conn = Connection::open(&source_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE patients (
                 pid INTEGER PRIMARY KEY, mpid INTEGER,
                 forename TEXT, surname TEXT, nickname TEXT, withdrawn TEXT
             );
             CREATE TABLE notes (note_id INTEGER PRIMARY KEY, pid INTEGER, note TEXT);

             INSERT INTO patients VALUES (1, 101, 'John', 'Smith', NULL, NULL);
             INSERT INTO patients VALUES (2, 102, 'Anna', NULL, NULL, NULL);
             INSERT INTO patients VALUES (3, 103, 'Carl', 'Moss', NULL, '1');

             INSERT INTO notes VALUES (1, 1, 'John attended; Jono was mentioned');
             INSERT INTO notes VALUES (2, 1, 'Routine follow-up');
             INSERT INTO notes VALUES (3, 2, 'Anna seen');
             INSERT INTO notes VALUES (4, 3, 'Carl here');",
        )
        .unwrap();

        Self {
            _dir: dir,
            source_path,
            dest_path,
            admin_path,
            optout_path,
        }
    }

    fn config(&self, with_optout_file: bool) -> VeilConfig {
        let optout_files = if with_optout_file {
            format!("optout_pid_filenames = [{:?}]", self.optout_path.display().to_string())
        } else {
            String::new()
        };
        let toml = format!(
            r#"
            [databases]
            destination_database = {dest:?}
            admin_database = {admin:?}

            [[databases.source_databases]]
            tag = "ephr"
            path = {src:?}

            [hashers.pid]
            algorithm = "hmac_sha256"
            key = "pid-key"

            [hashers.mpid]
            algorithm = "hmac_sha256"
            key = "mpid-key"

            [hashers.rows]
            algorithm = "hmac_md5"
            key = "rows-key"

            [scrub]
            scrub_string_suffixes = ["s"]

            [optout]
            optout_col_values = ["1"]
            {optout_files}

            [run]
            workers = 2
            "#,
            dest = self.dest_path.display().to_string(),
            admin = self.admin_path.display().to_string(),
            src = self.source_path.display().to_string(),
        );
        VeilConfig::from_toml_str(&toml).unwrap()
    }

    fn run(&self, mode: RunMode, with_optout_file: bool) -> (Arc<CountingEventHandler>, Arc<AdminStoreEngine>) {
        let config = self.config(with_optout_file);
        let dd = Arc::new(DataDictionary::load_from_str(DD).unwrap());
        let hashers = config.build_hashers().unwrap();
        let admin = Arc::new(
            AdminStoreEngine::open(
                &self.admin_path,
                Duration::from_millis(500),
                hashers.pid.clone(),
            )
            .unwrap(),
        );
        let databases = Arc::new(SqliteDatabases::new(
            &config.databases,
            Duration::from_millis(500),
        ));
        let events = Arc::new(CountingEventHandler::new());

        let orchestrator = Orchestrator::new(
            config,
            dd,
            databases,
            Arc::clone(&admin) as Arc<dyn AdminStore>,
            Arc::new(PlainTextExtractor),
            Arc::clone(&events) as _,
        );
        orchestrator.run(mode).unwrap();
        (events, admin)
    }

    fn update_source(&self, sql: &str) {
        Connection::open(&self.source_path)
            .unwrap()
            .execute_batch(sql)
            .unwrap();
    }

    fn dest(&self) -> Connection {
        Connection::open(&self.dest_path).unwrap()
    }

    fn rid_of(&self, admin: &AdminStoreEngine, pid: &str) -> String {
        admin.get_or_create_rid(pid).unwrap().rid
    }
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> i64 {
    conn.query_row(sql, params, |row| row.get(0)).unwrap()
}

fn read_note(fixture: &Fixture, note_id: i64) -> String {
    fixture
        .dest()
        .query_row(
            "SELECT note FROM notes WHERE note_id = ?1",
            [note_id],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn full_then_incremental_run_lifecycle() {
    let fixture = Fixture::new();

    // ── Run 1: full. ──
    let (events, admin) = fixture.run(RunMode::Full, false);

    // Patient 1 written and scrubbed; patient 2 skipped (surname NULL is a
    // required scrubber source); patient 3 opted out via the marker column.
    assert_eq!(events.writes_to("notes"), 2);
    assert_eq!(events.patients_skipped(), 1);
    assert_eq!(events.opt_outs(), 1);
    assert!(admin.opted_out("3", None).unwrap());

    let rid1 = fixture.rid_of(&admin, "1");
    assert_eq!(rid1.len(), 64, "RID width follows the digest length");
    let note = read_note(&fixture, 1);
    assert!(!note.contains("John"), "patient name scrubbed: {note}");
    assert!(note.contains("[__PPP__]"));
    assert!(note.contains("Jono"), "not yet an alias: {note}");

    // MRID recorded from the master patient ID column.
    let ids = admin.get_or_create_rid("1").unwrap();
    assert!(ids.mrid.is_some());

    // TRIDs are dense across the three patients.
    let mut trids: Vec<i64> = ["1", "2", "3"]
        .iter()
        .map(|pid| admin.get_or_create_rid(pid).unwrap().trid)
        .collect();
    trids.sort_unstable();
    assert_eq!(trids, vec![1, 2, 3]);

    // ── Run 2: incremental, nothing changed (S4). ──
    let (events, _) = fixture.run(RunMode::Incremental, false);
    assert_eq!(
        events.writes_to("notes"),
        0,
        "unchanged hashed rows are skipped"
    );
    assert!(events.rows_skipped() >= 2);

    // ── Run 3: patient 2's surname arrives (S7). ──
    fixture.update_source("UPDATE patients SET surname = 'Jones' WHERE pid = 2");
    let (events, admin2) = fixture.run(RunMode::Incremental, false);
    assert_eq!(events.patients_skipped(), 0);
    assert_eq!(events.writes_to("notes"), 1, "only patient 2's note");
    let rid2 = fixture.rid_of(&admin2, "2");
    assert_eq!(
        count(
            &fixture.dest(),
            "SELECT COUNT(*) FROM notes WHERE rid = ?1",
            rusqlite::params![rid2],
        ),
        1
    );

    // ── Run 4: a new alias forces a rewrite (S5). ──
    fixture.update_source("UPDATE patients SET nickname = 'Jono' WHERE pid = 1");
    let (events, _) = fixture.run(RunMode::Incremental, false);
    assert_eq!(
        events.writes_to("notes"),
        2,
        "all of patient 1's rows rewritten on scrubber change"
    );
    let note = read_note(&fixture, 1);
    assert!(
        !note.contains("Jono"),
        "new alias scrubbed after rewrite: {note}"
    );

    // ── Run 5: opt-out file appears (S6). ──
    std::fs::write(&fixture.optout_path, "1\n").unwrap();
    let (events, admin) = fixture.run(RunMode::Incremental, true);
    // Patient 1 newly withdrawn; patient 3's standing column opt-out fires
    // again (idempotently) every run.
    assert_eq!(events.opt_outs(), 2);
    assert!(admin.opted_out("1", None).unwrap());
    let rid1 = fixture.rid_of(&admin, "1");
    let dest = fixture.dest();
    assert_eq!(
        count(
            &dest,
            "SELECT COUNT(*) FROM notes WHERE rid = ?1",
            rusqlite::params![rid1],
        ),
        0,
        "opted-out patient's note rows deleted"
    );
    assert_eq!(
        count(
            &dest,
            "SELECT COUNT(*) FROM patients WHERE rid = ?1",
            rusqlite::params![rid1],
        ),
        0,
        "opted-out patient's demographic row deleted"
    );
    drop(dest);

    // ── Run 6: opt-outs are standing; nothing comes back. ──
    let (events, _) = fixture.run(RunMode::Incremental, true);
    assert_eq!(
        count(
            &fixture.dest(),
            "SELECT COUNT(*) FROM notes WHERE rid = ?1",
            rusqlite::params![rid1],
        ),
        0
    );
    assert!(events.writes_to("notes") <= 1, "only patient 2 may rewrite");
}

#[test]
fn source_row_deletion_reconciles() {
    let fixture = Fixture::new();
    let (_, _) = fixture.run(RunMode::Full, false);
    assert_eq!(count(&fixture.dest(), "SELECT COUNT(*) FROM notes", []), 2);

    fixture.update_source("DELETE FROM notes WHERE note_id = 2");
    let (events, _) = fixture.run(RunMode::Incremental, false);
    assert!(events.rows_deleted() >= 1);
    assert_eq!(
        count(&fixture.dest(), "SELECT COUNT(*) FROM notes WHERE note_id = 2", []),
        0,
        "vanished source row deleted from the destination"
    );
    assert_eq!(count(&fixture.dest(), "SELECT COUNT(*) FROM notes", []), 1);
}

#[test]
fn full_rebuild_keeps_research_ids_stable() {
    let fixture = Fixture::new();
    let (_, admin) = fixture.run(RunMode::Full, false);
    let rid_before = fixture.rid_of(&admin, "1");
    let trid_before = admin.get_or_create_rid("1").unwrap().trid;
    drop(admin);

    let (_, admin) = fixture.run(RunMode::Full, false);
    assert_eq!(fixture.rid_of(&admin, "1"), rid_before);
    assert_eq!(admin.get_or_create_rid("1").unwrap().trid, trid_before);
}

#[test]
fn destination_carries_surface_columns() {
    let fixture = Fixture::new();
    let (_, _) = fixture.run(RunMode::Full, false);
    let dest = fixture.dest();

    let mut stmt = dest.prepare("PRAGMA table_info(notes)").unwrap();
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get(1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    for expected in ["note_id", "rid", "note", "trid", "_src_hash", "_when_processed_utc"] {
        assert!(columns.iter().any(|c| c == expected), "missing {expected}");
    }

    // Hash column fixed-width and populated.
    let hash: String = dest
        .query_row("SELECT _src_hash FROM notes WHERE note_id = 1", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(hash.len(), 32);
}
