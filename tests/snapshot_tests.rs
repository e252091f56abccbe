// Snapshot committer tests: results.csv layout and git history

use chrono::{TimeZone, Utc};
use stockpiler::models::{BackupOutcome, DeviceResult, ExtraValue, FleetRun, REPORT_COLUMNS, TransportKind};
use stockpiler::snapshot::report::{report_columns, write_report_to};
use stockpiler::snapshot::{commit_message, commit_snapshot, git};

fn outcome(name: &str, ip: &str) -> BackupOutcome {
    BackupOutcome::new(format!("{}_backup", name), ip, name)
}

fn sample_run() -> FleetRun {
    let mut ok = outcome("a", "10.0.0.1");
    ok.ssh_port_check_ok = true;
    ok.record_backup(TransportKind::Ssh, "hostname a\n".into());
    ok.record_save_config();
    ok.mark_persisted(Utc::now());
    ok.extra.insert("site".into(), ExtraValue::Text("dc1".into()));

    let mut failed = outcome("b", "10.0.0.2");
    failed.extra.insert("rack".into(), ExtraValue::Int(12));
    failed.extra.insert("managed".into(), ExtraValue::Bool(true));

    let mut builder = FleetRun::begin();
    builder.insert("a", DeviceResult::Outcome(ok));
    builder.insert("b", DeviceResult::Outcome(failed));
    builder.insert(
        "c",
        DeviceResult::Crashed {
            error: "task panicked".into(),
        },
    );
    builder.finish()
}

fn render(run: &FleetRun) -> (usize, String) {
    let mut buf = Vec::new();
    let rows = write_report_to(&mut buf, run).unwrap();
    (rows, String::from_utf8(buf).unwrap())
}

#[test]
fn test_report_columns_fixed_then_sorted_extras() {
    let columns = report_columns(&sample_run());
    assert_eq!(&columns[..REPORT_COLUMNS.len()], &REPORT_COLUMNS.map(String::from)[..]);
    assert_eq!(&columns[REPORT_COLUMNS.len()..], &["managed", "rack", "site"]);
}

#[test]
fn test_report_rows_include_failures_and_skip_crashes() {
    let (rows, text) = render(&sample_run());
    assert_eq!(rows, 2);

    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);

    let a = &records[0];
    assert_eq!(&a[0], "10.0.0.1");
    assert_eq!(&a[1], "a");
    assert_eq!(&a[7], "True"); // backup_successful
    assert_eq!(&a[8], "True"); // save_config_successful
    assert_eq!(&a[10], "True"); // ssh_used
    assert!(a[12].ends_with('Z'), "last_successful_backup is UTC ISO-8601");
    assert_eq!(&a[15], "dc1");
    assert_eq!(&a[13], "", "absent extension values are empty cells");

    let b = &records[1];
    assert_eq!(&b[7], "False");
    assert_eq!(&b[12], "");
    assert_eq!(&b[13], "True");
    assert_eq!(&b[14], "12");
}

#[test]
fn test_report_empty_run_has_header_only() {
    let run = FleetRun::begin().finish();
    let (rows, text) = render(&run);
    assert_eq!(rows, 0);
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("ip,hostname,http_management,"));
}

#[test]
fn test_commit_message_format() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
    assert_eq!(
        commit_message("Stockpile Built at", &at),
        "Stockpile Built at 2024-03-01T12:30:00.000000Z"
    );
}

#[test]
fn test_commit_snapshot_initializes_repository() {
    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path().join("stockpile");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("a.txt"), "hostname a\n").unwrap();

    let oid = commit_snapshot(&out, "Stockpile Built at", &sample_run()).unwrap();

    let repo = git2::Repository::open(&out).unwrap();
    let commit = repo.find_commit(oid).unwrap();
    assert!(commit.message().unwrap().starts_with("Stockpile Built at "));
    assert_eq!(commit.author().name(), Some(git::AUTHOR_NAME));
    assert_eq!(commit.author().email(), Some(git::AUTHOR_EMAIL));
    let tree = commit.tree().unwrap();
    assert!(tree.get_name("a.txt").is_some());
    assert!(tree.get_name("results.csv").is_some());
}

#[test]
fn test_commit_snapshot_creates_missing_directory() {
    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path().join("fresh");

    commit_snapshot(&out, "Stockpile Built at", &FleetRun::begin().finish()).unwrap();

    assert!(out.join(".git").is_dir());
    assert!(out.join("results.csv").is_file());
}

#[test]
fn test_commit_snapshot_records_deletions_and_empty_changes() {
    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path();
    std::fs::write(out.join("old.txt"), "gone soon\n").unwrap();
    let run = FleetRun::begin().finish();
    commit_snapshot(out, "Stockpile Built at", &run).unwrap();

    std::fs::remove_file(out.join("old.txt")).unwrap();
    let second = commit_snapshot(out, "Stockpile Built at", &run).unwrap();
    // Same content again: still a new commit.
    let third = commit_snapshot(out, "Stockpile Built at", &run).unwrap();

    let repo = git2::Repository::open(out).unwrap();
    let second = repo.find_commit(second).unwrap();
    assert!(second.tree().unwrap().get_name("old.txt").is_none());
    let third = repo.find_commit(third).unwrap();
    assert_eq!(third.parent_id(0).unwrap(), second.id());
}

#[test]
fn test_open_or_init_reuses_existing_repository() {
    let dir = tempfile::TempDir::new().unwrap();
    git2::Repository::init(dir.path()).unwrap();
    std::fs::write(dir.path().join("keep.txt"), "x").unwrap();

    let repo = git::open_or_init(dir.path()).unwrap();
    git::stage_all(&repo).unwrap();
    git::commit(&repo, "first").unwrap();

    let again = git::open_or_init(dir.path()).unwrap();
    let head = again.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.message(), Some("first"));
}
