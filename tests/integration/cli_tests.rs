use super::common::write_file;
use clap::Parser;
use dupindex::cli::Cli;
use dupindex::error::ExitCode;
use dupindex::run_app;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn run(db: &Path, args: &[&str]) -> ExitCode {
    let mut argv = vec!["dupindex", "-q", "--store", "sqlite", "--db"];
    let db = db.to_str().unwrap();
    argv.push(db);
    argv.extend_from_slice(args);
    run_app(Cli::try_parse_from(argv).unwrap()).unwrap()
}

#[test]
fn test_scan_find_report_delete_cycle() {
    let media = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db = data.path().join("index.db");
    write_file(media.path(), "show_00:12:30.mkv", b"episode");
    write_file(media.path(), "show.mkv", b"episode");
    write_file(media.path(), "unique.mkv", b"something else");
    let root = media.path().to_str().unwrap();

    assert_eq!(run(&db, &["scan", root, "--min-size", "0"]), ExitCode::Success);
    assert!(media.path().join("fav.log").exists());
    assert!(media.path().join("fav.log.sort").exists());

    assert_eq!(run(&db, &["find", root]), ExitCode::Success);

    assert_eq!(run(&db, &["report", root]), ExitCode::Success);
    let report = fs::read_to_string(media.path().join("fav.log.dup")).unwrap();
    let lines: Vec<&str> = report.lines().collect();
    assert!(lines[0].starts_with("Duplicate files for fullHash "));
    assert_eq!(lines[1], "[+] 7,\"./show_00:12:30.mkv\"");
    assert_eq!(lines[2], "[-] 7,\"./show.mkv\"");

    assert_eq!(
        run(&db, &["delete", root, "--mode", "permanent", "--yes"]),
        ExitCode::Success
    );
    assert!(media.path().join("show_00:12:30.mkv").exists());
    assert!(!media.path().join("show.mkv").exists());
    assert!(media.path().join("unique.mkv").exists());

    assert_eq!(run(&db, &["report", root]), ExitCode::NoDuplicates);
}

#[test]
fn test_find_without_duplicates() {
    let media = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db = data.path().join("index.db");
    write_file(media.path(), "a", b"one");
    write_file(media.path(), "b", b"two");
    let root = media.path().to_str().unwrap();

    run(&db, &["scan", root, "--min-size", "0", "--no-log"]);
    assert_eq!(run(&db, &["find", root]), ExitCode::NoDuplicates);
}

#[test]
fn test_delete_requires_confirmation() {
    let media = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db = data.path().join("index.db");
    write_file(media.path(), "a", b"same");
    write_file(media.path(), "b", b"same");
    let root = media.path().to_str().unwrap();
    run(&db, &["scan", root, "--min-size", "0", "--no-log"]);
    run(&db, &["find", root]);

    let db_str = db.to_str().unwrap();
    let cli = Cli::try_parse_from(["dupindex", "-q", "--store", "sqlite", "--db", db_str, "delete", root]).unwrap();
    assert!(run_app(cli).is_err());
    assert!(media.path().join("a").exists());
    assert!(media.path().join("b").exists());

    assert_eq!(run(&db, &["delete", root, "--dry-run"]), ExitCode::Success);
    assert!(media.path().join("b").exists());
}

#[test]
fn test_reclaim_after_out_of_band_delete() {
    let media = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db = data.path().join("index.db");
    let file = write_file(media.path(), "a", b"data");
    let root = media.path().to_str().unwrap();
    run(&db, &["scan", root, "--min-size", "0", "--no-log"]);

    fs::remove_file(file).unwrap();
    assert_eq!(run(&db, &["reclaim"]), ExitCode::Success);

    let export = data.path().join("export.log");
    let export_str = export.to_str().unwrap();
    assert_eq!(run(&db, &["export", root, "-o", export_str]), ExitCode::Success);
    assert_eq!(fs::read_to_string(export).unwrap(), "");
}

#[test]
fn test_missing_root_is_an_error() {
    let data = TempDir::new().unwrap();
    let db = data.path().join("index.db");
    let cli = Cli::try_parse_from([
        "dupindex",
        "-q",
        "--store",
        "sqlite",
        "--db",
        db.to_str().unwrap(),
        "scan",
        "/no/such/media/root",
    ])
    .unwrap();
    assert!(run_app(cli).is_err());
}
