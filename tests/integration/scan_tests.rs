use super::common::{canonical, path_str, scan, write_file};
use dupindex::context::IndexContext;
use dupindex::pool::PoolConfig;
use dupindex::scanner::{ScanConfig, ScanError, Scanner};
use dupindex::store::{index_key, MetadataStore, StoreKind};
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

#[test]
fn test_every_eligible_file_is_mapped_both_ways() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.bin", b"alpha");
    write_file(dir.path(), "nested/deeper/b.bin", b"beta");
    write_file(dir.path(), ".hidden/c.bin", b"gamma");
    let root = canonical(dir.path());

    let ctx = IndexContext::in_memory();
    let summary = scan(&ctx, dir.path(), &[]);
    assert_eq!(summary.counts.indexed, 3);
    assert_eq!(summary.counts.errors, 0);
    assert!(!summary.interrupted);

    for rel in ["a.bin", "nested/deeper/b.bin", ".hidden/c.bin"] {
        let path = path_str(&root.join(rel));
        let key = ctx.store.key_for_path(&path).unwrap().expect("path_to_key");
        assert_eq!(key, index_key(&path));
        assert_eq!(ctx.store.path_for_key(&key).unwrap(), Some(path.clone()));
        let record = ctx.store.get_record(&key).unwrap().expect("record");
        assert!(record.is_hashed());
    }
}

#[test]
fn test_git_directory_is_never_indexed() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "project/.git/config", b"[core]");
    write_file(dir.path(), "project/src/main.rs", b"fn main() {}");
    let root = canonical(dir.path());

    let ctx = IndexContext::in_memory();
    let summary = scan(&ctx, dir.path(), &["*/.git/*"]);
    assert_eq!(summary.counts.indexed, 1);
    assert_eq!(summary.counts.dirs_pruned, 1);

    let git_config = path_str(&root.join("project/.git/config"));
    assert!(ctx.store.key_for_path(&git_config).unwrap().is_none());
    assert!(!ctx.store.has_record(&index_key(&git_config)).unwrap());
    assert_eq!(ctx.store.indexed_paths().unwrap().len(), 1);
}

#[test]
fn test_small_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "small", &[1u8; 10]);
    write_file(dir.path(), "large", &[1u8; 4096]);

    let ctx = IndexContext::in_memory();
    let config = ScanConfig::new(dir.path().to_path_buf())
        .with_min_size(1024)
        .with_pool(PoolConfig::with_workers(1));
    let summary = Scanner::new(ctx.clone(), config).run().unwrap();
    assert_eq!(summary.counts.indexed, 1);
    assert_eq!(summary.counts.too_small, 1);
}

#[test]
fn test_rescan_without_hashes_leaves_record_untouched() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "a.bin", b"content");
    let ctx = IndexContext::in_memory();
    let config = || {
        ScanConfig::new(dir.path().to_path_buf())
            .with_min_size(0)
            .with_hashes(false)
            .with_pool(PoolConfig::with_workers(1))
    };
    Scanner::new(ctx.clone(), config()).run().unwrap();
    let key = index_key(&path_str(&canonical(&file)));
    let before = ctx.store.get_record(&key).unwrap().unwrap();

    set_file_mtime(&file, FileTime::from_unix_time(1_000_000, 0)).unwrap();
    let summary = Scanner::new(ctx.clone(), config()).run().unwrap();
    assert_eq!(summary.counts.already_indexed, 1);
    assert_eq!(summary.counts.indexed, 0);
    assert_eq!(ctx.store.get_record(&key).unwrap().unwrap(), before);
}

#[test]
fn test_rescan_with_hashes_picks_up_new_content() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "a.bin", b"first");
    let ctx = IndexContext::in_memory();
    scan(&ctx, dir.path(), &[]);
    let key = index_key(&path_str(&canonical(&file)));
    let first = ctx.store.full_for_key(&key).unwrap().unwrap();

    std::fs::write(&file, b"second version").unwrap();
    scan(&ctx, dir.path(), &[]);
    let second = ctx.store.full_for_key(&key).unwrap().unwrap();
    assert_ne!(first, second);
    assert_eq!(ctx.store.partial_hashes().unwrap().len(), 1);
}

#[test]
fn test_missing_root_is_fatal() {
    let ctx = IndexContext::in_memory();
    let config = ScanConfig::new("/definitely/not/a/real/root".into());
    let err = Scanner::new(ctx, config).run().unwrap_err();
    assert!(matches!(err, ScanError::NotFound(_)));
}

#[test]
fn test_sqlite_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_file(dir.path(), "a.bin", b"persisted");
    let db = data.path().join("index.db");

    {
        let store = MetadataStore::open(StoreKind::Sqlite, &db).unwrap();
        let ctx = IndexContext::new(store, Default::default());
        scan(&ctx, dir.path(), &[]);
    }

    let store = MetadataStore::open(StoreKind::Sqlite, &db).unwrap();
    assert_eq!(store.backend_name(), "sqlite");
    let paths = store.indexed_paths().unwrap();
    assert_eq!(paths, vec![path_str(&canonical(&dir.path().join("a.bin")))]);
}
