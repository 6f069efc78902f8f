use super::common::{canonical, path_str, scan, write_file};
use dupindex::context::IndexContext;
use dupindex::pool::PoolConfig;
use dupindex::reclaim::Reclaimer;
use dupindex::store::{index_key, MetadataStore, StoreKind};
use tempfile::TempDir;

#[test]
fn test_reclaim_removes_only_deleted_files() {
    let dir = TempDir::new().unwrap();
    let gone = write_file(dir.path(), "gone.bin", b"bytes");
    let kept = write_file(dir.path(), "kept.bin", b"other bytes");
    let gone_path = path_str(&canonical(&gone));
    let kept_path = path_str(&canonical(&kept));

    let ctx = IndexContext::in_memory();
    scan(&ctx, dir.path(), &[]);
    std::fs::remove_file(&gone).unwrap();

    let summary = Reclaimer::new(ctx.clone(), PoolConfig::with_workers(2))
        .reclaim()
        .unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.purged_missing, 1);
    assert_eq!(summary.errors, 0);

    let gone_key = index_key(&gone_path);
    assert!(ctx.store.key_for_path(&gone_path).unwrap().is_none());
    assert!(ctx.store.path_for_key(&gone_key).unwrap().is_none());
    assert!(ctx.store.get_record(&gone_key).unwrap().is_none());
    assert!(ctx.store.partial_for_key(&gone_key).unwrap().is_none());
    assert!(ctx.store.full_for_key(&gone_key).unwrap().is_none());

    let kept_key = index_key(&kept_path);
    assert!(ctx.store.get_record(&kept_key).unwrap().is_some());
    assert!(ctx.store.full_for_key(&kept_key).unwrap().is_some());
    assert_eq!(ctx.store.indexed_paths().unwrap(), vec![kept_path]);
}

#[test]
fn test_reclaim_on_sqlite_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let file = write_file(dir.path(), "a.bin", b"x");
    let store = MetadataStore::open(StoreKind::Sqlite, &data.path().join("i.db")).unwrap();
    let ctx = IndexContext::new(store, Default::default());
    scan(&ctx, dir.path(), &[]);
    std::fs::remove_file(file).unwrap();

    let reclaimer = Reclaimer::new(ctx.clone(), PoolConfig::with_workers(1));
    assert_eq!(reclaimer.reclaim().unwrap().purged_missing, 1);
    let again = reclaimer.reclaim().unwrap();
    assert_eq!(again.checked, 0);
    assert!(ctx.store.record_keys().unwrap().is_empty());
}
