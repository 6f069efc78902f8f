use std::thread;

use super::common::{canonical, path_str, write_file};
use dupindex::context::IndexContext;
use dupindex::duplicates::{DuplicateResolver, ResolverConfig};
use dupindex::index::Indexer;
use dupindex::pool::PoolConfig;
use dupindex::reclaim::Reclaimer;
use dupindex::store::index_key;
use tempfile::TempDir;

#[test]
fn test_reclaim_alongside_indexing_of_other_paths() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    let ctx = IndexContext::in_memory();
    let indexer = Indexer::new(ctx.clone());

    let old: Vec<_> = (0..20)
        .map(|i| write_file(&root, &format!("old/{i}.bin"), format!("old {i}").as_bytes()))
        .collect();
    for path in &old {
        indexer.index_path(path, true).unwrap();
    }
    let (gone, kept) = old.split_at(10);
    for path in gone {
        std::fs::remove_file(path).unwrap();
    }
    let fresh: Vec<_> = (0..40)
        .map(|i| write_file(&root, &format!("new/{i}.bin"), format!("new {i}").as_bytes()))
        .collect();

    let summary = thread::scope(|s| {
        let writer = s.spawn(|| {
            for path in &fresh {
                indexer.index_path(path, true).unwrap();
            }
        });
        let summary = Reclaimer::new(ctx.clone(), PoolConfig::with_workers(4))
            .reclaim()
            .unwrap();
        writer.join().unwrap();
        summary
    });

    assert_eq!(summary.purged_missing, 10);
    assert_eq!(summary.errors, 0);
    for path in fresh.iter().chain(kept) {
        let path = path_str(path);
        let key = index_key(&path);
        assert_eq!(ctx.store.key_for_path(&path).unwrap(), Some(key.clone()));
        assert!(ctx.store.get_record(&key).unwrap().is_some());
        assert!(ctx.store.full_for_key(&key).unwrap().is_some());
    }
    for path in gone {
        let path = path_str(path);
        assert!(ctx.store.key_for_path(&path).unwrap().is_none());
        assert!(ctx.store.get_record(&index_key(&path)).unwrap().is_none());
    }
}

#[test]
fn test_group_never_left_with_one_member() {
    for round in 0..25 {
        let dir = TempDir::new().unwrap();
        let root = canonical(dir.path());
        let ctx = IndexContext::in_memory();
        let indexer = Indexer::new(ctx.clone());
        let copies: Vec<_> = ["a.mkv", "b.mkv", "c.mkv"]
            .iter()
            .map(|name| write_file(&root, name, b"identical frames"))
            .collect();
        for path in &copies {
            indexer.index_path(path, true).unwrap();
        }

        let resolver = DuplicateResolver::new(
            ctx.clone(),
            ResolverConfig::new(root.clone()).with_pool(PoolConfig::with_workers(2)),
        );
        let reclaimer = Reclaimer::new(ctx.clone(), PoolConfig::with_workers(1));
        thread::scope(|s| {
            s.spawn(|| resolver.find_duplicates().unwrap());
            s.spawn(|| reclaimer.purge_path(&path_str(&copies[1])).unwrap());
            s.spawn(|| reclaimer.purge_path(&path_str(&copies[2])).unwrap());
        });

        for full in ctx.store.group_hashes().unwrap() {
            let members = ctx.store.group_members(&full).unwrap();
            assert_ne!(members.len(), 1, "round {round}: group {full} has a single member");
        }
    }
}
