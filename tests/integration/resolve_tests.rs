use super::common::{canonical, path_str, scan, write_file};
use dupindex::actions::DeleteMode;
use dupindex::context::IndexContext;
use dupindex::duplicates::{render_report, DuplicateResolver, ResolverConfig};
use dupindex::pool::PoolConfig;
use std::path::Path;
use tempfile::TempDir;

fn resolver(ctx: &IndexContext, root: &Path) -> DuplicateResolver {
    DuplicateResolver::new(
        ctx.clone(),
        ResolverConfig::new(canonical(root)).with_pool(PoolConfig::with_workers(2)),
    )
}

#[test]
fn test_three_identical_files_form_one_group() {
    let dir = TempDir::new().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        write_file(dir.path(), name, b"identical payload");
    }
    let ctx = IndexContext::in_memory();
    scan(&ctx, dir.path(), &[]);

    let resolver = resolver(&ctx, dir.path());
    let summary = resolver.find_duplicates().unwrap();
    assert_eq!(summary.groups, 1);

    let groups = resolver.groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
    let root = canonical(dir.path());
    assert_eq!(groups[0].canonical(), Some(path_str(&root.join("a.txt")).as_str()));
}

#[test]
fn test_longest_basename_is_canonical() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"same");
    write_file(dir.path(), "summer-holiday.txt", b"same");
    write_file(dir.path(), "bb.txt", b"same");
    let ctx = IndexContext::in_memory();
    scan(&ctx, dir.path(), &[]);

    let resolver = resolver(&ctx, dir.path());
    resolver.find_duplicates().unwrap();
    let group = &resolver.groups().unwrap()[0];
    let order: Vec<&str> = group
        .paths()
        .map(|p| Path::new(p).file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(order, vec!["summer-holiday.txt", "bb.txt", "a.txt"]);
}

#[test]
fn test_timestamped_name_is_kept() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "clip_01:23:45.mp4", b"frames");
    write_file(dir.path(), "clip.mp4", b"frames");
    let ctx = IndexContext::in_memory();
    scan(&ctx, dir.path(), &[]);

    let resolver = resolver(&ctx, dir.path());
    resolver.find_duplicates().unwrap();
    let groups = resolver.groups().unwrap();
    let root = canonical(dir.path());
    let lines = render_report(&ctx.store, &root, &groups).unwrap();
    assert_eq!(lines[0], format!("Duplicate files for fullHash {}:", groups[0].full_hash));
    assert_eq!(lines[1], "[+] 6,\"./clip_01:23:45.mp4\"");
    assert_eq!(lines[2], "[-] 6,\"./clip.mp4\"");
    assert_eq!(lines[3], "");
}

#[test]
fn test_same_prefix_different_content_never_grouped() {
    let dir = TempDir::new().unwrap();
    let prefix = vec![0xABu8; 150 * 1024];
    let mut one = prefix.clone();
    one.extend_from_slice(b"tail one");
    let mut two = prefix;
    two.extend_from_slice(b"tail two");
    write_file(dir.path(), "one.bin", &one);
    write_file(dir.path(), "two.bin", &two);
    write_file(dir.path(), "one-copy.bin", &one);

    let ctx = IndexContext::in_memory();
    scan(&ctx, dir.path(), &[]);
    let resolver = resolver(&ctx, dir.path());
    let summary = resolver.find_duplicates().unwrap();
    assert_eq!(summary.candidate_sets, 1);
    assert_eq!(summary.groups, 1);

    let group = &resolver.groups().unwrap()[0];
    let root = canonical(dir.path());
    assert_eq!(group.len(), 2);
    assert!(group.paths().all(|p| p != path_str(&root.join("two.bin"))));
}

#[test]
fn test_delete_skips_group_whose_canonical_vanished() {
    let dir = TempDir::new().unwrap();
    let keep = write_file(dir.path(), "holiday-video.mkv", b"movie");
    let other = write_file(dir.path(), "copy.mkv", b"movie");
    let ctx = IndexContext::in_memory();
    scan(&ctx, dir.path(), &[]);
    let resolver = resolver(&ctx, dir.path());
    resolver.find_duplicates().unwrap();
    let groups = resolver.groups().unwrap();
    assert_eq!(
        groups[0].canonical(),
        Some(path_str(&canonical(&keep)).as_str())
    );

    std::fs::remove_file(&keep).unwrap();
    let summary = resolver.delete_duplicates(&groups, DeleteMode::Permanent);
    assert_eq!(summary.groups_skipped, 1);
    assert_eq!(summary.files_deleted, 0);
    assert!(other.exists());
    assert!(ctx
        .store
        .key_for_path(&path_str(&canonical(&other)))
        .unwrap()
        .is_some());
}

#[test]
fn test_delete_removes_duplicates_and_their_entries() {
    let dir = TempDir::new().unwrap();
    let keep = write_file(dir.path(), "original-name.jpg", b"pixels");
    let dup1 = write_file(dir.path(), "x.jpg", b"pixels");
    let dup2 = write_file(dir.path(), "sub/y.jpg", b"pixels");
    let ctx = IndexContext::in_memory();
    scan(&ctx, dir.path(), &[]);
    let dup_paths = [path_str(&canonical(&dup1)), path_str(&canonical(&dup2))];

    let resolver = resolver(&ctx, dir.path());
    resolver.find_duplicates().unwrap();
    let groups = resolver.groups().unwrap();
    let summary = resolver.delete_duplicates(&groups, DeleteMode::Permanent);

    assert_eq!(summary.files_deleted, 2);
    assert_eq!(summary.errors, 0);
    assert!(keep.exists());
    assert!(!dup1.exists());
    assert!(!dup2.exists());
    for path in &dup_paths {
        assert!(ctx.store.key_for_path(path).unwrap().is_none());
    }
    assert!(resolver.groups().unwrap().is_empty());
    let partial = ctx.store.partial_hashes().unwrap();
    assert_eq!(ctx.store.partial_members(&partial[0]).unwrap().len(), 1);
}
