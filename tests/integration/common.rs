use std::fs;
use std::path::{Path, PathBuf};

use dupindex::context::IndexContext;
use dupindex::pool::PoolConfig;
use dupindex::scanner::{ExcludeMatcher, ScanConfig, ScanSummary, Scanner};

pub fn write_file(dir: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn scan(ctx: &IndexContext, root: &Path, exclude: &[&str]) -> ScanSummary {
    let config = ScanConfig::new(root.to_path_buf())
        .with_min_size(0)
        .with_hashes(true)
        .with_exclude(ExcludeMatcher::from_patterns(exclude).unwrap())
        .with_pool(PoolConfig::with_workers(2));
    Scanner::new(ctx.clone(), config).run().unwrap()
}

pub fn canonical(root: &Path) -> PathBuf {
    fs::canonicalize(root).unwrap()
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
