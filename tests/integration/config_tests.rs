use dupindex::actions::DeleteMode;
use dupindex::config::{Config, ConfigOverrides};
use dupindex::store::StoreKind;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_env_layer_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "max_groups = 5\nmin_size = 1\n").unwrap();

    std::env::set_var("DUPINDEX_MAX_GROUPS", "9");
    std::env::set_var("DUPINDEX_DELETE_MODE", "trash");
    let config: Config = Config::figment(Some(&path)).extract().unwrap();
    std::env::remove_var("DUPINDEX_MAX_GROUPS");
    std::env::remove_var("DUPINDEX_DELETE_MODE");

    assert_eq!(config.max_groups, 9);
    assert_eq!(config.min_size, 1);
    assert_eq!(config.delete_mode, DeleteMode::Trash);
}

#[test]
fn test_overrides_win_over_everything() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "store = \"sqlite\"\nuse_mmap = true\n").unwrap();

    let overrides = ConfigOverrides {
        store: Some(StoreKind::Memory),
        use_mmap: Some(false),
        ..Default::default()
    };
    let config = Config::load(Some(&path), &overrides).unwrap();
    assert_eq!(config.store, StoreKind::Memory);
    assert!(!config.use_mmap);
}

#[test]
fn test_saved_toml_loads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let config = Config {
        min_size: 4096,
        max_groups: 0,
        ..Config::default()
    };
    fs::write(&path, config.to_toml().unwrap()).unwrap();

    let loaded: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();
    assert_eq!(loaded, config);
}
