use ngcforge_settings::{Catalog, Config, PreambleVar, SettingsError};
use std::fs;

fn customized() -> Config {
    let mut config = Config::default();
    config.general.digits = 4;
    config.general.auto_refresh = false;
    config.ngc.catalog = Catalog::Plasma;
    config.ngc.use_pct_signs = true;
    config.ngc.preamble_vars = vec![
        PreambleVar {
            name: "_probe_feed".to_string(),
            value: "10".to_string(),
        },
        PreambleVar {
            name: "_safe_z".to_string(),
            value: "5".to_string(),
        },
    ];
    config
}

#[test]
fn test_save_and_load_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings").join("config.toml");
    let config = customized();
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.ngc.preamble_vars[1].name, "_safe_z");
}

#[test]
fn test_save_and_load_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let config = customized();
    config.save_to_file(&path).unwrap();
    assert_eq!(Config::load_from_file(&path).unwrap(), config);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[general]\nmachine_units = \"imperial\"\n\n[ngc]\ncatalog = \"lathe\"\n").unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.general.digits, 3);
    assert_eq!(config.general.undo_max_len, 200);
    assert!(config.generation_options().init_str.starts_with("G18"));
}

#[test]
fn test_rejected_files() {
    let dir = tempfile::tempdir().unwrap();

    let yaml = dir.path().join("config.yaml");
    fs::write(&yaml, "general: {}").unwrap();
    assert!(matches!(
        Config::load_from_file(&yaml),
        Err(SettingsError::UnsupportedFormat(_))
    ));

    let invalid = dir.path().join("config.toml");
    fs::write(&invalid, "[general]\nundo_max_len = 0\n").unwrap();
    assert!(matches!(
        Config::load_from_file(&invalid),
        Err(SettingsError::InvalidSetting { .. })
    ));

    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{ not json").unwrap();
    assert!(matches!(
        Config::load_from_file(&broken),
        Err(SettingsError::JsonError(_))
    ));

    let missing = dir.path().join("missing.toml");
    assert_eq!(Config::load_or_default(&missing).unwrap(), Config::default());
}
