//! Settings persistence round trips and file edge cases.

use std::path::PathBuf;
use tempfile::TempDir;

use crate::persistence::{ensure_dir, load_json, load_json_or_default, save_json};
use crate::settings::{LogLevel, PoolPreset, Settings, SettingsStore};

// ============================================================================
// JSON Files
// ============================================================================

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("a").join("b").join("settings.json");

    save_json(&nested, &serde_json::json!({"key": "value"})).await.unwrap();
    assert!(nested.exists());
}

#[tokio::test]
async fn test_load_missing_file_is_io_error() {
    let result: Result<Settings, _> = load_json(&PathBuf::from("/nonexistent/settings.json")).await;
    assert!(matches!(result, Err(crate::StoreError::Io(_))));
}

#[tokio::test]
async fn test_load_or_default_on_corrupt_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let settings: Settings = load_json_or_default(&path).await;
    assert_eq!(settings, Settings::default());
}

#[tokio::test]
async fn test_ensure_dir_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("config");

    ensure_dir(&dir).await.unwrap();
    ensure_dir(&dir).await.unwrap();
    assert!(dir.is_dir());
}

#[tokio::test]
async fn test_atomic_write_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    save_json(&path, &Settings::default()).await.unwrap();
    save_json(&path, &Settings::default()).await.unwrap();

    assert!(!path.with_extension("json.tmp").exists());
}

// ============================================================================
// Settings Round Trip
// ============================================================================

#[tokio::test]
async fn test_settings_store_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    let store = SettingsStore::load(path.clone()).await.unwrap();
    store
        .update(|s| {
            s.log_level = LogLevel::Debug;
            s.fan_out_limit = Some(4);
            s.presets.tool = PoolPreset::cached(5, 0);
        })
        .await;
    store.save().await.unwrap();

    let reloaded = SettingsStore::load(path).await.unwrap().get().await;
    assert_eq!(reloaded.log_level, LogLevel::Debug);
    assert_eq!(reloaded.fan_out_limit, Some(4));
    assert_eq!(reloaded.presets.tool, PoolPreset::cached(5, 0));
}

#[tokio::test]
async fn test_invalid_settings_fall_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    tokio::fs::write(&path, r#"{"max_retries": 0}"#).await.unwrap();

    let settings = SettingsStore::load(path).await.unwrap().get().await;
    assert_eq!(settings.max_retries, 3);
}

#[tokio::test]
async fn test_unknown_fields_are_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    tokio::fs::write(&path, r#"{"log_level": "trace", "theme": "dark"}"#)
        .await
        .unwrap();

    let settings: Settings = load_json(&path).await.unwrap();
    assert_eq!(settings.log_level, LogLevel::Trace);
}
