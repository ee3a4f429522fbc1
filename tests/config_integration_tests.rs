//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Default configuration when no file exists
//! - Loading a hand-written tweenode.yaml
//! - Saving and reloading
//! - State directory resolution

use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;
use tweenode::ConfigManager;
use tweenode::models::{OutputMode, StoryFormatSpec, TweenodeConfig};

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.config_path(), config_path.join("tweenode.yaml"));
}

#[test]
fn test_creates_missing_config_dir() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("project/config");

    ConfigManager::new(&nested).unwrap();

    assert!(nested.is_dir());
}

#[test]
fn test_load_default_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load_config().unwrap();

    assert_eq!(config, TweenodeConfig::default());
    assert_eq!(config.debug.timeout_secs, 300);
    assert!(!config.debug.write_to_log);
    assert!(!config.debug.detach_process);
}

#[test]
fn test_load_handwritten_yaml() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(
        config_path.join("tweenode.yaml"),
        r#"
state_dir: build/.tweego
setup:
  binary_version: "2.1.0"
  custom_binary_url: https://mirror.example.com/tweego.zip
  clean_builtin_formats: true
  formats:
    - name: paperthin-1
      source_url: https://mirror.example.com/paperthin.js
      create_dedicated_folder: true
build:
  input_directory: src/story
  output_mode: file
  output_file: dist/index.html
  module_list:
    - src/vendor/lib.js
  extra_flags: ["--log-stats"]
debug:
  write_to_log: true
  timeout_secs: 60
"#,
    )
    .unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load_config().unwrap();

    assert_eq!(config.state_dir, Utf8PathBuf::from("build/.tweego"));
    assert_eq!(config.setup.binary_version, "2.1.0");
    assert_eq!(
        config.setup.custom_url(),
        Some("https://mirror.example.com/tweego.zip")
    );
    assert!(config.setup.clean_builtin_formats);
    assert_eq!(config.setup.formats.len(), 1);
    assert_eq!(config.setup.formats[0].name, "paperthin-1");
    assert_eq!(config.setup.formats[0].version, None);
    assert_eq!(config.build.output_mode, OutputMode::File);
    assert_eq!(config.build.module_list, vec![Utf8PathBuf::from("src/vendor/lib.js")]);
    assert_eq!(config.build.extra_flags, vec!["--log-stats".to_string()]);
    assert!(config.debug.write_to_log);
    assert_eq!(config.debug.timeout_secs, 60);
    assert!(config.build.validate().is_ok());
}

#[test]
fn test_invalid_yaml_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("tweenode.yaml"), "build: [this, is, not, a, map]\n").unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert!(manager.load_config().is_err());
}

#[test]
fn test_save_and_reload() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = TweenodeConfig::default();
    config.setup.formats = vec![StoryFormatSpec::new(
        "harlowe-3",
        "3.3.9",
        "https://twine2.neocities.org/harlowe-3.3.9.js",
        true,
    )];
    config.build.input_directory = Utf8PathBuf::from("story");
    config.build.use_test_mode = true;
    manager.save_config(&config).unwrap();

    assert!(manager.config_path().exists());
    assert_eq!(manager.load_config().unwrap(), config);
}

#[test]
fn test_state_paths_resolution() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    let mut config = TweenodeConfig::default();

    let relative = manager.state_paths(&config);
    assert_eq!(relative.root(), config_path.join(".tweenode"));
    assert_eq!(relative.story_formats(), config_path.join(".tweenode/storyformats"));

    config.state_dir = config_path.join("elsewhere");
    let absolute = manager.state_paths(&config);
    assert_eq!(absolute.root(), config_path.join("elsewhere"));
}
