use crate::models::{StatePaths, TweenodeConfig};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "tweenode.yaml";

/// Environment variables starting with this prefix override the file,
/// e.g. `TWEENODE__DEBUG__WRITE_TO_LOG=true`
pub const ENV_PREFIX: &str = "TWEENODE";

/// Configuration manager for loading and saving `tweenode.yaml`.
///
/// Layers, later wins:
/// - built-in defaults (serde field defaults)
/// - `tweenode.yaml` in the configuration directory, if present
/// - `TWEENODE__*` environment variables
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Project directory holding `tweenode.yaml`
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration, falling back to defaults when the file is missing.
    pub fn load_config(&self) -> Result<TweenodeConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let settings = Config::builder()
            .add_source(
                File::from(self.config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: TweenodeConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("{}", self.summary(&config));
        Ok(config)
    }

    /// One-line description of `config` and where it came from.
    ///
    /// `load_config` usually runs before logging is set up, so callers
    /// repeat this once the subscriber is installed.
    pub fn summary(&self, config: &TweenodeConfig) -> String {
        let source = if self.config_path.exists() {
            self.config_path.as_str()
        } else {
            "defaults"
        };
        format!(
            "Loaded config from {} - binary version: {}, formats: {}, output mode: {:?}",
            source,
            config.setup.binary_version,
            config.setup.formats.len(),
            config.build.output_mode
        )
    }

    /// Save the configuration file.
    ///
    /// # Arguments
    /// * `config` - The TweenodeConfig to save
    pub fn save_config(&self, config: &TweenodeConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// State directory layout for `config`, with a relative `state_dir`
    /// resolved against the configuration directory.
    pub fn state_paths(&self, config: &TweenodeConfig) -> StatePaths {
        if config.state_dir.is_absolute() {
            StatePaths::new(&config.state_dir)
        } else {
            StatePaths::new(self.config_dir.join(&config.state_dir))
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the configuration file path.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
