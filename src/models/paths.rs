use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// File name of the compiler binary on this host
pub const BINARY_NAME: &str = if cfg!(target_os = "windows") {
    "tweego.exe"
} else {
    "tweego"
};

/// Environment variable Tweego reads to locate story formats
pub const FORMATS_ENV_VAR: &str = "TWEEGO_PATH";

const FORMATS_DIR: &str = "storyformats";
const ERROR_LOG: &str = "tweenode.log";
const MANIFEST: &str = "install.yaml";
const LOGS_DIR: &str = "logs";

/// On-disk layout of the state directory
///
/// ```text
/// <state>/tweego[.exe]
/// <state>/storyformats/<format>/...
/// <state>/tweenode.log
/// <state>/install.yaml
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    root: Utf8PathBuf,
}

impl StatePaths {
    pub fn new<P: AsRef<Utf8Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn binary(&self) -> Utf8PathBuf {
        self.root.join(BINARY_NAME)
    }

    pub fn story_formats(&self) -> Utf8PathBuf {
        self.root.join(FORMATS_DIR)
    }

    /// Timestamped log of fatal compile errors
    pub fn error_log(&self) -> Utf8PathBuf {
        self.root.join(ERROR_LOG)
    }

    /// Written only after a fully successful setup
    pub fn manifest(&self) -> Utf8PathBuf {
        self.root.join(MANIFEST)
    }

    /// Rolling tracing output
    pub fn logs(&self) -> Utf8PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.manifest().is_file()
    }
}

/// Record of a completed installation, stored as `install.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallManifest {
    pub binary_version: String,
    pub binary_url: String,
    pub formats: Vec<String>,
    pub installed_at: String,
}
