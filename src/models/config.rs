use crate::error::CompileError;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Tweego release installed when nothing else is configured
pub const DEFAULT_BINARY_VERSION: &str = "2.1.1";

/// Default wall-clock limit for a single compilation
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Complete configuration from `tweenode.yaml`
///
/// Built once at the top of the call chain and handed to
/// [`SetupManager`](crate::services::SetupManager),
/// [`BinaryVerifier`](crate::services::BinaryVerifier) and
/// [`Compiler`](crate::services::Compiler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweenodeConfig {
    /// Private working directory holding the binary, formats and logs
    pub state_dir: Utf8PathBuf,
    pub setup: SetupConfig,
    pub build: BuildConfig,
    pub debug: DebugConfig,
}

impl Default for TweenodeConfig {
    fn default() -> Self {
        Self {
            state_dir: Utf8PathBuf::from(".tweenode"),
            setup: SetupConfig::default(),
            build: BuildConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

/// What to install: binary release plus story formats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub binary_version: String,

    /// Zip archive to use instead of the official release. Empty means unset.
    pub custom_binary_url: Option<String>,

    pub formats: Vec<StoryFormatSpec>,

    /// Empty `storyformats/` before downloading, dropping the formats bundled with Tweego
    pub clean_builtin_formats: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            binary_version: DEFAULT_BINARY_VERSION.to_string(),
            custom_binary_url: None,
            formats: default_formats(),
            clean_builtin_formats: false,
        }
    }
}

impl SetupConfig {
    /// Merge caller overrides over this config. Caller values win and
    /// `formats` is replaced wholesale rather than concatenated.
    pub fn merged(mut self, overrides: SetupOptions) -> Self {
        if let Some(version) = overrides.binary_version {
            self.binary_version = version;
        }
        if let Some(url) = overrides.custom_binary_url {
            self.custom_binary_url = Some(url);
        }
        if let Some(formats) = overrides.formats {
            self.formats = formats;
        }
        if let Some(clean) = overrides.clean_builtin_formats {
            self.clean_builtin_formats = clean;
        }
        self
    }

    /// The custom URL, if one is set and non-empty
    pub fn custom_url(&self) -> Option<&str> {
        self.custom_binary_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Caller-supplied overrides for [`SetupConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupOptions {
    pub binary_version: Option<String>,
    pub custom_binary_url: Option<String>,
    pub formats: Option<Vec<StoryFormatSpec>>,
    pub clean_builtin_formats: Option<bool>,
}

/// A story format bundle to download next to the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryFormatSpec {
    /// Unique key, used as the folder or file name under `storyformats/`
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    /// Either a single script (saved as `format.js`) or a `.zip` bundle
    pub source_url: String,

    /// Some bundles ship their own top-level folder (SugarCube), others
    /// need one created from `name`
    #[serde(default)]
    pub create_dedicated_folder: bool,
}

impl StoryFormatSpec {
    pub fn new(name: &str, version: &str, source_url: &str, create_dedicated_folder: bool) -> Self {
        Self {
            name: name.to_string(),
            version: Some(version.to_string()),
            source_url: source_url.to_string(),
            create_dedicated_folder,
        }
    }
}

fn default_formats() -> Vec<StoryFormatSpec> {
    vec![
        StoryFormatSpec::new(
            "sugarcube-2",
            "2.37.3",
            "https://www.motoslave.net/sugarcube/download.php/2/sugarcube-2.37.3-for-twine-2.1-local.zip",
            false,
        ),
        StoryFormatSpec::new(
            "chapbook-2",
            "2.2.0",
            "https://klembot.github.io/chapbook/use/2.2.0/format.js",
            true,
        ),
        StoryFormatSpec::new(
            "harlowe-3",
            "3.3.9",
            "https://twine2.neocities.org/harlowe-3.3.9.js",
            true,
        ),
        StoryFormatSpec::new(
            "harlowe-4-unstable",
            "4.0.0",
            "https://twine2.neocities.org/harlowe4-unstable.js",
            true,
        ),
    ]
}

/// Where the compiled HTML goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    File,
    #[default]
    String,
}

/// One compilation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub input_directory: Utf8PathBuf,
    pub output_mode: OutputMode,

    /// Required when `output_mode` is `file`
    pub output_file: Option<Utf8PathBuf>,

    pub html_head_file: Option<Utf8PathBuf>,
    pub module_list: Vec<Utf8PathBuf>,
    pub style_source: Option<Utf8PathBuf>,
    pub script_source: Option<Utf8PathBuf>,

    /// Passed to Tweego verbatim, after every computed flag
    pub extra_flags: Vec<String>,

    /// Compile in test mode (`-t`)
    pub use_test_mode: bool,
}

impl BuildConfig {
    /// Shallow merge: every top-level key present in `options` replaces ours.
    pub fn merged(&self, options: BuildOptions) -> Self {
        let mut merged = self.clone();

        if let Some(dir) = options.input_directory {
            merged.input_directory = dir;
        }
        if let Some(mode) = options.output_mode {
            merged.output_mode = mode;
        }
        if let Some(file) = options.output_file {
            merged.output_file = Some(file);
        }
        if let Some(head) = options.html_head_file {
            merged.html_head_file = Some(head);
        }
        if let Some(modules) = options.module_list {
            merged.module_list = modules;
        }
        if let Some(style) = options.style_source {
            merged.style_source = Some(style);
        }
        if let Some(script) = options.script_source {
            merged.script_source = Some(script);
        }
        if let Some(flags) = options.extra_flags {
            merged.extra_flags = flags;
        }
        if let Some(test_mode) = options.use_test_mode {
            merged.use_test_mode = test_mode;
        }

        merged
    }

    /// Tweego needs a source directory; file mode also needs somewhere to write.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.input_directory.as_str().trim().is_empty() {
            return Err(CompileError::InvalidBuildConfig(
                "input_directory is required".to_string(),
            ));
        }
        if self.output_mode == OutputMode::File
            && self
                .output_file
                .as_ref()
                .is_none_or(|path| path.as_str().trim().is_empty())
        {
            return Err(CompileError::InvalidBuildConfig(
                "output mode 'file' requires output_file".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-call overrides for [`BuildConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub input_directory: Option<Utf8PathBuf>,
    pub output_mode: Option<OutputMode>,
    pub output_file: Option<Utf8PathBuf>,
    pub html_head_file: Option<Utf8PathBuf>,
    pub module_list: Option<Vec<Utf8PathBuf>>,
    pub style_source: Option<Utf8PathBuf>,
    pub script_source: Option<Utf8PathBuf>,
    pub extra_flags: Option<Vec<String>>,
    pub use_test_mode: Option<bool>,
}

/// Diagnostics and process-handling switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Append every fatal condition to `<state>/tweenode.log`
    pub write_to_log: bool,

    /// Start Tweego in its own process group / detached console
    pub detach_process: bool,

    pub timeout_secs: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            write_to_log: false,
            detach_process: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}
