//! Data models for Tweenode.
//!
//! - [`TweenodeConfig`]: everything loaded from `tweenode.yaml` (setup, build, debug sections)
//! - [`SetupConfig`] / [`SetupOptions`]: binary release and story formats to install, plus caller overrides
//! - [`BuildConfig`] / [`BuildOptions`]: one compilation request, plus per-call overrides
//! - [`StatePaths`]: layout of the state directory
//! - [`RunState`]: mutable state owned by a single compiler runner

pub mod config;
pub mod paths;
pub mod run_state;

pub use config::{
    BuildConfig, BuildOptions, DebugConfig, OutputMode, SetupConfig, SetupOptions,
    StoryFormatSpec, TweenodeConfig,
};
pub use paths::{BINARY_NAME, FORMATS_ENV_VAR, InstallManifest, StatePaths};
pub use run_state::{CapturedOutput, RunPhase, RunState};
