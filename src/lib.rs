// Tweenode - Manages the Tweego story compiler
//
// This is the library crate: setup (download, extract, story formats),
// binary verification and compilation. The binary crate (main.rs) provides
// the command-line entry point.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use error::{CompileError, SetupError};
pub use models::{BuildConfig, BuildOptions, OutputMode, SetupConfig, StatePaths, TweenodeConfig};
pub use services::{BinaryVerifier, Compiler, SetupManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
