//! Services module - the setup and execution pipeline for the Tweego compiler.
//!
//! Leaves first:
//!
//! - [`platform`]: maps the host OS/architecture onto Tweego's release archive names
//! - [`transport`]: generic HTTP download and zip extraction behind the [`Transport`] trait
//! - [`SetupManager`]: downloads and unpacks the binary, then installs story formats
//! - [`BinaryVerifier`]: confirms the installed binary runs and really is Tweego
//! - [`Compiler`]: spawns Tweego for one build, drains both output streams,
//!   validates the HTML and returns or writes it
//!
//! Data flows `SetupManager` (once, idempotent) → `BinaryVerifier` (before
//! every run) → `Compiler` (per compilation).
//!
//! # Usage Example
//!
//! ```ignore
//! use tweenode::services::{Compiler, SetupManager};
//!
//! let setup = SetupManager::new(config.setup.clone(), paths.clone());
//! setup.ensure_setup().await?;
//!
//! let mut compiler = Compiler::with_paths(&config, paths);
//! let html = compiler.process(None).await?;
//! ```

pub mod compiler;
pub mod platform;
pub mod setup;
pub mod transport;
pub mod verify;

pub use compiler::{Compiler, build_arguments, is_html_document, is_output_locked};
pub use platform::{Platform, ReleaseArch, ReleaseOs, resolve_download_url};
pub use setup::{SetupManager, SetupOutcome};
pub use transport::{HttpTransport, Transport};
pub use verify::{BinaryVerifier, VERSION_BANNER};
