//! Tweenode - command-line front end for the Tweego story compiler
//!
//! # Overview
//!
//! This binary wires the library together:
//! - Logging infrastructure (rolling file under `<state>/logs` + console on stderr)
//! - Configuration loading ([`ConfigManager`], `tweenode.yaml` + `TWEENODE__*` env vars)
//! - A current-thread tokio runtime (all work is cooperative I/O)
//! - One of the setup / formats / verify / build commands
//!
//! # Execution Flow
//!
//! 1. Parse arguments
//! 2. Load configuration from `--config-dir`
//! 3. Initialize logging
//! 4. Run the requested command
//!
//! # Commands
//!
//! - `setup [--force]`: download and unpack Tweego plus the configured story formats
//! - `formats`: re-download story formats only
//! - `verify`: check that the installed binary is a working Tweego
//! - `build [INPUT] [-o FILE] [-t]`: compile a story; HTML goes to stdout unless `-o` is given

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tweenode::models::{BuildOptions, OutputMode, StatePaths, TweenodeConfig};
use tweenode::services::{BinaryVerifier, Compiler, SetupManager, SetupOutcome};
use tweenode::{APP_NAME, ConfigManager, VERSION};

#[derive(Debug, Parser)]
#[command(name = "tweenode", version, about = "Download, verify and run the Tweego story compiler")]
struct Cli {
    /// Directory containing tweenode.yaml
    #[arg(long, global = true, default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Install Tweego and the configured story formats
    Setup {
        /// Reinstall even if a previous setup completed
        #[arg(long)]
        force: bool,
    },

    /// Re-download the configured story formats only
    Formats,

    /// Check that the installed binary is a working Tweego
    Verify,

    /// Compile a story
    Build {
        /// Story source directory (overrides build.input_directory)
        input: Option<Utf8PathBuf>,

        /// Write the HTML to this file instead of stdout
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,

        /// Compile in test mode
        #[arg(short = 't', long)]
        test_mode: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let config = config_manager.load_config()?;
    let paths = config_manager.state_paths(&config);

    let _guard = tweenode::logging::setup_logging_with_console(
        &paths.logs(),
        APP_NAME,
        cli.debug,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    if !config_manager.config_path().exists() {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            config_manager.config_path()
        );
    }
    tracing::info!("{}", config_manager.summary(&config));

    // Everything here is I/O bound and sequential; one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(run(cli.command, config, paths));

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

async fn run(command: Commands, config: TweenodeConfig, paths: StatePaths) -> Result<()> {
    match command {
        Commands::Setup { force } => {
            let setup = SetupManager::new(config.setup, paths);
            if force {
                setup.reset().await?;
            }
            match setup.ensure_setup().await? {
                SetupOutcome::Installed => tracing::info!("Tweego installed in {}", setup.paths().root()),
                SetupOutcome::AlreadyInstalled => {
                    tracing::info!("Tweego already installed, use --force to reinstall")
                }
            }
        }
        Commands::Formats => {
            SetupManager::new(config.setup, paths).download_formats().await?;
        }
        Commands::Verify => {
            let verifier = BinaryVerifier::new(paths.binary());
            if !verifier.verify().await? {
                bail!("{} is not a working Tweego binary", paths.binary());
            }
            tracing::info!("{} verified", paths.binary());
        }
        Commands::Build {
            input,
            output,
            test_mode,
        } => {
            let options = BuildOptions {
                input_directory: input,
                output_mode: output.as_ref().map(|_| OutputMode::File),
                output_file: output,
                use_test_mode: test_mode.then_some(true),
                ..Default::default()
            };

            let mut compiler = Compiler::with_paths(&config, paths);
            if let Some(html) = compiler.process(Some(options)).await? {
                print!("{}", html);
            }
        }
    }

    Ok(())
}
