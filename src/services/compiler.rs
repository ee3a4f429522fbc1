use crate::error::{CompileError, summarize_message};
use crate::logging::append_error_log;
use crate::models::{
    BuildConfig, BuildOptions, CapturedOutput, FORMATS_ENV_VAR, OutputMode, RunPhase, RunState,
    StatePaths, TweenodeConfig,
};
use crate::services::verify::BinaryVerifier;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Grace period between the terminate signal and the forceful kill
pub const KILL_GRACE_PERIOD: Duration = Duration::from_millis(1500);

static DOCTYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*<!DOCTYPE\s+html\s*>").expect("Invalid DOCTYPE regex"));

static BODY_CLOSE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("Invalid body regex"));

/// True when `text` starts with the HTML doctype and closes its body
pub fn is_html_document(text: &str) -> bool {
    DOCTYPE_PATTERN.is_match(text) && BODY_CLOSE_PATTERN.is_match(text)
}

/// Build the Tweego command line for `build`.
///
/// Mapping:
/// - input directory, then the script source, as positional sources
/// - `--head=<path>` for the HTML head file
/// - `--module=<path>` per module, then the style source
/// - extra flags verbatim
/// - `-t` for test mode
///
/// `--output` is never passed: the runner captures the HTML and writes the
/// file itself so `file` and `string` modes share one path.
pub fn build_arguments(build: &BuildConfig) -> Vec<String> {
    let mut args = vec![build.input_directory.to_string()];

    if let Some(script) = &build.script_source {
        args.push(script.to_string());
    }

    if let Some(head) = &build.html_head_file {
        args.push(format!("--head={}", head));
    }

    for module in build.module_list.iter().chain(build.style_source.iter()) {
        args.push(format!("--module={}", module));
    }

    args.extend(build.extra_flags.iter().cloned());

    if build.use_test_mode {
        args.push("-t".to_string());
    }

    args
}

/// Report whether `path` is held open exclusively by someone else.
///
/// Probes with a non-destructive read+write open; a missing file is not locked.
pub fn is_output_locked(path: &Utf8Path) -> std::io::Result<bool> {
    match std::fs::OpenOptions::new().read(true).write(true).open(path) {
        Ok(_) => Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) if is_lock_error(&e) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Open errors meaning another process holds the file
fn is_lock_error(error: &std::io::Error) -> bool {
    // 32 is ERROR_SHARING_VIOLATION on Windows
    error.kind() == std::io::ErrorKind::PermissionDenied
        || (cfg!(windows) && error.raw_os_error() == Some(32))
}

/// Runs Tweego for one compilation at a time
///
/// `process` takes `&mut self`, so a single instance can never run two
/// compilations at once; use one `Compiler` per concurrent build.
///
/// # Example
///
/// ```ignore
/// let config = ConfigManager::new(".")?.load_config()?;
/// let mut compiler = Compiler::new(&config);
/// let html = compiler.process(None).await?;
/// ```
pub struct Compiler {
    paths: StatePaths,
    verifier: BinaryVerifier,
    state: RunState,
    child: Option<Child>,
    timeout: Duration,
}

impl Compiler {
    pub fn new(config: &TweenodeConfig) -> Self {
        Self::with_paths(config, StatePaths::new(&config.state_dir))
    }

    pub fn with_paths(config: &TweenodeConfig, paths: StatePaths) -> Self {
        Self {
            verifier: BinaryVerifier::new(paths.binary()),
            state: RunState::new(config.build.clone(), config.debug.clone()),
            child: None,
            timeout: Duration::from_secs(config.debug.timeout_secs),
            paths,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    /// Check that the installed binary is a working Tweego
    pub async fn verify(&self) -> Result<bool, CompileError> {
        self.verifier.verify().await
    }

    /// Compile the story described by the instance's build config with
    /// `options` merged over it.
    ///
    /// Returns the HTML in `string` mode, `None` after writing it in `file` mode.
    pub async fn process(
        &mut self,
        options: Option<BuildOptions>,
    ) -> Result<Option<String>, CompileError> {
        // A previous call dropped mid-flight may have left a child behind
        if self.child.is_some() {
            self.kill().await?;
        }

        let build = match options {
            Some(options) => self.state.build.merged(options),
            None => self.state.build.clone(),
        };
        self.state.begin_run();

        if let Err(e) = build.validate() {
            return Err(self.fail(e).await);
        }

        match self.verifier.verify().await {
            Ok(true) => {}
            Ok(false) => return Err(self.fail(CompileError::SetupIncomplete).await),
            Err(e) => return Err(self.fail(e).await),
        }

        let args = build_arguments(&build);
        tracing::info!("Running {} {}", self.verifier.binary(), args.join(" "));
        let start = Instant::now();

        let child = match self.spawn(&args) {
            Ok(child) => child,
            Err(e) => return Err(self.fail(e).await),
        };
        self.state.mark_running(child.id());
        self.child = Some(child);

        let collected = match self.child.as_mut() {
            Some(child) => timeout(self.timeout, collect_output(child)).await,
            None => Ok(Err(CompileError::SpawnFailed("child handle lost".to_string()))),
        };

        let captured = match collected {
            Ok(Ok(captured)) => captured,
            Ok(Err(e)) => return Err(self.fail(e).await),
            Err(_) => {
                tracing::warn!("Tweego did not finish within {:?}", self.timeout);
                return Err(self.fail(CompileError::Timeout(self.timeout)).await);
            }
        };

        self.child = None;
        self.state.mark_exited();
        self.state.last_stdio = Some(captured.clone());

        tracing::info!(
            "Tweego exited in {:.2}s with exit code {:?}",
            start.elapsed().as_secs_f32(),
            captured.exit_code
        );

        let payload = match classify_output(&captured) {
            Ok(payload) => payload,
            Err(e) => return Err(self.fail(e).await),
        };

        match build.output_mode {
            OutputMode::String => {
                self.state.finish(RunPhase::Succeeded);
                Ok(Some(payload))
            }
            OutputMode::File => {
                let path = build.output_file.clone().unwrap_or_default();
                if let Err(e) = write_output(&path, &payload).await {
                    return Err(self.fail(e).await);
                }
                tracing::info!("Wrote compiled story to {}", path);
                self.state.finish(RunPhase::Succeeded);
                Ok(None)
            }
        }
    }

    /// Stop the child process, if any.
    ///
    /// Sends a terminate signal first and escalates to a forceful kill after
    /// [`KILL_GRACE_PERIOD`]. Fails with `KillFailed` if the process survives both.
    pub async fn kill(&mut self) -> Result<(), CompileError> {
        let Some(mut child) = self.child.take() else {
            self.state.mark_exited();
            return Ok(());
        };

        let result = terminate(&mut child).await;
        match &result {
            Ok(()) => self.state.mark_exited(),
            Err(e) => {
                tracing::error!("{}", e);
                self.log_fatal(&e.to_string()).await;
                // Keep the handle so a later kill() can retry
                self.child = Some(child);
            }
        }
        result
    }

    fn spawn(&self, args: &[String]) -> Result<Child, CompileError> {
        let mut command = Command::new(self.verifier.binary());
        command
            .args(args)
            .env(FORMATS_ENV_VAR, self.paths.story_formats())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.state.debug.detach_process {
            detach(&mut command);
        }

        command.spawn().map_err(|e| {
            CompileError::SpawnFailed(summarize_message(&format!(
                "{}: {}",
                self.verifier.binary(),
                e
            )))
        })
    }

    /// Mark the run failed, record the error and reap the child.
    ///
    /// Returns the error to surface; a failed kill takes precedence.
    async fn fail(&mut self, error: CompileError) -> CompileError {
        self.state.phase = RunPhase::Failed;
        tracing::error!("{}", error);

        let mut detail = error.to_string();
        if let Some(stdio) = &self.state.last_stdio {
            detail.push_str(&format!(
                "\n--- stdout ---\n{}\n--- stderr ---\n{}",
                stdio.stdout, stdio.stderr
            ));
        }
        self.log_fatal(&detail).await;

        if let Err(kill_error) = self.kill().await {
            return kill_error;
        }
        self.state.finish(RunPhase::Failed);
        error
    }

    async fn log_fatal(&self, message: &str) {
        if !self.state.debug.write_to_log {
            return;
        }
        let log_path = self.paths.error_log();
        if let Err(e) = append_error_log(&log_path, message).await {
            tracing::warn!("Failed to write error log {}: {}", log_path, e);
        }
    }
}

/// Drain stdout and stderr concurrently until the process exits
async fn collect_output(child: &mut Child) -> Result<CapturedOutput, CompileError> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (stdout, stderr) = tokio::try_join!(read_stream(stdout), read_stream(stderr))?;

    let status = child
        .wait()
        .await
        .map_err(|e| CompileError::StreamError(summarize_message(&e.to_string())))?;

    Ok(CapturedOutput {
        stdout,
        stderr,
        exit_code: status.code(),
    })
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> Result<String, CompileError> {
    let Some(mut stream) = stream else {
        return Ok(String::new());
    };

    let mut buffer = Vec::new();
    stream
        .read_to_end(&mut buffer)
        .await
        .map_err(|e| CompileError::StreamError(summarize_message(&e.to_string())))?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Pick the HTML payload out of the captured streams.
///
/// Tweego may put the document on either stream, so whichever passes the
/// marker checks wins (stdout first). A non-zero exit always fails.
fn classify_output(captured: &CapturedOutput) -> Result<String, CompileError> {
    let exit_ok = captured.exit_code == Some(0);

    let payload = [&captured.stdout, &captured.stderr]
        .into_iter()
        .find(|text| is_html_document(text));

    match payload {
        Some(html) if exit_ok => Ok(html.clone()),
        _ => {
            let diagnostics = if captured.stderr.trim().is_empty() {
                &captured.stdout
            } else {
                &captured.stderr
            };
            Err(CompileError::MalformedOutput {
                first_line: diagnostics
                    .trim_start()
                    .lines()
                    .next()
                    .unwrap_or("<no output>")
                    .to_string(),
                exit_code: captured.exit_code,
            })
        }
    }
}

async fn write_output(path: &Utf8Path, payload: &str) -> Result<(), CompileError> {
    let locked = is_output_locked(path).map_err(|e| CompileError::io(path, e))?;
    if locked {
        return Err(CompileError::OutputLocked(path.to_path_buf()));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CompileError::io(parent, e))?;
    }

    tokio::fs::write(path, payload)
        .await
        .map_err(|e| CompileError::io(Utf8PathBuf::from(path), e))
}

async fn terminate(child: &mut Child) -> Result<(), CompileError> {
    let kill_error = |e: std::io::Error| CompileError::KillFailed(e.to_string());

    if child.try_wait().map_err(kill_error)?.is_some() {
        return Ok(());
    }

    if send_terminate(child) {
        if timeout(KILL_GRACE_PERIOD, child.wait()).await.is_ok() {
            tracing::debug!("Tweego exited after terminate signal");
            return Ok(());
        }
        tracing::warn!(
            "Tweego still running {:?} after terminate signal, killing",
            KILL_GRACE_PERIOD
        );
    }

    child.start_kill().map_err(kill_error)?;
    match timeout(KILL_GRACE_PERIOD, child.wait()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(kill_error(e)),
        Err(_) => Err(CompileError::KillFailed(format!(
            "process {:?} still alive after forceful kill",
            child.id()
        ))),
    }
}

/// Ask the child to exit. Returns false when no graceful signal exists.
#[cfg(unix)]
fn send_terminate(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("SIGTERM to {} failed: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(_child: &Child) -> bool {
    false
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    command.creation_flags(DETACHED_PROCESS);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}
