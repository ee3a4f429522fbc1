use crate::error::{CompileError, summarize_message};
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Substring of the banner Tweego prints to stderr for `--version`
pub const VERSION_BANNER: &str = "tweego, version";

/// How long `--version` may take before the binary is considered broken
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Confirms the installed binary is a working Tweego
///
/// No result is cached: the compiler re-verifies before every run.
#[derive(Debug, Clone)]
pub struct BinaryVerifier {
    binary: Utf8PathBuf,
    timeout: Duration,
}

impl BinaryVerifier {
    pub fn new<P: AsRef<Utf8Path>>(binary: P) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            timeout: VERIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Utf8Path {
        &self.binary
    }

    /// Run the binary with `--version` and look for [`VERSION_BANNER`] on stderr.
    ///
    /// Returns `Ok(false)` when the program runs but is not Tweego (or hangs);
    /// `Err(SpawnFailed)` only when it cannot be launched at all.
    pub async fn verify(&self) -> Result<bool, CompileError> {
        ensure_executable(&self.binary)?;

        let mut child = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CompileError::SpawnFailed(summarize_message(&format!("{}: {}", self.binary, e)))
            })?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompileError::StreamError("stderr was not captured".to_string()))?;

        let run = async {
            let mut banner = Vec::new();
            stderr.read_to_end(&mut banner).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((String::from_utf8_lossy(&banner).into_owned(), status))
        };

        let outcome = timeout(self.timeout, run).await;
        let (banner, status) = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!("Failed reading {} --version output: {}", self.binary, e);
                return Ok(false);
            }
            Err(_) => {
                tracing::warn!(
                    "{} --version did not finish within {:?}",
                    self.binary,
                    self.timeout
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Ok(false);
            }
        };

        let verified = banner.contains(VERSION_BANNER);
        if verified {
            tracing::debug!("Verified {}: {}", self.binary, banner.trim());
        } else {
            tracing::warn!(
                "{} is not a working Tweego binary (exit {:?}): {}",
                self.binary,
                status.code(),
                banner.lines().next().unwrap_or_default()
            );
        }

        Ok(verified)
    }
}

/// Force the executable bit; zip extraction does not always keep it.
#[cfg(unix)]
fn ensure_executable(binary: &Utf8Path) -> Result<(), CompileError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(binary)
        .map_err(|e| CompileError::SpawnFailed(format!("{}: {}", binary, e)))?;

    let mut permissions = metadata.permissions();
    if permissions.mode() & 0o111 != 0o111 {
        permissions.set_mode(permissions.mode() | 0o755);
        std::fs::set_permissions(binary, permissions)
            .map_err(|e| CompileError::SpawnFailed(format!("{}: {}", binary, e)))?;
        tracing::debug!("Marked {} as executable", binary);
    }

    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(binary: &Utf8Path) -> Result<(), CompileError> {
    if binary.is_file() {
        Ok(())
    } else {
        Err(CompileError::SpawnFailed(format!("{}: not found", binary)))
    }
}
