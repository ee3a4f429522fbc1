//! Generic HTTP-to-file download and zip-to-directory extraction.
//!
//! No knowledge of Tweego lives here; [`SetupManager`](super::SetupManager)
//! drives these operations through the [`Transport`] trait so tests can
//! substitute a mock and count calls.

use crate::error::SetupError;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io;

/// Network and archive operations needed by setup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and store the body at `destination`, creating parent
    /// directories. Nothing is left at `destination` on failure.
    async fn download(&self, url: &str, destination: &Utf8Path) -> Result<(), SetupError>;

    /// Materialize every entry of the zip at `archive` under `destination`
    async fn extract_archive(
        &self,
        archive: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), SetupError>;
}

/// [`Transport`] backed by `reqwest` and the `zip` crate
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn download(&self, url: &str, destination: &Utf8Path) -> Result<(), SetupError> {
        tracing::info!("Downloading {} -> {}", url, destination);

        let failed = |reason: String| SetupError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("server responded with {}", status)));
        }

        let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SetupError::io(parent, e))?;
        }

        // Full body is in memory; stage it next to the target and rename so a
        // failed write never leaves a truncated file at `destination`.
        let partial = Utf8PathBuf::from(format!("{}.part", destination));
        if let Err(e) = tokio::fs::write(&partial, &body).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SetupError::io(&partial, e));
        }
        if let Err(e) = tokio::fs::rename(&partial, destination).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SetupError::io(destination, e));
        }

        tracing::debug!("Downloaded {} bytes to {}", body.len(), destination);
        Ok(())
    }

    async fn extract_archive(
        &self,
        archive: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), SetupError> {
        let archive_path = archive.to_path_buf();
        let destination = destination.to_path_buf();

        tokio::task::spawn_blocking(move || extract_zip(&archive_path, &destination))
            .await
            .map_err(|e| SetupError::ExtractionFailed {
                archive: archive.to_path_buf(),
                reason: e.to_string(),
            })?
    }
}

/// Blocking zip extraction, preserving relative paths and POSIX modes
pub fn extract_zip(archive: &Utf8Path, destination: &Utf8Path) -> Result<(), SetupError> {
    tracing::info!("Extracting {} -> {}", archive, destination);

    let failed = |reason: String| SetupError::ExtractionFailed {
        archive: archive.to_path_buf(),
        reason,
    };

    let file = File::open(archive).map_err(|e| failed(e.to_string()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| failed(e.to_string()))?;

    fs::create_dir_all(destination).map_err(|e| SetupError::io(destination, e))?;

    let mut extracted = 0usize;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| failed(e.to_string()))?;

        let relative = entry
            .enclosed_name()
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
            .ok_or_else(|| failed(format!("unsafe entry name: {}", entry.name())))?;
        let target = destination.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| SetupError::io(&target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| SetupError::io(parent, e))?;
        }

        let mut out = File::create(&target).map_err(|e| SetupError::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| failed(format!("{}: {}", relative, e)))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| SetupError::io(&target, e))?;
        }

        extracted += 1;
    }

    tracing::debug!("Extracted {} files from {}", extracted, archive);
    Ok(())
}
