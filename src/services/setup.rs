use crate::error::SetupError;
use crate::models::{InstallManifest, SetupConfig, StatePaths, StoryFormatSpec};
use crate::services::platform::Platform;
use crate::services::transport::{HttpTransport, Transport};
use camino::{Utf8Path, Utf8PathBuf};
use tokio::fs;

/// Canonical file name for single-script story formats
pub const FORMAT_SCRIPT_NAME: &str = "format.js";

/// What [`SetupManager::ensure_setup`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// A manifest from an earlier successful run was found; nothing was touched
    AlreadyInstalled,
    Installed,
}

/// Installs the Tweego binary and story formats into the state directory
///
/// Steps run strictly in order because each consumes the previous step's
/// output on disk: download archive, extract it, fetch formats, write the
/// manifest. Any error aborts the sequence.
pub struct SetupManager<T: Transport = HttpTransport> {
    transport: T,
    paths: StatePaths,
    config: SetupConfig,
}

impl SetupManager<HttpTransport> {
    /// Manager using the real HTTP transport
    pub fn new(config: SetupConfig, paths: StatePaths) -> Self {
        Self::with_transport(HttpTransport::new(), config, paths)
    }
}

impl<T: Transport> SetupManager<T> {
    pub fn with_transport(transport: T, config: SetupConfig, paths: StatePaths) -> Self {
        Self {
            transport,
            paths,
            config,
        }
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    /// Run the full setup unless an earlier run finished successfully.
    ///
    /// Completion is judged by the install manifest, not by the state
    /// directory existing, so a half-finished run is retried.
    pub async fn ensure_setup(&self) -> Result<SetupOutcome, SetupError> {
        if self.paths.is_setup_complete() {
            tracing::debug!(
                "Setup already complete ({} present), skipping",
                self.paths.manifest()
            );
            return Ok(SetupOutcome::AlreadyInstalled);
        }

        tracing::info!(
            "Setting up Tweego v{} in {}",
            self.config.binary_version,
            self.paths.root()
        );

        fs::create_dir_all(self.paths.root())
            .await
            .map_err(|e| SetupError::io(self.paths.root(), e))?;

        let url = self.download_binary().await?;
        self.extract_binary().await?;

        if !self.config.formats.is_empty() || self.config.clean_builtin_formats {
            self.download_formats().await?;
        }

        self.write_manifest(url).await?;

        tracing::info!("Tweego setup complete");
        Ok(SetupOutcome::Installed)
    }

    /// Forget a previous installation so the next `ensure_setup` runs again
    pub async fn reset(&self) -> Result<(), SetupError> {
        let manifest = self.paths.manifest();
        match fs::remove_file(&manifest).await {
            Ok(()) => {
                tracing::info!("Removed install manifest {}", manifest);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SetupError::io(manifest, e)),
        }
    }

    /// URL of the binary archive: the custom URL when set, else the official
    /// release for this host
    pub fn binary_url(&self) -> Result<String, SetupError> {
        match self.config.custom_url() {
            Some(url) => Ok(url.to_string()),
            None => Ok(Platform::detect()?.download_url(&self.config.binary_version)),
        }
    }

    /// Where the downloaded binary archive is stored
    pub fn archive_path(&self) -> Result<Utf8PathBuf, SetupError> {
        let url = self.binary_url()?;
        Ok(self.paths.root().join(file_name_from_url(&url, "tweego.zip")))
    }

    /// Download the binary archive into the state directory.
    ///
    /// Returns the URL that was fetched.
    pub async fn download_binary(&self) -> Result<String, SetupError> {
        let url = self.binary_url()?;
        let archive = self.archive_path()?;

        self.transport.download(&url, &archive).await?;
        Ok(url)
    }

    /// Extract the downloaded archive into the state directory, then delete it
    pub async fn extract_binary(&self) -> Result<(), SetupError> {
        let archive = self.archive_path()?;

        self.transport
            .extract_archive(&archive, self.paths.root())
            .await?;

        fs::remove_file(&archive)
            .await
            .map_err(|e| SetupError::io(&archive, e))?;

        tracing::info!("Extracted Tweego to {}", self.paths.root());
        Ok(())
    }

    /// Download every configured story format.
    ///
    /// With `clean_builtin_formats` set, `storyformats/` is emptied first,
    /// removing the formats bundled in the Tweego archive.
    pub async fn download_formats(&self) -> Result<(), SetupError> {
        let formats_dir = self.paths.story_formats();

        if self.config.clean_builtin_formats {
            tracing::info!("Removing built-in story formats from {}", formats_dir);
            empty_dir(&formats_dir).await?;
        }

        for format in &self.config.formats {
            self.download_format(format, &formats_dir).await?;
        }

        Ok(())
    }

    async fn download_format(
        &self,
        format: &StoryFormatSpec,
        formats_dir: &Utf8Path,
    ) -> Result<(), SetupError> {
        tracing::info!(
            "Installing story format {} {}",
            format.name,
            format.version.as_deref().unwrap_or("")
        );

        let downloaded_name = file_name_from_url(&format.source_url, FORMAT_SCRIPT_NAME);
        let is_zip = downloaded_name.to_ascii_lowercase().ends_with(".zip");
        let final_name = if is_zip {
            downloaded_name
        } else {
            FORMAT_SCRIPT_NAME.to_string()
        };

        let target_dir = if format.create_dedicated_folder {
            let dir = formats_dir.join(&format.name);
            remove_path(&dir).await?;
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| SetupError::io(&dir, e))?;
            dir
        } else {
            fs::create_dir_all(formats_dir)
                .await
                .map_err(|e| SetupError::io(formats_dir, e))?;
            remove_path(&formats_dir.join(&format.name)).await?;
            formats_dir.to_path_buf()
        };

        let destination = target_dir.join(&final_name);
        self.transport
            .download(&format.source_url, &destination)
            .await?;

        if is_zip {
            self.transport
                .extract_archive(&destination, &target_dir)
                .await?;
            fs::remove_file(&destination)
                .await
                .map_err(|e| SetupError::io(&destination, e))?;
        }

        Ok(())
    }

    async fn write_manifest(&self, binary_url: String) -> Result<(), SetupError> {
        let manifest = InstallManifest {
            binary_version: self.config.binary_version.clone(),
            binary_url,
            formats: self.config.formats.iter().map(|f| f.name.clone()).collect(),
            installed_at: chrono::Local::now().to_rfc3339(),
        };

        let path = self.paths.manifest();
        let yaml = serde_yaml_ng::to_string(&manifest).map_err(|e| {
            SetupError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        fs::write(&path, yaml)
            .await
            .map_err(|e| SetupError::io(&path, e))
    }
}

/// Last path segment of `url`, without query or fragment
fn file_name_from_url(url: &str, fallback: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && !name.contains(':') => name.to_string(),
        _ => fallback.to_string(),
    }
}

/// Remove a file or directory if present
async fn remove_path(path: &Utf8Path) -> Result<(), SetupError> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SetupError::io(path, e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|e| SetupError::io(path, e))
}

/// Delete everything inside `dir`, creating it if missing
async fn empty_dir(dir: &Utf8Path) -> Result<(), SetupError> {
    remove_path(dir).await?;
    fs::create_dir_all(dir)
        .await
        .map_err(|e| SetupError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::MockTransport;
    use mockall::Sequence;
    use std::fs as std_fs;
    use tempfile::TempDir;

    const CUSTOM_URL: &str = "https://example.com/releases/tweego-custom.zip";

    fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    fn config_with(formats: Vec<StoryFormatSpec>) -> SetupConfig {
        SetupConfig {
            custom_binary_url: Some(CUSTOM_URL.to_string()),
            formats,
            ..Default::default()
        }
    }

    /// Mock that writes a placeholder file for every download and a fake
    /// binary for every extraction.
    fn writing_transport() -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_download().returning(|_url, dest| {
            std_fs::write(dest, b"payload").unwrap();
            Ok(())
        });
        transport.expect_extract_archive().returning(|_archive, dest| {
            std_fs::write(dest.join("extracted.marker"), b"").unwrap();
            Ok(())
        });
        transport
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://a.b/c/sugarcube.zip?x=1", "f"),
            "sugarcube.zip"
        );
        assert_eq!(file_name_from_url("https://a.b/c/", "format.js"), "format.js");
        assert_eq!(file_name_from_url("https://a.b/harlowe.js#top", "f"), "harlowe.js");
    }

    #[test]
    fn test_custom_url_drives_archive_path() {
        let (_temp, root) = utf8_temp_dir();
        let manager = SetupManager::with_transport(
            MockTransport::new(),
            config_with(vec![]),
            StatePaths::new(&root),
        );

        assert_eq!(manager.binary_url().unwrap(), CUSTOM_URL);
        assert_eq!(manager.archive_path().unwrap(), root.join("tweego-custom.zip"));
    }

    #[tokio::test]
    async fn test_ensure_setup_runs_steps_in_order() {
        let (_temp, root) = utf8_temp_dir();
        let state = root.join(".tweenode");
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();

        let archive = state.join("tweego-custom.zip");
        let expected_archive = archive.clone();
        transport
            .expect_download()
            .withf(move |url, dest| url == CUSTOM_URL && dest == expected_archive.as_path())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, dest| {
                std_fs::write(dest, b"zip").unwrap();
                Ok(())
            });
        transport
            .expect_extract_archive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let manager =
            SetupManager::with_transport(transport, config_with(vec![]), StatePaths::new(&state));

        let outcome = manager.ensure_setup().await.unwrap();

        assert_eq!(outcome, SetupOutcome::Installed);
        assert!(!archive.exists(), "archive must be deleted after extraction");
        assert!(manager.paths().is_setup_complete());
    }

    #[tokio::test]
    async fn test_ensure_setup_is_idempotent() {
        let (_temp, root) = utf8_temp_dir();
        let state = root.join(".tweenode");

        let first = SetupManager::with_transport(
            writing_transport(),
            config_with(vec![]),
            StatePaths::new(&state),
        );
        assert_eq!(first.ensure_setup().await.unwrap(), SetupOutcome::Installed);

        // No expectations: any network or extraction call panics the mock
        let mut transport = MockTransport::new();
        transport.expect_download().times(0);
        transport.expect_extract_archive().times(0);
        let second =
            SetupManager::with_transport(transport, config_with(vec![]), StatePaths::new(&state));

        assert_eq!(
            second.ensure_setup().await.unwrap(),
            SetupOutcome::AlreadyInstalled
        );
    }

    #[tokio::test]
    async fn test_half_finished_state_dir_is_retried() {
        let (_temp, root) = utf8_temp_dir();
        let state = root.join(".tweenode");
        std_fs::create_dir_all(&state).unwrap();

        let manager = SetupManager::with_transport(
            writing_transport(),
            config_with(vec![]),
            StatePaths::new(&state),
        );

        assert_eq!(manager.ensure_setup().await.unwrap(), SetupOutcome::Installed);
    }

    #[tokio::test]
    async fn test_download_failure_aborts_setup() {
        let (_temp, root) = utf8_temp_dir();
        let mut transport = MockTransport::new();
        transport.expect_download().times(1).returning(|url, _| {
            Err(SetupError::DownloadFailed {
                url: url.to_string(),
                reason: "server responded with 404 Not Found".to_string(),
            })
        });
        transport.expect_extract_archive().times(0);

        let manager =
            SetupManager::with_transport(transport, config_with(vec![]), StatePaths::new(&root));

        let err = manager.ensure_setup().await.unwrap_err();
        assert!(matches!(err, SetupError::DownloadFailed { .. }));
        assert!(!manager.paths().is_setup_complete());
    }

    #[tokio::test]
    async fn test_script_format_renamed_into_dedicated_folder() {
        let (_temp, root) = utf8_temp_dir();
        let paths = StatePaths::new(&root);
        let stale = paths.story_formats().join("harlowe-3");
        std_fs::create_dir_all(&stale).unwrap();
        std_fs::write(stale.join("old.js"), b"old").unwrap();

        let format = StoryFormatSpec::new(
            "harlowe-3",
            "3.3.9",
            "https://twine2.neocities.org/harlowe-3.3.9.js",
            true,
        );
        let manager =
            SetupManager::with_transport(writing_transport(), config_with(vec![format]), paths.clone());

        manager.download_formats().await.unwrap();

        let dir = paths.story_formats().join("harlowe-3");
        assert!(dir.join("format.js").is_file());
        assert!(!dir.join("old.js").exists(), "dedicated folder is recreated");
        assert!(!dir.join("harlowe-3.3.9.js").exists());
    }

    #[tokio::test]
    async fn test_zip_format_extracted_and_removed() {
        let (_temp, root) = utf8_temp_dir();
        let paths = StatePaths::new(&root);
        let stale = paths.story_formats().join("sugarcube-2");
        std_fs::create_dir_all(&stale).unwrap();

        let format = StoryFormatSpec::new(
            "sugarcube-2",
            "2.37.3",
            "https://example.com/sugarcube-2.37.3.zip",
            false,
        );
        let manager =
            SetupManager::with_transport(writing_transport(), config_with(vec![format]), paths.clone());

        manager.download_formats().await.unwrap();

        let formats_dir = paths.story_formats();
        assert!(!formats_dir.join("sugarcube-2.37.3.zip").exists());
        assert!(
            !formats_dir.join("sugarcube-2").exists(),
            "stale folder removed before download"
        );
        assert!(formats_dir.join("extracted.marker").exists());
    }

    #[tokio::test]
    async fn test_clean_builtin_formats_empties_directory() {
        let (_temp, root) = utf8_temp_dir();
        let paths = StatePaths::new(&root);
        let builtin = paths.story_formats().join("snowman-2");
        std_fs::create_dir_all(&builtin).unwrap();
        std_fs::write(builtin.join("format.js"), b"builtin").unwrap();

        let config = SetupConfig {
            clean_builtin_formats: true,
            ..config_with(vec![])
        };
        let mut transport = MockTransport::new();
        transport.expect_download().times(0);
        let manager = SetupManager::with_transport(transport, config, paths.clone());

        manager.download_formats().await.unwrap();

        assert!(paths.story_formats().is_dir());
        assert_eq!(std_fs::read_dir(paths.story_formats()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_reset_forces_rerun() {
        let (_temp, root) = utf8_temp_dir();
        let manager = SetupManager::with_transport(
            writing_transport(),
            config_with(vec![]),
            StatePaths::new(&root),
        );

        manager.ensure_setup().await.unwrap();
        manager.reset().await.unwrap();
        assert!(!manager.paths().is_setup_complete());

        // Resetting twice is fine
        manager.reset().await.unwrap();
        assert_eq!(manager.ensure_setup().await.unwrap(), SetupOutcome::Installed);
    }
}
