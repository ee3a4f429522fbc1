//! Maps the host OS and CPU architecture onto Tweego's release naming scheme.
//!
//! Supported matrix is `{linux, macos, windows} × {x86, x64}`. ARM hosts on
//! macOS and Windows get the x64 build (Rosetta 2 / Windows emulation) with a
//! warning; any other combination is an error.

use crate::error::SetupError;

const RELEASE_URL_BASE: &str = "https://github.com/tmedwards/tweego/releases/download";

/// Operating system token used in release archive names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOs {
    Linux,
    MacOs,
    Windows,
}

impl ReleaseOs {
    pub fn token(self) -> &'static str {
        match self {
            ReleaseOs::Linux => "linux",
            ReleaseOs::MacOs => "macos",
            ReleaseOs::Windows => "windows",
        }
    }
}

/// Architecture token used in release archive names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseArch {
    X86,
    X64,
}

impl ReleaseArch {
    pub fn token(self) -> &'static str {
        match self {
            ReleaseArch::X86 => "x86",
            ReleaseArch::X64 => "x64",
        }
    }
}

/// A host resolved to one of the published Tweego builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: ReleaseOs,
    pub arch: ReleaseArch,
    /// True when the x64 build will run under emulation on an ARM host
    pub emulated: bool,
}

impl Platform {
    /// Resolve the platform this process is running on
    pub fn detect() -> Result<Self, SetupError> {
        Self::resolve(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Resolve an `(os, arch)` pair as reported by `std::env::consts`
    pub fn resolve(os: &str, arch: &str) -> Result<Self, SetupError> {
        let unsupported = || SetupError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };

        let release_os = match os {
            "linux" => ReleaseOs::Linux,
            "macos" => ReleaseOs::MacOs,
            "windows" => ReleaseOs::Windows,
            _ => return Err(unsupported()),
        };

        let (release_arch, emulated) = match arch {
            "x86" => (ReleaseArch::X86, false),
            "x86_64" => (ReleaseArch::X64, false),
            "arm" | "aarch64" => match release_os {
                ReleaseOs::MacOs => {
                    tracing::warn!(
                        "This is an ARM macOS device. Tweego needs Rosetta 2 to run; highly untested, use at your own risk"
                    );
                    (ReleaseArch::X64, true)
                }
                ReleaseOs::Windows => {
                    tracing::warn!(
                        "This is a Windows on ARM device. Tweego needs x64 emulation to run; highly untested, use at your own risk"
                    );
                    (ReleaseArch::X64, true)
                }
                ReleaseOs::Linux => return Err(unsupported()),
            },
            _ => return Err(unsupported()),
        };

        Ok(Self {
            os: release_os,
            arch: release_arch,
            emulated,
        })
    }

    /// Name of the release archive for `version`
    pub fn archive_name(&self, version: &str) -> String {
        format!(
            "tweego-{}-{}-{}.zip",
            version,
            self.os.token(),
            self.arch.token()
        )
    }

    /// Download URL of the release archive for `version`
    pub fn download_url(&self, version: &str) -> String {
        format!(
            "{}/v{}/{}",
            RELEASE_URL_BASE,
            version,
            self.archive_name(version)
        )
    }
}

/// Download URL for `version` on the current host
pub fn resolve_download_url(version: &str) -> Result<String, SetupError> {
    Ok(Platform::detect()?.download_url(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MATRIX: [(&str, &str, &str, &str); 6] = [
        ("linux", "x86", "linux", "x86"),
        ("linux", "x86_64", "linux", "x64"),
        ("macos", "x86", "macos", "x86"),
        ("macos", "x86_64", "macos", "x64"),
        ("windows", "x86", "windows", "x86"),
        ("windows", "x86_64", "windows", "x64"),
    ];

    #[test]
    fn test_download_url_linux_x64() {
        let platform = Platform::resolve("linux", "x86_64").unwrap();
        assert_eq!(
            platform.download_url("2.1.1"),
            "https://github.com/tmedwards/tweego/releases/download/v2.1.1/tweego-2.1.1-linux-x64.zip"
        );
        assert!(!platform.emulated);
    }

    #[test]
    fn test_arm_mac_and_windows_fall_back_to_x64() {
        for os in ["macos", "windows"] {
            for arch in ["arm", "aarch64"] {
                let platform = Platform::resolve(os, arch).unwrap();
                assert_eq!(platform.arch, ReleaseArch::X64);
                assert!(platform.emulated);
            }
        }
    }

    #[test]
    fn test_arm_linux_is_unsupported() {
        let err = Platform::resolve("linux", "aarch64").unwrap_err();
        assert!(matches!(err, SetupError::UnsupportedPlatform { .. }));
        assert!(err.to_string().contains("linux (aarch64)"));
    }

    #[test]
    fn test_unknown_os_is_unsupported() {
        for (os, arch) in [("freebsd", "x86_64"), ("android", "aarch64"), ("linux", "riscv64")] {
            assert!(matches!(
                Platform::resolve(os, arch),
                Err(SetupError::UnsupportedPlatform { .. })
            ));
        }
    }

    #[test]
    fn test_archive_name_matches_url_tail() {
        let platform = Platform::resolve("windows", "x86").unwrap();
        let url = platform.download_url("2.1.0");
        assert!(url.ends_with(&platform.archive_name("2.1.0")));
        assert_eq!(platform.archive_name("2.1.0"), "tweego-2.1.0-windows-x86.zip");
    }

    proptest! {
        #[test]
        fn prop_url_contains_each_token_once(
            index in 0usize..MATRIX.len(),
            version in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
        ) {
            let (os, arch, os_token, arch_token) = MATRIX[index];
            let url = Platform::resolve(os, arch).unwrap().download_url(&version);

            prop_assert_eq!(url.matches(os_token).count(), 1);
            prop_assert_eq!(url.matches(arch_token).count(), 1);
            prop_assert!(url.contains(&version));
        }

        #[test]
        fn prop_unknown_os_always_fails(
            os in "[a-z]{3,10}".prop_filter("supported os", |os| {
                !matches!(os.as_str(), "linux" | "macos" | "windows")
            }),
            arch in prop::sample::select(vec!["x86", "x86_64", "arm", "aarch64"]),
        ) {
            let is_unsupported = matches!(
                Platform::resolve(&os, arch),
                Err(SetupError::UnsupportedPlatform { .. })
            );
            prop_assert!(is_unsupported);
        }
    }
}
