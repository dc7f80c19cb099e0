use std::fs;
use std::path::{Path, PathBuf};

use crate::platform::Platform;

pub mod download;
pub mod runner;

/// Name of the working directory the scanner leaves in the analysed project.
pub const SCANNER_WORK_DIR: &str = ".scannerwork";

const DOWNLOAD_DIR: &str = ".download-tmp";

/// On-disk layout of one scanner version inside the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerLayout {
    cache_dir: PathBuf,
    version: String,
    platform: Platform,
}

impl ScannerLayout {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        version: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            version: version.into(),
            platform,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `sonar-scanner-{version}-{os}-{arch}`, the top-level directory inside the archive.
    pub fn dist_name(&self) -> String {
        format!("sonar-scanner-{}-{}", self.version, self.platform)
    }

    pub fn install_dir(&self) -> PathBuf {
        self.cache_dir.join(self.dist_name())
    }

    pub fn executable(&self) -> PathBuf {
        self.install_dir().join("bin").join("sonar-scanner")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.cache_dir.join(DOWNLOAD_DIR)
    }

    pub fn archive_name(&self) -> String {
        format!("sonar-scanner-cli-{}-{}.zip", self.version, self.platform)
    }

    pub fn archive_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.archive_name())
    }
}

/// True when `path` is a regular file with an execute bit set.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ScannerLayout {
        let platform = Platform::from_names("Linux", "x86_64").unwrap();
        ScannerLayout::new("/cache", "6.2.1.4610", platform)
    }

    #[test]
    fn paths_follow_distribution_naming() {
        let layout = layout();
        assert_eq!(layout.dist_name(), "sonar-scanner-6.2.1.4610-linux-x64");
        assert_eq!(
            layout.executable(),
            PathBuf::from("/cache/sonar-scanner-6.2.1.4610-linux-x64/bin/sonar-scanner")
        );
        assert_eq!(layout.download_dir(), PathBuf::from("/cache/.download-tmp"));
    }

    #[test]
    fn archive_url_joins_base_without_double_slash() {
        assert_eq!(
            layout().archive_url("https://binaries.example.com/dist/"),
            "https://binaries.example.com/dist/sonar-scanner-cli-6.2.1.4610-linux-x64.zip"
        );
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_is_required() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("tool");
        fs::write(&file, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!is_executable(&file));
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&file));
        assert!(!is_executable(temp.path()));
    }
}
