use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tracing::{info, warn};

use super::{is_executable, ScannerLayout};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Fetches and unpacks scanner distributions into the cache directory.
#[derive(Debug, Clone)]
pub struct ScannerDownloader {
    http: Client,
    base_url: String,
}

impl ScannerDownloader {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sonar-gate/", env!("CARGO_PKG_VERSION")))
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context("failed to build download HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Return the path of a ready-to-run scanner, downloading it first if the
    /// cache does not already hold an executable for this layout.
    ///
    /// A cache hit performs no network request. On any failure the temporary
    /// download directory and the partially populated install directory are
    /// removed before the error is returned.
    pub async fn ensure_installed(&self, layout: &ScannerLayout) -> Result<PathBuf> {
        let executable = layout.executable();
        if is_executable(&executable) {
            info!(path = %executable.display(), "reusing cached scanner");
            return Ok(executable);
        }

        info!(dist = %layout.dist_name(), "scanner not cached; downloading");
        if let Err(err) = self.install(layout).await {
            cleanup(layout);
            return Err(err);
        }
        info!(path = %executable.display(), "scanner installed");
        Ok(executable)
    }

    async fn install(&self, layout: &ScannerLayout) -> Result<()> {
        let download_dir = layout.download_dir();
        fs::create_dir_all(layout.cache_dir()).with_context(|| {
            format!(
                "failed to create cache directory {}",
                layout.cache_dir().display()
            )
        })?;
        fs::create_dir_all(&download_dir).with_context(|| {
            format!(
                "failed to create download directory {}",
                download_dir.display()
            )
        })?;

        let archive = download_dir.join(layout.archive_name());
        let url = layout.archive_url(&self.base_url);
        self.fetch(&url, &archive).await?;

        let size = fs::metadata(&archive)
            .with_context(|| format!("downloaded archive missing at {}", archive.display()))?
            .len();
        if size == 0 {
            bail!("downloaded archive from {url} is empty");
        }

        extract_archive(&archive, layout.cache_dir())?;

        let executable = layout.executable();
        if !executable.is_file() {
            bail!(
                "scanner executable not found at {} after extracting {}",
                executable.display(),
                layout.archive_name()
            );
        }
        mark_executable(&executable)?;

        fs::remove_dir_all(&download_dir).with_context(|| {
            format!(
                "failed to remove download directory {}",
                download_dir.display()
            )
        })?;
        Ok(())
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to download scanner from {url}"))?;
        if !response.status().is_success() {
            bail!("scanner download from {url} failed with HTTP {}", response.status());
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read scanner download from {url}"))?;
        tokio::fs::write(destination, &bytes)
            .await
            .with_context(|| format!("failed to write {}", destination.display()))?;
        Ok(())
    }
}

fn extract_archive(archive: &Path, destination: &Path) -> Result<()> {
    let file = fs::File::open(archive)
        .with_context(|| format!("failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid zip archive", archive.display()))?;
    zip.extract(destination).with_context(|| {
        format!(
            "failed to extract {} into {}",
            archive.display(),
            destination.display()
        )
    })?;
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn cleanup(layout: &ScannerLayout) {
    for dir in [layout.download_dir(), layout.install_dir()] {
        if !dir.exists() {
            continue;
        }
        if let Err(err) = fs::remove_dir_all(&dir) {
            warn!(path = %dir.display(), error = %err, "failed to clean up partial download");
        }
    }
}
