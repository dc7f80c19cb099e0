use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

use super::SCANNER_WORK_DIR;

/// Parameters passed to the scanner for one analysis.
#[derive(Clone)]
pub struct ScanInvocation<'a> {
    pub project_key: &'a str,
    pub host_url: &'a str,
    pub token: &'a str,
}

impl ScanInvocation<'_> {
    /// The four `-D` properties understood by `sonar-scanner`. Sources are
    /// always the project directory itself.
    pub fn args(&self) -> Vec<String> {
        vec![
            format!("-Dsonar.projectKey={}", self.project_key),
            "-Dsonar.sources=.".to_string(),
            format!("-Dsonar.host.url={}", self.host_url),
            format!("-Dsonar.token={}", self.token),
        ]
    }
}

/// Run the scanner with `project_dir` as its working directory.
///
/// The scanner's `.scannerwork` directory is removed afterwards whether or not
/// the scan succeeded. A non-zero exit is an error.
pub async fn run_scanner(
    executable: &Path,
    project_dir: &Path,
    invocation: &ScanInvocation<'_>,
) -> Result<()> {
    let project_dir = project_dir.canonicalize().with_context(|| {
        format!(
            "failed to resolve project directory {}",
            project_dir.display()
        )
    })?;
    // Relative program paths are ambiguous once current_dir changes.
    let executable = executable
        .canonicalize()
        .with_context(|| format!("scanner executable missing at {}", executable.display()))?;
    info!(
        project = invocation.project_key,
        dir = %project_dir.display(),
        "running sonar-scanner"
    );

    let status = Command::new(&executable)
        .args(invocation.args())
        .current_dir(&project_dir)
        .status()
        .await;

    remove_work_dir(&project_dir);

    let status = status
        .with_context(|| format!("failed to launch scanner at {}", executable.display()))?;
    if !status.success() {
        bail!("sonar-scanner exited with {status}");
    }
    info!("scan finished");
    Ok(())
}

fn remove_work_dir(project_dir: &Path) {
    let work_dir = project_dir.join(SCANNER_WORK_DIR);
    if !work_dir.exists() {
        return;
    }
    if let Err(err) = fs::remove_dir_all(&work_dir) {
        warn!(path = %work_dir.display(), error = %err, "failed to remove scanner work directory");
    }
}
