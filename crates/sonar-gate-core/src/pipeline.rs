use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::gate::{GateReport, GateStatus, QualityGatePoller};
use crate::platform::Platform;
use crate::scanner::download::ScannerDownloader;
use crate::scanner::runner::{run_scanner, ScanInvocation};
use crate::scanner::ScannerLayout;
use crate::server::{ProbeOutcome, SonarClient};
use crate::settings::ScanSettings;

/// Non-fatal result of a complete run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The scan ran and the quality-gate check was disabled.
    GateSkipped,
    /// The scan ran and polling reached a terminal state.
    Gate(GateReport),
}

impl RunOutcome {
    /// Whether the process should exit successfully. Only a failed gate does not.
    pub fn is_success(&self) -> bool {
        match self {
            Self::GateSkipped => true,
            Self::Gate(report) => report.status != GateStatus::Failed,
        }
    }
}

/// Run the whole procedure on the current host.
pub async fn run(settings: &ScanSettings) -> Result<RunOutcome> {
    run_on_host(settings, std::env::consts::OS, std::env::consts::ARCH).await
}

/// Run the whole procedure for the given kernel and architecture names.
///
/// Steps, in order: platform detection, validation, optional connectivity
/// probe, scanner acquisition, scan, then (unless disabled) authentication
/// check and quality-gate polling. Every fatal condition is returned as an
/// error; nothing touches the filesystem or network before the first two
/// steps succeed.
#[instrument(skip_all, fields(project = %settings.project_key))]
pub async fn run_on_host(settings: &ScanSettings, os: &str, arch: &str) -> Result<RunOutcome> {
    let platform = Platform::from_names(os, arch)?;
    info!(%platform, "detected platform");

    settings.validate()?;

    let client = SonarClient::new(settings.host_base(), &settings.token)?;
    if settings.skip_connectivity_test {
        info!("skipping connectivity test");
    } else {
        probe_server(&client, settings.host_base()).await;
    }

    let layout = ScannerLayout::new(&settings.cache_dir, &settings.scanner_version, platform);
    let executable = ScannerDownloader::new(&settings.download_base_url)?
        .ensure_installed(&layout)
        .await
        .context("failed to prepare sonar-scanner")?;

    let invocation = ScanInvocation {
        project_key: &settings.project_key,
        host_url: settings.host_base(),
        token: &settings.token,
    };
    run_scanner(&executable, &settings.project_dir, &invocation).await?;

    if settings.skip_quality_gate_check {
        info!("skipping quality gate check");
        return Ok(RunOutcome::GateSkipped);
    }

    client
        .validate_authentication()
        .await
        .context("authentication check failed; cannot query the quality gate")?;
    info!("token accepted by analysis server");

    let poller = QualityGatePoller::new(settings.max_attempts, settings.poll_interval);
    let report = poller.poll(&client, &settings.project_key).await?;
    Ok(RunOutcome::Gate(report))
}

async fn probe_server(client: &SonarClient, host: &str) {
    match client.probe().await {
        ProbeOutcome::Reachable(status) => info!(
            host,
            status = status.status.as_deref().unwrap_or("unknown"),
            version = status.version.as_deref().unwrap_or("unknown"),
            "analysis server reachable"
        ),
        ProbeOutcome::Unexpected(code) => warn!(
            host,
            code, "analysis server answered the status probe with a non-200 code; continuing"
        ),
        ProbeOutcome::Unreachable(reason) => warn!(
            host,
            %reason,
            "analysis server did not answer the status probe; continuing"
        ),
    }
}
