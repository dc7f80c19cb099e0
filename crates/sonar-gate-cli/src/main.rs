use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use sonar_gate_core::{render_report, OutputFormat, RunOutcome, ScanSettings, SettingsLayer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sonar-gate",
    author,
    version,
    about = "Run a SonarQube analysis and report the quality gate verdict"
)]
struct Cli {
    /// Optional TOML or YAML file with default settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scanner CLI version to download (N.N.N.N)
    #[arg(long = "sonar-scanner-version", value_name = "VERSION")]
    scanner_version: Option<String>,

    /// Project key on the analysis server
    #[arg(long = "project-key", value_name = "KEY")]
    project_key: Option<String>,

    /// Base URL of the analysis server
    #[arg(long = "sonar-host-url", value_name = "URL")]
    host_url: Option<String>,

    /// Authentication token
    #[arg(
        long = "sonar-token",
        value_name = "TOKEN",
        env = "SONAR_TOKEN",
        hide_env_values = true
    )]
    token: Option<String>,

    /// Directory to analyse
    #[arg(long = "project-dir", value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Do not probe the server before scanning
    #[arg(long = "skip-connectivity-test")]
    skip_connectivity_test: bool,

    /// Do not wait for the quality gate after scanning
    #[arg(long = "skip-quality-gate-check")]
    skip_quality_gate_check: bool,

    /// Where downloaded scanner distributions are cached
    #[arg(long = "cache-dir", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Verdict output format (human or json)
    #[arg(long, value_name = "FORMAT")]
    output: Option<OutputFormat>,
}

impl Cli {
    fn layer(&self) -> SettingsLayer {
        SettingsLayer {
            scanner_version: self.scanner_version.clone(),
            project_key: self.project_key.clone(),
            host_url: self.host_url.clone(),
            token: self.token.clone(),
            project_dir: self.project_dir.clone(),
            skip_connectivity_test: self.skip_connectivity_test.then_some(true),
            skip_quality_gate_check: self.skip_quality_gate_check.then_some(true),
            cache_dir: self.cache_dir.clone(),
            output: self.output,
            ..SettingsLayer::default()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage errors exit 1; --help and --version exit 0.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let settings = ScanSettings::load(cli.config.as_deref(), &cli.layer())?;
    tracing::debug!(?settings, "resolved settings");
    let outcome = sonar_gate_core::run(&settings).await?;
    report(&settings, &outcome)
}

fn report(settings: &ScanSettings, outcome: &RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::GateSkipped => {
            println!(
                "✓ Analysis of {} completed (quality gate check skipped)",
                settings.project_key
            );
            Ok(())
        }
        RunOutcome::Gate(gate) => {
            let rendered = render_report(gate, settings.output)?;
            println!("{}", rendered.trim_end());
            if !outcome.is_success() {
                bail!("quality gate failed for project {}", gate.project_key);
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
