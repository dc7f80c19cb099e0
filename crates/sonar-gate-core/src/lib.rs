pub mod gate;
pub mod pipeline;
pub mod platform;
pub mod report;
pub mod scanner;
pub mod server;
pub mod settings;

pub use gate::{
    GateCondition, GateError, GateReport, GateStatus, ProjectStatus, ProjectStatusSource,
    QualityGatePoller, StatusFetch,
};
pub use pipeline::{run, run_on_host, RunOutcome};
pub use platform::{Arch, Os, Platform, PlatformError};
pub use report::{render_report, OutputFormat};
pub use scanner::{download::ScannerDownloader, ScannerLayout};
pub use server::{ProbeOutcome, SonarClient, SystemStatus};
pub use settings::{ScanSettings, SettingsError, SettingsLayer};
