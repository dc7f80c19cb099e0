use std::fmt::Write;
use std::str::FromStr;

use colored::Colorize;
use serde::Serialize;

use crate::gate::{GateCondition, GateReport, GateStatus};

/// Format styles supported when printing the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format `{other}` (expected human or json)")),
        }
    }
}

/// Produce a report string from a `GateReport` using the desired format.
pub fn render_report(report: &GateReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonReport::from(report))?),
    }
}

fn render_human(report: &GateReport) -> anyhow::Result<String> {
    let mut out = String::new();
    let headline = match report.status {
        GateStatus::Passed => format!("✓ Quality gate passed for {}", report.project_key)
            .green()
            .bold(),
        GateStatus::Warned => format!(
            "⚠ Quality gate passed with warnings for {}",
            report.project_key
        )
        .yellow()
        .bold(),
        GateStatus::Failed => format!("✗ Quality gate failed for {}", report.project_key)
            .red()
            .bold(),
        GateStatus::Unknown => format!(
            "? Analysis completed, quality gate status unknown for {} after {} attempt(s)",
            report.project_key, report.attempts
        )
        .cyan(),
    };
    writeln!(out, "{headline}")?;

    let conditions: Vec<&GateCondition> = report.relevant_conditions().collect();
    if !conditions.is_empty() {
        let label = match report.status {
            GateStatus::Failed => "Failed conditions:",
            _ => "Warning conditions:",
        };
        writeln!(out, "{label}")?;
        for condition in conditions {
            writeln!(out, "  - {}", describe_condition(condition))?;
        }
    }
    Ok(out)
}

fn describe_condition(condition: &GateCondition) -> String {
    let actual = condition.actual_value.as_deref().unwrap_or("n/a");
    match (&condition.comparator, &condition.error_threshold) {
        (Some(comparator), Some(threshold)) => format!(
            "{metric}: {actual} (required {op} {threshold})",
            metric = condition.metric_key,
            op = comparator_symbol(comparator),
        ),
        _ => format!("{}: {actual}", condition.metric_key),
    }
}

/// The server reports the comparator that makes a condition fail, so the
/// requirement is its negation.
fn comparator_symbol(comparator: &str) -> &str {
    match comparator {
        "LT" => ">=",
        "GT" => "<=",
        "EQ" => "!=",
        "NE" => "==",
        other => other,
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    project_key: &'a str,
    status: GateStatus,
    attempts: u32,
    conditions: &'a [GateCondition],
}

impl<'a> From<&'a GateReport> for JsonReport<'a> {
    fn from(report: &'a GateReport) -> Self {
        Self {
            project_key: &report.project_key,
            status: report.status,
            attempts: report.attempts,
            conditions: &report.conditions,
        }
    }
}
