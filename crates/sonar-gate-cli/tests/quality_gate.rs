#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use sonar_gate_core::settings::DEFAULT_SCANNER_VERSION;
use sonar_gate_core::{Platform, ScannerLayout};

const GATE_PATH: &str = "/api/qualitygates/project_status";

struct Fixture {
    _root: tempfile::TempDir,
    cache: std::path::PathBuf,
    project: std::path::PathBuf,
    server: MockServer,
}

impl Fixture {
    /// Workspace with a cached fake scanner and a mock server that accepts the token.
    /// `None` when the host platform has no scanner distribution.
    fn new() -> Option<Self> {
        let platform = Platform::detect().ok()?;
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("cache");
        let project = root.path().join("project");
        fs::create_dir_all(&project).unwrap();
        install_fake_scanner(&cache, platform);

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/system/status");
            then.status(200).json_body(json!({"status": "UP"}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/authentication/validate")
                .header("authorization", "Bearer squ_test");
            then.status(200).json_body(json!({"valid": true}));
        });

        Some(Self {
            _root: root,
            cache,
            project,
            server,
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("sonar-gate-cli").unwrap();
        cmd.env_remove("SONAR_TOKEN")
            .env("NO_COLOR", "1")
            .env("SONAR_GATE_POLL_INTERVAL", "10ms")
            .args([
                "--project-key",
                "demo",
                "--sonar-token",
                "squ_test",
                "--sonar-host-url",
                self.server.base_url().as_str(),
                "--project-dir",
                self.project.to_str().unwrap(),
                "--cache-dir",
                self.cache.to_str().unwrap(),
            ]);
        cmd
    }
}

fn install_fake_scanner(cache: &Path, platform: Platform) {
    let executable = ScannerLayout::new(cache, DEFAULT_SCANNER_VERSION, platform).executable();
    fs::create_dir_all(executable.parent().unwrap()).unwrap();
    fs::write(&executable, "#!/bin/sh\nmkdir -p .scannerwork\nexit 0\n").unwrap();
    fs::set_permissions(&executable, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn error_gate_exits_non_zero_after_one_request() {
    let Some(fixture) = Fixture::new() else {
        return;
    };
    let gate = fixture.server.mock(|when, then| {
        when.method(GET)
            .path(GATE_PATH)
            .query_param("projectKey", "demo");
        then.status(200).json_body(json!({
            "projectStatus": {
                "status": "ERROR",
                "conditions": [
                    {"status": "ERROR", "metricKey": "new_coverage", "comparator": "LT",
                     "errorThreshold": "80", "actualValue": "41.2"},
                    {"status": "OK", "metricKey": "new_bugs"}
                ]
            }
        }));
    });

    fixture
        .command()
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Quality gate failed for demo"))
        .stdout(predicate::str::contains("new_coverage: 41.2 (required >= 80)"))
        .stdout(predicate::str::contains("new_bugs").not());

    gate.assert_hits(1);
    assert!(!fixture.project.join(".scannerwork").exists());
}

#[test]
fn warn_gate_prints_details_and_exits_zero() {
    let Some(fixture) = Fixture::new() else {
        return;
    };
    fixture.server.mock(|when, then| {
        when.method(GET).path(GATE_PATH);
        then.status(200).json_body(json!({
            "projectStatus": {
                "status": "WARN",
                "conditions": [{"status": "WARN", "metricKey": "code_smells", "actualValue": "31"}]
            }
        }));
    });

    fixture
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("passed with warnings"))
        .stdout(predicate::str::contains("code_smells: 31"));
}

#[test]
fn unresolved_gate_reports_unknown_and_exits_zero() {
    let Some(fixture) = Fixture::new() else {
        return;
    };
    let gate = fixture.server.mock(|when, then| {
        when.method(GET).path(GATE_PATH);
        then.status(404);
    });

    fixture
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("quality gate status unknown"));

    gate.assert_hits(5);
}

#[test]
fn forbidden_gate_is_fatal_without_retry() {
    let Some(fixture) = Fixture::new() else {
        return;
    };
    let gate = fixture.server.mock(|when, then| {
        when.method(GET).path(GATE_PATH);
        then.status(403);
    });

    fixture
        .command()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("HTTP 403"));

    gate.assert_hits(1);
}

#[test]
fn json_output_and_failed_probe_are_not_fatal() {
    let root = tempfile::tempdir().unwrap();
    let Ok(platform) = Platform::detect() else {
        return;
    };
    let cache = root.path().join("cache");
    install_fake_scanner(&cache, platform);

    let server = MockServer::start();
    let probe = server.mock(|when, then| {
        when.method(GET).path("/api/system/status");
        then.status(503);
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/authentication/validate");
        then.status(200).json_body(json!({"valid": true}));
    });
    server.mock(|when, then| {
        when.method(GET).path(GATE_PATH);
        then.status(200)
            .json_body(json!({"projectStatus": {"status": "OK", "conditions": []}}));
    });

    let output = Command::cargo_bin("sonar-gate-cli")
        .unwrap()
        .env_remove("SONAR_TOKEN")
        .env("SONAR_GATE_POLL_INTERVAL", "10ms")
        .args([
            "--project-key",
            "demo",
            "--sonar-token",
            "squ_test",
            "--sonar-host-url",
            server.base_url().as_str(),
            "--project-dir",
            root.path().to_str().unwrap(),
            "--cache-dir",
            cache.to_str().unwrap(),
            "--output",
            "json",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    probe.assert_hits(1);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "passed");
    assert_eq!(report["project_key"], "demo");
    assert_eq!(report["attempts"], 1);
}

#[test]
fn skipped_gate_only_runs_the_scan() {
    let Some(fixture) = Fixture::new() else {
        return;
    };
    let gate = fixture.server.mock(|when, then| {
        when.method(GET).path(GATE_PATH);
        then.status(200);
    });

    fixture
        .command()
        .args(["--skip-connectivity-test", "--skip-quality-gate-check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("quality gate check skipped"));

    gate.assert_hits(0);
}

#[test]
fn error_gate_with_null_conditions_still_fails() {
    let Some(fixture) = Fixture::new() else {
        return;
    };
    let gate = fixture.server.mock(|when, then| {
        when.method(GET).path(GATE_PATH);
        then.status(200)
            .json_body(json!({"projectStatus": {"status": "ERROR", "conditions": null}}));
    });

    fixture
        .command()
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Quality gate failed for demo"));

    gate.assert_hits(1);
}

#[test]
fn piped_output_has_no_color_codes() {
    let Some(fixture) = Fixture::new() else {
        return;
    };
    fixture.server.mock(|when, then| {
        when.method(GET).path(GATE_PATH);
        then.status(200)
            .json_body(json!({"projectStatus": {"status": "OK", "conditions": []}}));
    });

    fixture
        .command()
        .env_remove("NO_COLOR")
        .env("CLICOLOR_FORCE", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Quality gate passed for demo"))
        .stdout(predicate::str::contains("\u{1b}[").not());
}
