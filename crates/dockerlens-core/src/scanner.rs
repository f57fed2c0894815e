use std::fs;
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::analyzer::report::{SecurityAnalysis, Severity, Vulnerability};
use crate::config::Config;

/// Trivy subprocess wrapper. Every entry point returns a `SecurityAnalysis`
/// whose `status` is degraded on failure; a broken or missing scanner never
/// aborts the report pipeline.
pub struct TrivyScanner {
    trivy_bin: String,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct TrivyReport {
    #[serde(default, rename = "Results")]
    results: Vec<TrivyResult>,
}

#[derive(Debug, Deserialize)]
struct TrivyResult {
    #[serde(default, rename = "Vulnerabilities")]
    vulnerabilities: Vec<TrivyVulnerability>,
    #[serde(default, rename = "Misconfigurations")]
    misconfigurations: Vec<TrivyMisconfiguration>,
}

#[derive(Debug, Deserialize)]
struct TrivyVulnerability {
    #[serde(rename = "VulnerabilityID")]
    vulnerability_id: String,
    #[serde(default, rename = "PkgName")]
    pkg_name: String,
    #[serde(default, rename = "Severity")]
    severity: String,
    #[serde(default, rename = "InstalledVersion")]
    installed_version: String,
    #[serde(rename = "FixedVersion")]
    fixed_version: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrivyMisconfiguration {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default, rename = "Type")]
    kind: String,
    #[serde(default, rename = "Severity")]
    severity: String,
    #[serde(rename = "Title")]
    title: Option<String>,
}

impl TrivyScanner {
    pub fn new(config: &Config) -> Self {
        TrivyScanner {
            trivy_bin: config.trivy_bin.clone(),
            enabled: true,
        }
    }

    /// A scanner that always reports `skipped`; used when scanning is turned
    /// off (offline CLI runs, tests).
    pub fn disabled(config: &Config) -> Self {
        TrivyScanner {
            trivy_bin: config.trivy_bin.clone(),
            enabled: false,
        }
    }

    /// Scan a local image for vulnerabilities.
    pub fn scan_image(&self, image_ref: &str) -> SecurityAnalysis {
        if !self.enabled {
            return SecurityAnalysis::skipped();
        }
        self.run_scan(&["image", "--scanners", "vuln,secret,misconfig"], image_ref)
    }

    /// Scan raw Dockerfile text. The text is staged into a scratch directory
    /// as `Dockerfile` and run through trivy's config scanner;
    /// misconfiguration records are folded into the vulnerability list shape.
    pub fn scan_dockerfile(&self, content: &str) -> SecurityAnalysis {
        if !self.enabled {
            return SecurityAnalysis::skipped();
        }

        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => return SecurityAnalysis::error(format!("scan workspace failed: {e}")),
        };
        if let Err(e) = fs::write(dir.path().join("Dockerfile"), content) {
            return SecurityAnalysis::error(format!("scan workspace failed: {e}"));
        }
        let target = dir.path().to_string_lossy().to_string();
        self.run_scan(&["config"], &target)
    }

    fn run_scan(&self, mode_args: &[&str], target: &str) -> SecurityAnalysis {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => return SecurityAnalysis::error(format!("scan workspace failed: {e}")),
        };
        let output_file = dir.path().join("result.json");

        let mut cmd = Command::new(&self.trivy_bin);
        cmd.args(mode_args)
            .args(["--format", "json", "--output"])
            .arg(&output_file)
            .arg(target)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = match cmd.output() {
            Ok(o) => o,
            Err(e) => {
                return SecurityAnalysis::error(format!(
                    "failed to run {}: {e}",
                    self.trivy_bin
                ))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return SecurityAnalysis::error(format!(
                "trivy exited with {}: {}",
                output.status,
                stderr.lines().last().unwrap_or("").trim(),
            ));
        }

        let raw = match fs::read_to_string(&output_file) {
            Ok(r) => r,
            Err(e) => return SecurityAnalysis::error(format!("scan output unreadable: {e}")),
        };

        match serde_json::from_str::<TrivyReport>(&raw) {
            Ok(report) => SecurityAnalysis::ok(collect_records(report)),
            Err(e) => SecurityAnalysis::error(format!("scan output unparsable: {e}")),
        }
    }
}

fn collect_records(report: TrivyReport) -> Vec<Vulnerability> {
    let mut records = Vec::new();
    for result in report.results {
        for v in result.vulnerabilities {
            records.push(Vulnerability {
                id: v.vulnerability_id,
                package: v.pkg_name,
                severity: Severity::parse_lossy(&v.severity),
                installed_version: v.installed_version,
                fixed_version: v.fixed_version,
                title: v.title,
            });
        }
        for m in result.misconfigurations {
            records.push(Vulnerability {
                id: m.id,
                package: if m.kind.is_empty() { "dockerfile".to_string() } else { m.kind },
                severity: Severity::parse_lossy(&m.severity),
                installed_version: String::new(),
                fixed_version: None,
                title: m.title,
            });
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::report::ScanStatus;

    #[test]
    fn test_disabled_scanner_reports_skipped() {
        let scanner = TrivyScanner::disabled(&Config::default());
        let result = scanner.scan_dockerfile("FROM alpine\n");
        assert_eq!(result.status, ScanStatus::Skipped);
        assert!(result.vulnerabilities.is_empty());
    }

    #[test]
    fn test_missing_binary_degrades_to_error() {
        let config = Config {
            trivy_bin: "trivy-definitely-not-installed".to_string(),
            ..Config::default()
        };
        let scanner = TrivyScanner::new(&config);
        let result = scanner.scan_image("alpine:3.21");
        assert_eq!(result.status, ScanStatus::Error);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_parse_trivy_report_shape() {
        let raw = r#"{
            "Results": [
                {
                    "Vulnerabilities": [
                        {
                            "VulnerabilityID": "CVE-2024-1234",
                            "PkgName": "openssl",
                            "Severity": "HIGH",
                            "InstalledVersion": "1.1.1",
                            "FixedVersion": "3.0.0",
                            "Title": "overflow"
                        }
                    ],
                    "Misconfigurations": [
                        {"ID": "DS002", "Type": "dockerfile", "Severity": "CRITICAL", "Title": "root user"}
                    ]
                }
            ]
        }"#;
        let report: TrivyReport = serde_json::from_str(raw).unwrap();
        let records = collect_records(report);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "CVE-2024-1234");
        assert_eq!(records[0].severity, Severity::High);
        assert_eq!(records[1].id, "DS002");
        assert_eq!(records[1].package, "dockerfile");
    }

    #[test]
    fn test_unknown_severity_maps_low() {
        assert_eq!(Severity::parse_lossy("UNKNOWN"), Severity::Low);
    }
}
