use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::parser::runtime::Runtime;

/// Severity level for findings, scanner records and the CLI fail gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }

    /// Map a scanner severity string; unknown strings become Low rather than
    /// failing the whole report.
    pub fn parse_lossy(s: &str) -> Severity {
        match s.to_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Where a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FindingCategory {
    /// Rule engine output over parsed instructions / image layers.
    Analysis,
    /// Scanner vulnerabilities and AI security warnings.
    Security,
}

/// A single finding with a stable rule code and an actionable fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
    pub category: FindingCategory,
}

/// One vulnerability record from the external scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub package: String,
    pub severity: Severity,
    pub installed_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Outcome class of the vulnerability-scan sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Ok,
    Error,
    Skipped,
}

/// The scanner sub-report. Always present in a Report; a failed or skipped
/// scan degrades `status` instead of aborting the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAnalysis {
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_vulnerabilities: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub vulnerabilities: Vec<Vulnerability>,
}

impl SecurityAnalysis {
    pub fn ok(vulnerabilities: Vec<Vulnerability>) -> Self {
        let mut by_severity = BTreeMap::new();
        for v in &vulnerabilities {
            *by_severity.entry(v.severity.symbol().to_string()).or_insert(0) += 1;
        }
        SecurityAnalysis {
            status: ScanStatus::Ok,
            error: None,
            total_vulnerabilities: vulnerabilities.len(),
            by_severity,
            vulnerabilities,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SecurityAnalysis {
            status: ScanStatus::Error,
            error: Some(message.into()),
            total_vulnerabilities: 0,
            by_severity: BTreeMap::new(),
            vulnerabilities: Vec::new(),
        }
    }

    pub fn skipped() -> Self {
        SecurityAnalysis {
            status: ScanStatus::Skipped,
            error: None,
            total_vulnerabilities: 0,
            by_severity: BTreeMap::new(),
            vulnerabilities: Vec::new(),
        }
    }
}

/// A filesystem delta produced by one build instruction. For static analysis
/// layers are synthesized 1:1 from instructions with `size_mb = 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageLayer {
    pub command: String,
    pub size_mb: f64,
    pub is_large: bool,
}

/// Image-level facts, from real image history or synthesized from text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub total_size_mb: f64,
    pub layer_count: usize,
    pub base_image: String,
    pub layers: Vec<ImageLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
    pub is_static: bool,
}

/// Configured user of the final image and the derived root flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeAnalysis {
    pub user: String,
    pub runs_as_root: bool,
    pub issues: Vec<String>,
}

impl RuntimeAnalysis {
    pub fn from_user(user: String, runs_as_root: bool) -> Self {
        let issues = if runs_as_root {
            vec!["Container runs as root user".to_string()]
        } else {
            Vec::new()
        };
        RuntimeAnalysis { user, runs_as_root, issues }
    }
}

/// AI-produced replacement Dockerfile and its commentary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRecommendation {
    pub optimized_dockerfile: String,
    #[serde(default)]
    pub dockerignore: String,
    #[serde(default)]
    pub explanation: Vec<String>,
    #[serde(default)]
    pub security_warnings: Vec<String>,
}

/// Deterministic fallback suggestion, emitted when the AI optimizer is
/// unavailable or errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedDockerfile {
    #[serde(rename = "type")]
    pub kind: String,
    pub base_image: String,
    pub dockerfile: String,
    pub explanation: Vec<String>,
    pub disclaimer: String,
}

/// Either shape of `recommendation` in the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recommendation {
    Ai(AiRecommendation),
    Suggested(SuggestedDockerfile),
}

impl Recommendation {
    pub fn dockerfile(&self) -> &str {
        match self {
            Recommendation::Ai(r) => &r.optimized_dockerfile,
            Recommendation::Suggested(s) => &s.dockerfile,
        }
    }

    pub fn explanation(&self) -> &[String] {
        match self {
            Recommendation::Ai(r) => &r.explanation,
            Recommendation::Suggested(s) => &s.explanation,
        }
    }
}

/// Headline numbers consumers read first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub image_size_mb: f64,
    pub layer_count: usize,
    pub runs_as_root: bool,
    pub security_scan_status: ScanStatus,
    pub misconfiguration_count: usize,
}

/// Echoed source-repository metadata for repo-scan flows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoContext {
    pub owner: String,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub path: String,
    pub original_content: String,
    pub url: String,
}

/// The complete analysis report. Built fresh per request, immutable once
/// returned; the core never persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_static: Option<bool>,
    pub summary: Summary,
    pub image_analysis: ImageAnalysis,
    pub runtime: Runtime,
    pub runtime_analysis: RuntimeAnalysis,
    pub security_analysis: SecurityAnalysis,
    pub misconfigurations: Vec<Finding>,
    pub recommendation: Recommendation,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<RepoContext>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    /// Highest severity across the merged findings list, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max_by_key(|s| s.priority())
    }

    pub fn count_at_least(&self, threshold: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity.priority() >= threshold.priority())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"HIGH\"");
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("bogus".parse::<Severity>().is_err());
    }

    #[test]
    fn test_security_analysis_counts_by_severity() {
        let vulns = vec![
            Vulnerability {
                id: "CVE-2024-0001".into(),
                package: "openssl".into(),
                severity: Severity::High,
                installed_version: "1.1.1".into(),
                fixed_version: Some("3.0.0".into()),
                title: None,
            },
            Vulnerability {
                id: "CVE-2024-0002".into(),
                package: "zlib".into(),
                severity: Severity::High,
                installed_version: "1.2".into(),
                fixed_version: None,
                title: None,
            },
        ];
        let analysis = SecurityAnalysis::ok(vulns);
        assert_eq!(analysis.total_vulnerabilities, 2);
        assert_eq!(analysis.by_severity.get("HIGH"), Some(&2));
    }

    #[test]
    fn test_suggested_recommendation_serializes_type_key() {
        let s = SuggestedDockerfile {
            kind: "suggested".into(),
            base_image: "alpine:3.21".into(),
            dockerfile: "FROM alpine:3.21".into(),
            explanation: vec![],
            disclaimer: "review first".into(),
        };
        let json = serde_json::to_value(Recommendation::Suggested(s)).unwrap();
        assert_eq!(json["type"], "suggested");
        assert_eq!(json["base_image"], "alpine:3.21");
    }
}
