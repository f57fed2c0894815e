use crate::analyzer::report::{
    Finding, FindingCategory, SecurityAnalysis, Severity,
};

/// Merge findings from the rule engine, AI security warnings and the scanner
/// into one ordered, deduplicated list.
///
/// Merge order is fixed: rule-engine findings first (in rule-table order),
/// then AI warnings with a fuzzy containment test against everything already
/// accepted, then HIGH/CRITICAL scanner vulnerabilities deduped by id
/// reference. A final pass removes exact normalized-message duplicates,
/// keeping the first occurrence.
pub fn merge(
    analysis_findings: Vec<Finding>,
    ai_warnings: &[String],
    security: &SecurityAnalysis,
) -> Vec<Finding> {
    let mut merged = analysis_findings;

    for warning in ai_warnings {
        let warning = warning.trim();
        if warning.is_empty() {
            continue;
        }
        if merged.iter().any(|f| fuzzy_overlap(&f.message, warning)) {
            continue;
        }
        merged.push(Finding {
            id: "AI_SECURITY_WARNING".to_string(),
            severity: Severity::Medium,
            message: warning.to_string(),
            recommendation: "Reported by the AI optimizer; verify and address in the Dockerfile."
                .to_string(),
            category: FindingCategory::Security,
        });
    }

    for vuln in &security.vulnerabilities {
        if !matches!(vuln.severity, Severity::High | Severity::Critical) {
            continue;
        }
        let already_referenced = merged
            .iter()
            .any(|f| f.message.to_lowercase().contains(&vuln.id.to_lowercase()));
        if already_referenced {
            continue;
        }
        let fix = match &vuln.fixed_version {
            Some(v) => format!("Upgrade {} to {}.", vuln.package, v),
            None => format!("No fixed version published for {} yet; consider a different base image.", vuln.package),
        };
        merged.push(Finding {
            id: vuln.id.clone(),
            severity: vuln.severity,
            message: format!(
                "{}: {} {} is vulnerable ({})",
                vuln.id,
                vuln.package,
                vuln.installed_version,
                vuln.title.as_deref().unwrap_or("no title"),
            ),
            recommendation: fix,
            category: FindingCategory::Security,
        });
    }

    dedup_exact(merged)
}

/// True when one message is contained in the other after normalization.
/// Catches AI warnings that restate a rule-engine finding in more words.
fn fuzzy_overlap(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a.contains(&b) || b.contains(&a)
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn dedup_exact(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for finding in findings {
        let key = normalize(&finding.message);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(finding);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::report::Vulnerability;

    fn rule_finding(id: &str, message: &str) -> Finding {
        Finding {
            id: id.to_string(),
            severity: Severity::High,
            message: message.to_string(),
            recommendation: "fix it".to_string(),
            category: FindingCategory::Analysis,
        }
    }

    fn vuln(id: &str, severity: Severity) -> Vulnerability {
        Vulnerability {
            id: id.to_string(),
            package: "openssl".to_string(),
            severity,
            installed_version: "1.1.1".to_string(),
            fixed_version: Some("3.0.0".to_string()),
            title: Some("buffer overflow".to_string()),
        }
    }

    #[test]
    fn test_analysis_findings_come_first() {
        let merged = merge(
            vec![rule_finding("RUNS_AS_ROOT", "Container runs as root user")],
            &["Image exposes the docker socket".to_string()],
            &SecurityAnalysis::skipped(),
        );
        assert_eq!(merged[0].id, "RUNS_AS_ROOT");
        assert_eq!(merged[1].id, "AI_SECURITY_WARNING");
        assert_eq!(merged[1].category, FindingCategory::Security);
    }

    #[test]
    fn test_ai_warning_containment_dedup() {
        let merged = merge(
            vec![rule_finding("RUNS_AS_ROOT", "Container runs as root user")],
            &[
                // Substring of an accepted message (after lowering): dropped.
                "container RUNS AS ROOT".to_string(),
                // Contains an accepted message: dropped.
                "Warning: container runs as root user in production".to_string(),
                "Secret mounted at build time".to_string(),
            ],
            &SecurityAnalysis::skipped(),
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].message, "Secret mounted at build time");
    }

    #[test]
    fn test_only_high_and_critical_vulnerabilities_folded() {
        let security = SecurityAnalysis::ok(vec![
            vuln("CVE-2024-0001", Severity::Critical),
            vuln("CVE-2024-0002", Severity::Medium),
            vuln("CVE-2024-0003", Severity::Low),
        ]);
        let merged = merge(Vec::new(), &[], &security);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "CVE-2024-0001");
    }

    #[test]
    fn test_vulnerability_deduped_by_id_reference() {
        let security = SecurityAnalysis::ok(vec![vuln("CVE-2024-0001", Severity::High)]);
        let merged = merge(
            Vec::new(),
            &["Base image carries CVE-2024-0001 in openssl".to_string()],
            &security,
        );
        // The AI warning already references the id; the scanner record is
        // dropped.
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "AI_SECURITY_WARNING");
    }

    #[test]
    fn test_no_two_entries_share_a_normalized_message() {
        let merged = merge(
            vec![
                rule_finding("A", "Same message"),
                rule_finding("B", "  same MESSAGE  "),
            ],
            &[],
            &SecurityAnalysis::skipped(),
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "A");
    }

    #[test]
    fn test_empty_sources_yield_empty_list() {
        let merged = merge(Vec::new(), &[], &SecurityAnalysis::skipped());
        assert!(merged.is_empty());
    }
}
