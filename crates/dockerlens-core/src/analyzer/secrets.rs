use regex::Regex;

use crate::analyzer::report::{Finding, FindingCategory, Severity};

/// Sensitive key fragments checked against ENV/ARG lines. Checked in order;
/// only the first matching term per line is reported.
const SENSITIVE_KEYS: &[&str] = &[
    "aws_access_key_id",
    "aws_secret_access_key",
    "npm_token",
    "github_token",
    "secret_key",
    "api_key",
    "access_token",
    "db_password",
];

/// Scan raw Dockerfile text for credential-looking ENV/ARG assignments.
///
/// Heuristic by design: obfuscated or encoded secrets slip through, and a
/// variable like `API_KEY_NAME=foobar` is an accepted false positive. At most
/// one `EXPOSED_SECRET` finding is emitted per line, carrying the 1-based
/// line number.
pub fn detect(content: &str) -> Vec<Finding> {
    let env_arg = Regex::new(r"(?i)^\s*(ENV|ARG)\s+").unwrap();

    let mut findings = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if !env_arg.is_match(line) {
            continue;
        }
        for key in SENSITIVE_KEYS {
            // Key fragment, an assignment, and at least 4 value characters.
            let pattern = format!(r"(?i){}\w*\s*[=\s]\s*\S{{4,}}", regex::escape(key));
            let re = Regex::new(&pattern).unwrap();
            if re.is_match(line) {
                findings.push(Finding {
                    id: "EXPOSED_SECRET".to_string(),
                    severity: Severity::High,
                    message: format!(
                        "Exposed secret: possible {} hardcoded at line {}",
                        key.to_uppercase(),
                        idx + 1
                    ),
                    recommendation:
                        "Pass secrets at runtime (env files, secret stores, BuildKit secret mounts), never bake them into the image."
                            .to_string(),
                    category: FindingCategory::Analysis,
                });
                break;
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_api_key_flagged_with_line_number() {
        let findings = detect("FROM alpine\nENV API_KEY=abcd1234\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].id, "EXPOSED_SECRET");
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].message.contains("line 2"));
    }

    #[test]
    fn test_plain_port_env_not_flagged() {
        assert!(detect("ENV PORT=8080\n").is_empty());
    }

    #[test]
    fn test_arg_secret_flagged() {
        let findings = detect("ARG GITHUB_TOKEN=ghp_abcdef123456\n");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_short_value_not_flagged() {
        // Fewer than 4 value characters does not qualify.
        assert!(detect("ENV API_KEY=ab\n").is_empty());
    }

    #[test]
    fn test_run_lines_ignored() {
        assert!(detect("RUN export API_KEY=abcd1234\n").is_empty());
    }

    #[test]
    fn test_one_finding_per_line() {
        // Line matches both secret_key and api_key; only the first vocabulary
        // hit is reported.
        let findings = detect("ENV SECRET_KEY=abcd1234 API_KEY=efgh5678\n");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("SECRET_KEY"));
    }

    #[test]
    fn test_case_insensitive_keyword() {
        let findings = detect("env db_password=hunter22\n");
        assert_eq!(findings.len(), 1);
    }
}
