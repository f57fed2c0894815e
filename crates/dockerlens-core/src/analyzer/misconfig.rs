use crate::analyzer::report::{
    Finding, FindingCategory, ImageAnalysis, RuntimeAnalysis, Severity,
};

/// Canonical rule-table revision. Earlier deployments disagreed on ids
/// (`RUNS_AS_ROOT` vs `RUN_AS_ROOT`) and on the curl exemption; this table is
/// the single versioned source of truth.
pub const RULE_TABLE_VERSION: &str = "2025.1";

const HEAVY_BASES: &[&str] = &["ubuntu", "debian", "fedora", "centos"];

/// Build-tool markers that should never survive into a final image. `curl`
/// is deliberately absent: it is the usual healthcheck tool and flagging it
/// drowned real findings in noise.
const BUILD_TOOL_MARKERS: &[&str] = &["gcc", "build-essential", "make", "git"];

const EXPOSE_RANGE_LIMIT: u32 = 100;

/// Evaluate the misconfiguration rule table against image and runtime facts.
///
/// Pure and deterministic: no I/O, emission order is table order, and the
/// same inputs always produce the same ordered findings. Missing data (an
/// empty layer list, an unknown base image) yields no matches rather than an
/// error.
pub fn evaluate(image: &ImageAnalysis, runtime: &RuntimeAnalysis) -> Vec<Finding> {
    let mut findings = Vec::new();

    if runtime.runs_as_root {
        findings.push(analysis_finding(
            "RUNS_AS_ROOT",
            Severity::High,
            "Container runs as root user",
            "Add a non-root USER in the Dockerfile.",
        ));
    }

    let base_lower = image.base_image.to_lowercase();
    if HEAVY_BASES.iter().any(|b| base_lower.contains(b)) && !base_lower.contains("slim") {
        findings.push(analysis_finding(
            "HEAVY_BASE_IMAGE",
            Severity::Medium,
            &format!("Heavy base image detected ({})", image.base_image),
            "Use slim or alpine base images where possible.",
        ));
    }

    // Static and history-based analyses see multi-stage evidence differently:
    // stage count for raw text, large-layer flags for real images.
    if image.is_static {
        if image.stages.len() < 2 {
            findings.push(analysis_finding(
                "SINGLE_STAGE",
                Severity::Low,
                "Single-stage build detected",
                "Consider a multi-stage build to keep build dependencies out of the final image.",
            ));
        }
    } else if image.layers.iter().any(|l| l.is_large) {
        findings.push(analysis_finding(
            "NO_MULTI_STAGE",
            Severity::High,
            "Large build layers detected in final image",
            "Use multi-stage builds to exclude build dependencies.",
        ));
    }

    for layer in &image.layers {
        let cmd = layer.command.to_lowercase();
        if BUILD_TOOL_MARKERS.iter().any(|m| cmd.contains(m)) {
            findings.push(analysis_finding(
                "BUILD_TOOLS_PRESENT",
                Severity::High,
                "Build tools present in final image",
                "Install build tools only in a builder stage.",
            ));
            break;
        }
    }

    for layer in &image.layers {
        if layer.command.to_lowercase().contains("docker.sock") {
            findings.push(analysis_finding(
                "DOCKER_SOCKET_MOUNT",
                Severity::High,
                "Docker socket referenced in build instructions",
                "Never expose /var/run/docker.sock to a container; it grants host root.",
            ));
            break;
        }
    }

    for layer in &image.layers {
        if is_copy_all(&layer.command) {
            findings.push(analysis_finding(
                "COPY_ALL",
                Severity::Medium,
                "COPY . used (entire build context copied)",
                "Use .dockerignore and copy only required files.",
            ));
            break;
        }
    }

    if !image
        .layers
        .iter()
        .any(|l| l.command.to_lowercase().contains("healthcheck"))
    {
        findings.push(analysis_finding(
            "MISSING_HEALTHCHECK",
            Severity::Low,
            "No HEALTHCHECK instruction found",
            "Add a HEALTHCHECK so orchestrators can detect a wedged container.",
        ));
    }

    for layer in &image.layers {
        let cmd = layer.command.to_lowercase();
        // Matches both static `EXPOSE ...` layers and image-history shells
        // like `/bin/sh -c #(nop) EXPOSE 1000-1200`.
        if let Some(pos) = cmd.find("expose ") {
            let args = &cmd[pos + "expose ".len()..];
            if let Some(span) = widest_port_range(args) {
                if span > EXPOSE_RANGE_LIMIT {
                    findings.push(analysis_finding(
                        "EXCESSIVE_EXPOSE",
                        Severity::Medium,
                        &format!("Excessive port range exposed ({span} ports)"),
                        "Expose only the specific ports the service listens on.",
                    ));
                    break;
                }
            }
        }
    }

    if base_version_unpinned(&image.base_image) {
        findings.push(analysis_finding(
            "NO_VERSION_PINNING",
            Severity::Medium,
            &format!("Base image version not pinned ({})", image.base_image),
            "Pin the base image to a specific version tag instead of latest.",
        ));
    }

    findings
}

fn analysis_finding(id: &str, severity: Severity, message: &str, recommendation: &str) -> Finding {
    Finding {
        id: id.to_string(),
        severity,
        message: message.to_string(),
        recommendation: recommendation.to_string(),
        category: FindingCategory::Analysis,
    }
}

/// `COPY . <dest>` copies the whole context. `COPY . .` is excluded to cut
/// noise on the extremely common workdir-relative form.
fn is_copy_all(command: &str) -> bool {
    let cmd = command.to_lowercase();
    let Some(args) = cmd.strip_prefix("copy ") else {
        return false;
    };
    let args = args.trim();
    args.starts_with(". ") && args != ". ."
}

/// Largest span among `lo-hi` port ranges in an EXPOSE argument list.
/// Malformed ranges (non-numeric tokens) are skipped, not fatal.
fn widest_port_range(args: &str) -> Option<u32> {
    let mut widest = None;
    for token in args.split_whitespace() {
        // Strip protocol suffixes like 8000-9000/tcp.
        let token = token.split('/').next().unwrap_or(token);
        let Some((lo, hi)) = token.split_once('-') else {
            continue;
        };
        if let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) {
            if hi >= lo {
                let span = hi - lo;
                if widest.map_or(true, |w| span > w) {
                    widest = Some(span);
                }
            }
        }
    }
    widest
}

/// No `:` tag at all, or an explicit `latest`, means unpinned. Registry ports
/// (`host:5000/img`) are not tags.
fn base_version_unpinned(base_image: &str) -> bool {
    if base_image == "unknown" {
        return false;
    }
    let name = base_image.rsplit('/').next().unwrap_or(base_image);
    match name.split_once(':') {
        Some((_, tag)) => tag.eq_ignore_ascii_case("latest"),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::report::ImageLayer;

    fn static_image(commands: &[&str], base: &str, stages: usize) -> ImageAnalysis {
        ImageAnalysis {
            image: None,
            total_size_mb: 0.0,
            layer_count: commands.len(),
            base_image: base.to_string(),
            layers: commands
                .iter()
                .map(|c| ImageLayer {
                    command: c.to_string(),
                    size_mb: 0.0,
                    is_large: false,
                })
                .collect(),
            stages: (0..stages).map(|i| format!("stage-{i}")).collect(),
            is_static: true,
        }
    }

    fn non_root() -> RuntimeAnalysis {
        RuntimeAnalysis::from_user("appuser".into(), false)
    }

    fn as_root() -> RuntimeAnalysis {
        RuntimeAnalysis::from_user("root".into(), true)
    }

    fn ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn test_runs_as_root_rule() {
        let image = static_image(&[], "alpine:3.21", 1);
        assert!(ids(&evaluate(&image, &as_root())).contains(&"RUNS_AS_ROOT"));
        assert!(!ids(&evaluate(&image, &non_root())).contains(&"RUNS_AS_ROOT"));
    }

    #[test]
    fn test_heavy_base_image() {
        let heavy = static_image(&[], "ubuntu:20.04", 1);
        assert!(ids(&evaluate(&heavy, &non_root())).contains(&"HEAVY_BASE_IMAGE"));

        let slim = static_image(&[], "python:3.12-slim", 1);
        assert!(!ids(&evaluate(&slim, &non_root())).contains(&"HEAVY_BASE_IMAGE"));

        let debian_slim = static_image(&[], "debian:bookworm-slim", 1);
        assert!(!ids(&evaluate(&debian_slim, &non_root())).contains(&"HEAVY_BASE_IMAGE"));
    }

    #[test]
    fn test_single_stage_only_for_static() {
        let one = static_image(&[], "alpine:3.21", 1);
        assert!(ids(&evaluate(&one, &non_root())).contains(&"SINGLE_STAGE"));

        let two = static_image(&[], "alpine:3.21", 2);
        assert!(!ids(&evaluate(&two, &non_root())).contains(&"SINGLE_STAGE"));
    }

    #[test]
    fn test_no_multi_stage_only_for_real_images() {
        let mut image = static_image(&["RUN apt-get install foo"], "alpine:3.21", 0);
        image.is_static = false;
        image.layers[0].is_large = true;
        image.layers[0].size_mb = 220.0;

        let findings = evaluate(&image, &non_root());
        let found = ids(&findings);
        assert!(found.contains(&"NO_MULTI_STAGE"));
        assert!(!found.contains(&"SINGLE_STAGE"));
    }

    #[test]
    fn test_build_tools_first_match_stops() {
        let image = static_image(
            &["RUN apt-get install -y gcc", "RUN apt-get install -y make"],
            "debian:12",
            1,
        );
        let findings = evaluate(&image, &non_root());
        let count = findings.iter().filter(|f| f.id == "BUILD_TOOLS_PRESENT").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_curl_alone_is_not_a_build_tool() {
        let image = static_image(&["RUN apk add curl"], "alpine:3.21", 1);
        assert!(!ids(&evaluate(&image, &non_root())).contains(&"BUILD_TOOLS_PRESENT"));
    }

    #[test]
    fn test_docker_socket_mount() {
        let image = static_image(
            &["RUN ls /var/run/docker.sock"],
            "alpine:3.21",
            1,
        );
        assert!(ids(&evaluate(&image, &non_root())).contains(&"DOCKER_SOCKET_MOUNT"));
    }

    #[test]
    fn test_copy_all_excludes_dot_dot() {
        let flagged = static_image(&["COPY . /app"], "alpine:3.21", 1);
        assert!(ids(&evaluate(&flagged, &non_root())).contains(&"COPY_ALL"));

        let quiet = static_image(&["COPY . ."], "alpine:3.21", 1);
        assert!(!ids(&evaluate(&quiet, &non_root())).contains(&"COPY_ALL"));
    }

    #[test]
    fn test_missing_healthcheck() {
        let missing = static_image(&["RUN echo hi"], "alpine:3.21", 1);
        assert!(ids(&evaluate(&missing, &non_root())).contains(&"MISSING_HEALTHCHECK"));

        let present = static_image(
            &["HEALTHCHECK CMD curl -f http://localhost:8080/health"],
            "alpine:3.21",
            1,
        );
        assert!(!ids(&evaluate(&present, &non_root())).contains(&"MISSING_HEALTHCHECK"));
    }

    #[test]
    fn test_excessive_expose_span() {
        let wide = static_image(&["EXPOSE 1000-1200"], "alpine:3.21", 1);
        assert!(ids(&evaluate(&wide, &non_root())).contains(&"EXCESSIVE_EXPOSE"));

        let narrow = static_image(&["EXPOSE 1000-1050"], "alpine:3.21", 1);
        assert!(!ids(&evaluate(&narrow, &non_root())).contains(&"EXCESSIVE_EXPOSE"));
    }

    #[test]
    fn test_malformed_expose_range_is_skipped() {
        let image = static_image(&["EXPOSE abc-def 8080"], "alpine:3.21", 1);
        assert!(!ids(&evaluate(&image, &non_root())).contains(&"EXCESSIVE_EXPOSE"));
    }

    #[test]
    fn test_version_pinning() {
        let latest = static_image(&[], "ubuntu:latest", 1);
        assert!(ids(&evaluate(&latest, &non_root())).contains(&"NO_VERSION_PINNING"));

        let untagged = static_image(&[], "ubuntu", 1);
        assert!(ids(&evaluate(&untagged, &non_root())).contains(&"NO_VERSION_PINNING"));

        let pinned = static_image(&[], "ubuntu:20.04", 1);
        assert!(!ids(&evaluate(&pinned, &non_root())).contains(&"NO_VERSION_PINNING"));

        let unknown = static_image(&[], "unknown", 1);
        assert!(!ids(&evaluate(&unknown, &non_root())).contains(&"NO_VERSION_PINNING"));
    }

    #[test]
    fn test_deterministic_and_order_stable() {
        let image = static_image(
            &["RUN apt-get install -y gcc", "COPY . /app", "EXPOSE 5000-5200"],
            "ubuntu:latest",
            1,
        );
        let first = evaluate(&image, &as_root());
        let second = evaluate(&image, &as_root());
        assert_eq!(first, second);
        // Emission follows table order.
        let order = ids(&first);
        let root_pos = order.iter().position(|i| *i == "RUNS_AS_ROOT").unwrap();
        let pin_pos = order.iter().position(|i| *i == "NO_VERSION_PINNING").unwrap();
        assert!(root_pos < pin_pos);
    }

    #[test]
    fn test_empty_layers_yield_no_layer_findings() {
        let image = static_image(&[], "alpine:3.21", 2);
        let findings = evaluate(&image, &non_root());
        let found = ids(&findings);
        assert!(!found.contains(&"BUILD_TOOLS_PRESENT"));
        assert!(!found.contains(&"COPY_ALL"));
        // No layers means no healthcheck either; that rule still fires.
        assert!(found.contains(&"MISSING_HEALTHCHECK"));
    }
}
