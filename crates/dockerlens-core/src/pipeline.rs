use chrono::Utc;

use crate::ai::{AiContext, AiOptimizer};
use crate::analyzer::report::{
    AiRecommendation, Finding, FindingCategory, ImageAnalysis, Recommendation, Report,
    RuntimeAnalysis, ScanStatus, SecurityAnalysis, Severity, Summary,
};
use crate::analyzer::{self, aggregate, misconfig, secrets};
use crate::docker::DockerInspector;
use crate::error::CollaboratorError;
use crate::parser::runtime::{self, Runtime};
use crate::scanner::TrivyScanner;
use crate::suggestor;

/// Build a report from raw Dockerfile text.
///
/// The scanner and AI sub-steps degrade on failure instead of aborting: a
/// failed scan lands as a degraded `security_analysis`, a failed or absent
/// AI call falls back to the deterministic suggestor. The pipeline always
/// reaches a final report for static input.
pub async fn build_static_report(
    content: &str,
    scanner: &TrivyScanner,
    ai: Option<&AiOptimizer>,
) -> Report {
    let analysis = analyzer::analyze_content(content);
    let security = scanner.scan_dockerfile(content);
    let ai_result = try_ai(
        ai,
        "dockerfile",
        analysis.runtime,
        &analysis.image,
        &analysis.runtime_analysis,
        Some(content),
    )
    .await;

    assemble(
        "dockerfile".to_string(),
        analysis.image,
        analysis.runtime_analysis,
        analysis.runtime,
        security,
        ai_result,
        secrets::detect(content),
    )
}

/// Build a report for a local image. Only a missing image (or an unreachable
/// daemon) is fatal; every downstream sub-step degrades.
pub async fn build_image_report(
    image_ref: &str,
    docker: &DockerInspector,
    scanner: &TrivyScanner,
    ai: Option<&AiOptimizer>,
) -> Result<Report, CollaboratorError> {
    let image = docker.inspect_image(image_ref)?;

    // A failed metadata read should not kill the report; assume the
    // conservative default and note it on stderr.
    let runtime_analysis = match docker.inspect_runtime(image_ref) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("warning: runtime introspection failed for {image_ref}: {e}");
            RuntimeAnalysis::from_user("root".to_string(), true)
        }
    };

    let classifier_text = format!(
        "{} {}",
        image.base_image,
        image
            .layers
            .iter()
            .map(|l| l.command.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    );
    let detected = runtime::classify(&classifier_text);

    let security = scanner.scan_image(image_ref);
    let ai_result = try_ai(ai, image_ref, detected, &image, &runtime_analysis, None).await;

    Ok(assemble(
        image_ref.to_string(),
        image,
        runtime_analysis,
        detected,
        security,
        ai_result,
        Vec::new(),
    ))
}

async fn try_ai(
    ai: Option<&AiOptimizer>,
    image_name: &str,
    detected: Runtime,
    image: &ImageAnalysis,
    runtime_analysis: &RuntimeAnalysis,
    dockerfile: Option<&str>,
) -> Option<AiRecommendation> {
    let optimizer = ai?;

    let misconfigurations = misconfig::evaluate(image, runtime_analysis);
    let context = AiContext {
        image: image_name.to_string(),
        runtime: detected,
        summary: format!(
            "{} layers, {:.0} MB, {} misconfiguration(s)",
            image.layer_count,
            image.total_size_mb,
            misconfigurations.len()
        ),
        misconfigurations,
    };

    match optimizer.optimize(&context, dockerfile).await {
        Ok(rec) => Some(rec),
        Err(e) => {
            eprintln!("warning: AI optimizer unavailable, using deterministic suggestion: {e}");
            None
        }
    }
}

/// Pure report assembly; tests inject scanner and AI results here exactly as
/// the pipeline would.
pub fn assemble(
    image_name: String,
    image: ImageAnalysis,
    runtime_analysis: RuntimeAnalysis,
    detected: Runtime,
    security: SecurityAnalysis,
    ai_result: Option<AiRecommendation>,
    secret_findings: Vec<Finding>,
) -> Report {
    let mut misconfigurations = misconfig::evaluate(&image, &runtime_analysis);
    misconfigurations.extend(secret_findings);

    let ai_warnings: Vec<String> = ai_result
        .as_ref()
        .map(|r| r.security_warnings.clone())
        .unwrap_or_default();

    let mut findings = aggregate::merge(misconfigurations.clone(), &ai_warnings, &security);

    if security.status == ScanStatus::Error {
        findings.push(Finding {
            id: "SECURITY_SCAN_FAILED".to_string(),
            severity: Severity::Low,
            message: "Security scan failed (environment or permission issue)".to_string(),
            recommendation: "Check that the scanner binary is installed and can reach the target."
                .to_string(),
            category: FindingCategory::Security,
        });
    }

    let recommendation = match ai_result {
        Some(rec) => Recommendation::Ai(rec),
        None => Recommendation::Suggested(suggestor::generate(
            detected,
            &image,
            &runtime_analysis,
            &misconfigurations,
        )),
    };

    let is_static = image.is_static;
    let summary = Summary {
        image_size_mb: image.total_size_mb,
        layer_count: image.layer_count,
        runs_as_root: runtime_analysis.runs_as_root,
        security_scan_status: security.status,
        misconfiguration_count: misconfigurations.len(),
    };

    Report {
        image: image_name,
        is_static: if is_static { Some(true) } else { None },
        summary,
        image_analysis: image,
        runtime: detected,
        runtime_analysis,
        security_analysis: security,
        misconfigurations,
        recommendation,
        findings,
        repo: None,
        generated_at: Utc::now(),
    }
}
