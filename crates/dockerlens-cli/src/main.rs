mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dockerlens_core::ai::AiOptimizer;
use dockerlens_core::analyzer;
use dockerlens_core::docker::DockerInspector;
use dockerlens_core::pipeline;
use dockerlens_core::scanner::TrivyScanner;
use dockerlens_core::suggestor;
use dockerlens_core::{Config, Report, Severity};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "dockerlens",
    version,
    about = "dockerlens - Dockerfile & container image security analyzer",
    long_about = "Analyze Dockerfiles and local images for security misconfigurations, \
exposed secrets and size waste, and generate a hardened replacement build definition."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a Dockerfile (or every Dockerfile under a directory)
    Analyze {
        /// Path to a Dockerfile or a directory to search
        #[arg(default_value = "Dockerfile")]
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Exit non-zero when any finding meets this severity
        #[arg(long, default_value = "HIGH")]
        fail_on: Severity,

        /// Run the vulnerability scanner (requires trivy on PATH)
        #[arg(long)]
        scan: bool,

        /// POST the content to a hosted analysis endpoint instead of
        /// analyzing locally
        #[arg(long)]
        server: Option<String>,
    },

    /// Analyze a local container image
    Image {
        /// Image reference (must be present locally)
        image: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Exit non-zero when any finding meets this severity
        #[arg(long, default_value = "HIGH")]
        fail_on: Severity,

        /// Run the vulnerability scanner (requires trivy on PATH)
        #[arg(long)]
        scan: bool,
    },

    /// Print the deterministic hardened Dockerfile suggestion
    Suggest {
        /// Path to the Dockerfile
        path: PathBuf,

        /// Show a diff against the original instead of the full text
        #[arg(long)]
        diff: bool,

        /// Write the suggestion to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List local containers with image size and memory usage
    Containers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Analyze { path, format, fail_on, scan, server } => {
            cmd_analyze(&config, &path, &format, fail_on, scan, server.as_deref()).await
        }
        Commands::Image { image, format, fail_on, scan } => {
            cmd_image(&config, &image, &format, fail_on, scan).await
        }
        Commands::Suggest { path, diff, output } => cmd_suggest(&path, diff, output.as_deref()),
        Commands::Containers => cmd_containers(&config),
    }
}

fn discover_dockerfiles(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if path.is_dir() {
        let mut files: Vec<PathBuf> = glob::glob(&format!("{}/**/Dockerfile", path.display()))
            .context("Failed to read glob pattern")?
            .chain(
                glob::glob(&format!("{}/**/*.dockerfile", path.display()))
                    .context("Failed to read glob pattern")?,
            )
            .filter_map(|r| r.ok())
            .collect();
        files.sort();
        return Ok(files);
    }

    anyhow::bail!("Path '{}' does not exist", path.display());
}

async fn cmd_analyze(
    config: &Config,
    path: &Path,
    format: &str,
    fail_on: Severity,
    scan: bool,
    server: Option<&str>,
) -> Result<()> {
    let files = discover_dockerfiles(path)?;
    if files.is_empty() {
        anyhow::bail!(
            "No Dockerfiles found at '{}'. \
            Point at a Dockerfile or a directory containing one.",
            path.display()
        );
    }

    let scanner = if scan {
        TrivyScanner::new(config)
    } else {
        TrivyScanner::disabled(config)
    };
    let ai = AiOptimizer::from_config(config);

    let mut gate_tripped = false;
    for file in &files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let report = match server {
            Some(server) => analyze_remote(server, &content).await?,
            None => pipeline::build_static_report(&content, &scanner, ai.as_ref()).await,
        };

        emit_report(&report, &file.display().to_string(), format)?;

        let blocking = report.count_at_least(fail_on);
        if blocking > 0 {
            gate_tripped = true;
            if format != "json" {
                eprintln!(
                    "{}: {} finding(s) at or above {}",
                    file.display(),
                    blocking,
                    fail_on.symbol()
                );
            }
        }
    }

    if gate_tripped {
        std::process::exit(1);
    }
    Ok(())
}

async fn analyze_remote(server: &str, content: &str) -> Result<Report> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/analyze-dockerfile", server.trim_end_matches('/')))
        .json(&serde_json::json!({ "content": content }))
        .send()
        .await
        .with_context(|| format!("Failed to reach analysis server at {server}"))?;

    if !response.status().is_success() {
        anyhow::bail!("Analysis server returned {}", response.status());
    }

    response
        .json::<Report>()
        .await
        .context("Analysis server returned an unexpected payload")
}

async fn cmd_image(
    config: &Config,
    image: &str,
    format: &str,
    fail_on: Severity,
    scan: bool,
) -> Result<()> {
    let docker = DockerInspector::new(config);
    let scanner = if scan {
        TrivyScanner::new(config)
    } else {
        TrivyScanner::disabled(config)
    };
    let ai = AiOptimizer::from_config(config);

    let report = pipeline::build_image_report(image, &docker, &scanner, ai.as_ref())
        .await
        .with_context(|| format!("Failed to analyze image '{image}'"))?;

    emit_report(&report, image, format)?;

    if report.count_at_least(fail_on) > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn emit_report(report: &Report, source: &str, format: &str) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(report)?;
            println!("{}", json);
        }
        _ => display::print_report(report, source),
    }
    Ok(())
}

fn cmd_suggest(path: &Path, diff: bool, output: Option<&Path>) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let analysis = analyzer::analyze_content(&content);
    let misconfigurations = dockerlens_core::analyzer::misconfig::evaluate(
        &analysis.image,
        &analysis.runtime_analysis,
    );
    let suggestion = suggestor::generate(
        analysis.runtime,
        &analysis.image,
        &analysis.runtime_analysis,
        &misconfigurations,
    );

    if diff {
        display::print_diff(&content, &suggestion.dockerfile, &path.to_string_lossy());
        return Ok(());
    }

    match output {
        Some(out_path) => {
            std::fs::write(out_path, &suggestion.dockerfile)?;
            println!("Suggested Dockerfile written to {}", out_path.display());
        }
        None => {
            print!("{}", suggestion.dockerfile);
        }
    }

    Ok(())
}

fn cmd_containers(config: &Config) -> Result<()> {
    let docker = DockerInspector::new(config);
    let (containers, errors) = docker
        .list_containers()
        .context("Failed to list containers (is the Docker daemon running?)")?;

    display::print_containers(&containers, &errors);
    Ok(())
}
