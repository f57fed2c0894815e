use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::analyzer::report::{ImageAnalysis, ImageLayer, RuntimeAnalysis};
use crate::config::Config;
use crate::error::CollaboratorError;

/// A container row from the listing, including derived image size and live
/// memory usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub image_size_mb: f64,
    pub memory_usage_mb: f64,
}

/// A per-container introspection failure, kept alongside the successes so
/// callers can report both instead of the batch silently shrinking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerError {
    pub name: String,
    pub error: String,
}

/// Image and runtime introspection over the local `docker` CLI. Strictly
/// local: absent images are a NotFound error, never an auto-pull.
pub struct DockerInspector {
    docker_bin: String,
    large_layer_threshold_mb: f64,
}

impl DockerInspector {
    pub fn new(config: &Config) -> Self {
        DockerInspector {
            docker_bin: config.docker_bin.clone(),
            large_layer_threshold_mb: config.large_layer_threshold_mb,
        }
    }

    /// Size, per-layer history and base image of a local image.
    pub fn inspect_image(&self, image_ref: &str) -> Result<ImageAnalysis, CollaboratorError> {
        let size_bytes = self
            .run(&["image", "inspect", image_ref, "--format", "{{.Size}}"])?
            .trim()
            .parse::<u64>()
            .map_err(|e| CollaboratorError::Unavailable(format!("bad image size: {e}")))?;
        let total_size_mb = round2(size_bytes as f64 / (1024.0 * 1024.0));

        let history = self.run(&[
            "history",
            image_ref,
            "--no-trunc",
            "--format",
            "{{.Size}}|{{.CreatedBy}}",
        ])?;

        let mut layers = Vec::new();
        for line in history.lines() {
            let Some((size_str, command)) = line.split_once('|') else {
                continue;
            };
            let size_mb = parse_size_mb(size_str);
            layers.push(ImageLayer {
                command: command.trim().to_string(),
                size_mb,
                is_large: size_mb >= self.large_layer_threshold_mb,
            });
        }

        let base_image = layers
            .iter()
            .rev()
            .find_map(|l| {
                l.command
                    .split_once("FROM")
                    .map(|(_, rest)| rest.trim().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ImageAnalysis {
            image: Some(image_ref.to_string()),
            total_size_mb,
            layer_count: layers.len(),
            base_image,
            layers,
            stages: Vec::new(),
            is_static: false,
        })
    }

    /// Configured user from image metadata.
    pub fn inspect_runtime(&self, image_ref: &str) -> Result<RuntimeAnalysis, CollaboratorError> {
        let user = self
            .run(&["image", "inspect", image_ref, "--format", "{{.Config.User}}"])?
            .trim()
            .to_string();
        let runs_as_root = matches!(user.to_lowercase().as_str(), "" | "0" | "root");
        let user = if user.is_empty() { "root".to_string() } else { user };
        Ok(RuntimeAnalysis::from_user(user, runs_as_root))
    }

    /// List all containers with image size and memory usage. One container's
    /// failing stats call does not abort the batch; its error lands in the
    /// second list.
    pub fn list_containers(
        &self,
    ) -> Result<(Vec<ContainerInfo>, Vec<ContainerError>), CollaboratorError> {
        let listing = self.run(&[
            "ps",
            "-a",
            "--format",
            "{{.ID}}|{{.Names}}|{{.Image}}|{{.Status}}",
        ])?;

        let mut containers = Vec::new();
        let mut errors = Vec::new();

        for line in listing.lines() {
            let parts: Vec<&str> = line.splitn(4, '|').collect();
            let &[id, name, image, status] = parts.as_slice() else {
                continue;
            };

            match self.container_details(id, image, status) {
                Ok((image_size_mb, memory_usage_mb)) => containers.push(ContainerInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                    image: image.to_string(),
                    status: status.to_string(),
                    image_size_mb,
                    memory_usage_mb,
                }),
                Err(e) => errors.push(ContainerError {
                    name: name.to_string(),
                    error: e.to_string(),
                }),
            }
        }

        Ok((containers, errors))
    }

    fn container_details(
        &self,
        id: &str,
        image: &str,
        status: &str,
    ) -> Result<(f64, f64), CollaboratorError> {
        let size_bytes = self
            .run(&["image", "inspect", image, "--format", "{{.Size}}"])?
            .trim()
            .parse::<u64>()
            .unwrap_or(0);
        let image_size_mb = round2(size_bytes as f64 / (1024.0 * 1024.0));

        let memory_usage_mb = if status.starts_with("Up") {
            let stats = self.run(&["stats", "--no-stream", "--format", "{{.MemUsage}}", id])?;
            parse_mem_usage_mb(&stats)
        } else {
            0.0
        };

        Ok((image_size_mb, memory_usage_mb))
    }

    fn run(&self, args: &[&str]) -> Result<String, CollaboratorError> {
        let output = Command::new(&self.docker_bin)
            .args(args)
            .output()
            .map_err(|e| {
                CollaboratorError::Unavailable(format!("failed to run {}: {e}", self.docker_bin))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.contains("No such image") || stderr.contains("No such object") {
                return Err(CollaboratorError::NotFound(stderr.to_string()));
            }
            return Err(CollaboratorError::Unavailable(format!(
                "{} {} failed: {stderr}",
                self.docker_bin,
                args.first().unwrap_or(&""),
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Parse a `docker history` size column ("0B", "1.24kB", "45.2MB", "1.1GB").
fn parse_size_mb(size_str: &str) -> f64 {
    let size_str = size_str.trim();
    if size_str == "0B" {
        return 0.0;
    }
    if let Some(kb) = size_str.strip_suffix("kB") {
        return round2(kb.parse::<f64>().unwrap_or(0.0) / 1024.0);
    }
    if let Some(mb) = size_str.strip_suffix("MB") {
        return mb.parse::<f64>().unwrap_or(0.0);
    }
    if let Some(gb) = size_str.strip_suffix("GB") {
        return gb.parse::<f64>().unwrap_or(0.0) * 1024.0;
    }
    if let Some(b) = size_str.strip_suffix('B') {
        return round2(b.parse::<f64>().unwrap_or(0.0) / (1024.0 * 1024.0));
    }
    0.0
}

/// Parse the left half of a `docker stats` MemUsage column
/// ("12.5MiB / 7.6GiB").
fn parse_mem_usage_mb(stats: &str) -> f64 {
    let usage = stats.split('/').next().unwrap_or("").trim();
    if let Some(mib) = usage.strip_suffix("MiB") {
        return round2(mib.parse::<f64>().unwrap_or(0.0));
    }
    if let Some(gib) = usage.strip_suffix("GiB") {
        return round2(gib.parse::<f64>().unwrap_or(0.0) * 1024.0);
    }
    if let Some(kib) = usage.strip_suffix("KiB") {
        return round2(kib.parse::<f64>().unwrap_or(0.0) / 1024.0);
    }
    0.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_variants() {
        assert_eq!(parse_size_mb("0B"), 0.0);
        assert_eq!(parse_size_mb("45.2MB"), 45.2);
        assert_eq!(parse_size_mb("2GB"), 2048.0);
        assert_eq!(parse_size_mb("1024kB"), 1.0);
        assert_eq!(parse_size_mb("garbage"), 0.0);
    }

    #[test]
    fn test_parse_mem_usage() {
        assert_eq!(parse_mem_usage_mb("12.5MiB / 7.6GiB"), 12.5);
        assert_eq!(parse_mem_usage_mb("2GiB / 8GiB"), 2048.0);
        assert_eq!(parse_mem_usage_mb(""), 0.0);
    }
}
