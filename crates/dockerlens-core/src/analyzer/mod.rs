pub mod aggregate;
pub mod misconfig;
pub mod report;
pub mod secrets;

use crate::parser::dockerfile::{self, Instruction};
use crate::parser::runtime::{self, Runtime};
use report::{ImageAnalysis, ImageLayer, RuntimeAnalysis};

/// Everything the static pass derives from raw Dockerfile text.
#[derive(Debug, Clone)]
pub struct StaticAnalysis {
    pub instructions: Vec<Instruction>,
    pub image: ImageAnalysis,
    pub runtime_analysis: RuntimeAnalysis,
    pub runtime: Runtime,
}

/// Analyze Dockerfile text without touching a container runtime.
///
/// Layers are synthesized 1:1 from instructions with zero size so the rule
/// engine sees the same shape it gets from real image history.
pub fn analyze_content(content: &str) -> StaticAnalysis {
    let instructions = dockerfile::parse(content);

    let layers: Vec<ImageLayer> = instructions
        .iter()
        .map(|i| ImageLayer {
            command: i.command(),
            size_mb: 0.0,
            is_large: false,
        })
        .collect();

    let base_image = dockerfile::base_image(&instructions);
    let stages = dockerfile::stages(&instructions);
    let (user, runs_as_root) = dockerfile::effective_user(&instructions);

    let classifier_text = format!(
        "{} {}",
        base_image,
        layers
            .iter()
            .map(|l| l.command.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    );
    let runtime = runtime::classify(&classifier_text);

    let image = ImageAnalysis {
        image: None,
        total_size_mb: 0.0,
        layer_count: layers.len(),
        base_image,
        layers,
        stages,
        is_static: true,
    };

    StaticAnalysis {
        instructions,
        image,
        runtime_analysis: RuntimeAnalysis::from_user(user, runs_as_root),
        runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
FROM ubuntu:latest
RUN apt-get install -y gcc
COPY . /app
CMD [\"./app\"]
";

    #[test]
    fn test_static_layers_mirror_instructions() {
        let analysis = analyze_content(SAMPLE);
        assert_eq!(analysis.image.layer_count, 4);
        assert!(analysis.image.is_static);
        assert!(analysis.image.layers.iter().all(|l| l.size_mb == 0.0 && !l.is_large));
        assert_eq!(analysis.image.layers[0].command, "FROM ubuntu:latest");
    }

    #[test]
    fn test_base_image_and_stages() {
        let analysis = analyze_content("FROM golang:1.22 AS builder\nFROM alpine:3.21\n");
        assert_eq!(analysis.image.base_image, "alpine:3.21");
        assert_eq!(analysis.image.stages.len(), 2);
    }

    #[test]
    fn test_default_user_is_root() {
        let analysis = analyze_content(SAMPLE);
        assert!(analysis.runtime_analysis.runs_as_root);
        assert_eq!(analysis.runtime_analysis.user, "root");
        assert!(!analysis.runtime_analysis.issues.is_empty());
    }

    #[test]
    fn test_runtime_classification_uses_base_and_commands() {
        let analysis = analyze_content("FROM node:20\nRUN npm ci\n");
        assert_eq!(analysis.runtime, Runtime::Node);
    }
}
