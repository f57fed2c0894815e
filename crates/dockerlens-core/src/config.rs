use std::time::Duration;

/// AI optimizer endpoint settings. Absent entirely when no API key is
/// configured; the pipeline then goes straight to the deterministic
/// suggestor.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

/// Process-wide configuration, built once at the composition root and passed
/// by reference into each collaborator adapter. The analysis core never reads
/// the environment or any other global state.
#[derive(Debug, Clone)]
pub struct Config {
    pub docker_bin: String,
    pub trivy_bin: String,
    /// Layers at or above this size are flagged `is_large`.
    pub large_layer_threshold_mb: f64,
    pub github_token: Option<String>,
    pub ai: Option<AiConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        let ai = std::env::var("GROQ_API_KEY").ok().map(|api_key| AiConfig {
            api_key,
            endpoint: std::env::var("AI_ENDPOINT")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1/chat/completions".to_string()),
            model: std::env::var("AI_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
            timeout: Duration::from_secs(30),
        });

        Config {
            docker_bin: std::env::var("DOCKER_BIN").unwrap_or_else(|_| "docker".to_string()),
            trivy_bin: std::env::var("TRIVY_BIN").unwrap_or_else(|_| "trivy".to_string()),
            large_layer_threshold_mb: 50.0,
            github_token: std::env::var("GITHUB_TOKEN").ok(),
            ai,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            docker_bin: "docker".to_string(),
            trivy_bin: "trivy".to_string(),
            large_layer_threshold_mb: 50.0,
            github_token: None,
            ai: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_collaborator_credentials() {
        let config = Config::default();
        assert!(config.ai.is_none());
        assert!(config.github_token.is_none());
        assert_eq!(config.large_layer_threshold_mb, 50.0);
    }
}
