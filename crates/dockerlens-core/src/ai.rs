use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::analyzer::report::{AiRecommendation, Finding};
use crate::config::Config;
use crate::error::CollaboratorError;
use crate::parser::runtime::Runtime;

/// What the optimizer gets told about the image under analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AiContext {
    pub image: String,
    pub runtime: Runtime,
    pub misconfigurations: Vec<Finding>,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Client for the hosted-LLM Dockerfile optimizer (OpenAI-compatible chat
/// completions). Calls are bounded by the configured timeout; any non-success
/// status or unparsable payload is an error the pipeline recovers from with
/// the deterministic suggestor.
pub struct AiOptimizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl AiOptimizer {
    /// None when no API key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let ai = config.ai.as_ref()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", ai.api_key)).ok()?;
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(ai.timeout)
            .build()
            .ok()?;

        Some(AiOptimizer {
            client,
            endpoint: ai.endpoint.clone(),
            model: ai.model.clone(),
        })
    }

    pub async fn optimize(
        &self,
        context: &AiContext,
        dockerfile: Option<&str>,
    ) -> Result<AiRecommendation, CollaboratorError> {
        let prompt = build_prompt(context, dockerfile);

        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a specialized Docker optimization assistant. You only output valid JSON."
                },
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.2,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("AI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Unavailable(format!(
                "AI endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("AI response unreadable: {e}")))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| CollaboratorError::Unavailable("AI response had no choices".into()))?;

        parse_recommendation(content)
    }
}

fn build_prompt(context: &AiContext, dockerfile: Option<&str>) -> String {
    let misconfigurations =
        serde_json::to_string_pretty(&context.misconfigurations).unwrap_or_default();
    format!(
        "You are an expert Docker and DevSecOps engineer. Produce a secure, optimized \
multi-stage replacement for the image below.\n\n\
### CONTEXT\nImage: {}\nDetected runtime: {}\nSummary: {}\nMisconfigurations found:\n{}\n\n\
### ORIGINAL DOCKERFILE\n{}\n\n\
### OUTPUT\nRespond with one valid JSON object with keys: optimized_dockerfile, \
dockerignore, explanation (array of strings), security_warnings (array of strings). \
No markdown, no commentary outside the JSON.",
        context.image,
        context.runtime,
        context.summary,
        misconfigurations,
        dockerfile.unwrap_or("Not provided. Use image metadata and misconfigurations above."),
    )
}

/// Parse the model's JSON payload, tolerating ```json fences some models
/// insist on.
fn parse_recommendation(content: &str) -> Result<AiRecommendation, CollaboratorError> {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    serde_json::from_str(trimmed)
        .map_err(|e| CollaboratorError::Unavailable(format!("AI payload was not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json_payload() {
        let content = r#"{
            "optimized_dockerfile": "FROM alpine:3.21",
            "dockerignore": ".git",
            "explanation": ["smaller base"],
            "security_warnings": ["no healthcheck"]
        }"#;
        let rec = parse_recommendation(content).unwrap();
        assert_eq!(rec.optimized_dockerfile, "FROM alpine:3.21");
        assert_eq!(rec.security_warnings.len(), 1);
    }

    #[test]
    fn test_parse_fenced_payload() {
        let content = "```json\n{\"optimized_dockerfile\": \"FROM alpine\"}\n```";
        let rec = parse_recommendation(content).unwrap();
        assert_eq!(rec.optimized_dockerfile, "FROM alpine");
        assert!(rec.explanation.is_empty());
    }

    #[test]
    fn test_unparsable_payload_is_unavailable() {
        let err = parse_recommendation("Sure! Here is your Dockerfile:").unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }

    #[test]
    fn test_no_optimizer_without_api_key() {
        assert!(AiOptimizer::from_config(&Config::default()).is_none());
    }

    #[test]
    fn test_prompt_carries_context() {
        let context = AiContext {
            image: "web:1.0".into(),
            runtime: Runtime::Python,
            misconfigurations: Vec::new(),
            summary: "2 findings".into(),
        };
        let prompt = build_prompt(&context, Some("FROM python:3.12"));
        assert!(prompt.contains("web:1.0"));
        assert!(prompt.contains("python"));
        assert!(prompt.contains("FROM python:3.12"));
    }
}
