use anyhow::{Context, Result};
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Fixed instruction handed to the language model for every enhancement
/// request. The model is told to answer with the final prompt text only.
const SYSTEM_PROMPT: &str = "You are an expert prompt engineer for AI image generators (like Midjourney or Stable Diffusion). \
Your job is to take the user's simple concept and turn it into a highly detailed, descriptive image generation prompt. \
Focus on subject description, lighting, composition, camera angle, and artistic style. \
Return ONLY the final enhanced prompt text, nothing else, no conversational filler.";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for a locally running Ollama server. Handles the connectivity
/// probe (model listing) and single-shot prompt enhancement.
#[derive(Debug)]
pub struct OllamaClient {
    runtime: Arc<Runtime>,
    client: Client,
}

impl OllamaClient {
    pub fn new(runtime: Arc<Runtime>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("failed to construct HTTP client for Ollama")?;
        Ok(Self { runtime, client })
    }

    /// Lists the models the server currently offers. One attempt, no retry;
    /// the caller maps failure to the offline connectivity state.
    pub fn list_models(&self, base_url: String) -> tokio::task::JoinHandle<Result<Vec<ModelInfo>>> {
        let client = self.client.clone();

        self.runtime.spawn(async move {
            let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
            let response = client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("failed to reach Ollama at {url}"))?
                .error_for_status()
                .context("model listing request returned error status")?;

            let tags = response
                .json::<TagsResponse>()
                .await
                .context("failed to parse model listing JSON")?;

            info!("Ollama reported {} model(s).", tags.models.len());
            Ok(tags.models)
        })
    }

    /// Rewrites a short user concept into a detailed image-generation prompt
    /// using a single non-streaming completion. The response text is returned
    /// with surrounding whitespace removed.
    pub fn enhance_prompt(
        &self,
        base_url: String,
        model: String,
        concept: String,
    ) -> tokio::task::JoinHandle<Result<String>> {
        let client = self.client.clone();

        self.runtime.spawn(async move {
            let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
            let body = GenerateRequest {
                model: &model,
                prompt: concept_prompt(&concept),
                system: SYSTEM_PROMPT,
                stream: false,
            };

            let response = client
                .post(&url)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("failed to reach Ollama at {url}"))?
                .error_for_status()
                .context("prompt enhancement request returned error status")?;

            let payload = response
                .json::<GenerateResponse>()
                .await
                .context("failed to parse enhancement response JSON")?;

            Ok(payload.response.trim().to_string())
        })
    }
}

fn concept_prompt(concept: &str) -> String {
    format!("User concept: \"{concept}\"\n\nEnhanced prompt:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn concept_is_embedded_with_the_completion_cue() {
        assert_eq!(
            concept_prompt("a cat"),
            "User concept: \"a cat\"\n\nEnhanced prompt:"
        );
    }

    #[test]
    fn generate_request_disables_streaming() {
        let body = GenerateRequest {
            model: "llama3",
            prompt: concept_prompt("a cat"),
            system: SYSTEM_PROMPT,
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "llama3");
        assert_eq!(value["stream"], json!(false));
        assert_eq!(value["system"], SYSTEM_PROMPT);
        assert_eq!(value["prompt"], "User concept: \"a cat\"\n\nEnhanced prompt:");
    }

    #[test]
    fn tags_response_preserves_model_order() {
        let tags: TagsResponse = serde_json::from_str(
            r#"{"models":[{"name":"llama3","size":123},{"name":"mistral"}]}"#,
        )
        .unwrap();
        let names: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["llama3", "mistral"]);
    }

    #[test]
    fn missing_model_list_defaults_to_empty() {
        let tags: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(tags.models.is_empty());
    }

    #[test]
    fn enhancement_text_is_trimmed() {
        let payload: GenerateResponse =
            serde_json::from_str(r#"{"response":"  A fluffy orange cat...\n"}"#).unwrap();
        assert_eq!(payload.response.trim(), "A fluffy orange cat...");
    }
}
