use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

use super::{EnrichError, MetadataEnricher, VideoMetadata};
use crate::config::EnrichSettings;

const SYSTEM_PROMPT: &str = "You write YouTube metadata for educational videos. \
Reply with a single JSON object with the keys \"title\" (at most 100 characters), \
\"description\" (2-4 short paragraphs) and \"thumbnail_prompt\" (one sentence describing \
an eye-catching thumbnail image without any text in it).";

/// OpenAI-compatible chat + image generation client
pub struct OpenAiEnricher {
    client: Client,
    api_key: String,
    settings: EnrichSettings,
}

impl OpenAiEnricher {
    pub fn new(api_key: impl Into<String>, settings: EnrichSettings) -> Result<Self, EnrichError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            settings,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, EnrichError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MetadataEnricher for OpenAiEnricher {
    async fn describe(&self, filename: &str, caption: Option<String>) -> Result<VideoMetadata, EnrichError> {
        let mut prompt = format!("Video file name: {}", filename);
        if let Some(caption) = caption.as_deref().filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("\nOriginal post text: {}", caption));
        }

        tracing::debug!("Requesting metadata from {}", self.settings.text_model);
        let body = json!({
            "model": self.settings.text_model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self.post("chat/completions", &body).await?;
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EnrichError::Malformed("no message content in completion".to_string()))?;

        parse_metadata(content)
    }

    async fn generate_thumbnail(&self, prompt: &str, dest: &Path) -> Result<(), EnrichError> {
        tracing::debug!("Requesting thumbnail from {}: {:.80}", self.settings.image_model, prompt);
        let body = json!({
            "model": self.settings.image_model,
            "prompt": prompt,
            "n": 1,
            "size": self.settings.image_size,
            "response_format": "b64_json",
        });

        let response = self.post("images/generations", &body).await?;
        let encoded = response["data"][0]["b64_json"]
            .as_str()
            .ok_or_else(|| EnrichError::Malformed("no b64_json image in response".to_string()))?;

        let bytes = general_purpose::STANDARD.decode(encoded)?;
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }
}

/// Parse the model's JSON answer, tolerating markdown code fences
pub fn parse_metadata(content: &str) -> Result<VideoMetadata, EnrichError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let metadata: VideoMetadata = serde_json::from_str(body)
        .map_err(|e| EnrichError::Malformed(format!("{}: {:.200}", e, body)))?;

    if metadata.title.trim().is_empty() {
        return Err(EnrichError::Malformed("empty title".to_string()));
    }

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let meta = parse_metadata(
            r#"{"title": "Graphs 101", "description": "Intro to graphs", "thumbnail_prompt": "a graph"}"#,
        )
        .unwrap();
        assert_eq!(meta.title, "Graphs 101");
        assert_eq!(meta.thumbnail_prompt, "a graph");
    }

    #[test]
    fn test_parse_fenced_json_with_alias() {
        let content = "```json\n{\"title\": \"T\", \"description\": \"D\", \"image_prompt\": \"P\"}\n```";
        let meta = parse_metadata(content).unwrap();
        assert_eq!(meta.title, "T");
        assert_eq!(meta.thumbnail_prompt, "P");
    }

    #[test]
    fn test_missing_prompt_defaults_to_empty() {
        let meta = parse_metadata(r#"{"title": "T", "description": "D"}"#).unwrap();
        assert!(meta.thumbnail_prompt.is_empty());
    }

    #[test]
    fn test_rejects_empty_title_and_garbage() {
        assert!(matches!(
            parse_metadata(r#"{"title": " ", "description": "D"}"#),
            Err(EnrichError::Malformed(_))
        ));
        assert!(matches!(parse_metadata("Sure! Here it is"), Err(EnrichError::Malformed(_))));
    }

    #[test]
    fn test_endpoint_joining() {
        let enricher = OpenAiEnricher::new(
            "key",
            EnrichSettings {
                base_url: "http://localhost:8080/v1/".to_string(),
                ..EnrichSettings::default()
            },
        )
        .unwrap();
        assert_eq!(enricher.endpoint("chat/completions"), "http://localhost:8080/v1/chat/completions");
    }
}
