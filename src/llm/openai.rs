use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{StylistError, StylistResult};
use crate::llm::media::{to_data_url, ImageInput};
use crate::utils::http::{get_http_client, truncate_for_log};
use crate::utils::retry::{send_with_retry, RetryPolicy};
use crate::utils::timing::log_api_timing;

const SERVICE: &str = "openai";

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub size: &'a str,
    pub quality: &'a str,
}

/// Client for an OpenAI-compatible chat completion and image generation API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            timeout,
            retry,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.openai_base_url,
            &config.openai_api_key,
            config.api_timeout(),
            RetryPolicy::from_config(config),
        )
    }

    fn ensure_configured(&self) -> StylistResult<()> {
        if self.api_key.is_empty() {
            return Err(StylistError::Config(
                "OPENAI_API_KEY is not configured.".to_string(),
            ));
        }
        Ok(())
    }

    async fn post_json(&self, path: &str, payload: &Value) -> StylistResult<reqwest::Response> {
        self.ensure_configured()?;
        let url = format!("{}/{}", self.base_url, path);
        send_with_retry(SERVICE, &self.retry, || {
            get_http_client()
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(payload)
        })
        .await
    }

    async fn chat_completion(&self, payload: Value) -> StylistResult<String> {
        let response = self.post_json("chat/completions", &payload).await?;
        let body: ChatCompletionResponse = response.json().await.map_err(|err| {
            StylistError::malformed("chat completion", format!("invalid JSON body: {err}"))
        })?;

        let message = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .ok_or_else(|| StylistError::malformed("chat completion", "no choices returned"))?;

        if let Some(refusal) = message.refusal.filter(|value| !value.trim().is_empty()) {
            warn!("Model refused the request: {}", truncate_for_log(&refusal, 300));
            return Err(StylistError::malformed(
                "chat completion",
                format!("model refused: {refusal}"),
            ));
        }

        let content = message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(StylistError::malformed("chat completion", "empty message content"));
        }
        debug!("Chat completion content: {}", truncate_for_log(&content, 500));
        Ok(content)
    }

    /// Sends `images` as the user turn, after `system_prompt`.
    pub async fn chat_with_images(
        &self,
        model: &str,
        system_prompt: &str,
        images: &[ImageInput],
        max_tokens: u32,
    ) -> StylistResult<String> {
        let parts: Vec<Value> = images
            .iter()
            .map(|image| {
                json!({
                    "type": "image_url",
                    "image_url": { "url": to_data_url(image) }
                })
            })
            .collect();

        let payload = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": parts },
            ],
            "max_tokens": max_tokens,
        });

        let metadata = json!({ "images": images.len() });
        log_api_timing(SERVICE, model, "chat_with_images", Some(metadata), || {
            self.chat_completion(payload)
        })
        .await
    }

    pub async fn chat_text(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        max_tokens: u32,
    ) -> StylistResult<String> {
        let payload = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content },
            ],
            "max_tokens": max_tokens,
        });

        log_api_timing(SERVICE, model, "chat_text", None, || {
            self.chat_completion(payload)
        })
        .await
    }

    /// Generates a single image and returns its hosted URL.
    pub async fn generate_image(&self, request: ImageRequest<'_>) -> StylistResult<String> {
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "size": request.size,
            "quality": request.quality,
            "n": 1,
        });

        log_api_timing(SERVICE, request.model, "generate_image", None, || async {
            let response = self.post_json("images/generations", &payload).await?;
            let body: ImageGenerationResponse = response.json().await.map_err(|err| {
                StylistError::malformed("image generation", format!("invalid JSON body: {err}"))
            })?;
            let image = body
                .data
                .into_iter()
                .next()
                .ok_or_else(|| StylistError::malformed("image generation", "no images returned"))?;
            if let Some(revised) = image.revised_prompt.as_deref() {
                debug!("Image prompt revised to: {}", truncate_for_log(revised, 300));
            }
            image
                .url
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| StylistError::malformed("image generation", "image has no url"))
        })
        .await
    }
}
