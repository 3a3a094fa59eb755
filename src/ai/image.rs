use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ImageConfig;
use crate::error::{AppError, Result};

const PROVIDER: &str = "image generation";

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

/// Zhipu CogView text-to-image client.
#[derive(Clone)]
pub struct ImageClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ImageClient {
    pub fn new(api_key: String, config: &ImageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Generates a cover image for `title` and returns its temporary URL.
    pub async fn generate(&self, title: &str) -> Result<String> {
        let request = GenerationRequest {
            model: &self.model,
            prompt: format!("A cover illustration for an essay titled \"{title}\""),
        };

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(AppError::provider(PROVIDER))?;

        if !response.status().is_success() {
            let error_text = response.text().await.map_err(AppError::provider(PROVIDER))?;
            return Err(AppError::upstream(PROVIDER, format!("API error: {}", error_text)));
        }

        let generation: GenerationResponse =
            response.json().await.map_err(AppError::provider(PROVIDER))?;

        generation
            .data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or_else(|| AppError::upstream(PROVIDER, "No image returned from API"))
    }
}
