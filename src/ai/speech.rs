use std::time::Duration;

use reqwest::Client;

use crate::config::SpeechConfig;
use crate::error::{AppError, Result};

const PROVIDER: &str = "speech synthesis";

/// Azure Cognitive Services text-to-speech client.
#[derive(Clone)]
pub struct SpeechClient {
    client: Client,
    api_key: String,
    endpoint: String,
    voice: String,
    output_format: String,
}

impl SpeechClient {
    pub fn new(api_key: String, config: &SpeechConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("essay-backend/1.0")
            .build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint_url(),
            voice: config.voice.clone(),
            output_format: config.output_format.clone(),
        })
    }

    /// Renders `text` to audio in the configured output format.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.output_format)
            .body(ssml(&self.voice, text))
            .send()
            .await
            .map_err(AppError::provider(PROVIDER))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.map_err(AppError::provider(PROVIDER))?;
            return Err(AppError::upstream(
                PROVIDER,
                format!("API error {}: {}", status, error_text),
            ));
        }

        let audio = response.bytes().await.map_err(AppError::provider(PROVIDER))?;
        if audio.is_empty() {
            return Err(AppError::upstream(PROVIDER, "Empty audio returned from API"));
        }
        Ok(audio.to_vec())
    }

    /// File extension matching the configured output format.
    pub fn file_extension(&self) -> &'static str {
        if self.output_format.ends_with("mp3") {
            "mp3"
        } else if self.output_format.starts_with("ogg") {
            "ogg"
        } else if self.output_format.starts_with("webm") {
            "webm"
        } else {
            "wav"
        }
    }
}

fn ssml(voice: &str, text: &str) -> String {
    let lang = voice.splitn(3, '-').take(2).collect::<Vec<_>>().join("-");
    format!(
        "<speak version='1.0' xml:lang='{}'><voice name='{}'>{}</voice></speak>",
        xml_escape(&lang),
        xml_escape(voice),
        xml_escape(text)
    )
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
