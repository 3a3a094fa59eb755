use crate::ai::{ImageClient, SpeechClient};
use crate::config::Config;
use crate::db::SecretRepository;
use crate::error::{AppError, Result};
use crate::services::TelegraphClient;

/// The external clients the essay lifecycle calls out to. A `None` client is
/// unconfigured and every call through it fails as an upstream error.
#[derive(Clone, Default)]
pub struct Providers {
    pub image: Option<ImageClient>,
    pub speech: Option<SpeechClient>,
    pub telegraph: Option<TelegraphClient>,
}

impl Providers {
    /// Builds clients from config, falling back to the secrets table for
    /// credentials the config leaves empty.
    pub async fn resolve(config: &Config, secrets: &SecretRepository) -> Result<Self> {
        let mut image_config = config.image.clone();
        let mut image_key = image_config.api_key.clone();
        if image_key.is_none() {
            if let Some(secret) = secrets.lookup("zhipu").await {
                image_key = Some(secret.api_key).filter(|k| !k.is_empty());
                if !secret.uri.is_empty() {
                    image_config.base_url = secret.uri;
                }
            }
        }

        let mut speech_config = config.speech.clone();
        let mut speech_key = speech_config.api_key.clone();
        if speech_key.is_none() {
            if let Some(secret) = secrets.lookup("azure").await {
                speech_key = Some(secret.api_key).filter(|k| !k.is_empty());
                if let Some(region) = secret.ext.get("region").filter(|r| !r.is_empty()) {
                    speech_config.region = region.clone();
                }
                if !secret.uri.is_empty() {
                    speech_config.endpoint = Some(secret.uri);
                }
            }
        }

        let mut telegraph_token = config.telegraph.access_token.clone();
        if telegraph_token.is_none() {
            telegraph_token = secrets
                .lookup("telegraph")
                .await
                .map(|s| s.api_key)
                .filter(|k| !k.is_empty());
        }

        let image = image_key
            .map(|key| ImageClient::new(key, &image_config))
            .transpose()?;
        let speech = speech_key
            .map(|key| SpeechClient::new(key, &speech_config))
            .transpose()?;
        let telegraph = telegraph_token
            .map(|token| TelegraphClient::new(token, &config.telegraph))
            .transpose()?;

        for (name, configured) in [
            ("image generation", image.is_some()),
            ("speech synthesis", speech.is_some()),
            ("telegraph", telegraph.is_some()),
        ] {
            if !configured {
                tracing::warn!("No credentials for {}, calls to it will fail", name);
            }
        }

        Ok(Self {
            image,
            speech,
            telegraph,
        })
    }

    pub fn image(&self) -> Result<&ImageClient> {
        self.image
            .as_ref()
            .ok_or_else(|| AppError::upstream("image generation", "not configured"))
    }

    pub fn speech(&self) -> Result<&SpeechClient> {
        self.speech
            .as_ref()
            .ok_or_else(|| AppError::upstream("speech synthesis", "not configured"))
    }

    pub fn telegraph(&self) -> Result<&TelegraphClient> {
        self.telegraph
            .as_ref()
            .ok_or_else(|| AppError::upstream("telegraph", "not configured"))
    }
}
