use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_files_dir")]
    pub files_dir: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Public base URL used when building file links.
    #[serde(default = "default_app_url")]
    pub app_url: String,

    #[serde(default = "default_task_concurrency")]
    pub task_concurrency: usize,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub telegraph: TelegraphConfig,

    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_image_base_url")]
    pub base_url: String,
    #[serde(default = "default_image_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_speech_region")]
    pub region: String,
    /// Overrides the region-derived endpoint.
    pub endpoint: Option<String>,
    #[serde(default = "default_speech_voice")]
    pub voice: String,
    #[serde(default = "default_speech_format")]
    pub output_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegraphConfig {
    pub access_token: Option<String>,
    #[serde(default = "default_telegraph_base_url")]
    pub base_url: String,
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub token: Option<String>,
    #[serde(default = "default_bot_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("essay-backend");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("essays.db").to_string_lossy().to_string()
}

fn default_files_dir() -> String {
    data_dir().join("files").to_string_lossy().to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_app_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_task_concurrency() -> usize {
    4
}

fn default_image_base_url() -> String {
    "https://open.bigmodel.cn/api/paas/v4".to_string()
}

fn default_image_model() -> String {
    "cogview-3-flash".to_string()
}

fn default_speech_region() -> String {
    "eastus".to_string()
}

fn default_speech_voice() -> String {
    "en-US-JennyNeural".to_string()
}

fn default_speech_format() -> String {
    "audio-24khz-48kbitrate-mono-mp3".to_string()
}

fn default_telegraph_base_url() -> String {
    "https://api.telegra.ph".to_string()
}

fn default_bot_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_image_base_url(),
            model: default_image_model(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            region: default_speech_region(),
            endpoint: None,
            voice: default_speech_voice(),
            output_format: default_speech_format(),
        }
    }
}

impl Default for TelegraphConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: default_telegraph_base_url(),
            author_name: None,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_bot_base_url(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            files_dir: default_files_dir(),
            bind_addr: default_bind_addr(),
            app_url: default_app_url(),
            task_concurrency: default_task_concurrency(),
            image: ImageConfig::default(),
            speech: SpeechConfig::default(),
            telegraph: TelegraphConfig::default(),
            bot: BotConfig::default(),
        }
    }
}

impl SpeechConfig {
    pub fn endpoint_url(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                self.region
            )
        })
    }
}

impl Config {
    /// Loads the config file (creating it with defaults when missing), then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok());
        if config.task_concurrency == 0 {
            return Err(AppError::Config(
                "task_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("essay-backend")
            .join("config.toml")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("ZHIPU_API_KEY") {
            self.image.api_key = Some(v);
        }
        if let Some(v) = non_empty("AZURE_SPEECH_KEY") {
            self.speech.api_key = Some(v);
        }
        if let Some(v) = non_empty("AZURE_SPEECH_REGION") {
            self.speech.region = v;
        }
        if let Some(v) = non_empty("TELEGRAPH_TOKEN") {
            self.telegraph.access_token = Some(v);
        }
        if let Some(v) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.bot.token = Some(v);
        }
    }
}
