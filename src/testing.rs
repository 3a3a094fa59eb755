//! Shared fixtures for tests: an essay service wired to a scratch database,
//! a temp file store and a wiremock server standing in for every provider.

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::ai::{ImageClient, SpeechClient};
use crate::config::{ImageConfig, SpeechConfig, TelegraphConfig};
use crate::db::Repository;
use crate::essay::{EssayService, Providers};
use crate::services::TelegraphClient;
use crate::storage::FileStore;
use crate::tasks::TaskPool;

pub const APP_URL: &str = "http://app.test";
pub const IMAGE_PATH: &str = "/zhipu/images/generations";
pub const TTS_PATH: &str = "/tts";
pub const TELEGRAPH_PATH: &str = "/telegraph/createPage";

pub struct Harness {
    pub service: EssayService,
    pub repo: Repository,
    pub files: FileStore,
    pub server: MockServer,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let providers = Providers {
            image: Some(
                ImageClient::new(
                    "zk".into(),
                    &ImageConfig {
                        base_url: format!("{}/zhipu", server.uri()),
                        ..ImageConfig::default()
                    },
                )
                .unwrap(),
            ),
            speech: Some(
                SpeechClient::new(
                    "az".into(),
                    &SpeechConfig {
                        endpoint: Some(format!("{}{}", server.uri(), TTS_PATH)),
                        ..SpeechConfig::default()
                    },
                )
                .unwrap(),
            ),
            telegraph: Some(
                TelegraphClient::new(
                    "tg".into(),
                    &TelegraphConfig {
                        base_url: format!("{}/telegraph", server.uri()),
                        ..TelegraphConfig::default()
                    },
                )
                .unwrap(),
            ),
        };
        Self::with_providers(server, providers).await
    }

    pub async fn with_providers(server: MockServer, providers: Providers) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::in_memory().await.unwrap();
        let files = FileStore::new(dir.path().join("files"), APP_URL).unwrap();
        let service = EssayService::new(repo.clone(), files.clone(), providers, TaskPool::spawn(2));
        Self {
            service,
            repo,
            files,
            server,
            _dir: dir,
        }
    }

    /// Image generation answering with a URL on the mock server, plus that image.
    pub async fn mock_image(&self, bytes: &[u8]) -> String {
        let image_url = format!("{}/assets/cover.png", self.server.uri());
        Mock::given(method("POST"))
            .and(path(IMAGE_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [{"url": image_url}]})),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/assets/cover.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
            .mount(&self.server)
            .await;
        image_url
    }

    pub async fn mock_telegraph(&self, page_url: &str) {
        Mock::given(method("POST"))
            .and(path(TELEGRAPH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"path": "p", "url": page_url}
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_tts(&self, audio: &[u8]) {
        Mock::given(method("POST"))
            .and(path(TTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(audio.to_vec()))
            .mount(&self.server)
            .await;
    }

    pub async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}
