use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const PROVIDER: &str = "telegram";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
    pub audio: Option<Audio>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Audio {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct SendAudioRequest<'a> {
    chat_id: i64,
    /// An HTTP URL or a previously returned `file_id`.
    audio: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
}

/// Minimal Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    /// `poll_timeout_secs` bounds long polling; the HTTP timeout leaves headroom above it.
    pub fn new(token: String, base_url: &str, poll_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn call<B: Serialize, T: DeserializeOwned>(&self, api_method: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/bot{}/{}", self.base_url, self.token, api_method))
            .json(body)
            .send()
            .await
            .map_err(AppError::provider(PROVIDER))?;

        let status = response.status();
        let api_response: ApiResponse<T> = response.json().await.map_err(|e| {
            AppError::upstream(PROVIDER, format!("{api_method} returned {status}: {e}"))
        })?;

        match api_response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(AppError::upstream(
                PROVIDER,
                format!(
                    "{api_method} failed: {}",
                    description.unwrap_or_else(|| status.to_string())
                ),
            )),
        }
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &request).await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message> {
        let request = SendMessageRequest {
            chat_id,
            text,
            disable_web_page_preview: false,
        };
        self.call("sendMessage", &request).await
    }

    /// Sends audio by URL or file id and returns the Telegram file id of the result.
    pub async fn send_audio(
        &self,
        chat_id: i64,
        audio: &str,
        title: &str,
        caption: Option<&str>,
    ) -> Result<Option<String>> {
        let request = SendAudioRequest {
            chat_id,
            audio,
            title,
            caption,
        };
        let message: Message = self.call("sendAudio", &request).await?;
        Ok(message.audio.map(|a| a.file_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_updates_parses_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot42:abc/getUpdates"))
            .and(body_partial_json(json!({"offset": 7, "timeout": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 7, "message": {"message_id": 1, "chat": {"id": 99}, "text": "/list"}},
                    {"update_id": 8}
                ]
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::new("42:abc".into(), &server.uri(), 1).unwrap();
        let updates = client.get_updates(Some(7), 1).await.unwrap();
        assert_eq!(updates.len(), 2);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 99);
        assert_eq!(message.text.as_deref(), Some("/list"));
        assert!(updates[1].message.is_none());
    }

    #[tokio::test]
    async fn send_audio_returns_file_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot42:abc/sendAudio"))
            .and(body_partial_json(json!({"chat_id": 5, "audio": "http://h/a.mp3"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 3, "chat": {"id": 5}, "audio": {"file_id": "CQAC-1"}}
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::new("42:abc".into(), &server.uri(), 1).unwrap();
        let file_id = client
            .send_audio(5, "http://h/a.mp3", "Essay", None)
            .await
            .unwrap();
        assert_eq!(file_id.as_deref(), Some("CQAC-1"));
    }

    #[tokio::test]
    async fn api_errors_carry_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false, "error_code": 401, "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::new("bad".into(), &server.uri(), 1).unwrap();
        let err = client.get_me().await.unwrap_err();
        assert!(err.to_string().contains("Unauthorized"), "{err}");
    }

    #[tokio::test]
    async fn unreachable_api_is_an_upstream_error() {
        let client = TelegramClient::new("t".into(), "http://127.0.0.1:1", 1).unwrap();
        let err = client.get_me().await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { provider: PROVIDER, .. }), "{err:?}");
    }
}
