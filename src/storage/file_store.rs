use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use url::Url;
use uuid::Uuid;

use crate::error::{AppError, Result};

const SUFFIX_LEN: usize = 10;
const FETCH_PROVIDER: &str = "file fetch";

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
static SAFE_SEGMENT: OnceLock<Regex> = OnceLock::new();

/// Record-scoped files on local disk, laid out as
/// `<root>/<collection>/<record id>/<stored name>`.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    app_url: String,
    client: Client,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, app_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("essay-backend/1.0")
            .build()?;
        Ok(Self {
            root: root.into(),
            app_url: app_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Writes `bytes` and returns the unique stored file name.
    pub async fn save(
        &self,
        collection: &str,
        record_id: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let dir = self.record_dir(collection, record_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let name = stored_name(original_name);
        tokio::fs::write(dir.join(&name), bytes).await?;
        tracing::debug!("Stored {} ({} bytes) for {}/{}", name, bytes.len(), collection, record_id);
        Ok(name)
    }

    /// Downloads `url`, returning the bytes and the file name taken from the
    /// last path segment.
    pub async fn fetch_url(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let parsed = Url::parse(url)
            .map_err(|e| AppError::Validation(format!("invalid file url {url}: {e}")))?;
        let name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .unwrap_or_else(|| "file".to_string());

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(AppError::provider(FETCH_PROVIDER))?;
        if !response.status().is_success() {
            return Err(AppError::upstream(
                FETCH_PROVIDER,
                format!("GET {} returned {}", url, response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(AppError::provider(FETCH_PROVIDER))?;
        Ok((bytes.to_vec(), name))
    }

    pub async fn read(&self, collection: &str, record_id: &str, name: &str) -> Result<Vec<u8>> {
        if !is_safe_segment(name) {
            return Err(AppError::NotFound(format!("file {name}")));
        }
        let path = self.record_dir(collection, record_id)?.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("file {name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every file stored for a record. A missing directory is fine.
    pub async fn remove_record(&self, collection: &str, record_id: &str) -> Result<()> {
        let dir = self.record_dir(collection, record_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn url(&self, collection: &str, record_id: &str, name: &str) -> String {
        format!(
            "{}/api/files/{}/{}/{}",
            self.app_url,
            collection,
            record_id,
            urlencoding::encode(name)
        )
    }

    fn record_dir(&self, collection: &str, record_id: &str) -> Result<PathBuf> {
        if !is_safe_segment(collection) || !is_safe_segment(record_id) {
            return Err(AppError::NotFound(format!("{collection}/{record_id}")));
        }
        Ok(self.root.join(collection).join(record_id))
    }
}

fn is_safe_segment(segment: &str) -> bool {
    let re = SAFE_SEGMENT.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap());
    re.is_match(segment) && !segment.starts_with('.')
}

/// `"My Essay!.mp3"` becomes `"My_Essay_<random>.mp3"`.
fn stored_name(original: &str) -> String {
    let re = UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^A-Za-z0-9_\-]+").unwrap());

    let (stem, ext) = match original.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=8).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext.to_ascii_lowercase()))
        }
        _ => (original, None),
    };

    let mut clean = re.replace_all(stem, "_").trim_matches('_').to_string();
    if clean.is_empty() {
        clean = "file".to_string();
    }
    clean.truncate(100);

    let suffix: String = Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string();
    match ext {
        Some(ext) => format!("{clean}_{suffix}.{ext}"),
        None => format!("{clean}_{suffix}"),
    }
}
