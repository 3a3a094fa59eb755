use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TelegraphConfig;
use crate::error::{AppError, Result};

const PROVIDER: &str = "telegraph";
const MAX_TITLE_CHARS: usize = 256;

/// A Telegraph DOM node: either bare text or an element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Text(String),
    Element {
        tag: &'static str,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        attrs: BTreeMap<&'static str, String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        children: Vec<Node>,
    },
}

#[derive(Debug, Serialize)]
struct CreatePageRequest<'a> {
    access_token: &'a str,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author_name: Option<&'a str>,
    content: Vec<Node>,
    return_content: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<Page>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub path: String,
    pub url: String,
}

#[derive(Clone)]
pub struct TelegraphClient {
    client: Client,
    access_token: String,
    base_url: String,
    author_name: Option<String>,
}

impl TelegraphClient {
    pub fn new(access_token: String, config: &TelegraphConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            access_token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            author_name: config.author_name.clone(),
        })
    }

    /// Publishes a new page and returns its address.
    pub async fn create_page(&self, title: &str, content: &str, image_url: Option<&str>) -> Result<Page> {
        let request = CreatePageRequest {
            access_token: &self.access_token,
            title: title.chars().take(MAX_TITLE_CHARS).collect(),
            author_name: self.author_name.as_deref(),
            content: page_nodes(content, image_url),
            return_content: false,
        };

        let response = self
            .client
            .post(format!("{}/createPage", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(AppError::provider(PROVIDER))?;

        if !response.status().is_success() {
            let error_text = response.text().await.map_err(AppError::provider(PROVIDER))?;
            return Err(AppError::upstream(PROVIDER, format!("API error: {}", error_text)));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(AppError::provider(PROVIDER))?;
        match api_response {
            ApiResponse {
                ok: true,
                result: Some(page),
                ..
            } => Ok(page),
            ApiResponse { error, .. } => Err(AppError::upstream(
                PROVIDER,
                error.unwrap_or_else(|| "No page returned from API".to_string()),
            )),
        }
    }
}

/// Optional leading image figure followed by one paragraph per non-blank line.
pub fn page_nodes(content: &str, image_url: Option<&str>) -> Vec<Node> {
    let mut nodes = Vec::new();

    if let Some(src) = image_url.filter(|s| !s.is_empty()) {
        let mut attrs = BTreeMap::new();
        attrs.insert("src", src.to_string());
        nodes.push(Node::Element {
            tag: "figure",
            attrs: BTreeMap::new(),
            children: vec![Node::Element {
                tag: "img",
                attrs,
                children: Vec::new(),
            }],
        });
    }

    nodes.extend(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| Node::Element {
                tag: "p",
                attrs: BTreeMap::new(),
                children: vec![Node::Text(line.to_string())],
            }),
    );

    nodes
}
