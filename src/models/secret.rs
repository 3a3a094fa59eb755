use std::collections::HashMap;

use chrono::{DateTime, Utc};

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Secret {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub api_key: String,
    pub secret_key: String,
    pub description: String,
    pub ext: HashMap<String, String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSecret {
    pub name: String,
    pub uri: String,
    pub api_key: String,
    pub secret_key: String,
    pub description: String,
    pub ext: HashMap<String, String>,
}
