use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Essay {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Stored file name of the thumbnail, if one is attached.
    pub thumb: Option<String>,
    /// Stored file name of the rendered audio, if one is attached.
    pub file: Option<String>,
    pub file_id: String,
    pub task_id: String,
    pub sentences: Vec<Sentence>,
    pub telegraph: String,
    pub essay_type: String,
    pub video_link: String,
    pub revision: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// One timed caption as delivered by the speech provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentence {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub begin_time: i64,
    #[serde(default)]
    pub end_time: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct NewEssay {
    pub id: String,
    pub title: String,
    pub content: String,
    pub thumb: Option<String>,
    pub essay_type: String,
    pub video_link: String,
}

/// Field-level changes applied by a revision-checked save. `None` leaves the
/// column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EssayPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub thumb: Option<Option<String>>,
    pub file: Option<Option<String>>,
    pub file_id: Option<String>,
    pub task_id: Option<String>,
    pub sentences: Option<Vec<Sentence>>,
    pub telegraph: Option<String>,
    pub essay_type: Option<String>,
    pub video_link: Option<String>,
}

impl EssayPatch {
    pub fn is_empty(&self) -> bool {
        *self == EssayPatch::default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EssaySummary {
    pub id: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub title: String,
}

impl From<Essay> for EssaySummary {
    fn from(essay: Essay) -> Self {
        Self {
            id: essay.id,
            created: essay.created,
            updated: essay.updated,
            title: essay.title,
        }
    }
}

/// Full view of an essay with stored files rewritten into fetchable URLs.
#[derive(Debug, Clone, Serialize)]
pub struct EssayDetail {
    pub id: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub title: String,
    pub content: String,
    pub file: String,
    pub file_id: String,
    pub thumb: String,
    pub telegraph: String,
    pub sentences: Vec<Sentence>,
    pub essay_type: String,
    pub video_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddEssayRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Body of a generic record create.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub essay_type: String,
    #[serde(default)]
    pub video_link: String,
}

/// Body of a generic record update. Only these fields are writable through
/// the record API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub task_id: Option<String>,
    pub essay_type: Option<String>,
    pub video_link: Option<String>,
}

impl From<RecordPatch> for EssayPatch {
    fn from(patch: RecordPatch) -> Self {
        EssayPatch {
            title: patch.title,
            content: patch.content,
            task_id: patch.task_id,
            essay_type: patch.essay_type,
            video_link: patch.video_link,
            ..Default::default()
        }
    }
}

/// Completion callback sent by the speech provider.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsCallback {
    pub data: TtsCallbackData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsCallbackData {
    pub task_id: String,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
    pub audio_address: String,
}
