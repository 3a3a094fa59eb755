use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{
    AddEssayRequest, EssayDetail, EssaySummary, RecordInput, RecordPatch, TtsCallback,
};
use crate::tasks::TaskStatsSnapshot;

use super::resp::{succ, ApiResult};
use super::AppState;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

pub async fn start_bot(State(state): State<AppState>) -> ApiResult<()> {
    state.bot.start().await;
    succ(())
}

pub async fn stop_bot(State(state): State<AppState>) -> ApiResult<()> {
    state.bot.stop().await;
    succ(())
}

pub async fn notify(
    State(state): State<AppState>,
    payload: Result<Json<TtsCallback>, JsonRejection>,
) -> ApiResult<()> {
    state.essays.notify(body(payload)?).await?;
    succ(())
}

#[derive(Debug, Serialize)]
pub struct Created {
    id: String,
}

pub async fn add_essay(
    State(state): State<AppState>,
    payload: Result<Json<AddEssayRequest>, JsonRejection>,
) -> ApiResult<Created> {
    let request = body(payload)?;
    let id = state.essays.add(&request.title, &request.content).await?;
    succ(Created { id })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    filter: String,
    limit: Option<u32>,
    offset: Option<u32>,
}

pub async fn list_essays(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Vec<EssaySummary>> {
    let Query(query) = query.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    succ(state.essays.list(&query.filter, query.limit, query.offset).await?)
}

pub async fn essay_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<EssayDetail> {
    succ(state.essays.detail(&id).await?)
}

pub async fn delete_essay(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.essays.delete(&id).await?;
    succ(())
}

#[derive(Debug, Deserialize)]
pub struct FileIdRequest {
    file_id: String,
}

pub async fn update_file_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<FileIdRequest>, JsonRejection>,
) -> ApiResult<()> {
    let request = body(payload)?;
    state.essays.update_file_id(&id, &request.file_id).await?;
    succ(())
}

pub async fn create_record(
    State(state): State<AppState>,
    payload: Result<Json<RecordInput>, JsonRejection>,
) -> ApiResult<EssayDetail> {
    succ(state.essays.create_record(body(payload)?).await?)
}

pub async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RecordPatch>, JsonRejection>,
) -> ApiResult<EssayDetail> {
    succ(state.essays.update_record(&id, body(payload)?).await?)
}

pub async fn task_stats(State(state): State<AppState>) -> ApiResult<TaskStatsSnapshot> {
    succ(state.essays.tasks().stats())
}

/// Serves stored bytes. Unlike the JSON routes a missing file is a plain 404.
pub async fn serve_file(
    State(state): State<AppState>,
    Path((collection, id, name)): Path<(String, String, String)>,
) -> Response {
    match state.essays.files().read(&collection, &id, &name).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, content_type(&name))],
            Body::from(bytes),
        )
            .into_response(),
        Err(AppError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!("Failed to read file {}/{}/{}: {}", collection, id, name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn not_found() -> AppError {
    AppError::NotFound("route".to_string())
}

fn content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}
