use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::AppError;

/// Uniform response body. Every response is HTTP 200; `code` carries the
/// outcome, 0 meaning success.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

pub fn succ<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        code: 0,
        msg: "success".to_string(),
        data: Some(data),
    }))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        match &self {
            AppError::NotFound(_) | AppError::Validation(_) | AppError::Conflict(_) => {
                tracing::warn!("Request failed ({}): {}", code, self)
            }
            _ => tracing::error!("Request failed ({}): {}", code, self),
        }

        let body = Envelope::<()> {
            code,
            msg: self.to_string(),
            data: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}
