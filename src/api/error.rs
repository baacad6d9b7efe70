//! HTTP error mapping
//!
//! Every error body has the shape `{"detail": ...}`: a list of field
//! errors for 422, a message string otherwise.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use super::types::FieldError;
use crate::domain::task::Task;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request validation failed")]
    Validation(Vec<FieldError>),

    #[error("Model not loaded. Please try again later.")]
    ModelNotLoaded,

    #[error("{label} failed: {message}")]
    Generation { label: &'static str, message: String },
}

impl ApiError {
    pub fn generation(task: Task, message: impl Into<String>) -> Self {
        ApiError::Generation { label: task.label(), message: message.into() }
    }

    /// Unparseable or mistyped JSON body.
    pub fn malformed_body(message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError {
            loc:  vec!["body".to_string()],
            msg:  message.into(),
            kind: "json_invalid".to_string(),
        }])
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)     => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ModelNotLoaded    => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Generation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(errors) => json!({ "detail": errors }),
            other                        => json!({ "detail": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
