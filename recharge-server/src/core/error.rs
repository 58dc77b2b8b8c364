//! HTTP 层错误
//!
//! 回调入口把下层错误映射到这里，再统一变成 JSON 错误响应。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("资源未找到")]
    NotFound,

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("冲突: {0}")]
    Conflict(String),

    #[error("未知平台: {0}")]
    UnknownPlatform(String),

    #[error("内部服务器错误")]
    Internal(#[from] anyhow::Error),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::NotFound | ServerError::UnknownPlatform(_) => StatusCode::NOT_FOUND,
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ServerError::NotFound => "not_found",
            ServerError::Validation(_) => "validation_error",
            ServerError::Conflict(_) => "conflict",
            ServerError::UnknownPlatform(_) => "unknown_platform",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        // 内部错误细节只进日志，不进响应体
        let message = if let ServerError::Internal(err) = &self {
            tracing::error!(error = ?err, "Internal server error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: self.code(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

/// 处理器的 Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
