use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::{models::ErrorBody, telemetry};

pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";
pub const TEXT_REQUIRED: &str = "Text parameter is required";
pub const INVALID_HISTORY: &str = "History must be a list of user/assistant messages";
pub const CONFIGURATION: &str = "Server configuration error";
pub const UPSTREAM_FAILED: &str = "Failed to get response from AI service";
pub const NO_RESPONSE: &str = "No response received";
pub const INTERNAL: &str = "Internal server error";

/**
 * \brief 中继请求的错误分类。
 *
 * Display 为服务端诊断信息；返回给调用方的只有 `public_message()`。
 */
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid history: {0}")]
    InvalidHistory(String),

    #[error("{var} environment variable is not set")]
    MissingCredential { var: &'static str },

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("no reply in upstream response")]
    NoReply,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /**
     * \brief 返回给调用方的状态码。上游失败时原样转发上游状态码。
     */
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::InvalidInput(_) | RelayError::InvalidHistory(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream { status, .. } => forwarded_status(*status),
            RelayError::MissingCredential { .. } | RelayError::NoReply | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            RelayError::MethodNotAllowed(_) => METHOD_NOT_ALLOWED,
            RelayError::InvalidInput(_) => TEXT_REQUIRED,
            RelayError::InvalidHistory(_) => INVALID_HISTORY,
            RelayError::MissingCredential { .. } => CONFIGURATION,
            RelayError::Upstream { .. } => UPSTREAM_FAILED,
            RelayError::NoReply => NO_RESPONSE,
            RelayError::Internal(_) => INTERNAL,
        }
    }

    /**
     * \brief 仅运维侧需要关注的故障记为 ERROR，调用方输入问题记为 INFO。
     */
    pub fn log(&self) {
        match self {
            RelayError::MethodNotAllowed(_)
            | RelayError::InvalidInput(_)
            | RelayError::InvalidHistory(_) => {
                telemetry::log_event("relay.reject", &self.to_string())
            }
            _ => telemetry::log_error("relay", &self.to_string()),
        }
    }
}

fn forwarded_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() || code.is_server_error() => code,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
