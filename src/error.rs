use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    archive::ArchiveError, paths::ResolveError, render, trash::TrashError, unique::AllocError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("admin credentials required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
    /// An external tool failed; its message is shown as-is.
    #[error("{0}")]
    Process(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::Process(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the client. Internal details stay in the log.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(details) => {
                error!(details = %details, "Internal server error");
                "An internal error occurred.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let title = match status {
            StatusCode::NOT_FOUND => "Not Found",
            s if s.is_client_error() => "Warning",
            _ => "Error",
        };
        (status, render::error_page(title, &self.public_message())).into_response()
    }
}

/// Same errors, rendered as `{"err": "..."}` for the script-driven endpoints.
#[derive(Debug)]
pub struct JsonError(pub AppError);

impl<E: Into<AppError>> From<E> for JsonError {
    fn from(err: E) -> Self {
        JsonError(err.into())
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let body = serde_json::json!({ "err": self.0.public_message() });
        (status, Json(body)).into_response()
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match &err {
            ResolveError::NotFound(_) => AppError::NotFound("Path not found.".into()),
            ResolveError::OutsideRoot(path) => {
                warn!("Path traversal attempt: {}", path.display());
                AppError::Forbidden("Access denied.".into())
            }
            ResolveError::Io { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        match &err {
            ArchiveError::EmptyLabel
            | ArchiveError::InvalidLabel(_)
            | ArchiveError::Selection(_) => AppError::BadRequest(err.to_string()),
            ArchiveError::Failed { .. } | ArchiveError::Spawn { .. } => {
                error!("Archive failed: {}", err);
                AppError::Process(err.to_string())
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<AllocError> for AppError {
    fn from(err: AllocError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<TrashError> for AppError {
    fn from(err: TrashError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
