use crate::time::TimeRangeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    TimeRange(#[from] TimeRangeError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("query execution failed")]
    QueryExecution(#[source] anyhow::Error),

    #[error("query timed out")]
    Timeout,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::TimeRange(_) | ServiceError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Config(_)
            | ServiceError::QueryExecution(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            match &self {
                ServiceError::QueryExecution(source) | ServiceError::Internal(source) => {
                    error!(error = %self, cause = ?source, "request failed")
                }
                _ => error!(error = %self, "request failed"),
            }
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(
            ServiceError::from(TimeRangeError::InvalidFormat).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::from(TimeRangeError::InvalidRange).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidRequest("page must be >= 1".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn server_errors_hide_their_cause() {
        let err = ServiceError::QueryExecution(anyhow::anyhow!("password authentication failed"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "query execution failed");
        assert_eq!(ServiceError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ServiceError::Config("unknown table".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
