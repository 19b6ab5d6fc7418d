use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use flat_core::error::FlatError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain without
/// touching the `FlatError` enum.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }
}

fn status_for(e: &FlatError) -> StatusCode {
    match e {
        FlatError::JobNotFound(_) | FlatError::StepNotFound { .. } => StatusCode::NOT_FOUND,
        FlatError::JobExists(_) => StatusCode::CONFLICT,
        FlatError::InvalidJobName(_)
        | FlatError::InvalidSqlFormat(_)
        | FlatError::Parse(_) => StatusCode::BAD_REQUEST,
        FlatError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
        FlatError::Io(_) | FlatError::Yaml(_) | FlatError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequestError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if let Some(e) = self.0.downcast_ref::<FlatError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_not_found_maps_to_404() {
        let err = AppError(FlatError::JobNotFound("sync".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn job_exists_maps_to_409() {
        let err = AppError(FlatError::JobExists("sync".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_job_name_maps_to_400() {
        let err = AppError(FlatError::InvalidJobName("1bad".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn closed_session_maps_to_503() {
        let err = AppError(FlatError::SessionClosed.into());
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn io_error_maps_to_500() {
        let err = AppError(FlatError::Io(std::io::Error::other("disk full")).into());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn other_errors_map_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn bad_request_constructor_maps_to_400() {
        let err = AppError::bad_request("unsupported message");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
