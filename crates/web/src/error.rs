//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{ListError, PurchaseError};
use crate::store::StoreError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Repository operation failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Input the user can correct.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request conflicts with current data (duplicate item).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Repository(RepositoryError::Store(err))
    }
}

impl From<ListError> for AppError {
    fn from(err: ListError) -> Self {
        match err {
            ListError::InvalidName(e) => Self::Validation(e.to_string()),
            ListError::Duplicate(_) => Self::Conflict(err.to_string()),
            ListError::Repository(e) => Self::Repository(e),
        }
    }
}

impl From<PurchaseError> for AppError {
    fn from(err: PurchaseError) -> Self {
        match err {
            PurchaseError::ItemNotFound => Self::NotFound("item".to_string()),
            PurchaseError::Repository(e) => Self::Repository(e),
        }
    }
}

impl AppError {
    /// Whether the store could not be reached, as opposed to a bug.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Repository(RepositoryError::Store(StoreError::Unavailable(_) | StoreError::Http(_)))
        )
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Repository(RepositoryError::NotFound) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Repository(RepositoryError::Conflict(_)) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            _ if self.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Repository(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            _ if self.is_unavailable() => {
                "Could not reach the database. Please try again.".to_string()
            }
            Self::Repository(RepositoryError::NotFound) | Self::NotFound(_) => {
                "That item is no longer on the list.".to_string()
            }
            // Don't expose internal error details to clients
            Self::Repository(_) | Self::Internal(_) => "Something went wrong.".to_string(),
            Self::Validation(msg) | Self::Conflict(msg) | Self::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, self.user_message()).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("list", "Item added", Some(&[("name", "milk")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shoplist_core::{NameError, NormalizedName};

    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("item-123".to_string());
        assert_eq!(err.to_string(), "Not found: item-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Conflict("test".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Validation("test".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(StoreError::Unavailable("down".to_string()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_list_errors_map_to_user_messages() {
        let duplicate: AppError = ListError::Duplicate(NormalizedName::parse("milk").unwrap()).into();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
        assert_eq!(duplicate.user_message(), "Milk is already on the list");

        let invalid: AppError = ListError::InvalidName(NameError::TooLong { max: 100 }).into();
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let internal: AppError = RepositoryError::DataCorruption("bad".to_string()).into();
        assert_eq!(internal.user_message(), "Something went wrong.");
    }
}
