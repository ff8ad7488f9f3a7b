//! Errors returned by the Iceberg REST handlers.
//!
//! Each [`IcebergError`] variant is one Iceberg exception type and renders as
//! the REST `ErrorModel` body `{"error": {"message", "type", "code"}}`.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::CatalogError;

/// Result type alias for Iceberg operations.
pub type IcebergResult<T> = Result<T, IcebergError>;

/// A failed catalog request, one variant per Iceberg exception type.
#[derive(Debug, Error)]
pub enum IcebergError {
    /// 400 `BadRequestException`.
    #[error("{0}")]
    BadRequest(String),
    /// 400 `ValidationException`: a metadata update that cannot apply.
    #[error("{0}")]
    Validation(String),
    /// 404 `NoSuchNamespaceException`.
    #[error("{0}")]
    NoSuchNamespace(String),
    /// 404 `NoSuchTableException`.
    #[error("{0}")]
    NoSuchTable(String),
    /// 404 `NotFoundException` for anything that is not a namespace or table.
    #[error("{0}")]
    NotFound(String),
    /// 406 `UnsupportedOperationException`.
    #[error("{0}")]
    Unsupported(String),
    /// 409 `AlreadyExistsException`.
    #[error("{0}")]
    AlreadyExists(String),
    /// 409 `NamespaceNotEmptyException`.
    #[error("{0}")]
    NamespaceNotEmpty(String),
    /// 409 `CommitFailedException`: a requirement or pointer swap failed.
    #[error("{0}")]
    CommitFailed(String),
    /// 422 `UnprocessableEntityException`.
    #[error("{0}")]
    Unprocessable(String),
    /// 503 `ServiceUnavailableException`, optionally with `Retry-After`.
    #[error("{message}")]
    ServiceUnavailable {
        /// What is unavailable.
        message: String,
        /// Seconds the client should wait.
        retry_after_seconds: Option<u32>,
    },
    /// 500 `InternalServerException`.
    #[error("{message}")]
    Internal {
        /// Failure description.
        message: String,
    },
}

impl IcebergError {
    /// 400 `BadRequestException`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// 400 `ValidationException`.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// 404 for a missing table.
    #[must_use]
    pub fn table_not_found(table: &str) -> Self {
        Self::NoSuchTable(format!("Table does not exist: {table}"))
    }

    /// 404 for a missing namespace.
    #[must_use]
    pub fn namespace_not_found(namespace: &str) -> Self {
        Self::NoSuchNamespace(format!("Namespace does not exist: {namespace}"))
    }

    /// 409 for dropping a namespace that still holds tables or children.
    #[must_use]
    pub fn namespace_not_empty(namespace: &str) -> Self {
        Self::NamespaceNotEmpty(format!("Namespace is not empty: {namespace}"))
    }

    /// 409 for creating something that is already there.
    #[must_use]
    pub fn already_exists(entity: &str, name: &str) -> Self {
        Self::AlreadyExists(format!("{entity} already exists: {name}"))
    }

    /// 406.
    #[must_use]
    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// 422 listing the keys that were both set and removed.
    #[must_use]
    pub fn property_overlap(keys: &[String]) -> Self {
        Self::Unprocessable(format!(
            "Properties cannot be both updated and removed: {}",
            keys.join(", ")
        ))
    }

    /// 409 `CommitFailedException`.
    #[must_use]
    pub fn commit_conflict(details: impl Into<String>) -> Self {
        Self::CommitFailed(details.into())
    }

    /// HTTP status for the response.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NoSuchNamespace(_) | Self::NoSuchTable(_) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Unsupported(_) => StatusCode::NOT_ACCEPTABLE,
            Self::AlreadyExists(_) | Self::NamespaceNotEmpty(_) | Self::CommitFailed(_) => {
                StatusCode::CONFLICT
            }
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Iceberg exception name for the `type` field.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BadRequestException",
            Self::Validation(_) => "ValidationException",
            Self::NoSuchNamespace(_) => "NoSuchNamespaceException",
            Self::NoSuchTable(_) => "NoSuchTableException",
            Self::NotFound(_) => "NotFoundException",
            Self::Unsupported(_) => "UnsupportedOperationException",
            Self::AlreadyExists(_) => "AlreadyExistsException",
            Self::NamespaceNotEmpty(_) => "NamespaceNotEmptyException",
            Self::CommitFailed(_) => "CommitFailedException",
            Self::Unprocessable(_) => "UnprocessableEntityException",
            Self::ServiceUnavailable { .. } => "ServiceUnavailableException",
            Self::Internal { .. } => "InternalServerException",
        }
    }

    /// Message for the `message` field.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(message)
            | Self::Validation(message)
            | Self::NoSuchNamespace(message)
            | Self::NoSuchTable(message)
            | Self::NotFound(message)
            | Self::Unsupported(message)
            | Self::AlreadyExists(message)
            | Self::NamespaceNotEmpty(message)
            | Self::CommitFailed(message)
            | Self::Unprocessable(message)
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message } => message,
        }
    }
}

/// The Iceberg REST `ErrorModel` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct IcebergErrorResponse {
    /// The error itself.
    pub error: IcebergErrorDetail,
}

/// Body of an [`IcebergErrorResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct IcebergErrorDetail {
    /// Message shown to the client.
    pub message: String,
    /// Iceberg exception name.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Same as the HTTP status.
    pub code: u16,
}

impl From<&IcebergError> for IcebergErrorResponse {
    fn from(err: &IcebergError) -> Self {
        let error = IcebergErrorDetail {
            message: err.message().to_owned(),
            error_type: err.error_type().to_owned(),
            code: err.status_code().as_u16(),
        };
        Self { error }
    }
}

impl From<CatalogError> for IcebergError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NoSuchNamespace(name) => Self::namespace_not_found(&name),
            CatalogError::NoSuchTable(name) => Self::table_not_found(&name),
            CatalogError::AlreadyExists { entity, name } => Self::already_exists(entity, &name),
            CatalogError::NamespaceNotEmpty(name) => Self::namespace_not_empty(&name),
            CatalogError::CommitFailed(message) => Self::CommitFailed(message),
            CatalogError::Validation(message) => Self::BadRequest(message),
            CatalogError::FileNotFound(location) => {
                Self::NotFound(format!("Metadata file does not exist: {location}"))
            }
            CatalogError::Unavailable(message) => Self::ServiceUnavailable {
                message,
                retry_after_seconds: Some(1),
            },
            CatalogError::Storage(message) | CatalogError::Serialization(message) => {
                Self::Internal { message }
            }
        }
    }
}

impl IntoResponse for IcebergError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error_type = self.error_type(), error = %self, "catalog request failed");
        }

        let mut response = (status, axum::Json(IcebergErrorResponse::from(&self))).into_response();
        if let Self::ServiceUnavailable {
            retry_after_seconds: Some(seconds),
            ..
        } = self
        {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_type_pairs() {
        let cases = [
            (IcebergError::bad_request("x"), 400, "BadRequestException"),
            (IcebergError::validation("x"), 400, "ValidationException"),
            (IcebergError::namespace_not_found("db"), 404, "NoSuchNamespaceException"),
            (IcebergError::table_not_found("db.t"), 404, "NoSuchTableException"),
            (IcebergError::unsupported_operation("x"), 406, "UnsupportedOperationException"),
            (IcebergError::already_exists("Table", "db.t"), 409, "AlreadyExistsException"),
            (IcebergError::namespace_not_empty("db"), 409, "NamespaceNotEmptyException"),
            (IcebergError::commit_conflict("x"), 409, "CommitFailedException"),
            (IcebergError::property_overlap(&["a".into()]), 422, "UnprocessableEntityException"),
        ];
        for (err, code, error_type) in cases {
            assert_eq!(err.status_code().as_u16(), code, "{err:?}");
            assert_eq!(err.error_type(), error_type);
        }
    }

    #[test]
    fn test_error_model_body() {
        let err = IcebergError::table_not_found("sales.orders");
        let json = serde_json::to_value(IcebergErrorResponse::from(&err)).expect("serialize");
        assert_eq!(json["error"]["type"], "NoSuchTableException");
        assert_eq!(json["error"]["code"], 404);
        assert_eq!(json["error"]["message"], "Table does not exist: sales.orders");
    }

    #[test]
    fn test_catalog_error_mapping() {
        let err = IcebergError::from(CatalogError::NamespaceNotEmpty("db".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_type(), "NamespaceNotEmptyException");

        let err = IcebergError::from(CatalogError::AlreadyExists {
            entity: "Table",
            name: "db.t".into(),
        });
        assert_eq!(err.message(), "Table already exists: db.t");

        let err = IcebergError::from(CatalogError::FileNotFound("memory://m.json".into()));
        assert_eq!(err.error_type(), "NotFoundException");

        let err = IcebergError::from(CatalogError::Storage("disk full".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_service_unavailable_sets_retry_after() {
        let response = IcebergError::ServiceUnavailable {
            message: "busy".into(),
            retry_after_seconds: Some(3),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("3")
        );

        let response = IcebergError::ServiceUnavailable {
            message: "busy".into(),
            retry_after_seconds: None,
        }
        .into_response();
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
