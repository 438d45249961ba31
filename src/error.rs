//! Errors returned by profiles, rendered as RFC 7807 problem documents.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Serialize, Serializer};
use sqlx::{Error as SQLxError, postgres::PgDatabaseError};
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::crypto::CryptoError;

pub type Result<T> = std::result::Result<T, ServerError>;

const INVALID_TITLE: &str = "There were validation errors with your request.";
const UNPARSABLE_TITLE: &str = "Request body could not be parsed.";

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    /// Body is not JSON, or not a JSON object.
    #[error(transparent)]
    Json(#[from] JsonRejection),

    /// Body is a JSON object whose fields have the wrong type.
    #[error("invalid body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("an account with this email already exists")]
    EmailTaken,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Build a [`ServerError::Validation`] holding a single field error.
    pub fn field(
        field: &'static str,
        code: &'static str,
        message: &'static str,
    ) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(
            field,
            ValidationError::new(code).with_message(message.into()),
        );
        Self::Validation(errors)
    }

    /// Map a unique-constraint violation to [`ServerError::EmailTaken`].
    ///
    /// `email` is the only unique column of `accounts`.
    pub fn from_insert(err: SQLxError) -> Self {
        match err.as_database_error() {
            Some(db) if db.is_unique_violation() => Self::EmailTaken,
            _ => Self::Sql(err),
        }
    }

    fn to_problem(&self) -> Problem {
        match self {
            ServerError::Validation(errors) => {
                Problem::bad_request(INVALID_TITLE, self.to_string())
                    .with_errors(errors)
            },
            ServerError::Json(rejection) => {
                Problem::bad_request(UNPARSABLE_TITLE, rejection.body_text())
            },
            ServerError::Body(err) => {
                Problem::bad_request(UNPARSABLE_TITLE, err.to_string())
            },
            ServerError::Sql(err) => {
                let detail = err
                    .as_database_error()
                    .and_then(|e| e.try_downcast_ref::<PgDatabaseError>())
                    .and_then(PgDatabaseError::detail)
                    .map_or_else(|| err.to_string(), str::to_owned);
                Problem::bad_request(INVALID_TITLE, detail)
            },
            ServerError::EmailTaken => {
                Problem::bad_request(INVALID_TITLE, self.to_string())
            },
            ServerError::Crypto(err) => {
                tracing::error!(error = %err, "password hashing failed");
                Problem::internal()
            },
            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                Problem::internal()
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.to_problem().into_response()
    }
}

/// Problem document sent on every failed request.
#[derive(Debug, Serialize)]
pub struct Problem {
    r#type: Option<String>,
    title: &'static str,
    #[serde(serialize_with = "status_code")]
    status: StatusCode,
    detail: String,
    instance: Option<String>,
    /// `null` unless the body reached field validation.
    errors: Option<Vec<FieldError>>,
}

impl Problem {
    fn bad_request(title: &'static str, detail: String) -> Self {
        Self {
            r#type: None,
            title,
            status: StatusCode::BAD_REQUEST,
            detail,
            instance: None,
            errors: None,
        }
    }

    fn internal() -> Self {
        Self {
            title: "Internal server error.",
            status: StatusCode::INTERNAL_SERVER_ERROR,
            ..Self::bad_request("", String::default())
        }
    }

    fn with_errors(mut self, errors: &ValidationErrors) -> Self {
        let mut fields = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, issues)| {
                issues.iter().map(move |issue| FieldError {
                    field: field.to_string(),
                    message: issue.to_string(),
                })
            })
            .collect::<Vec<_>>();
        // field_errors() is backed by a HashMap.
        fields.sort_by(|a, b| a.field.cmp(&b.field));

        self.errors = Some(fields);
        self
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

fn status_code<S: Serializer>(
    status: &StatusCode,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_payload() {
        let mut errors = ValidationErrors::new();
        errors.add("name", ValidationError::new("blank"));
        errors.add(
            "email",
            ValidationError::new("required")
                .with_message("Users must have an email address.".into()),
        );
        let response = ServerError::Validation(errors).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body(response).await;
        assert_eq!(body["status"], 400);
        assert_eq!(body["title"], INVALID_TITLE);
        assert_eq!(body["errors"][0]["field"], "email");
        assert_eq!(
            body["errors"][0]["message"],
            "Users must have an email address."
        );
        assert_eq!(body["errors"][1]["field"], "name");
    }

    #[tokio::test]
    async fn test_wrong_body_type() {
        let err = serde_json::from_str::<u8>("\"x\"").unwrap_err();
        let response = ServerError::from(err).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body(response).await;
        assert_eq!(body["title"], UNPARSABLE_TITLE);
        assert!(body["errors"].is_null());
    }

    #[tokio::test]
    async fn test_internal_hides_details() {
        let response = ServerError::Internal {
            details: "pool exhausted".into(),
            source: None,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body(response).await;
        assert_eq!(body["status"], 500);
        assert_eq!(body["title"], "Internal server error.");
        assert_eq!(body["detail"], "");
    }

    #[tokio::test]
    async fn test_email_taken_is_bad_request() {
        let response = ServerError::EmailTaken.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body(response).await;
        assert_eq!(body["detail"], "an account with this email already exists");
        assert!(body["errors"].is_null());
    }

    #[test]
    fn test_other_sql_errors_are_kept() {
        assert!(matches!(
            ServerError::from_insert(SQLxError::RowNotFound),
            ServerError::Sql(SQLxError::RowNotFound)
        ));
    }
}
