//! Typed errors and HTTP mapping.

use crate::response::ResultObject;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("missing reference: {kind} '{id}' in resource {resource}")]
    MissingReference {
        resource: String,
        kind: &'static str,
        id: String,
    },
    #[error("duplicate alias '{alias}' in resource {resource}")]
    DuplicateAlias { resource: String, alias: String },
    #[error("duplicate column '{column}' in resource {resource}")]
    DuplicateColumn { resource: String, column: String },
    #[error("invalid identity field in resource {resource}: {reason}")]
    InvalidIdentity { resource: String, reason: String },
    #[error("nested resources deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Backend failure while running a statement.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("no such table: {0}")]
    UnknownTable(String),
    #[error("no such column: {0}")]
    UnknownColumn(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("missing scope: {0}")]
    Forbidden(String),
}

/// The five failure kinds a request can end in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Validation,
    Auth,
    NotFound,
    Storage,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("validation: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage: {0}")]
    Storage(#[from] StoreError),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Storage(StoreError::Db(e))
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(ConfigError::UnknownResource(_)) => ErrorKind::NotFound,
            AppError::Config(_) => ErrorKind::Config,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Auth(_) => ErrorKind::Auth,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(ConfigError::UnknownResource(_)) => StatusCode::NOT_FOUND,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(AuthError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            AppError::Auth(AuthError::Forbidden(_)) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code placed in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(ConfigError::UnknownResource(_)) => "not_found",
            AppError::Config(_) => "config_error",
            AppError::Validation(_) => "validation_error",
            AppError::Auth(AuthError::Unauthenticated) => "unauthorized",
            AppError::Auth(AuthError::Forbidden(_)) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Storage(_) => "storage_error",
        }
    }

    /// Message safe to show a client. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Storage(_) => "storage failure".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ResultObject::from_error(&self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_resource_maps_to_404() {
        let e = AppError::from(ConfigError::UnknownResource("ghosts".into()));
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn auth_errors_split_401_and_403() {
        assert_eq!(AppError::from(AuthError::Unauthenticated).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::from(AuthError::Forbidden("users:write".into())).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn storage_message_is_generic() {
        let e = AppError::from(StoreError::Constraint("unique(code)".into()));
        assert_eq!(e.public_message(), "storage failure");
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
