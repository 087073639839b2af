use serde::Serialize;
use thiserror::Error;

/// Failure classes surfaced by the orchestration entry points.
///
/// A duplicate open lead is not represented here: it is reported as a `skipped` outcome.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} not found: {detail}")]
    NotFound { entity: &'static str, detail: String },
    #[error("{0}")]
    Upstream(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    NotFound,
    Upstream,
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, detail: impl Into<String>) -> Self {
        Self::NotFound { entity, detail: detail.into() }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Upstream(_) => ErrorClass::Upstream,
        }
    }
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Upstream => "upstream",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation => "The request could not be processed. Check inputs and try again.",
            Self::NotFound => "A referenced record does not exist.",
            Self::Upstream => "A dependent service failed. Please retry shortly.",
        }
    }
}
