//! Structured result envelopes returned by every orchestration entry point.
//!
//! Entry points never propagate errors past their boundary; they fold a `Result<_, FlowError>` into an
//! [`Outcome`] that always carries a `status` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorClass, FlowError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome<T> {
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    #[serde(flatten)]
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> Outcome<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self::with_status(OutcomeStatus::Success, message, data)
    }

    pub fn skipped(message: impl Into<String>, data: T) -> Self {
        Self::with_status(OutcomeStatus::Skipped, message, data)
    }

    fn with_status(status: OutcomeStatus, message: impl Into<String>, data: T) -> Self {
        Self { status, message: message.into(), error_class: None, data, timestamp: Utc::now() }
    }

    pub fn is_error(&self) -> bool {
        self.status == OutcomeStatus::Error
    }
}

impl<T: Default> Outcome<T> {
    pub fn failure(error: &FlowError) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: error.to_string(),
            error_class: Some(error.class()),
            data: T::default(),
            timestamp: Utc::now(),
        }
    }
}

impl<T: Default> From<Result<Outcome<T>, FlowError>> for Outcome<T> {
    fn from(result: Result<Outcome<T>, FlowError>) -> Self {
        result.unwrap_or_else(|error| Self::failure(&error))
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;
    use serde_json::json;

    use super::{Outcome, OutcomeStatus};
    use crate::errors::FlowError;

    #[derive(Debug, Default, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct LeadRef {
        #[serde(skip_serializing_if = "Option::is_none")]
        lead_id: Option<String>,
    }

    #[test]
    fn success_flattens_payload_fields() {
        let outcome =
            Outcome::success("lead created", LeadRef { lead_id: Some("lead-1".to_string()) });
        let value = serde_json::to_value(&outcome).expect("serialize outcome");

        assert_eq!(value["status"], json!("success"));
        assert_eq!(value["leadId"], json!("lead-1"));
        assert!(value.get("errorClass").is_none());
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn failure_keeps_status_field_and_class() {
        let result: Result<Outcome<LeadRef>, FlowError> =
            Err(FlowError::validation("missing phoneNumberId"));
        let outcome = Outcome::from(result);
        let value = serde_json::to_value(&outcome).expect("serialize outcome");

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(value["status"], json!("error"));
        assert_eq!(value["errorClass"], json!("validation"));
        assert_eq!(value["message"], json!("missing phoneNumberId"));
        assert!(value.get("leadId").is_none());
    }
}
