pub mod api_keys;
pub mod config;
pub mod domain;
pub mod errors;
pub mod outcome;
pub mod scheduling;
pub mod signature;

pub use api_keys::{ApiKeyCache, ApiKeyEntry};
pub use domain::business::{Business, BusinessId};
pub use domain::connection::OAuthConnection;
pub use domain::lead::{Lead, LeadId, NewLead};
pub use domain::message::{ChatMessage, SenderType};
pub use domain::pipeline::{Pipeline, PipelineId, PipelineStage, StageId, StageNeighbors};
pub use domain::EmployeeId;
pub use errors::{ErrorClass, FlowError};
pub use outcome::{Outcome, OutcomeStatus};
pub use signature::{HmacVerifier, SignatureScheme, SignatureVerifier};
