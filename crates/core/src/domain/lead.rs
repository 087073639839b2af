use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{PipelineId, StageId};
use crate::domain::EmployeeId;

pub const UNKNOWN_CONTACT_NAME: &str = "Unknown";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl LeadId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub pipeline_id: PipelineId,
    pub stage_id: StageId,
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub conversation_id: Option<String>,
    pub value: Decimal,
    pub employee_id: Option<EmployeeId>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    pub fn is_at_stage(&self, stage_id: &StageId) -> bool {
        &self.stage_id == stage_id
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone_number.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn email_address(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }
}

/// A lead about to enter its pipeline at the input stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLead {
    pub pipeline_id: PipelineId,
    pub stage_id: StageId,
    pub customer_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub conversation_id: Option<String>,
}

impl NewLead {
    pub fn into_lead(self, id: LeadId, now: DateTime<Utc>) -> Lead {
        Lead {
            id,
            pipeline_id: self.pipeline_id,
            stage_id: self.stage_id,
            customer_name: self.customer_name,
            phone_number: Some(self.phone_number),
            email: self.email,
            conversation_id: self.conversation_id,
            value: Decimal::ZERO,
            employee_id: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{LeadId, NewLead};
    use crate::domain::pipeline::{PipelineId, StageId};

    fn new_lead() -> NewLead {
        NewLead {
            pipeline_id: PipelineId("pipe-1".to_string()),
            stage_id: StageId("stage-input".to_string()),
            customer_name: "Maria".to_string(),
            phone_number: "5511999990000".to_string(),
            email: None,
            conversation_id: Some("conv-9".to_string()),
        }
    }

    #[test]
    fn new_leads_start_open_with_zero_value() {
        let lead = new_lead().into_lead(LeadId("lead-1".to_string()), Utc::now());

        assert!(lead.is_open());
        assert_eq!(lead.value, Decimal::ZERO);
        assert!(lead.is_at_stage(&StageId("stage-input".to_string())));
        assert_eq!(lead.phone(), Some("5511999990000"));
    }

    #[test]
    fn closed_lead_is_not_open() {
        let mut lead = new_lead().into_lead(LeadId("lead-2".to_string()), Utc::now());
        lead.closed_at = Some(Utc::now());

        assert!(!lead.is_open());
    }
}
