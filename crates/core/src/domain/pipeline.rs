use serde::{Deserialize, Serialize};

use crate::domain::business::BusinessId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(pub String);

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub business_id: BusinessId,
    pub name: String,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_enabled: bool,
}

impl Pipeline {
    pub fn channel_id(&self) -> Option<&str> {
        self.whatsapp_phone_number_id.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: StageId,
    pub pipeline_id: PipelineId,
    pub name: String,
    pub position: i64,
    pub is_input: bool,
    pub webhook_url: Option<String>,
}

impl PipelineStage {
    pub fn webhook_target(&self) -> Option<&str> {
        self.webhook_url.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }
}

/// Stages surrounding a position: `previous` nearest-first (descending), `next` ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StageNeighbors {
    pub previous: Vec<PipelineStage>,
    pub next: Vec<PipelineStage>,
}

impl StageNeighbors {
    pub fn around(stages: &[PipelineStage], position: i64) -> Self {
        let mut previous: Vec<PipelineStage> =
            stages.iter().filter(|stage| stage.position < position).cloned().collect();
        previous.sort_by(|a, b| b.position.cmp(&a.position));

        let mut next: Vec<PipelineStage> =
            stages.iter().filter(|stage| stage.position > position).cloned().collect();
        next.sort_by_key(|stage| stage.position);

        Self { previous, next }
    }
}
