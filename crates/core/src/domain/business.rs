use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    pub timezone: String,
}

impl Business {
    /// Resolves the IANA timezone, falling back to UTC for unknown names.
    pub fn tz(&self) -> Tz {
        self.timezone.trim().parse::<Tz>().unwrap_or(Tz::UTC)
    }
}
