use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

use crate::domain::EmployeeId;

/// Tokens expiring within this window are refreshed before use.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

pub const GOOGLE_CALENDAR_PROVIDER: &str = "google_calendar";

#[derive(Clone, Debug)]
pub struct OAuthConnection {
    pub id: String,
    pub employee_id: EmployeeId,
    pub provider: String,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthConnection {
    /// A connection without a known expiry is treated as valid.
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now <= buffer,
            None => false,
        }
    }
}
