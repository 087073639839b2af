//! Calendar provider access: OAuth token refresh, free/busy lookups and event creation.

pub mod client;
pub mod google;

pub use client::{Attendee, CalendarClient, CalendarError, CreatedEvent, EventSpec, TokenGrant};
pub use google::GoogleCalendarClient;
