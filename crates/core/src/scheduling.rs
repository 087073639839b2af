//! Calendar slot arithmetic used by availability checks and booking.
//!
//! All instants are stored in UTC; working hours and suggestions are expressed in the business timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::errors::FlowError;

pub const SLOT_STEP_MINUTES: i64 = 30;
pub const MAX_SUGGESTIONS: usize = 5;

const LOCAL_DATETIME_FORMATS: [&str; 4] =
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Half-open interval `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, FlowError> {
        if end <= start {
            return Err(FlowError::validation("time window must end after it starts"));
        }
        Ok(Self { start, end })
    }

    pub fn starting_at(start: DateTime<Utc>, duration: Duration) -> Result<Self, FlowError> {
        Self::new(start, start + duration)
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

pub fn is_free(window: &TimeWindow, busy: &[TimeWindow]) -> bool {
    !busy.iter().any(|interval| interval.overlaps(window))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl WorkingHours {
    pub fn parse(start: &str, end: &str) -> Result<Self, FlowError> {
        let start = parse_clock(start)?;
        let end = parse_clock(end)?;
        if end <= start {
            return Err(FlowError::validation("working hours must end after they start"));
        }
        Ok(Self { start, end })
    }

    /// The working window of `day` in `tz`, as UTC instants.
    pub fn window_on(&self, day: NaiveDate, tz: Tz) -> Option<TimeWindow> {
        let start = local_instant(tz, day, self.start)?;
        let end = local_instant(tz, day, self.end)?;
        (end > start).then_some(TimeWindow { start, end })
    }
}

fn parse_clock(raw: &str) -> Result<NaiveTime, FlowError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| FlowError::validation(format!("invalid clock time `{raw}` (expected HH:MM)")))
}

/// Accepts RFC 3339 instants, or naive local date-times interpreted in the business timezone.
pub fn parse_requested_start(raw: &str, tz: Tz) -> Result<DateTime<Utc>, FlowError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FlowError::validation("missing required field `date`"));
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }

    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| FlowError::validation(format!("invalid meeting date `{raw}`")))
}

#[derive(Clone, Copy, Debug)]
pub struct SlotQuery {
    pub day: NaiveDate,
    pub tz: Tz,
    pub hours: WorkingHours,
    pub duration: Duration,
    pub now: DateTime<Utc>,
}

/// Walks the working-hour window of `query.day` in fixed steps and returns free slot starts.
///
/// Slots starting before `now`, overlapping any busy interval, or running past the end of the working day
/// are skipped. At most [`MAX_SUGGESTIONS`] starts are returned, in the business timezone.
pub fn suggest_slots(query: &SlotQuery, busy: &[TimeWindow]) -> Vec<DateTime<Tz>> {
    let Some(TimeWindow { start: day_start, end: day_end }) =
        query.hours.window_on(query.day, query.tz)
    else {
        return Vec::new();
    };
    if query.duration <= Duration::zero() {
        return Vec::new();
    }

    let step = Duration::minutes(SLOT_STEP_MINUTES);
    let mut suggestions = Vec::new();
    let mut cursor = day_start;

    while cursor + query.duration <= day_end && suggestions.len() < MAX_SUGGESTIONS {
        let slot = TimeWindow { start: cursor, end: cursor + query.duration };
        if cursor >= query.now && is_free(&slot, busy) {
            suggestions.push(cursor.with_timezone(&query.tz));
        }
        cursor += step;
    }

    suggestions
}

fn local_instant(tz: Tz, day: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&day.and_time(time)).earliest().map(|local| local.with_timezone(&Utc))
}
