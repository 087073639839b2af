//! Chat history records as seen by outbound notifications.
//!
//! Provider history entries come in several shapes. Body text is resolved through an ordered chain of
//! [`BodySource`] extractors; the first non-empty result wins. The raw record is only used when none of
//! the text fields is present, so a record whose text fields are all blank carries no body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    Salesperson,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodySource {
    TextBody,
    Body,
    Message,
    RawRecord,
}

pub const BODY_EXTRACTORS: [BodySource; 4] =
    [BodySource::TextBody, BodySource::Body, BodySource::Message, BodySource::RawRecord];

const SENDER_FIELDS: [&str; 3] = ["from", "sender", "author"];

/// Shortest sender number accepted as a national-format suffix of the lead's phone.
pub const MIN_SUFFIX_DIGITS: usize = 8;

impl BodySource {
    /// Whether the record carries this source's field at all, blank or not.
    pub fn is_present(self, record: &Value) -> bool {
        match self {
            Self::TextBody => {
                record.get("text").and_then(|text| text.get("body")).is_some_and(Value::is_string)
            }
            Self::Body => record.get("body").is_some_and(Value::is_string),
            Self::Message => record.get("message").is_some_and(Value::is_string),
            Self::RawRecord => true,
        }
    }

    pub fn extract(self, record: &Value) -> Option<String> {
        let raw = match self {
            Self::TextBody => {
                record.get("text").and_then(|text| text.get("body")).and_then(Value::as_str)?.to_string()
            }
            Self::Body => record.get("body").and_then(Value::as_str)?.to_string(),
            Self::Message => record.get("message").and_then(Value::as_str)?.to_string(),
            Self::RawRecord => serde_json::to_string(record).ok()?,
        };
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

pub fn extract_body(record: &Value) -> Option<(BodySource, String)> {
    let text_fields = &BODY_EXTRACTORS[..BODY_EXTRACTORS.len() - 1];
    if let Some(found) =
        text_fields.iter().find_map(|source| source.extract(record).map(|text| (*source, text)))
    {
        return Some(found);
    }
    if text_fields.iter().any(|source| source.is_present(record)) {
        return None;
    }
    BodySource::RawRecord.extract(record).map(|text| (BodySource::RawRecord, text))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub sender_type: SenderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    pub fn from_record(record: &Value, lead_phone: &str) -> Option<Self> {
        let (_, text) = extract_body(record)?;
        let sender = extract_sender(record);
        let sender_type = match sender.as_deref() {
            Some(sender) if phone_matches(sender, lead_phone) => SenderType::Customer,
            _ => SenderType::Salesperson,
        };

        Some(Self {
            id: record.get("id").and_then(scalar_text),
            sender_type,
            sender,
            text,
            timestamp: record.get("timestamp").and_then(scalar_text),
        })
    }
}

pub fn classify_history(records: &[Value], lead_phone: &str) -> Vec<ChatMessage> {
    records.iter().filter_map(|record| ChatMessage::from_record(record, lead_phone)).collect()
}

fn extract_sender(record: &Value) -> Option<String> {
    SENDER_FIELDS.iter().find_map(|field| {
        let value = record.get(*field)?;
        match value {
            Value::Object(_) => value
                .get("phone_number")
                .or_else(|| value.get("phone"))
                .or_else(|| value.get("id"))
                .and_then(scalar_text),
            _ => scalar_text(value),
        }
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Digit-wise match: the sender equals or contains the lead's number, or is a national-format suffix
/// of it with at least [`MIN_SUFFIX_DIGITS`] digits.
pub fn phone_matches(sender: &str, lead_phone: &str) -> bool {
    let sender_digits = digits(sender);
    let lead_digits = digits(lead_phone);
    if sender_digits.is_empty() || lead_digits.is_empty() {
        return !sender.trim().is_empty() && sender.trim() == lead_phone.trim();
    }

    sender_digits == lead_digits
        || sender_digits.contains(&lead_digits)
        || (sender_digits.len() >= MIN_SUFFIX_DIGITS && lead_digits.ends_with(&sender_digits))
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}
