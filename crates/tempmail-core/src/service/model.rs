//! Mailbox data models and their wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-issued session paired with the address it currently serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier (`sid_token`).
    #[serde(rename = "sid_token", default)]
    pub session_id: String,
    /// Address bound to the session (`email_addr`).
    #[serde(rename = "email_addr", default)]
    pub email_address: String,
}

impl Session {
    /// Creates a session.
    #[must_use]
    pub fn new(session_id: impl Into<String>, email_address: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            email_address: email_address.into(),
        }
    }

    /// Returns true if both identifier and address are present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.session_id.is_empty() && !self.email_address.is_empty()
    }
}

/// One row of the inbox listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Message identifier.
    #[serde(rename = "mail_id", deserialize_with = "lenient::string")]
    pub id: String,
    /// Sender.
    #[serde(rename = "mail_from", default, deserialize_with = "lenient::string")]
    pub from: String,
    /// Subject line.
    #[serde(rename = "mail_subject", default, deserialize_with = "lenient::string")]
    pub subject: String,
    /// Arrival time as Unix seconds.
    #[serde(rename = "mail_timestamp", default, deserialize_with = "lenient::seconds")]
    pub timestamp_secs: i64,
}

impl MessageSummary {
    /// Arrival time, if the timestamp is representable.
    #[must_use]
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp_secs, 0)
    }

    /// Case-insensitive match against id, sender, and subject.
    ///
    /// `needle` must already be lowercase.
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        self.id.to_lowercase().contains(needle)
            || self.from.to_lowercase().contains(needle)
            || self.subject.to_lowercase().contains(needle)
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name, also used to request the download.
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
}

/// Full content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetail {
    /// Message identifier.
    #[serde(rename = "mail_id", deserialize_with = "lenient::string")]
    pub id: String,
    /// Sender.
    #[serde(rename = "mail_from", default, deserialize_with = "lenient::string")]
    pub from: String,
    /// Subject line.
    #[serde(rename = "mail_subject", default, deserialize_with = "lenient::string")]
    pub subject: String,
    /// Arrival time as Unix seconds.
    #[serde(rename = "mail_timestamp", default, deserialize_with = "lenient::seconds")]
    pub timestamp_secs: i64,
    /// HTML body.
    #[serde(rename = "mail_body", default, deserialize_with = "lenient::string")]
    pub body_html: String,
    /// Attachments.
    #[serde(rename = "mail_attachments", default)]
    pub attachments: Vec<Attachment>,
}

impl MessageDetail {
    /// Arrival time, if the timestamp is representable.
    #[must_use]
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp_secs, 0)
    }
}

/// The service encodes ids and timestamps as either strings or numbers.
mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Null => Ok(String::new()),
            other => Err(D::Error::custom(format!(
                "expected string or number, got {other}"
            ))),
        }
    }

    pub fn seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {n}"))),
            Value::String(s) if s.trim().is_empty() => Ok(0),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid timestamp: {s}"))),
            Value::Null => Ok(0),
            other => Err(D::Error::custom(format!("invalid timestamp: {other}"))),
        }
    }
}
