//! Envelope parsing for the SDK wire format.
//!
//! The envelope format is a simple text-based protocol:
//! ```text
//! {envelope_header}\n
//! {item_header}\n
//! {item_payload}\n
//! {item_header}\n
//! {item_payload}\n
//! ...
//! ```
//!
//! An item header may declare `length`, in which case the payload is exactly
//! that many raw bytes following the header line. This lets binary or
//! newline-containing payloads be embedded safely while small payloads stay
//! human-readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("empty envelope body")]
    EmptyBody,
    #[error("missing envelope header")]
    MissingHeader,
    #[error("invalid envelope header: {0}")]
    InvalidHeader(String),
    #[error("invalid item header")]
    InvalidItemHeader(#[source] serde_json::Error),
    #[error("item length {declared} exceeds remaining {available} bytes")]
    LengthOutOfRange { declared: usize, available: usize },
    #[error("invalid item payload: {0}")]
    InvalidPayload(String),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EnvelopeHeaders {
    /// Unique identifier of the event associated to this envelope.
    ///
    /// Envelopes without contained events do not carry an event id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Timestamp when the envelope was sent, according to the SDK.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

/// The type of an envelope item.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Error event payload encoded in JSON.
    Event,
    /// Transaction event payload encoded in JSON.
    Transaction,
    /// Raw payload of an arbitrary attachment.
    Attachment,
    /// Session update data.
    Session,
    /// Aggregated session data.
    Sessions,
    /// Client internal report (eg: outcomes).
    ClientReport,
    /// User feedback encoded as JSON.
    UserReport,
    /// Profile event payload encoded as JSON.
    Profile,
    /// Replay metadata and breadcrumb payload.
    ReplayEvent,
    /// Replay recording data.
    ReplayRecording,
    /// Monitor check-in encoded as JSON.
    CheckIn,
    /// A log for the log product, not internal logs.
    Log,
    /// A standalone span.
    Span,
    /// An item type this version does not know about.
    #[serde(other)]
    Unknown,
}

impl ItemType {
    /// Returns the variant name of the item type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Transaction => "transaction",
            Self::Attachment => "attachment",
            Self::Session => "session",
            Self::Sessions => "sessions",
            Self::ClientReport => "client_report",
            Self::UserReport => "user_report",
            Self::Profile => "profile",
            Self::ReplayEvent => "replay_event",
            Self::ReplayRecording => "replay_recording",
            Self::CheckIn => "check_in",
            Self::Log => "log",
            Self::Span => "span",
            Self::Unknown => "unknown",
        }
    }

    pub fn as_str(&self) -> &str {
        self.name()
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemHeader {
    #[serde(rename = "type")]
    pub ty: ItemType,

    /// Byte length of a raw payload. Absent for line-delimited payloads.
    #[serde(default)]
    pub length: Option<usize>,

    #[serde(default)]
    pub content_type: Option<String>,
}

/// A single item in an envelope: typed header plus raw payload bytes.
#[derive(Debug)]
pub struct EnvelopeItem {
    pub header: ItemHeader,
    pub payload: Vec<u8>,
}

/// A parsed envelope
#[derive(Debug)]
pub struct Envelope {
    header: EnvelopeHeaders,
    items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// Parse an envelope from bytes.
    ///
    /// The first line is the envelope header. Each following item is a JSON
    /// header line followed by either exactly `length` raw bytes (one
    /// trailing newline consumed if present) or, without `length`, one
    /// newline-terminated line with a trailing `\r` stripped.
    pub fn from_slice(data: &[u8]) -> Result<Self, EnvelopeError> {
        if data.is_empty() {
            return Err(EnvelopeError::EmptyBody);
        }

        let mut cursor = 0usize;

        let header_line = read_line(data, &mut cursor).ok_or(EnvelopeError::MissingHeader)?;
        if header_line.is_empty() {
            return Err(EnvelopeError::MissingHeader);
        }
        let header: EnvelopeHeaders = serde_json::from_slice(header_line)
            .map_err(|e| EnvelopeError::InvalidHeader(e.to_string()))?;

        let mut items = Vec::new();
        while let Some(line) = read_line(data, &mut cursor) {
            if line.is_empty() {
                continue;
            }

            let item_header: ItemHeader =
                serde_json::from_slice(line).map_err(EnvelopeError::InvalidItemHeader)?;

            let payload = match item_header.length {
                Some(length) => {
                    let available = data.len() - cursor;
                    if length > available {
                        return Err(EnvelopeError::LengthOutOfRange {
                            declared: length,
                            available,
                        });
                    }
                    let payload = data[cursor..cursor + length].to_vec();
                    cursor += length;
                    // Consume the newline terminating the raw payload
                    if data.get(cursor) == Some(&b'\n') {
                        cursor += 1;
                    }
                    payload
                }
                None => read_line(data, &mut cursor).unwrap_or_default().to_vec(),
            };

            items.push(EnvelopeItem {
                header: item_header,
                payload,
            });
        }

        Ok(Envelope { header, items })
    }

    /// Get the envelope header
    pub fn header(&self) -> &EnvelopeHeaders {
        &self.header
    }

    /// Iterate over all envelope items
    pub fn items(&self) -> impl Iterator<Item = &EnvelopeItem> {
        self.items.iter()
    }

    /// Iterate over items of type `event`; everything else is ignored here.
    pub fn event_items(&self) -> impl Iterator<Item = &EnvelopeItem> {
        self.items
            .iter()
            .filter(|item| item.header.ty == ItemType::Event)
    }
}

/// Read one line (terminated by `\n` or end of input), stripping a trailing
/// `\r`. Returns `None` once the cursor is at the end.
fn read_line<'a>(data: &'a [u8], cursor: &mut usize) -> Option<&'a [u8]> {
    if *cursor >= data.len() {
        return None;
    }
    let start = *cursor;
    let mut line = match data[start..].iter().position(|&b| b == b'\n') {
        Some(offset) => {
            *cursor = start + offset + 1;
            &data[start..start + offset]
        }
        None => {
            *cursor = data.len();
            &data[start..]
        }
    };
    if line.ends_with(b"\r") {
        line = &line[..line.len() - 1];
    }
    Some(line)
}
