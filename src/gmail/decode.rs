//! Gmail message decoding — walks the MIME payload tree and pulls the
//! headers the ingestion path needs.
//!
//! Decoding never fails: a message with no decodable content anywhere in
//! its tree yields an empty body, and missing headers get fixed
//! placeholders. Callers must treat an empty body as valid input.

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::Deserialize;

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_SENDER: &str = "Unknown Sender";
pub const UNKNOWN_RECIPIENT: &str = "Unknown Recipient";
pub const UNKNOWN_DATE: &str = "Unknown Date";

// ── Wire types ──────────────────────────────────────────────────────

/// A full message as returned by the provider's `messages.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub payload: MessagePayload,
}

/// One node of the MIME payload tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

// ── Body extraction ─────────────────────────────────────────────────

/// Extract the best available textual body from a payload tree.
///
/// Depth-first: at each multipart level, prefer a sibling `text/plain`
/// part with decodable data, then `text/html`, then recurse into each part
/// in order and take the first non-empty result. Leaf payloads decode
/// their own body directly. Returns an empty string when nothing in the
/// tree decodes — not an error.
pub fn extract_body(payload: &MessagePayload) -> String {
    if !payload.parts.is_empty() {
        for part in &payload.parts {
            if part.mime_type == "text/plain" {
                if let Some(text) = decode_part_data(part) {
                    return text;
                }
            }
        }
        for part in &payload.parts {
            if part.mime_type == "text/html" {
                if let Some(text) = decode_part_data(part) {
                    return text;
                }
            }
        }
        for part in &payload.parts {
            let nested = extract_body(part);
            if !nested.is_empty() {
                return nested;
            }
        }
    }

    decode_part_data(payload).unwrap_or_default()
}

fn decode_part_data(payload: &MessagePayload) -> Option<String> {
    let data = payload.body.as_ref()?.data.as_deref()?;
    decode_base64url(data)
}

/// Decode base64url body data, tolerating both padded and unpadded forms.
fn decode_base64url(data: &str) -> Option<String> {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .ok()?;
    String::from_utf8(bytes).ok()
}

// ── Header extraction ───────────────────────────────────────────────

/// Pull a header by exact name from the flat header list.
pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name == name)
        .map(|h| h.value.as_str())
}

/// The headers the ingestion path cares about, with fixed placeholders for
/// anything absent.
#[derive(Debug, Clone)]
pub struct DecodedHeaders {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
}

/// Extract `Subject`/`From`/`To`/`Date`. Never fails.
pub fn extract_headers(headers: &[Header]) -> DecodedHeaders {
    DecodedHeaders {
        subject: header_value(headers, "Subject")
            .unwrap_or(NO_SUBJECT)
            .to_string(),
        from: header_value(headers, "From")
            .unwrap_or(UNKNOWN_SENDER)
            .to_string(),
        to: header_value(headers, "To")
            .unwrap_or(UNKNOWN_RECIPIENT)
            .to_string(),
        date: header_value(headers, "Date")
            .unwrap_or(UNKNOWN_DATE)
            .to_string(),
    }
}
