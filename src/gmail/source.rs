//! Mail source — lists and fetches mailbox messages and normalizes them
//! into `EmailRecord`s for the ingestion pipeline.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::{classify_priority, content_preview, format_subject, parse_timestamp};
use crate::config::GmailConfig;
use crate::error::MailError;
use crate::gmail::credentials::{self, GmailToken};
use crate::gmail::decode::{self, MailMessage};
use crate::model::{EmailRecord, EmailStatus};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const FETCH_TIMEOUT_SECS: u64 = 30;

pub const GMAIL_SOURCE_NAME: &str = "gmail";

// ── Query ───────────────────────────────────────────────────────────

/// Parameters for one mailbox fetch.
#[derive(Debug, Clone)]
pub struct FetchQuery {
    /// Address matched as sender or recipient.
    pub address: String,
    /// Age cutoff in minutes (0 = unbounded).
    pub since_minutes: u32,
    /// Include mail that has already been read.
    pub include_read: bool,
    /// Maximum messages to fetch.
    pub limit: usize,
    /// Stop after the first message (smoke-test mode).
    pub early_stop: bool,
}

impl FetchQuery {
    pub fn from_config(config: &GmailConfig) -> Self {
        Self {
            address: config.address.clone(),
            since_minutes: config.since_minutes,
            include_read: config.include_read,
            limit: config.limit,
            early_stop: false,
        }
    }

    /// Build the provider search-query string.
    pub fn to_provider_query(&self) -> String {
        let mut query = format!("to:{addr} OR from:{addr}", addr = self.address);

        if self.since_minutes > 0 {
            let after = (Utc::now() - ChronoDuration::minutes(i64::from(self.since_minutes)))
                .timestamp();
            query.push_str(&format!(" after:{after}"));
        }

        if !self.include_read {
            query.push_str(" is:unread");
        }

        query
    }
}

/// Outcome of one fetch: the decoded records plus how many messages were
/// skipped because they could not be fetched or decoded.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub records: Vec<EmailRecord>,
    pub failed: u32,
}

/// Seam between the scheduler and the mailbox provider.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Fetch matching messages as normalized records.
    ///
    /// A listing failure is reported to the caller with zero records
    /// processed; a single undecodable message is skipped and counted in
    /// `FetchBatch::failed`, never aborting the batch.
    async fn fetch(&self, query: &FetchQuery) -> Result<FetchBatch, MailError>;
}

// ── Gmail implementation ────────────────────────────────────────────

/// Mail source backed by the Gmail REST API.
pub struct GmailSource {
    config: GmailConfig,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

impl GmailSource {
    pub fn new(config: GmailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            config,
            client,
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// Point the source at a different API base (tests).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn list_message_ids(
        &self,
        token: &GmailToken,
        query: &FetchQuery,
    ) -> Result<Vec<String>, MailError> {
        let url = format!("{}/users/me/messages", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token.bearer())
            .query(&[
                ("q", query.to_provider_query()),
                ("maxResults", query.limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::ListFailed {
                reason: format!("provider returned {}", response.status()),
            });
        }

        let listing: ListResponse = response
            .json()
            .await
            .map_err(|e| MailError::ListFailed {
                reason: format!("unparseable listing: {e}"),
            })?;

        Ok(listing.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(
        &self,
        token: &GmailToken,
        id: &str,
    ) -> Result<MailMessage, MailError> {
        let url = format!("{}/users/me/messages/{id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token.bearer())
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Http(format!(
                "message {id}: provider returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MailError::Http(format!("message {id}: unparseable body: {e}")))
    }
}

/// Normalize one decoded provider message into an `EmailRecord`.
///
/// Freshly ingested mail always carries the canonical `new` status.
pub fn record_from_message(message: &MailMessage) -> EmailRecord {
    let headers = decode::extract_headers(&message.payload.headers);
    let body = decode::extract_body(&message.payload);
    let body_preview = content_preview(&body);
    let subject = format_subject(&headers.subject);
    let priority = classify_priority(&subject, &body_preview);

    let id = if message.id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        message.id.clone()
    };
    let thread_id = if message.thread_id.is_empty() {
        id.clone()
    } else {
        message.thread_id.clone()
    };

    EmailRecord {
        id,
        thread_id,
        subject_raw: headers.subject,
        subject,
        from: headers.from,
        to: headers.to,
        sent_at: parse_timestamp(&headers.date),
        sent_at_raw: headers.date,
        body_preview,
        status: EmailStatus::New,
        priority,
        tool_invoked: None,
        source_name: GMAIL_SOURCE_NAME.to_string(),
    }
}

#[async_trait]
impl MailSource for GmailSource {
    async fn fetch(&self, query: &FetchQuery) -> Result<FetchBatch, MailError> {
        // Credentials are re-resolved each fetch so a rotated token file is
        // picked up without a restart. Failure here is a hard stop.
        let token = credentials::resolve(&self.config)?;

        let ids = self.list_message_ids(&token, query).await?;
        if ids.is_empty() {
            debug!("No messages matched the mailbox query");
            return Ok(FetchBatch::default());
        }

        info!(count = ids.len(), "Fetching mailbox messages");

        let mut batch = FetchBatch::default();
        for (i, id) in ids.iter().enumerate() {
            if query.early_stop && i > 0 {
                info!(processed = i, "Early stop after first message");
                break;
            }

            match self.get_message(&token, id).await {
                Ok(message) => batch.records.push(record_from_message(&message)),
                Err(e) => {
                    warn!(message_id = %id, "Skipping undecodable message: {e}");
                    batch.failed += 1;
                }
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::decode::{Header, MessagePayload};
    use crate::model::Priority;

    fn query(address: &str) -> FetchQuery {
        FetchQuery {
            address: address.into(),
            since_minutes: 0,
            include_read: false,
            limit: 50,
            early_stop: false,
        }
    }

    #[test]
    fn query_matches_sender_and_recipient() {
        let q = query("ops@example.com").to_provider_query();
        assert!(q.starts_with("to:ops@example.com OR from:ops@example.com"));
    }

    #[test]
    fn query_unread_only_by_default() {
        let q = query("ops@example.com").to_provider_query();
        assert!(q.ends_with(" is:unread"));
    }

    #[test]
    fn query_include_read_drops_unread_filter() {
        let mut fq = query("ops@example.com");
        fq.include_read = true;
        assert!(!fq.to_provider_query().contains("is:unread"));
    }

    #[test]
    fn query_zero_minutes_is_unbounded() {
        assert!(!query("ops@example.com").to_provider_query().contains("after:"));
    }

    #[test]
    fn query_age_cutoff_present_when_bounded() {
        let mut fq = query("ops@example.com");
        fq.since_minutes = 5;
        let q = fq.to_provider_query();
        assert!(q.contains(" after:"));
    }

    #[test]
    fn fresh_records_are_new_with_classified_priority() {
        let message = MailMessage {
            id: "m1".into(),
            thread_id: "t1".into(),
            payload: MessagePayload {
                headers: vec![
                    Header {
                        name: "Subject".into(),
                        value: "URGENT: server down".into(),
                    },
                    Header {
                        name: "From".into(),
                        value: "alice@example.com".into(),
                    },
                ],
                ..Default::default()
            },
        };
        let record = record_from_message(&message);
        assert_eq!(record.status, EmailStatus::New);
        assert_eq!(record.priority, Priority::High);
        assert_eq!(record.source_name, GMAIL_SOURCE_NAME);
        assert_eq!(record.to, decode::UNKNOWN_RECIPIENT);
        assert_eq!(record.body_preview, "No content");
        assert!(record.sent_at.is_none());
    }

    #[test]
    fn missing_thread_id_falls_back_to_message_id() {
        let message = MailMessage {
            id: "m2".into(),
            thread_id: String::new(),
            payload: MessagePayload::default(),
        };
        let record = record_from_message(&message);
        assert_eq!(record.thread_id, "m2");
    }

    // ── Fetch against a stub provider ───────────────────────────────

    // "aGVsbG8=" is base64url("hello").
    const GOOD_MESSAGE: &str = concat!(
        r#"{"id":"good","threadId":"t-good","payload":{"mimeType":"text/plain","#,
        r#""headers":[{"name":"Subject","value":"Hi"},"#,
        r#"{"name":"From","value":"alice@example.com"}],"#,
        r#""body":{"data":"aGVsbG8="}}}"#
    );

    async fn spawn_stub_provider(listing: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut raw = Vec::new();
                    let mut buf = [0u8; 1024];
                    loop {
                        let n = stream.read(&mut buf).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        raw.extend_from_slice(&buf[..n]);
                        if raw.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&raw);
                    let path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("");

                    let (status, body) = if path.starts_with("/users/me/messages/good") {
                        ("200 OK", GOOD_MESSAGE)
                    } else if path.starts_with("/users/me/messages/bad") {
                        ("500 Internal Server Error", "{}")
                    } else {
                        ("200 OK", listing)
                    };
                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });

        format!("http://{addr}")
    }

    fn stub_config() -> GmailConfig {
        GmailConfig {
            address: "ops@example.com".into(),
            token_json: Some(r#"{"token": "ya29.test"}"#.into()),
            token_path: std::path::PathBuf::from("/nonexistent/token.json"),
            since_minutes: 0,
            include_read: true,
            limit: 50,
        }
    }

    #[tokio::test]
    async fn bad_message_is_skipped_and_counted() {
        let base = spawn_stub_provider(r#"{"messages":[{"id":"good"},{"id":"bad"}]}"#).await;
        let source = GmailSource::new(stub_config()).with_base_url(&base);

        let batch = source.fetch(&query("ops@example.com")).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].id, "good");
        assert_eq!(batch.records[0].body_preview, "hello");
        assert_eq!(batch.failed, 1);
    }

    #[tokio::test]
    async fn empty_listing_is_an_empty_batch() {
        let base = spawn_stub_provider(r#"{"messages":[]}"#).await;
        let source = GmailSource::new(stub_config()).with_base_url(&base);

        let batch = source.fetch(&query("ops@example.com")).await.unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.failed, 0);
    }
}
