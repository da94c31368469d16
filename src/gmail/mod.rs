//! Mailbox ingestion — credential resolution, message decoding, and the
//! mail source that turns provider messages into canonical records.

pub mod credentials;
pub mod decode;
pub mod source;

pub use credentials::GmailToken;
pub use source::{FetchBatch, FetchQuery, GmailSource, MailSource};
