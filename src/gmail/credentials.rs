//! Mailbox credential resolution.
//!
//! Tries an ordered list of sources and stops at the first one that
//! parses. Resolution failure is a hard stop for the ingestion path — an
//! unauthenticated mailbox client must not run — and never triggers a
//! fallback to a different backend.

use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GmailConfig;
use crate::error::CredentialError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// OAuth token bundle for the mailbox provider.
///
/// Acquisition/refresh flows are out of scope; the bundle is consumed
/// as-is and its access token used as a bearer credential.
#[derive(Debug, Clone, Deserialize)]
pub struct GmailToken {
    token: SecretString,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.to_string()]
}

impl GmailToken {
    /// Access token for the `Authorization: Bearer` header.
    pub fn bearer(&self) -> &str {
        self.token.expose_secret()
    }
}

/// Resolve mailbox credentials from the configured sources, in fixed order:
///
/// 1. the inline JSON bundle from configuration;
/// 2. the token file at the configured path.
///
/// The first source that parses wins; later sources are not consulted.
/// If neither yields parseable data the result is
/// `CredentialError::Unavailable`.
pub fn resolve(config: &GmailConfig) -> Result<GmailToken, CredentialError> {
    if let Some(raw) = &config.token_json {
        match serde_json::from_str::<GmailToken>(raw) {
            Ok(token) => {
                debug!("Using inline token bundle from configuration");
                return Ok(token);
            }
            Err(e) => {
                warn!("Could not parse inline token bundle: {e}");
            }
        }
    }

    match load_token_file(&config.token_path) {
        Some(token) => {
            debug!(path = %config.token_path.display(), "Using token file");
            Ok(token)
        }
        None => Err(CredentialError::Unavailable {
            tried: format!(
                "inline bundle, token file at {}",
                config.token_path.display()
            ),
        }),
    }
}

fn load_token_file(path: &Path) -> Option<GmailToken> {
    if !path.exists() {
        debug!(path = %path.display(), "Token file not found");
        return None;
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), "Could not read token file: {e}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(path = %path.display(), "Could not parse token file: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    fn config(token_json: Option<&str>, token_path: PathBuf) -> GmailConfig {
        GmailConfig {
            address: "ops@example.com".into(),
            token_json: token_json.map(String::from),
            token_path,
            since_minutes: 5,
            include_read: false,
            limit: 50,
        }
    }

    const BUNDLE: &str = r#"{
        "token": "ya29.inline",
        "refresh_token": "1//refresh",
        "token_uri": "https://oauth2.googleapis.com/token",
        "client_id": "client",
        "client_secret": "secret",
        "scopes": ["https://www.googleapis.com/auth/gmail.modify"]
    }"#;

    #[test]
    fn inline_bundle_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"token": "ya29.from-file"}}"#).unwrap();

        let cfg = config(Some(BUNDLE), file.path().to_path_buf());
        let token = resolve(&cfg).unwrap();
        assert_eq!(token.bearer(), "ya29.inline");
    }

    #[test]
    fn falls_back_to_file_when_inline_unparseable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"token": "ya29.from-file"}}"#).unwrap();

        let cfg = config(Some("{not json"), file.path().to_path_buf());
        let token = resolve(&cfg).unwrap();
        assert_eq!(token.bearer(), "ya29.from-file");
    }

    #[test]
    fn missing_everything_is_unavailable() {
        let cfg = config(None, PathBuf::from("/nonexistent/token.json"));
        let err = resolve(&cfg).unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable { .. }));
    }

    #[test]
    fn unparseable_file_is_unavailable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();

        let cfg = config(None, file.path().to_path_buf());
        assert!(resolve(&cfg).is_err());
    }

    #[test]
    fn defaults_applied_to_sparse_bundle() {
        let cfg = config(Some(r#"{"token": "ya29.sparse"}"#), PathBuf::from("/nope"));
        let token = resolve(&cfg).unwrap();
        assert_eq!(token.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(token.scopes, vec![DEFAULT_SCOPE.to_string()]);
        assert!(token.refresh_token.is_none());
    }
}
