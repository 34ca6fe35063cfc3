//! Typed failures for the signing pipeline.
//!
//! Every variant carries a stable machine tag (see [`SignError::kind`]) so
//! callers can report failures structurally without matching on variants.

use std::path::{Path, PathBuf};

use thiserror::Error;

type Source = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SignError {
    /// The PKCS#11 module could not be loaded, the session could not be
    /// opened, or authentication failed.
    #[error("token error: {message}")]
    Token {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// No usable certificate with a private key exists on the token.
    #[error("no certificate with a private key found on the token")]
    NoCertificateFound,

    /// The token refused the key operation or the signature container could
    /// not be assembled.
    #[error("signing failed: {message}")]
    Signing {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// The input is not a PDF this tool can sign.
    #[error("malformed PDF document: {0}")]
    MalformedDocument(String),

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SignError {
    pub fn token(message: impl Into<String>) -> Self {
        SignError::Token {
            message: message.into(),
            source: None,
        }
    }

    pub fn token_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SignError::Token {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn signing(message: impl Into<String>) -> Self {
        SignError::Signing {
            message: message.into(),
            source: None,
        }
    }

    pub fn signing_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SignError::Signing {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        SignError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable machine tag used in structured reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SignError::Token { .. } => "token_error",
            SignError::NoCertificateFound => "no_certificate_found",
            SignError::Signing { .. } => "signing_error",
            SignError::MalformedDocument(_) => "malformed_document",
            SignError::Io { .. } => "io_error",
            SignError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(SignError::token("x").kind(), "token_error");
        assert_eq!(SignError::NoCertificateFound.kind(), "no_certificate_found");
        assert_eq!(SignError::signing("x").kind(), "signing_error");
        assert_eq!(
            SignError::MalformedDocument("x".into()).kind(),
            "malformed_document"
        );
        assert_eq!(
            SignError::InvalidArgument("x".into()).kind(),
            "invalid_argument"
        );
    }

    #[test]
    fn source_chain_is_preserved() {
        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let err = SignError::token_with("cannot open session", inner);
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("locked"));
    }
}
