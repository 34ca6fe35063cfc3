//! JSON output formats.
//!
//! Success reports go to stdout, the error report to stderr; progress and
//! styling stay on stderr so stdout is always machine-parseable.

use cardsign_core::SignatureResult;
use cardsign_token::{CertificateDescription, SlotDescription};
use serde::Serialize;

#[derive(Serialize)]
pub struct SignJson<'a> {
    pub success: bool,
    pub input: String,
    pub output: String,
    /// Certificate alias and signer subject, flattened into the report.
    #[serde(flatten)]
    pub result: &'a SignatureResult,
}

#[derive(Serialize)]
pub struct CertListJson {
    pub certificates: Vec<CertificateDescription>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct TokenListJson {
    pub library: String,
    pub exists: bool,
    pub slots: Vec<SlotDescription>,
}

#[derive(Serialize)]
pub struct ErrorJson<'a> {
    pub success: bool,
    /// Stable machine tag of the failure kind.
    pub kind: &'a str,
    pub message: String,
    pub causes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_report_field_names() {
        let result = SignatureResult {
            certificate: "sig-key".into(),
            signer: "CN=Jean Dupont".into(),
        };
        let payload = SignJson {
            success: true,
            input: "in.pdf".into(),
            output: "out.pdf".into(),
            result: &result,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            json,
            r#"{"success":true,"input":"in.pdf","output":"out.pdf","certificate":"sig-key","signer":"CN=Jean Dupont"}"#
        );
    }

    #[test]
    fn error_report_field_names() {
        let payload = ErrorJson {
            success: false,
            kind: "token_error",
            message: "token error: authentication failed".into(),
            causes: vec!["CKR_PIN_INCORRECT".into()],
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.starts_with(r#"{"success":false,"kind":"token_error""#));
        assert!(json.contains("CKR_PIN_INCORRECT"));
    }
}
