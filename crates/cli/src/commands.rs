//! The inventory commands: list-tokens and list-certs.

use std::path::Path;
use std::time::Duration;

use cardsign_core::SignError;
use cardsign_token::{TokenProvider, describe};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::json::{CertListJson, TokenListJson};

fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.into());
    spinner
}

/// Lists slots with a token present. A missing module file is reported, not
/// an error: the caller learns the middleware is absent from the payload.
pub fn list_tokens(provider: &dyn TokenProvider, module: &Path) -> Result<(), SignError> {
    eprintln!(
        "{}",
        style("==> Enumerating PKCS#11 slots").cyan().bold()
    );

    let exists = module.exists();
    let slots = if exists {
        let progress = spinner("Loading PKCS#11 module...");
        let slots = provider.list_slots()?;
        progress.finish_with_message(format!(
            "[OK] {} slot(s) with a token present",
            style(slots.len()).cyan()
        ));
        slots
    } else {
        eprintln!(
            "    {} module not found: {}",
            style("Warning:").yellow().bold(),
            style(module.display()).dim()
        );
        Vec::new()
    };

    let payload = TokenListJson {
        library: module.display().to_string(),
        exists,
        slots,
    };
    println!(
        "{}",
        serde_json::to_string(&payload)
            .map_err(|e| SignError::signing_with("cannot serialize report", e))?
    );
    Ok(())
}

pub fn list_certs(
    provider: &dyn TokenProvider,
    slot: usize,
    pin: Option<&str>,
) -> Result<(), SignError> {
    let pin =
        pin.ok_or_else(|| SignError::InvalidArgument("PIN is required (-p/--pin)".into()))?;

    eprintln!(
        "{}",
        style("==> Listing certificates on token").cyan().bold()
    );

    let progress = spinner("Opening token session...");
    let session = provider.open_session(slot, pin)?;
    let entries = session.entries()?;
    progress.finish_with_message(format!(
        "[OK] {} certificate entries",
        style(entries.len()).cyan()
    ));

    let certificates = describe(&entries);
    let payload = CertListJson {
        count: certificates.len(),
        certificates,
    };
    println!(
        "{}",
        serde_json::to_string(&payload)
            .map_err(|e| SignError::signing_with("cannot serialize report", e))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardsign_token::mock::MockToken;

    #[test]
    fn list_certs_requires_pin() {
        let token = MockToken::new("1234");
        let err = list_certs(&token, 0, None).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn list_certs_with_wrong_pin_is_token_error() {
        let token = MockToken::new("1234");
        let err = list_certs(&token, 0, Some("0000")).unwrap_err();
        assert_eq!(err.kind(), "token_error");
    }

    #[test]
    fn list_tokens_reports_missing_module_without_error() {
        let token = MockToken::new("1234");
        list_tokens(&token, Path::new("/nonexistent/libgclib.so")).unwrap();
    }
}
