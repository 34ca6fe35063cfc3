//! The sign command: session, certificate selection, then the core pipeline.

use std::path::PathBuf;
use std::time::Duration;

use cardsign_core::{
    AppearanceConfig, Rect, SignError, SignatureRequest, SignatureResult, sign_document,
};
use cardsign_token::{CadesBuilder, TokenProvider, select_alias, subject_name};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::json::SignJson;

pub struct SignArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub pin: Option<String>,
    pub alias: Option<String>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact: Option<String>,
    pub name: Option<String>,
    pub visible: bool,
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub image: Option<PathBuf>,
}

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

pub fn sign(provider: &dyn TokenProvider, slot: usize, args: SignArgs) -> Result<(), SignError> {
    let input = args
        .input
        .ok_or_else(|| SignError::InvalidArgument("input file is required (-i/--input)".into()))?;
    let output = args
        .output
        .ok_or_else(|| SignError::InvalidArgument("output file is required (-o/--output)".into()))?;
    let pin = args
        .pin
        .ok_or_else(|| SignError::InvalidArgument("PIN is required (-p/--pin)".into()))?;

    eprintln!(
        "{}",
        style("==> Signing PDF with PKCS#11 token").cyan().bold()
    );

    let progress = spinner("Opening token session (the card may take a moment)...");
    let session = provider.open_session(slot, &pin)?;
    let entries = session.entries()?;
    progress.finish_with_message(format!(
        "[OK] Session open ({} certificate entries)",
        style(entries.len()).cyan()
    ));

    let alias = select_alias(&entries, args.alias.as_deref())?;
    let chain = session.certificate_chain(&alias)?;
    let leaf = chain
        .first()
        .ok_or_else(|| SignError::signing("certificate chain is empty"))?;
    let signer = subject_name(leaf)?;
    eprintln!(
        "    Using certificate: {} ({})",
        style(&alias).cyan(),
        style(&signer).dim()
    );

    let mut request = SignatureRequest::new(&input, &output);
    request.signer_name = args.name;
    request.reason = args.reason;
    request.location = args.location;
    request.contact = args.contact;
    if args.visible {
        request.appearance = Some(AppearanceConfig {
            page: args.page,
            rect: Rect::new(args.x, args.y, args.width, args.height),
            image: args.image,
        });
    }

    let builder = CadesBuilder::new(session.as_ref(), alias.clone(), chain)?;
    let progress = spinner("Signing (the token may ask for presence)...");
    sign_document(&request, &builder)?;
    progress.finish_and_clear();

    eprintln!(
        "\n{} {}",
        style("[SUCCESS]").green().bold(),
        style("Signed successfully").cyan()
    );

    let result = SignatureResult {
        certificate: alias,
        signer,
    };
    let payload = SignJson {
        success: true,
        input: input.display().to_string(),
        output: output.display().to_string(),
        result: &result,
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

    fn args(pin: Option<&str>) -> SignArgs {
        SignArgs {
            input: Some(PathBuf::from("/tmp/in.pdf")),
            output: Some(PathBuf::from("/tmp/out-cardsign-test.pdf")),
            pin: pin.map(String::from),
            alias: None,
            reason: None,
            location: None,
            contact: None,
            name: None,
            visible: false,
            page: 1,
            x: 50.0,
            y: 50.0,
            width: 200.0,
            height: 50.0,
            image: None,
        }
    }

    #[test]
    fn missing_pin_is_invalid_argument() {
        let token = MockToken::new("1234");
        let err = sign(&token, 0, args(None)).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn missing_input_is_invalid_argument() {
        let token = MockToken::new("1234");
        let mut a = args(Some("1234"));
        a.input = None;
        let err = sign(&token, 0, a).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn wrong_pin_fails_before_touching_any_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pdf");
        let token = MockToken::new("1234");
        let mut a = args(Some("9999"));
        a.output = Some(output.clone());
        let err = sign(&token, 0, a).unwrap_err();
        assert_eq!(err.kind(), "token_error");
        assert!(!output.exists());
    }

    #[test]
    fn empty_token_is_no_certificate_found() {
        let token = MockToken::new("1234");
        let err = sign(&token, 0, args(Some("1234"))).unwrap_err();
        assert_eq!(err.kind(), "no_certificate_found");
    }
}
