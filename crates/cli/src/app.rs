use cardsign_core::SignError;
use cardsign_token::{Pkcs11Provider, resolve_module_path};
use console::style;

use crate::cli::{Cli, Commands};
use crate::json::ErrorJson;
use crate::sign::SignArgs;

pub fn run(cli: Cli) -> Result<(), SignError> {
    let module = resolve_module_path(cli.lib.as_deref());
    tracing::debug!(module = %module.display(), slot = cli.slot, "using PKCS#11 module");
    let provider = Pkcs11Provider::new(&module);

    let result = match cli.command {
        Commands::ListTokens => crate::commands::list_tokens(&provider, &module),

        Commands::ListCerts { pin } => {
            crate::commands::list_certs(&provider, cli.slot, pin.as_deref())
        }

        Commands::Sign {
            input,
            output,
            pin,
            alias,
            reason,
            location,
            contact,
            name,
            visible,
            page,
            x,
            y,
            width,
            height,
            image,
        } => crate::sign::sign(
            &provider,
            cli.slot,
            SignArgs {
                input,
                output,
                pin,
                alias,
                reason,
                location,
                contact,
                name,
                visible,
                page,
                x,
                y,
                width,
                height,
                image,
            },
        ),
    };

    if let Err(e) = &result {
        report_error(e);
    }
    result
}

/// Renders the failure as a structured report on stderr, with the styled
/// summary above it for humans.
fn report_error(e: &SignError) {
    eprintln!("\n{} {}", style("[ERROR]").red().bold(), style(e).red());

    let causes: Vec<String> = std::iter::successors(
        std::error::Error::source(e),
        |cause| cause.source(),
    )
    .map(|cause| cause.to_string())
    .collect();
    for (i, cause) in causes.iter().enumerate() {
        if i == 0 {
            eprintln!("\n    Caused by:");
        }
        eprintln!("      - {}", style(cause).red());
    }

    let payload = ErrorJson {
        success: false,
        kind: e.kind(),
        message: e.to_string(),
        causes,
    };
    match serde_json::to_string(&payload) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!(r#"{{"success":false,"kind":"{}"}}"#, e.kind()),
    }
}
