use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cardsign",
    about = "Sign PDF documents with a smart-card held key (PKCS#11, CAdES)",
    long_about = "Produces PAdES-style signatures: a CAdES-B detached container \
                  embedded in one PDF incremental update, with the private key \
                  operation performed on the token."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the PKCS#11 module (well-known locations are probed if omitted)
    #[arg(long, global = true)]
    pub lib: Option<PathBuf>,

    /// Slot index among slots with a token present
    #[arg(long, global = true, default_value_t = 0)]
    pub slot: usize,

    /// Enable verbose logging (sets RUST_LOG=debug if not already set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List slots with a token present
    ListTokens,

    /// List certificates on the token
    ListCerts {
        /// User PIN
        #[arg(short, long)]
        pin: Option<String>,
    },

    /// Sign a PDF document
    Sign {
        /// Path to the PDF file to sign
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output path for the signed PDF
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// User PIN
        #[arg(short, long)]
        pin: Option<String>,

        /// Certificate alias (selected by policy if omitted)
        #[arg(short, long)]
        alias: Option<String>,

        /// Signing reason, recorded in the signature and shown on the stamp
        #[arg(long)]
        reason: Option<String>,

        /// Signing location
        #[arg(long)]
        location: Option<String>,

        /// Signer contact information
        #[arg(long)]
        contact: Option<String>,

        /// Signer name shown on the stamp
        #[arg(long)]
        name: Option<String>,

        /// Draw a visible signature stamp
        #[arg(long)]
        visible: bool,

        /// Page carrying the visible stamp (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Stamp position, PDF user-space points from the lower-left corner
        #[arg(long, default_value_t = 50.0)]
        x: f32,

        #[arg(long, default_value_t = 50.0)]
        y: f32,

        #[arg(long, default_value_t = 200.0)]
        width: f32,

        #[arg(long, default_value_t = 50.0)]
        height: f32,

        /// Stamp background image (PNG or JPEG)
        #[arg(long)]
        image: Option<PathBuf>,
    },
}
