//! Request and result types for a signing operation.

use std::path::PathBuf;

use serde::Serialize;

/// Name given to the signature form field created in the document.
pub const SIG_FIELD_NAME: &str = "Signature1";

/// Rectangle in PDF user-space coordinates, origin at the lower-left corner
/// of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const DEFAULT_STAMP: Rect = Rect {
        x: 50.0,
        y: 50.0,
        width: 200.0,
        height: 50.0,
    };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// Placement of the visible signature stamp.
///
/// Assembled once before signing and never mutated afterwards; the renderer
/// only ever reads it. The rectangle is deliberately not bounds-checked
/// against the page.
#[derive(Debug, Clone)]
pub struct AppearanceConfig {
    /// 1-based page number carrying the stamp.
    pub page: u32,
    pub rect: Rect,
    /// Background image (PNG or JPEG). A path that does not exist is
    /// skipped silently and the stamp is text-only.
    pub image: Option<PathBuf>,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        AppearanceConfig {
            page: 1,
            rect: Rect::DEFAULT_STAMP,
            image: None,
        }
    }
}

/// Everything the pipeline needs to sign one document.
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub field_name: String,
    /// Name shown on the stamp and recorded as `/Name`.
    pub signer_name: Option<String>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact: Option<String>,
    /// `None` produces an invisible signature (zero-size widget).
    pub appearance: Option<AppearanceConfig>,
}

impl SignatureRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        SignatureRequest {
            input: input.into(),
            output: output.into(),
            field_name: SIG_FIELD_NAME.to_string(),
            signer_name: None,
            reason: None,
            location: None,
            contact: None,
            appearance: None,
        }
    }
}

/// Outcome of a completed signing operation, as surfaced in reports.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureResult {
    /// Alias of the certificate used.
    pub certificate: String,
    /// Subject DN of the signing certificate.
    pub signer: String,
}
