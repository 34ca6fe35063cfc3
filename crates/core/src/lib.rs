//! Core PDF signing primitives: document validation, incremental-update
//! assembly, byte-range reservation, visible appearance rendering, and
//! embedding of a detached signature container.
//!
//! This crate provides the foundational building blocks for cardsign, with
//! no CLI, UI, or PKCS#11 dependencies. The cryptographic container is
//! produced behind the [`SignatureBuilder`] seam.

pub mod appearance;
pub mod digest;
pub mod document;
pub mod error;
pub mod increment;
pub mod request;
pub mod signer;

#[cfg(test)]
mod testutil;

pub use digest::{DigestAlgorithm, compute_digest};
pub use error::SignError;
pub use request::{AppearanceConfig, Rect, SIG_FIELD_NAME, SignatureRequest, SignatureResult};
pub use signer::{SignatureBuilder, sign_document};
