//! Capability traits for cryptographic token access.
//!
//! The CLI constructs one concrete provider and passes it down as
//! `&dyn TokenProvider`; nothing in the pipeline reaches for a global
//! registry. Tests substitute the in-memory mock through the same seams.

use std::path::{Path, PathBuf};

use cardsign_core::SignError;

/// Middleware installation paths probed when no module path is given, in
/// preference order.
pub const WELL_KNOWN_MODULE_PATHS: &[&str] = &[
    "/usr/lib/pkcs11/libgclib.so",
    "/usr/lib/ClassicClient/libgclib.so",
    "/usr/lib/x86_64-linux-gnu/opensc-pkcs11.so",
];

/// Resolves the PKCS#11 module path: an explicit path wins, else the first
/// well-known path present on disk, else the first well-known path as a
/// hard default (loading it may still fail, with a useful error).
pub fn resolve_module_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    for candidate in WELL_KNOWN_MODULE_PATHS {
        let candidate = Path::new(candidate);
        if candidate.exists() {
            tracing::debug!(module = %candidate.display(), "PKCS#11 module found by probing");
            return candidate.to_path_buf();
        }
    }
    PathBuf::from(WELL_KNOWN_MODULE_PATHS[0])
}

/// One certificate entry on the token.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    /// CKA_LABEL, falling back to the hex CKA_ID when the label is empty.
    pub alias: String,
    /// DER of the certificate, when the object carries one.
    pub certificate: Option<Vec<u8>>,
    /// Whether a private-key object with the same CKA_ID exists.
    pub has_private_key: bool,
}

/// A slot with a token present, as reported by the module.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SlotDescription {
    /// Index into the present-token slot list; the same index `open_session`
    /// accepts.
    pub slot: usize,
    pub label: String,
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
}

pub trait TokenProvider {
    /// Opens an authenticated session on the given slot index. The session
    /// is released when the returned value is dropped, on every exit path.
    fn open_session(&self, slot: usize, pin: &str) -> Result<Box<dyn TokenSession>, SignError>;

    /// Slots with a token present, in module-reported order.
    fn list_slots(&self) -> Result<Vec<SlotDescription>, SignError>;
}

pub trait TokenSession {
    /// Certificate entries in provider-reported order, never re-sorted.
    fn entries(&self) -> Result<Vec<KeyEntry>, SignError>;

    /// SHA256-RSA-PKCS signature over `data`, computed on the token. The
    /// caller passes the raw bytes; hashing happens inside the mechanism.
    fn sign(&self, alias: &str, data: &[u8]) -> Result<Vec<u8>, SignError>;

    /// Leaf-first certificate chain for `alias`, assembled from the
    /// certificates present on the token.
    fn certificate_chain(&self, alias: &str) -> Result<Vec<Vec<u8>>, SignError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_module_path_wins() {
        let path = resolve_module_path(Some(Path::new("/tmp/custom-p11.so")));
        assert_eq!(path, PathBuf::from("/tmp/custom-p11.so"));
    }

    #[test]
    fn probe_falls_back_to_default() {
        // None of the well-known paths exist in the test environment.
        let path = resolve_module_path(None);
        assert!(
            WELL_KNOWN_MODULE_PATHS
                .iter()
                .any(|p| Path::new(p) == path)
        );
    }
}
