//! The signing pipeline.
//!
//! Validates the input, reserves the signature in one incremental update,
//! hands the covered bytes to a [`SignatureBuilder`], embeds the container
//! it returns, and only then moves the finished file to the output path.

use std::io::Write as _;
use std::path::Path;

use chrono::Local;

use crate::digest::{DigestAlgorithm, compute_digest};
use crate::document;
use crate::error::SignError;
use crate::increment;
use crate::request::SignatureRequest;

/// Produces the detached CMS/CAdES container for a signature byte-range.
///
/// Implementations delegate the private-key operation to a hardware token;
/// this crate only ever sees the finished container.
pub trait SignatureBuilder {
    /// Number of bytes reserved in the output for the container.
    fn reserved_len(&self) -> usize;

    /// Builds the detached container over the covered bytes.
    fn build(&self, byte_range_content: &[u8]) -> Result<Vec<u8>, SignError>;
}

#[tracing::instrument(
    skip(request, builder),
    fields(input = %request.input.display(), output = %request.output.display())
)]
pub fn sign_document(
    request: &SignatureRequest,
    builder: &dyn SignatureBuilder,
) -> Result<(), SignError> {
    let loaded = document::load_document(&request.input)?;
    let now = Local::now();

    let mut prepared =
        increment::build_increment(&loaded, request, builder.reserved_len(), now)?;
    increment::patch_byte_range(&mut prepared)?;

    let content = increment::signed_content(&prepared);
    let algorithm = DigestAlgorithm::default();
    let digest = compute_digest(algorithm, &content);
    tracing::debug!(
        algorithm = algorithm.name(),
        digest = %hex::encode(&digest),
        "byte-range digest"
    );

    let container = builder.build(&content)?;
    increment::embed_signature(&mut prepared, &container)?;

    write_atomically(&request.output, &prepared.bytes)?;
    tracing::info!(size = prepared.bytes.len(), "document signed");
    Ok(())
}

/// Writes next to the target and renames into place, so a failure never
/// leaves a partial file under the final name.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), SignError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SignError::io(path, e))?;
    tmp.write_all(bytes).map_err(|e| SignError::io(path, e))?;
    tmp.persist(path).map_err(|e| SignError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::minimal_pdf;

    struct StubBuilder {
        reserved: usize,
        fail: bool,
    }

    impl SignatureBuilder for StubBuilder {
        fn reserved_len(&self) -> usize {
            self.reserved
        }

        fn build(&self, _content: &[u8]) -> Result<Vec<u8>, SignError> {
            if self.fail {
                Err(SignError::signing("token removed"))
            } else {
                Ok(vec![0xAB; 48])
            }
        }
    }

    fn setup() -> (tempfile::TempDir, SignatureRequest) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, minimal_pdf()).unwrap();
        let request = SignatureRequest::new(&input, dir.path().join("out.pdf"));
        (dir, request)
    }

    #[test]
    fn signs_and_produces_parseable_output() {
        let (_dir, request) = setup();
        let builder = StubBuilder {
            reserved: 64,
            fail: false,
        };
        sign_document(&request, &builder).unwrap();

        let out = std::fs::read(&request.output).unwrap();
        let input = std::fs::read(&request.input).unwrap();
        assert!(out.starts_with(&input));
        lopdf::Document::load_mem(&out).unwrap();
        assert!(out.windows(96).any(|w| w == "ab".repeat(48).as_bytes()));
    }

    #[test]
    fn failing_builder_leaves_no_output_file() {
        let (_dir, request) = setup();
        let builder = StubBuilder {
            reserved: 64,
            fail: true,
        };
        let err = sign_document(&request, &builder).unwrap_err();
        assert!(matches!(err, SignError::Signing { .. }));
        assert!(!request.output.exists());
    }

    #[test]
    fn signed_output_can_be_signed_again() {
        let (dir, request) = setup();
        let builder = StubBuilder {
            reserved: 64,
            fail: false,
        };
        sign_document(&request, &builder).unwrap();

        let mut second = SignatureRequest::new(&request.output, dir.path().join("out2.pdf"));
        second.field_name = "Signature2".to_string();
        sign_document(&second, &builder).unwrap();

        let first = std::fs::read(&request.output).unwrap();
        let twice = std::fs::read(&second.output).unwrap();
        assert!(twice.starts_with(&first));
        lopdf::Document::load_mem(&twice).unwrap();
    }

    #[test]
    fn missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = SignatureRequest::new(
            dir.path().join("absent.pdf"),
            dir.path().join("out.pdf"),
        );
        let builder = StubBuilder {
            reserved: 64,
            fail: false,
        };
        let err = sign_document(&request, &builder).unwrap_err();
        assert!(matches!(err, SignError::Io { .. }));
        assert!(!request.output.exists());
    }
}
