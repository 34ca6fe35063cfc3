//! Input document loading and validation.

use std::path::Path;

use lopdf::{Document, ObjectId};

use crate::error::SignError;

/// A parsed input document plus the raw bytes it was parsed from.
///
/// The raw bytes are kept verbatim: the incremental update is appended after
/// them and they must reach the output unchanged.
pub struct LoadedDocument {
    pub bytes: Vec<u8>,
    pub doc: Document,
    /// Offset of the previous cross-reference section, for the `/Prev`
    /// entry of the appended trailer.
    pub prev_xref_offset: u64,
}

impl std::fmt::Debug for LoadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDocument")
            .field("size", &self.bytes.len())
            .field("objects", &self.doc.objects.len())
            .field("prev_xref_offset", &self.prev_xref_offset)
            .finish()
    }
}

#[tracing::instrument]
pub fn load_document(path: &Path) -> Result<LoadedDocument, SignError> {
    let bytes = std::fs::read(path).map_err(|e| SignError::io(path, e))?;
    let doc = Document::load_mem(&bytes)
        .map_err(|e| SignError::MalformedDocument(e.to_string()))?;
    if doc.trailer.get(b"Root").is_err() {
        return Err(SignError::MalformedDocument(
            "trailer has no /Root entry".to_string(),
        ));
    }
    let prev_xref_offset = last_startxref(&bytes)?;
    tracing::debug!(
        size = bytes.len(),
        objects = doc.objects.len(),
        prev_xref_offset,
        "document loaded"
    );
    Ok(LoadedDocument {
        bytes,
        doc,
        prev_xref_offset,
    })
}

/// Offset recorded by the last `startxref` keyword in the file.
///
/// `lopdf` resolves the cross-reference chain internally but does not expose
/// the trailing offset, so it is scanned from the end of the raw bytes.
pub fn last_startxref(data: &[u8]) -> Result<u64, SignError> {
    let keyword = b"startxref";
    let pos = data
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| SignError::MalformedDocument("no startxref marker".to_string()))?;
    let rest = &data[pos + keyword.len()..];
    let digits: Vec<u8> = rest
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Err(SignError::MalformedDocument(
            "startxref not followed by an offset".to_string(),
        ));
    }
    // All-digit ASCII, parse cannot fail except on overflow.
    String::from_utf8_lossy(&digits)
        .parse::<u64>()
        .map_err(|e| SignError::MalformedDocument(format!("bad startxref offset: {e}")))
}

/// Object id of the 1-based `page` in the document.
pub fn page_object_id(doc: &Document, page: u32) -> Result<ObjectId, SignError> {
    doc.get_pages()
        .get(&page)
        .copied()
        .ok_or_else(|| {
            SignError::InvalidArgument(format!("page {page} does not exist in the document"))
        })
}
