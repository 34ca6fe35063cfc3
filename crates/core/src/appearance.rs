//! Visible signature appearance.
//!
//! The stamp is a frame form XObject composing two layers: `/n0` draws the
//! background image (scaled uniformly to fit the rectangle and centered),
//! `/n2` draws the descriptive text block. Readers that understand layered
//! signature appearances pick the layers up by those names.

use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::SignError;
use crate::request::Rect;

/// Decoded stamp image ready to embed as an image XObject.
#[derive(Debug)]
pub struct StampImage {
    pub width: u32,
    pub height: u32,
    /// Raw 8-bit RGB samples, row-major.
    pub rgb: Vec<u8>,
}

/// Loads the stamp background image.
///
/// No path, or a path that does not exist, yields `None` and the background
/// layer is skipped. A file that exists but cannot be decoded is an error:
/// the caller asked for that image explicitly.
pub fn load_stamp_image(path: Option<&Path>) -> Result<Option<StampImage>, SignError> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !path.exists() {
        tracing::debug!(path = %path.display(), "stamp image not found, text-only stamp");
        return Ok(None);
    }
    let decoded = image::open(path).map_err(|e| {
        SignError::InvalidArgument(format!("cannot decode stamp image {}: {e}", path.display()))
    })?;
    let rgb = decoded.to_rgb8();
    let (width, height) = (rgb.width(), rgb.height());
    Ok(Some(StampImage {
        width,
        height,
        rgb: rgb.into_raw(),
    }))
}

/// Content stream for the `/n0` layer.
///
/// Image space is the unit square, so the CTM carries the scaled size and
/// the centering offset.
pub fn layer0_content(rect: Rect, image: &StampImage) -> String {
    let scale = (rect.width / image.width as f32).min(rect.height / image.height as f32);
    let scaled_w = image.width as f32 * scale;
    let scaled_h = image.height as f32 * scale;
    let offset_x = (rect.width - scaled_w) / 2.0;
    let offset_y = (rect.height - scaled_h) / 2.0;
    format!(
        "q {} 0 0 {} {} {} cm /Img0 Do Q",
        fmt_real(scaled_w),
        fmt_real(scaled_h),
        fmt_real(offset_x),
        fmt_real(offset_y)
    )
}

/// Text of the `/n2` layer, one line per supplied field.
///
/// Line order is fixed; absent fields are omitted; the timestamp line is
/// always present and always last.
pub fn layer2_text(
    signer_name: Option<&str>,
    reason: Option<&str>,
    location: Option<&str>,
    now: DateTime<Local>,
) -> String {
    let mut lines = Vec::new();
    if let Some(name) = signer_name {
        lines.push(format!("Signé par: {name}"));
    }
    if let Some(reason) = reason {
        lines.push(format!("Raison: {reason}"));
    }
    if let Some(location) = location {
        lines.push(format!("Lieu: {location}"));
    }
    lines.push(format!("Date: {}", now.format("%d/%m/%Y %H:%M")));
    lines.join("\n")
}

/// Content stream for the `/n2` layer: 10pt Helvetica, 12pt leading,
/// anchored at the top-left of the rectangle.
pub fn layer2_content(text: &str, rect: Rect) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"BT\n/F0 10 Tf\n12 TL\n");
    out.extend_from_slice(format!("2 {} Td\n", fmt_real(rect.height - 12.0)).as_bytes());
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            out.extend_from_slice(b"T*\n");
        }
        out.push(b'(');
        out.extend_from_slice(&escape_pdf_text(&encode_winansi(line)));
        out.extend_from_slice(b") Tj\n");
    }
    out.extend_from_slice(b"ET\n");
    out
}

/// Best-effort WinAnsi (cp1252 superset of Latin-1) encoding; characters
/// outside the codepage become `?`.
pub fn encode_winansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| {
            let code = c as u32;
            if code < 256 { code as u8 } else { b'?' }
        })
        .collect()
}

fn escape_pdf_text(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out
}

/// Shortest plain decimal rendering of a PDF real.
pub(crate) fn fmt_real(v: f32) -> String {
    if v == v.trunc() && v.abs() < 1e7 {
        format!("{}", v as i64)
    } else {
        let s = format!("{v:.4}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 25, 14, 30, 0).unwrap()
    }

    #[test]
    fn text_block_full() {
        let text = layer2_text(
            Some("Jean Dupont"),
            Some("Approbation"),
            Some("Luxembourg"),
            fixed_now(),
        );
        assert_eq!(
            text,
            "Signé par: Jean Dupont\nRaison: Approbation\nLieu: Luxembourg\nDate: 25/08/2026 14:30"
        );
    }

    #[test]
    fn text_block_omits_absent_fields_but_keeps_date() {
        let text = layer2_text(None, None, None, fixed_now());
        assert_eq!(text, "Date: 25/08/2026 14:30");

        let text = layer2_text(None, Some("Validation"), None, fixed_now());
        assert_eq!(text, "Raison: Validation\nDate: 25/08/2026 14:30");
    }

    #[test]
    fn image_scaled_uniformly_and_centered() {
        let rect = Rect::new(50.0, 50.0, 200.0, 50.0);
        let image = StampImage {
            width: 100,
            height: 100,
            rgb: vec![0; 100 * 100 * 3],
        };
        // Limiting dimension is the height: scale 0.5, 75pt left over on x.
        assert_eq!(
            layer0_content(rect, &image),
            "q 50 0 0 50 75 0 cm /Img0 Do Q"
        );
    }

    #[test]
    fn winansi_maps_accents_and_escapes_delimiters() {
        assert_eq!(encode_winansi("é"), vec![0xE9]);
        assert_eq!(encode_winansi("日"), vec![b'?']);

        let content = layer2_content("a(b)c", Rect::new(0.0, 0.0, 100.0, 40.0));
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("(a\\(b\\)c) Tj"));
    }

    #[test]
    fn missing_image_path_is_skipped() {
        assert!(load_stamp_image(None).unwrap().is_none());
        assert!(
            load_stamp_image(Some(Path::new("/nonexistent/stamp.png")))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn undecodable_image_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load_stamp_image(Some(&path)).unwrap_err();
        assert!(matches!(err, SignError::InvalidArgument(_)));
    }
}
