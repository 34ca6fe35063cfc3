//! Incremental-update assembly.
//!
//! The signed output is the original file bytes, untouched, followed by one
//! incremental-update section: the new and updated objects, the signature
//! dictionary with its `/Contents` and `/ByteRange` placeholders, a classic
//! cross-reference table and a trailer chaining back via `/Prev`. The
//! signature dictionary is rendered by hand so the placeholder spans are
//! known exactly and can be patched in place.

use std::io::Write as _;
use std::ops::Range;

use chrono::{DateTime, Local};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat, dictionary};

use crate::appearance::{self, StampImage, encode_winansi, fmt_real};
use crate::document::{self, LoadedDocument};
use crate::error::SignError;
use crate::request::{Rect, SignatureRequest};

/// Width of the `/ByteRange` placeholder. Four integers of up to ten digits
/// each fit, which covers files below 10 GB.
const BYTE_RANGE_FIELD_LEN: usize = 48;

/// Original bytes plus one unsigned incremental update.
pub struct PreparedIncrement {
    pub bytes: Vec<u8>,
    /// Span of the `/Contents` hex placeholder, including the `<>`
    /// delimiters. Excluded from the digest.
    pub contents_span: Range<usize>,
    byte_range_span: Range<usize>,
}

/// Appends the incremental-update section for one signature.
///
/// `reserved_len` is the number of raw bytes reserved for the DER signature
/// container; the hex placeholder is twice that.
pub fn build_increment(
    loaded: &LoadedDocument,
    request: &SignatureRequest,
    reserved_len: usize,
    now: DateTime<Local>,
) -> Result<PreparedIncrement, SignError> {
    let doc = &loaded.doc;
    let mut next_id = doc.max_id;
    let mut alloc = || {
        next_id += 1;
        (next_id, 0u16)
    };

    // New and updated objects of the increment, except the signature
    // dictionary which is rendered separately.
    let mut objects: Vec<(ObjectId, Object)> = Vec::new();

    let page_number = request.appearance.as_ref().map_or(1, |a| a.page);
    let page_id = document::page_object_id(doc, page_number)?;

    // Appearance layers.
    let mut frame_ref: Option<ObjectId> = None;
    let mut widget_rect = Rect::new(0.0, 0.0, 0.0, 0.0);
    if let Some(config) = &request.appearance {
        widget_rect = config.rect;
        let rect = config.rect;
        let bbox = vec![real(0.0), real(0.0), real(rect.width), real(rect.height)];

        let stamp = appearance::load_stamp_image(config.image.as_deref())?;
        let n0_id = alloc();
        let (n0_resources, n0_content) = match stamp {
            Some(image) => {
                let image_id = alloc();
                objects.push((image_id, image_xobject(&image)?));
                let resources = dictionary! {
                    "XObject" => dictionary! { "Img0" => Object::Reference(image_id) },
                };
                (resources, appearance::layer0_content(rect, &image).into_bytes())
            }
            None => (Dictionary::new(), Vec::new()),
        };
        objects.push((
            n0_id,
            Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => bbox.clone(),
                    "Resources" => n0_resources,
                },
                n0_content,
            )),
        ));

        let font_id = alloc();
        objects.push((
            font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            }),
        ));

        let text = appearance::layer2_text(
            request.signer_name.as_deref(),
            request.reason.as_deref(),
            request.location.as_deref(),
            now,
        );
        let n2_id = alloc();
        objects.push((
            n2_id,
            Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => bbox.clone(),
                    "Resources" => dictionary! {
                        "Font" => dictionary! { "F0" => Object::Reference(font_id) },
                    },
                },
                appearance::layer2_content(&text, rect),
            )),
        ));

        let frm_id = alloc();
        objects.push((
            frm_id,
            Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => bbox,
                    "Resources" => dictionary! {
                        "XObject" => dictionary! {
                            "n0" => Object::Reference(n0_id),
                            "n2" => Object::Reference(n2_id),
                        },
                    },
                },
                b"q /n0 Do Q q /n2 Do Q".to_vec(),
            )),
        ));
        frame_ref = Some(frm_id);
    }

    // Signature dictionary id is allocated now but the object is rendered
    // by hand during serialization.
    let sig_id = alloc();

    // Signature field, doubling as its widget annotation.
    let field_id = alloc();
    let rect_array = match request.appearance {
        Some(_) => vec![
            real(widget_rect.x),
            real(widget_rect.y),
            real(widget_rect.x + widget_rect.width),
            real(widget_rect.y + widget_rect.height),
        ],
        None => vec![real(0.0), real(0.0), real(0.0), real(0.0)],
    };
    let mut field = dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Sig",
        "Rect" => rect_array,
        "F" => 132,
        "T" => Object::String(
            encode_winansi(&request.field_name),
            StringFormat::Literal,
        ),
        "P" => Object::Reference(page_id),
        "V" => Object::Reference(sig_id),
    };
    if let Some(frm) = frame_ref {
        field.set("AP", dictionary! { "N" => Object::Reference(frm) });
    }
    objects.push((field_id, Object::Dictionary(field)));

    // Page carries the widget in /Annots.
    let mut page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| SignError::MalformedDocument(format!("page object: {e}")))?
        .clone();
    match page.get(b"Annots").ok().cloned() {
        Some(Object::Reference(annots_id)) => {
            let mut annots = doc
                .get_object(annots_id)
                .and_then(Object::as_array)
                .map_err(|e| SignError::MalformedDocument(format!("page /Annots: {e}")))?
                .clone();
            annots.push(Object::Reference(field_id));
            objects.push((annots_id, Object::Array(annots)));
        }
        Some(Object::Array(mut annots)) => {
            annots.push(Object::Reference(field_id));
            page.set("Annots", annots);
        }
        _ => {
            page.set("Annots", vec![Object::Reference(field_id)]);
        }
    }
    objects.push((page_id, Object::Dictionary(page)));

    // Catalog gains or updates its /AcroForm.
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| SignError::MalformedDocument(format!("trailer /Root: {e}")))?;
    let catalog = doc
        .get_object(root_id)
        .and_then(Object::as_dict)
        .map_err(|e| SignError::MalformedDocument(format!("document catalog: {e}")))?
        .clone();
    match catalog.get(b"AcroForm").ok().cloned() {
        Some(Object::Reference(form_id)) => {
            let mut form = doc
                .get_object(form_id)
                .and_then(Object::as_dict)
                .map_err(|e| SignError::MalformedDocument(format!("/AcroForm: {e}")))?
                .clone();
            append_signature_field(&mut form, field_id, doc, &mut objects)?;
            objects.push((form_id, Object::Dictionary(form)));
        }
        Some(Object::Dictionary(mut form)) => {
            append_signature_field(&mut form, field_id, doc, &mut objects)?;
            let mut updated = catalog;
            updated.set("AcroForm", form);
            objects.push((root_id, Object::Dictionary(updated)));
        }
        _ => {
            let mut form = Dictionary::new();
            append_signature_field(&mut form, field_id, doc, &mut objects)?;
            let form_id = alloc();
            objects.push((form_id, Object::Dictionary(form)));
            let mut updated = catalog;
            updated.set("AcroForm", Object::Reference(form_id));
            objects.push((root_id, Object::Dictionary(updated)));
        }
    }

    // Serialize: original bytes first, never rewritten.
    let mut out = loaded.bytes.clone();
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }

    let mut xref_entries: Vec<(u32, u16, usize)> = Vec::new();
    for (id, object) in &objects {
        xref_entries.push((id.0, id.1, out.len()));
        write_indirect_object(&mut out, *id, object);
    }

    xref_entries.push((sig_id.0, sig_id.1, out.len()));
    let (contents_span, byte_range_span) =
        write_signature_dictionary(&mut out, sig_id, request, reserved_len, now);

    let xref_start = out.len();
    write_xref_section(&mut out, &xref_entries);

    let mut trailer = Dictionary::new();
    trailer.set("Size", i64::from(next_id) + 1);
    trailer.set("Prev", loaded.prev_xref_offset as i64);
    trailer.set("Root", Object::Reference(root_id));
    if let Ok(id) = doc.trailer.get(b"ID") {
        trailer.set("ID", id.clone());
    }
    out.extend_from_slice(b"trailer\n");
    write_object(&mut out, &Object::Dictionary(trailer));
    out.extend_from_slice(format!("\nstartxref\n{xref_start}\n%%EOF\n").as_bytes());

    tracing::debug!(
        increment_len = out.len() - loaded.bytes.len(),
        objects = objects.len() + 1,
        "incremental update assembled"
    );
    Ok(PreparedIncrement {
        bytes: out,
        contents_span,
        byte_range_span,
    })
}

fn append_signature_field(
    form: &mut Dictionary,
    field_id: ObjectId,
    doc: &lopdf::Document,
    objects: &mut Vec<(ObjectId, Object)>,
) -> Result<(), SignError> {
    // Signatures exist and the viewer must not construct appearances.
    form.set("SigFlags", 3);
    match form.get(b"Fields").ok().cloned() {
        Some(Object::Reference(fields_id)) => {
            let mut fields = doc
                .get_object(fields_id)
                .and_then(Object::as_array)
                .map_err(|e| SignError::MalformedDocument(format!("/AcroForm /Fields: {e}")))?
                .clone();
            fields.push(Object::Reference(field_id));
            objects.push((fields_id, Object::Array(fields)));
        }
        Some(Object::Array(mut fields)) => {
            fields.push(Object::Reference(field_id));
            form.set("Fields", fields);
        }
        _ => {
            form.set("Fields", vec![Object::Reference(field_id)]);
        }
    }
    Ok(())
}

/// Patches the real `/ByteRange` over its space-padded placeholder.
pub fn patch_byte_range(prepared: &mut PreparedIncrement) -> Result<(), SignError> {
    let total = prepared.bytes.len();
    let rendered = format!(
        "[0 {} {} {}]",
        prepared.contents_span.start,
        prepared.contents_span.end,
        total - prepared.contents_span.end
    );
    let span = prepared.byte_range_span.clone();
    if rendered.len() > span.len() {
        return Err(SignError::signing(format!(
            "byte range {rendered} does not fit its {}-byte reservation",
            span.len()
        )));
    }
    let mut field = vec![b' '; span.len()];
    field[..rendered.len()].copy_from_slice(rendered.as_bytes());
    prepared.bytes[span].copy_from_slice(&field);
    Ok(())
}

/// The covered bytes: everything outside the `/Contents` placeholder.
pub fn signed_content(prepared: &PreparedIncrement) -> Vec<u8> {
    let mut content =
        Vec::with_capacity(prepared.bytes.len() - prepared.contents_span.len());
    content.extend_from_slice(&prepared.bytes[..prepared.contents_span.start]);
    content.extend_from_slice(&prepared.bytes[prepared.contents_span.end..]);
    content
}

/// Writes the DER container hex-encoded into the reservation. The remainder
/// of the placeholder stays zero-filled, as the byte-range already covers it.
pub fn embed_signature(prepared: &mut PreparedIncrement, der: &[u8]) -> Result<(), SignError> {
    let capacity = (prepared.contents_span.len() - 2) / 2;
    if der.len() > capacity {
        return Err(SignError::signing(format!(
            "signature container is {} bytes but only {capacity} bytes are reserved",
            der.len()
        )));
    }
    let hexed = hex::encode(der);
    let start = prepared.contents_span.start + 1;
    prepared.bytes[start..start + hexed.len()].copy_from_slice(hexed.as_bytes());
    Ok(())
}

fn write_signature_dictionary(
    out: &mut Vec<u8>,
    id: ObjectId,
    request: &SignatureRequest,
    reserved_len: usize,
    now: DateTime<Local>,
) -> (Range<usize>, Range<usize>) {
    out.extend_from_slice(
        format!(
            "{} {} obj\n<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /ETSI.CAdES.detached\n",
            id.0, id.1
        )
        .as_bytes(),
    );

    out.extend_from_slice(b"/ByteRange ");
    let byte_range_start = out.len();
    out.extend_from_slice(&vec![b' '; BYTE_RANGE_FIELD_LEN]);
    let byte_range_span = byte_range_start..out.len();

    out.extend_from_slice(b"\n/Contents ");
    let contents_start = out.len();
    out.push(b'<');
    out.extend_from_slice(&vec![b'0'; reserved_len * 2]);
    out.push(b'>');
    let contents_span = contents_start..out.len();

    let optional = [
        ("Name", request.signer_name.as_deref()),
        ("Reason", request.reason.as_deref()),
        ("Location", request.location.as_deref()),
        ("ContactInfo", request.contact.as_deref()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            out.extend_from_slice(format!("\n/{key} ").as_bytes());
            write_literal_string(out, &encode_winansi(value));
        }
    }
    out.extend_from_slice(b"\n/M ");
    write_literal_string(out, pdf_date(&now).as_bytes());
    out.extend_from_slice(b"\n>>\nendobj\n");

    (contents_span, byte_range_span)
}

/// PDF date string, e.g. `D:20260825143000+02'00'`.
fn pdf_date(now: &DateTime<Local>) -> String {
    let stamp = now.format("D:%Y%m%d%H%M%S").to_string();
    let offset = now.format("%z").to_string();
    format!("{stamp}{}'{}'", &offset[..3], &offset[3..])
}

fn image_xobject(image: &StampImage) -> Result<Object, SignError> {
    let compressed = {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&image.rgb)
            .and_then(|()| encoder.finish())
    }
    .map_err(|e| SignError::signing_with("cannot compress stamp image", e))?;
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(image.width),
        "Height" => i64::from(image.height),
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    Ok(Object::Stream(Stream::new(dict, compressed)))
}

fn real(v: f32) -> Object {
    Object::Real(v)
}

fn write_indirect_object(out: &mut Vec<u8>, id: ObjectId, object: &Object) {
    out.extend_from_slice(format!("{} {} obj\n", id.0, id.1).as_bytes());
    write_object(out, object);
    out.extend_from_slice(b"\nendobj\n");
}

fn write_object(out: &mut Vec<u8>, object: &Object) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Object::Real(r) => out.extend_from_slice(fmt_real(*r).as_bytes()),
        Object::Name(name) => write_name(out, name),
        Object::String(s, StringFormat::Literal) => write_literal_string(out, s),
        Object::String(s, StringFormat::Hexadecimal) => {
            out.push(b'<');
            out.extend_from_slice(hex::encode(s).as_bytes());
            out.push(b'>');
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict),
        Object::Stream(stream) => {
            write_dictionary(out, &stream.dict);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference((num, generation)) => {
            out.extend_from_slice(format!("{num} {generation} R").as_bytes());
        }
    }
}

fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<< ");
    for (key, value) in dict.iter() {
        write_name(out, key);
        out.push(b' ');
        write_object(out, value);
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
}

fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &b in name {
        // Delimiters and whitespace need the #xx escape.
        if b <= b' '
            || b == b'#'
            || matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
        {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        } else {
            out.push(b);
        }
    }
}

fn write_literal_string(out: &mut Vec<u8>, s: &[u8]) {
    out.push(b'(');
    for &b in s {
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
    out.push(b')');
}

fn write_xref_section(out: &mut Vec<u8>, entries: &[(u32, u16, usize)]) {
    let mut entries = entries.to_vec();
    entries.sort_by_key(|e| e.0);
    out.extend_from_slice(b"xref\n");
    let mut i = 0;
    while i < entries.len() {
        let mut j = i + 1;
        while j < entries.len() && entries[j].0 == entries[j - 1].0 + 1 {
            j += 1;
        }
        out.extend_from_slice(format!("{} {}\n", entries[i].0, j - i).as_bytes());
        for (_, generation, offset) in &entries[i..j] {
            out.extend_from_slice(format!("{offset:010} {generation:05} n\r\n").as_bytes());
        }
        i = j;
    }
}
