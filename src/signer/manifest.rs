//! The embedded signature manifest.
//!
//! Completed signatures are recorded as a JSON array in the document Info
//! `/Subject` entry — the simplest channel that survives normal viewers while
//! staying machine-recoverable. The `digest` and `signature` fields of the
//! newest record are written as fixed-width zero placeholders first, the
//! digest is computed over the serialized bytes in that masked state, and the
//! real hex values are then spliced over the placeholders without moving a
//! single byte offset. Verification reverses the splice.

use lopdf::{Dictionary, Document, Object, StringFormat};
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

pub const SIGNATURE_ALGORITHM: &str = "SHA256withRSA";

/// Hex length of a SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// One completed signature, as embedded in the document.
///
/// Field order is the JSON serialization order; the masking helpers depend on
/// `digest` and `signature` serializing as `"key":"hex"` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedSignature {
    pub algorithm: String,
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub tax_id: Option<String>,
    /// RFC 3339, UTC, whole seconds.
    pub signed_at: String,
    /// SHA-256 over the artifact bytes with this record's two hex fields
    /// masked to zeros, hex.
    pub digest: String,
    /// RSA signature over the same masked bytes, hex, exactly the key
    /// modulus width.
    pub signature: String,
}

/// Reads the manifest out of a parsed document. Absent manifest is an empty
/// list; a present but unparseable one is a corrupt document.
pub fn read_manifest(doc: &Document) -> Result<Vec<EmbeddedSignature>, DocumentError> {
    let Some(info) = info_dict(doc) else {
        return Ok(Vec::new());
    };
    let Ok(obj) = info.get(b"Subject") else {
        return Ok(Vec::new());
    };
    let Ok(bytes) = obj.as_str() else {
        return Ok(Vec::new());
    };
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes)
        .map_err(|e| DocumentError::Corrupt(format!("malformed signature manifest: {e}")))
}

/// Writes the manifest into the Info `/Subject` entry, creating the Info
/// dictionary when the document has none.
pub fn write_manifest(
    doc: &mut Document,
    manifest: &[EmbeddedSignature],
) -> Result<(), DocumentError> {
    let json = serde_json::to_string(manifest)
        .map_err(|e| DocumentError::Corrupt(format!("manifest serialization: {e}")))?;
    let value = Object::String(json.into_bytes(), StringFormat::Literal);

    match doc.trailer.get(b"Info").map(Object::clone) {
        Ok(Object::Reference(id)) => {
            let info = doc
                .get_object_mut(id)
                .and_then(Object::as_dict_mut)
                .map_err(|e| DocumentError::Corrupt(format!("bad Info dictionary: {e}")))?;
            info.set("Subject", value);
        }
        Ok(Object::Dictionary(mut info)) => {
            info.set("Subject", value);
            doc.trailer.set("Info", Object::Dictionary(info));
        }
        _ => {
            let mut info = Dictionary::new();
            info.set("Subject", value);
            let id = doc.add_object(Object::Dictionary(info));
            doc.trailer.set("Info", Object::Reference(id));
        }
    }
    Ok(())
}

fn info_dict(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// Replaces the serialized `"key":"old_hex"` pair (last occurrence) with
/// `"key":"new_hex"`. Both hex strings must be the same length so no byte
/// offset moves. Returns false when the pair is not present.
pub fn splice_hex(buf: &mut [u8], key: &str, old_hex: &str, new_hex: &str) -> bool {
    debug_assert_eq!(old_hex.len(), new_hex.len());
    let pattern = format!("\"{key}\":\"{old_hex}\"");
    let replacement = format!("\"{key}\":\"{new_hex}\"");
    match rfind(buf, pattern.as_bytes()) {
        Some(pos) => {
            buf[pos..pos + replacement.len()].copy_from_slice(replacement.as_bytes());
            true
        }
        None => false,
    }
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
