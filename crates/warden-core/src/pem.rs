//! Minimal PEM framing for Warden key and certificate material
//!
//! Keys and certificates travel as labelled base64 text blocks so they can
//! be embedded in documents and carried over the wire as plain strings. A
//! block with the wrong label is rejected, which is what catches a public
//! key handed to an operation expecting a private one.

use crate::errors::{Result, SecurityError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Label for Ed25519 private key blocks.
pub const PRIVATE_KEY_LABEL: &str = "WARDEN PRIVATE KEY";
/// Label for Ed25519 public key blocks.
pub const PUBLIC_KEY_LABEL: &str = "WARDEN PUBLIC KEY";
/// Label for certificate blocks.
pub const CERTIFICATE_LABEL: &str = "WARDEN CERTIFICATE";

const LINE_WIDTH: usize = 64;

/// Encode `bytes` as a single PEM block with the given label.
pub fn encode(label: &str, bytes: &[u8]) -> String {
    let body = STANDARD.encode(bytes);
    let mut out = String::with_capacity(body.len() + label.len() * 2 + 40);
    out.push_str("-----BEGIN ");
    out.push_str(label);
    out.push_str("-----\n");
    let mut rest = body.as_str();
    while !rest.is_empty() {
        let split = rest.len().min(LINE_WIDTH);
        out.push_str(&rest[..split]);
        out.push('\n');
        rest = &rest[split..];
    }
    out.push_str("-----END ");
    out.push_str(label);
    out.push_str("-----\n");
    out
}

/// Decode exactly one PEM block with the given label.
///
/// Rejects empty input, missing or mismatched labels, and invalid base64,
/// all as [`SecurityError::InvalidData`]. Text outside the BEGIN/END
/// markers is ignored, so a block may carry surrounding commentary.
pub fn decode(label: &str, text: &str) -> Result<Vec<u8>> {
    let mut blocks = decode_all(label, text)?;
    if blocks.len() != 1 {
        return Err(SecurityError::invalid_data(format!(
            "expected a single {} block, found {}",
            label,
            blocks.len()
        )));
    }
    // Length checked above.
    Ok(blocks.remove(0))
}

/// Decode one or more concatenated PEM blocks with the given label,
/// preserving order. Used for leaf-to-root certificate chains.
pub fn decode_all(label: &str, text: &str) -> Result<Vec<Vec<u8>>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");
    let mut blocks = Vec::new();
    let mut rest = text;

    loop {
        let Some(start) = rest.find(&begin) else {
            break;
        };
        let after_begin = &rest[start + begin.len()..];
        let Some(stop) = after_begin.find(&end) else {
            return Err(SecurityError::invalid_data(format!(
                "unterminated {label} block"
            )));
        };
        let body: String = after_begin[..stop]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD.decode(body.as_bytes()).map_err(|err| {
            SecurityError::invalid_data(format!("invalid base64 in {label} block: {err}"))
        })?;
        blocks.push(bytes);
        rest = &after_begin[stop + end.len()..];
    }

    if blocks.is_empty() {
        return Err(SecurityError::invalid_data(format!(
            "no {label} block found"
        )));
    }
    Ok(blocks)
}
