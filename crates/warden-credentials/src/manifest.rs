//! Manifest templates and signed manifests
//!
//! A manifest template is the unsigned rule tree an application exposes as
//! its requestable permission surface. A signed manifest carries the same
//! rule tree plus a binding to one identity certificate: the SHA-256
//! thumbprint of the certificate's subject key, and the certificate
//! authority's signature over (canonical rules ‖ thumbprint). Verification
//! recomputes both and requires exact matches.

use crate::certificate::Certificate;
use crate::rules::{
    bytes_to_string, parse_nodes, read_text_element, unexpected, write_element, write_nodes,
    xml_error, RuleSet,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use sha2::{Digest, Sha256};
use warden_core::{PrivateKey, PublicKey, Result, SecurityError, Thumbprint};

/// Schema version of signed manifests.
const MANIFEST_VERSION: &str = "1";
/// OID naming the thumbprint digest algorithm (SHA-256).
const THUMBPRINT_OID: &str = "2.16.840.1.101.3.4.2.1";
/// OID naming the signature algorithm (Ed25519).
const SIGNATURE_OID: &str = "1.3.101.112";

/// An unsigned manifest template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTemplate {
    /// The requestable permission surface.
    pub rules: RuleSet,
}

impl ManifestTemplate {
    /// Parse and schema-validate a `<manifest>` template document.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        expect_root(&mut reader, "manifest")?;
        let nodes = parse_nodes(&mut reader, "manifest")?;
        expect_eof(&mut reader)?;
        Ok(Self {
            rules: RuleSet { nodes },
        })
    }

    /// Emit as a `<manifest>` template document.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, Event::Start(BytesStart::new("manifest")))?;
        write_nodes(&mut writer, &self.rules.nodes)?;
        write_element(&mut writer, Event::End(BytesEnd::new("manifest")))?;
        bytes_to_string(writer.into_inner())
    }
}

/// A signed manifest bound to one identity certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedManifest {
    /// The granted permission rules.
    pub rules: RuleSet,
    /// SHA-256 thumbprint of the subject certificate's public key.
    pub thumbprint: Thumbprint,
    /// Authority signature over (canonical rules ‖ thumbprint).
    pub signature: Vec<u8>,
}

impl SignedManifest {
    /// Parse and schema-validate a signed `<manifest>` document.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        expect_root(&mut reader, "manifest")?;

        expect_start(&mut reader, "version")?;
        let version = read_text_element(&mut reader, "version")?;
        if version != MANIFEST_VERSION {
            return Err(SecurityError::malformed_document(format!(
                "unsupported manifest version `{version}`"
            )));
        }

        expect_start(&mut reader, "rules")?;
        let nodes = parse_nodes(&mut reader, "rules")?;

        let thumbprint_bytes = parse_oid_value(&mut reader, "thumbprint", THUMBPRINT_OID)?;
        let thumbprint: Thumbprint = thumbprint_bytes.as_slice().try_into().map_err(|_| {
            SecurityError::malformed_document("thumbprint must be a 32-byte SHA-256 digest")
        })?;
        let signature = parse_oid_value(&mut reader, "signature", SIGNATURE_OID)?;

        expect_end(&mut reader, "manifest")?;
        expect_eof(&mut reader)?;

        Ok(Self {
            rules: RuleSet { nodes },
            thumbprint,
            signature,
        })
    }

    /// Emit as a signed `<manifest>` document.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, Event::Start(BytesStart::new("manifest")))?;

        write_text_element(&mut writer, "version", MANIFEST_VERSION)?;

        write_element(&mut writer, Event::Start(BytesStart::new("rules")))?;
        write_nodes(&mut writer, &self.rules.nodes)?;
        write_element(&mut writer, Event::End(BytesEnd::new("rules")))?;

        write_oid_value(&mut writer, "thumbprint", THUMBPRINT_OID, &self.thumbprint)?;
        write_oid_value(&mut writer, "signature", SIGNATURE_OID, &self.signature)?;

        write_element(&mut writer, Event::End(BytesEnd::new("manifest")))?;
        bytes_to_string(writer.into_inner())
    }

    /// Verify this manifest against the identity certificate it should be
    /// bound to and the authority key that signed it.
    ///
    /// A thumbprint that does not match the certificate's subject key is
    /// [`SecurityError::UnknownCertificate`]; a signature that does not
    /// verify under `authority` is [`SecurityError::InvalidData`].
    pub fn verify(&self, subject: &Certificate, authority: &PublicKey) -> Result<()> {
        if self.thumbprint != subject.thumbprint() {
            return Err(SecurityError::unknown_certificate(
                "signed manifest is bound to a different identity certificate",
            ));
        }
        let digest = signing_digest(&self.rules, &self.thumbprint)?;
        authority
            .verify(&digest, &self.signature)
            .map_err(|_| SecurityError::invalid_data("signed manifest signature does not verify"))
    }
}

/// Sign a manifest template for use with a specific identity certificate.
///
/// This is a local, offline operation: it requires no proxy and no
/// authentication. The template is schema-validated
/// ([`SecurityError::MalformedDocument`] on failure); the subject
/// certificate and private key are parsed from PEM
/// ([`SecurityError::InvalidData`] on missing or wrongly-typed material).
pub fn sign_manifest(
    manifest_template_xml: &str,
    subject_certificate_pem: &str,
    signer_private_key_pem: &str,
) -> Result<String> {
    let template = ManifestTemplate::parse(manifest_template_xml)?;
    let subject = Certificate::from_pem(subject_certificate_pem)?;
    let signer = PrivateKey::from_pem(signer_private_key_pem)?;

    let thumbprint = subject.thumbprint();
    let digest = signing_digest(&template.rules, &thumbprint)?;
    let signature = signer.sign(&digest);

    SignedManifest {
        rules: template.rules,
        thumbprint,
        signature,
    }
    .to_xml()
}

/// SHA-256 over (canonical rules XML ‖ thumbprint), the message the
/// authority signs.
fn signing_digest(rules: &RuleSet, thumbprint: &Thumbprint) -> Result<[u8; 32]> {
    let canonical = rules.canonical_xml()?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(thumbprint);
    Ok(hasher.finalize().into())
}

fn expect_root(reader: &mut Reader<&[u8]>, tag: &str) -> Result<()> {
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Decl(_) | Event::Comment(_) => continue,
            Event::Start(start) if start.name().as_ref() == tag.as_bytes() => return Ok(()),
            other => return Err(unexpected(&other, &format!("<{tag}>"))),
        }
    }
}

fn expect_start(reader: &mut Reader<&[u8]>, tag: &str) -> Result<()> {
    match reader.read_event().map_err(xml_error)? {
        Event::Start(start) if start.name().as_ref() == tag.as_bytes() => Ok(()),
        other => Err(unexpected(&other, &format!("<{tag}>"))),
    }
}

fn expect_end(reader: &mut Reader<&[u8]>, tag: &str) -> Result<()> {
    match reader.read_event().map_err(xml_error)? {
        Event::End(end) if end.name().as_ref() == tag.as_bytes() => Ok(()),
        other => Err(unexpected(&other, &format!("</{tag}>"))),
    }
}

fn expect_eof(reader: &mut Reader<&[u8]>) -> Result<()> {
    match reader.read_event().map_err(xml_error)? {
        Event::Eof => Ok(()),
        other => Err(unexpected(&other, "end of document")),
    }
}

/// Parse `<tag><oid>...</oid><value>base64</value></tag>`.
fn parse_oid_value(reader: &mut Reader<&[u8]>, tag: &str, expected_oid: &str) -> Result<Vec<u8>> {
    expect_start(reader, tag)?;
    expect_start(reader, "oid")?;
    let oid = read_text_element(reader, "oid")?;
    if oid != expected_oid {
        return Err(SecurityError::malformed_document(format!(
            "unsupported {tag} algorithm oid `{oid}`"
        )));
    }
    expect_start(reader, "value")?;
    let value = read_text_element(reader, "value")?;
    expect_end(reader, tag)?;
    STANDARD
        .decode(value.as_bytes())
        .map_err(|err| SecurityError::malformed_document(format!("invalid {tag} base64: {err}")))
}

fn write_oid_value<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    oid: &str,
    value: &[u8],
) -> Result<()> {
    write_element(writer, Event::Start(BytesStart::new(tag)))?;
    write_text_element(writer, "oid", oid)?;
    write_text_element(writer, "value", &STANDARD.encode(value))?;
    write_element(writer, Event::End(BytesEnd::new(tag)))
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<()> {
    write_element(writer, Event::Start(BytesStart::new(tag)))?;
    write_element(writer, Event::Text(BytesText::new(text)))?;
    write_element(writer, Event::End(BytesEnd::new(tag)))
}
