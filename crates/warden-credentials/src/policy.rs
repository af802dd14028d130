//! Authorization policies
//!
//! A policy is the versioned authorization document an application enforces
//! at runtime: a schema version, a serial number that must strictly
//! increase across updates, and an ordered list of ACLs pairing a
//! peer-matching predicate with a permission rule set. When no policy is
//! installed the application derives a default policy from its trust
//! anchors alone.

use crate::rules::{
    bytes_to_string, parse_nodes, read_text_element, unexpected, write_element, write_nodes,
    xml_error, RuleSet,
};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use warden_core::{GroupId, PublicKey, Result, SecurityError, TrustAnchor};

/// Supported policy schema version.
const POLICY_VERSION: u32 = 1;

const PEER_TYPE_ALL: &str = "ALL";
const PEER_TYPE_WITH_MEMBERSHIP: &str = "WITH_MEMBERSHIP";

/// Predicate selecting which authenticated peers an ACL applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// Matches every authenticated peer.
    All,
    /// Matches peers holding membership in `group` signed by `authority`.
    WithMembership {
        /// The security group whose members match.
        group: GroupId,
        /// Public key of the group's certificate authority.
        authority: PublicKey,
    },
}

/// One access-control entry: peers it applies to, rules it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    /// Peer predicates, in document order.
    pub peers: Vec<Peer>,
    /// Permission rules granted to matching peers.
    pub rules: RuleSet,
}

/// A versioned authorization policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Schema version; only version 1 is supported.
    pub version: u32,
    /// Strictly-increasing freshness counter. The sole replay guard for
    /// stale policies.
    pub serial_number: u32,
    /// Access-control entries, in document order.
    pub acls: Vec<Acl>,
}

impl Policy {
    /// The default policy derived solely from trust anchors: one allow-all
    /// ACL per anchor, matched by membership in the anchor group. Serial
    /// number zero, so any explicit update supersedes it.
    pub fn default_for(anchors: &[TrustAnchor]) -> Self {
        Self {
            version: POLICY_VERSION,
            serial_number: 0,
            acls: anchors
                .iter()
                .map(|anchor| Acl {
                    peers: vec![Peer::WithMembership {
                        group: anchor.group,
                        authority: anchor.authority,
                    }],
                    rules: RuleSet::allow_all(),
                })
                .collect(),
        }
    }

    /// Parse and schema-validate a `<policy>` document.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        expect_root(&mut reader, "policy")?;

        expect_start(&mut reader, "policyVersion")?;
        let version_text = read_text_element(&mut reader, "policyVersion")?;
        let version: u32 = version_text.parse().map_err(|_| {
            SecurityError::malformed_document(format!("invalid policyVersion `{version_text}`"))
        })?;
        if version != POLICY_VERSION {
            return Err(SecurityError::malformed_document(format!(
                "unsupported policyVersion {version}"
            )));
        }

        expect_start(&mut reader, "serialNumber")?;
        let serial_text = read_text_element(&mut reader, "serialNumber")?;
        let serial_number: u32 = serial_text.parse().map_err(|_| {
            SecurityError::malformed_document(format!("invalid serialNumber `{serial_text}`"))
        })?;

        expect_start(&mut reader, "acls")?;
        let mut acls = Vec::new();
        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(start) if start.name().as_ref() == b"acl" => {
                    acls.push(parse_acl(&mut reader)?);
                }
                Event::End(end) if end.name().as_ref() == b"acls" => break,
                Event::Eof => {
                    return Err(SecurityError::malformed_document("unterminated <acls>"))
                }
                other => return Err(unexpected(&other, "acl")),
            }
        }
        if acls.is_empty() {
            return Err(SecurityError::malformed_document(
                "policy requires at least one acl",
            ));
        }

        expect_end(&mut reader, "policy")?;
        match reader.read_event().map_err(xml_error)? {
            Event::Eof => {}
            other => return Err(unexpected(&other, "end of document")),
        }

        Ok(Self {
            version,
            serial_number,
            acls,
        })
    }

    /// Emit as a `<policy>` document.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, Event::Start(BytesStart::new("policy")))?;

        write_text(&mut writer, "policyVersion", &self.version.to_string())?;
        write_text(&mut writer, "serialNumber", &self.serial_number.to_string())?;

        write_element(&mut writer, Event::Start(BytesStart::new("acls")))?;
        for acl in &self.acls {
            write_element(&mut writer, Event::Start(BytesStart::new("acl")))?;

            write_element(&mut writer, Event::Start(BytesStart::new("peers")))?;
            for peer in &acl.peers {
                write_element(&mut writer, Event::Start(BytesStart::new("peer")))?;
                match peer {
                    Peer::All => write_text(&mut writer, "type", PEER_TYPE_ALL)?,
                    Peer::WithMembership { group, authority } => {
                        write_text(&mut writer, "type", PEER_TYPE_WITH_MEMBERSHIP)?;
                        write_text(&mut writer, "publicKey", &authority.to_pem())?;
                        write_text(&mut writer, "sgID", &group.to_string())?;
                    }
                }
                write_element(&mut writer, Event::End(BytesEnd::new("peer")))?;
            }
            write_element(&mut writer, Event::End(BytesEnd::new("peers")))?;

            write_element(&mut writer, Event::Start(BytesStart::new("rules")))?;
            write_nodes(&mut writer, &acl.rules.nodes)?;
            write_element(&mut writer, Event::End(BytesEnd::new("rules")))?;

            write_element(&mut writer, Event::End(BytesEnd::new("acl")))?;
        }
        write_element(&mut writer, Event::End(BytesEnd::new("acls")))?;

        write_element(&mut writer, Event::End(BytesEnd::new("policy")))?;
        bytes_to_string(writer.into_inner())
    }
}

fn parse_acl(reader: &mut Reader<&[u8]>) -> Result<Acl> {
    expect_start(reader, "peers")?;
    let mut peers = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) if start.name().as_ref() == b"peer" => {
                peers.push(parse_peer(reader)?);
            }
            Event::End(end) if end.name().as_ref() == b"peers" => break,
            Event::Eof => return Err(SecurityError::malformed_document("unterminated <peers>")),
            other => return Err(unexpected(&other, "peer")),
        }
    }
    if peers.is_empty() {
        return Err(SecurityError::malformed_document(
            "acl requires at least one peer",
        ));
    }

    expect_start(reader, "rules")?;
    let nodes = parse_nodes(reader, "rules")?;
    expect_end(reader, "acl")?;

    Ok(Acl {
        peers,
        rules: RuleSet { nodes },
    })
}

fn parse_peer(reader: &mut Reader<&[u8]>) -> Result<Peer> {
    expect_start(reader, "type")?;
    let peer_type = read_text_element(reader, "type")?;
    match peer_type.as_str() {
        PEER_TYPE_ALL => {
            expect_end(reader, "peer")?;
            Ok(Peer::All)
        }
        PEER_TYPE_WITH_MEMBERSHIP => {
            expect_start(reader, "publicKey")?;
            let key_text = read_text_element(reader, "publicKey")?;
            let authority = PublicKey::from_pem(&key_text).map_err(|err| {
                SecurityError::malformed_document(format!("invalid peer publicKey: {err}"))
            })?;
            expect_start(reader, "sgID")?;
            let sg_text = read_text_element(reader, "sgID")?;
            let group = GroupId::from_hex(&sg_text).map_err(|err| {
                SecurityError::malformed_document(format!("invalid peer sgID: {err}"))
            })?;
            expect_end(reader, "peer")?;
            Ok(Peer::WithMembership { group, authority })
        }
        other => Err(SecurityError::malformed_document(format!(
            "unknown peer type `{other}`"
        ))),
    }
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

fn write_text<W: std::io::Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<()> {
    write_element(writer, Event::Start(BytesStart::new(tag)))?;
    write_element(writer, Event::Text(BytesText::new(text)))?;
    write_element(writer, Event::End(BytesEnd::new(tag)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use warden_core::KeyPair;

    const ALLOW_ALL_RULES: &str = "<rules>\
        <node>\
        <interface>\
        <method>\
        <annotation name=\"org.alljoyn.Bus.Action\" value=\"Provide\"/>\
        <annotation name=\"org.alljoyn.Bus.Action\" value=\"Modify\"/>\
        </method>\
        </interface>\
        </node>\
        </rules>";

    fn policy_xml(serial: u32) -> String {
        format!(
            "<policy>\
             <policyVersion>1</policyVersion>\
             <serialNumber>{serial}</serialNumber>\
             <acls>\
             <acl>\
             <peers><peer><type>ALL</type></peer></peers>\
             {ALLOW_ALL_RULES}\
             </acl>\
             </acls>\
             </policy>"
        )
    }

    #[test]
    fn parses_match_all_policy() {
        let policy = Policy::parse(&policy_xml(200)).unwrap();
        assert_eq!(policy.version, 1);
        assert_eq!(policy.serial_number, 200);
        assert_eq!(policy.acls.len(), 1);
        assert_eq!(policy.acls[0].peers, vec![Peer::All]);
    }

    #[test]
    fn round_trips_membership_peer() {
        let authority = KeyPair::generate(&mut rand::rngs::OsRng).public_key();
        let group = GroupId::new(&[9u8; 16]).unwrap();
        let policy = Policy {
            version: 1,
            serial_number: 42,
            acls: vec![Acl {
                peers: vec![Peer::WithMembership { group, authority }],
                rules: RuleSet::allow_all(),
            }],
        };
        let xml = policy.to_xml().unwrap();
        assert_eq!(Policy::parse(&xml).unwrap(), policy);
    }

    #[test]
    fn unsupported_version_is_malformed() {
        let xml = policy_xml(200).replace(
            "<policyVersion>1</policyVersion>",
            "<policyVersion>2</policyVersion>",
        );
        assert_matches!(
            Policy::parse(&xml),
            Err(SecurityError::MalformedDocument { .. })
        );
    }

    #[test]
    fn missing_acls_is_malformed() {
        let xml = "<policy>\
                   <policyVersion>1</policyVersion>\
                   <serialNumber>1</serialNumber>\
                   <acls></acls>\
                   </policy>";
        assert_matches!(
            Policy::parse(xml),
            Err(SecurityError::MalformedDocument { .. })
        );
    }

    #[test]
    fn unknown_peer_type_is_malformed() {
        let xml = policy_xml(1).replace("<type>ALL</type>", "<type>ANY</type>");
        assert_matches!(
            Policy::parse(&xml),
            Err(SecurityError::MalformedDocument { .. })
        );
    }

    #[test]
    fn default_policy_has_one_acl_per_anchor() {
        let authority = KeyPair::generate(&mut rand::rngs::OsRng).public_key();
        let anchor = TrustAnchor {
            group: GroupId::new(&[0u8; 16]).unwrap(),
            authority,
        };
        let policy = Policy::default_for(&[anchor]);
        assert_eq!(policy.serial_number, 0);
        assert_eq!(policy.acls.len(), 1);
        assert_matches!(policy.acls[0].peers[0], Peer::WithMembership { .. });
        // Round-trips through the document form.
        let xml = policy.to_xml().unwrap();
        assert_eq!(Policy::parse(&xml).unwrap(), policy);
    }
}
