//! Permission rule trees
//!
//! A rule set is a tree of (object path, interface, member) nodes where
//! each member carries an action annotation set. The same tree appears in
//! three places: manifest templates, the `rules` section of signed
//! manifests, and the `rules` section of policy ACLs. Parsing and emission
//! live here so all three agree byte-for-byte on the schema.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use warden_core::{Result, SecurityError};

/// Attribute name carried by action annotations in existing signed
/// artifacts; preserved verbatim for interoperability.
pub const ACTION_ANNOTATION: &str = "org.alljoyn.Bus.Action";

/// Permission granted by a member rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// May observe the member (read, receive).
    Observe,
    /// May provide the member to peers.
    Provide,
    /// May modify through the member (call, write).
    Modify,
}

impl Action {
    /// The exact annotation value for this action.
    pub fn value(&self) -> &'static str {
        match self {
            Action::Observe => "Observe",
            Action::Provide => "Provide",
            Action::Modify => "Modify",
        }
    }

    fn from_value(value: &str) -> Result<Self> {
        match value {
            "Observe" => Ok(Action::Observe),
            "Provide" => Ok(Action::Provide),
            "Modify" => Ok(Action::Modify),
            other => Err(SecurityError::malformed_document(format!(
                "unknown action annotation value `{other}`"
            ))),
        }
    }
}

/// Kind of interface member a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    /// A callable method.
    Method,
    /// A readable/writable property.
    Property,
    /// An emitted signal.
    Signal,
}

impl MemberKind {
    fn element(&self) -> &'static str {
        match self {
            MemberKind::Method => "method",
            MemberKind::Property => "property",
            MemberKind::Signal => "signal",
        }
    }

    fn from_element(name: &[u8]) -> Option<Self> {
        match name {
            b"method" => Some(MemberKind::Method),
            b"property" => Some(MemberKind::Property),
            b"signal" => Some(MemberKind::Signal),
            _ => None,
        }
    }
}

/// A member rule: one method/property/signal with its granted actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member kind.
    pub kind: MemberKind,
    /// Member name; absent means any member of this kind.
    pub name: Option<String>,
    /// Actions granted, in document order.
    pub actions: Vec<Action>,
}

/// An interface rule grouping member rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRule {
    /// Interface name; absent means any interface.
    pub name: Option<String>,
    /// Member rules, in document order.
    pub members: Vec<Member>,
}

/// A node rule grouping interface rules under an object path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRule {
    /// Object path; absent means any path.
    pub name: Option<String>,
    /// Interface rules, in document order.
    pub interfaces: Vec<InterfaceRule>,
}

/// An ordered set of node rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Node rules, in document order.
    pub nodes: Vec<NodeRule>,
}

impl RuleSet {
    /// The allow-everything rule set used by default policies: every member
    /// kind on every interface of every node, with its full action set.
    pub fn allow_all() -> Self {
        Self {
            nodes: vec![NodeRule {
                name: None,
                interfaces: vec![InterfaceRule {
                    name: None,
                    members: vec![
                        Member {
                            kind: MemberKind::Method,
                            name: None,
                            actions: vec![Action::Provide, Action::Modify],
                        },
                        Member {
                            kind: MemberKind::Property,
                            name: None,
                            actions: vec![Action::Provide, Action::Modify, Action::Observe],
                        },
                        Member {
                            kind: MemberKind::Signal,
                            name: None,
                            actions: vec![Action::Provide, Action::Observe],
                        },
                    ],
                }],
            }],
        }
    }

    /// Canonical `<rules>...</rules>` bytes, the input to manifest
    /// signature computation. Deterministic: no whitespace, attributes only
    /// where set.
    pub fn canonical_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, Event::Start(BytesStart::new("rules")))?;
        write_nodes(&mut writer, &self.nodes)?;
        write_element(&mut writer, Event::End(BytesEnd::new("rules")))?;
        bytes_to_string(writer.into_inner())
    }
}

pub(crate) fn xml_error(err: impl std::fmt::Display) -> SecurityError {
    SecurityError::malformed_document(format!("xml error: {err}"))
}

pub(crate) fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    event: Event<'_>,
) -> Result<()> {
    writer.write_event(event).map_err(xml_error)
}

pub(crate) fn bytes_to_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(xml_error)
}

/// Read a `name="..."` attribute if present; any other attribute is a
/// schema violation.
fn name_attribute(start: &BytesStart<'_>) -> Result<Option<String>> {
    let mut name = None;
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_ref() == b"name" {
            name = Some(attr.unescape_value().map_err(xml_error)?.into_owned());
        } else {
            return Err(SecurityError::malformed_document(format!(
                "unexpected attribute `{}`",
                String::from_utf8_lossy(attr.key.as_ref())
            )));
        }
    }
    Ok(name)
}

fn annotation(start: &BytesStart<'_>) -> Result<Action> {
    let mut name = None;
    let mut value = None;
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        match attr.key.as_ref() {
            b"name" => name = Some(attr.unescape_value().map_err(xml_error)?.into_owned()),
            b"value" => value = Some(attr.unescape_value().map_err(xml_error)?.into_owned()),
            other => {
                return Err(SecurityError::malformed_document(format!(
                    "unexpected annotation attribute `{}`",
                    String::from_utf8_lossy(other)
                )))
            }
        }
    }
    match (name, value) {
        (Some(name), Some(value)) if name == ACTION_ANNOTATION => Action::from_value(&value),
        (Some(name), Some(_)) => Err(SecurityError::malformed_document(format!(
            "unknown annotation name `{name}`"
        ))),
        _ => Err(SecurityError::malformed_document(
            "annotation requires name and value attributes",
        )),
    }
}

/// Parse `<node>` children until the closing tag of `container`.
pub(crate) fn parse_nodes(reader: &mut Reader<&[u8]>, container: &str) -> Result<Vec<NodeRule>> {
    let mut nodes = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) if start.name().as_ref() == b"node" => {
                nodes.push(parse_node(reader, &start)?);
            }
            Event::End(end) if end.name().as_ref() == container.as_bytes() => break,
            Event::Eof => {
                return Err(SecurityError::malformed_document(format!(
                    "unterminated <{container}> element"
                )))
            }
            other => return Err(unexpected(&other, "node")),
        }
    }
    if nodes.is_empty() {
        return Err(SecurityError::malformed_document(format!(
            "<{container}> requires at least one node rule"
        )));
    }
    Ok(nodes)
}

fn parse_node(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<NodeRule> {
    let name = name_attribute(start)?;
    let mut interfaces = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) if start.name().as_ref() == b"interface" => {
                interfaces.push(parse_interface(reader, &start)?);
            }
            Event::End(end) if end.name().as_ref() == b"node" => break,
            Event::Eof => {
                return Err(SecurityError::malformed_document("unterminated <node>"))
            }
            other => return Err(unexpected(&other, "interface")),
        }
    }
    if interfaces.is_empty() {
        return Err(SecurityError::malformed_document(
            "node rule requires at least one interface",
        ));
    }
    Ok(NodeRule { name, interfaces })
}

fn parse_interface(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<InterfaceRule> {
    let name = name_attribute(start)?;
    let mut members = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => match MemberKind::from_element(start.name().as_ref()) {
                Some(kind) => members.push(parse_member(reader, &start, kind)?),
                None => return Err(unexpected(&Event::Start(start), "member")),
            },
            Event::End(end) if end.name().as_ref() == b"interface" => break,
            Event::Eof => {
                return Err(SecurityError::malformed_document("unterminated <interface>"))
            }
            other => return Err(unexpected(&other, "member")),
        }
    }
    if members.is_empty() {
        return Err(SecurityError::malformed_document(
            "interface rule requires at least one member",
        ));
    }
    Ok(InterfaceRule { name, members })
}

fn parse_member(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    kind: MemberKind,
) -> Result<Member> {
    let name = name_attribute(start)?;
    let mut actions = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Empty(start) if start.name().as_ref() == b"annotation" => {
                actions.push(annotation(&start)?);
            }
            Event::Start(start) if start.name().as_ref() == b"annotation" => {
                actions.push(annotation(&start)?);
                // Accept the open/close spelling of an empty annotation.
                match reader.read_event().map_err(xml_error)? {
                    Event::End(end) if end.name().as_ref() == b"annotation" => {}
                    other => return Err(unexpected(&other, "</annotation>")),
                }
            }
            Event::End(end) if end.name().as_ref() == kind.element().as_bytes() => break,
            Event::Eof => {
                return Err(SecurityError::malformed_document(format!(
                    "unterminated <{}>",
                    kind.element()
                )))
            }
            other => return Err(unexpected(&other, "annotation")),
        }
    }
    if actions.is_empty() {
        return Err(SecurityError::malformed_document(format!(
            "{} rule requires at least one action annotation",
            kind.element()
        )));
    }
    Ok(Member {
        kind,
        name,
        actions,
    })
}

pub(crate) fn unexpected(event: &Event<'_>, expected: &str) -> SecurityError {
    let found = match event {
        Event::Start(start) | Event::Empty(start) => {
            format!("<{}>", String::from_utf8_lossy(start.name().as_ref()))
        }
        Event::End(end) => format!("</{}>", String::from_utf8_lossy(end.name().as_ref())),
        Event::Text(_) => "text content".to_string(),
        Event::Eof => "end of document".to_string(),
        _ => "unsupported markup".to_string(),
    };
    SecurityError::malformed_document(format!("expected {expected}, found {found}"))
}

/// Emit node rules into an open container element.
pub(crate) fn write_nodes<W: std::io::Write>(
    writer: &mut Writer<W>,
    nodes: &[NodeRule],
) -> Result<()> {
    for node in nodes {
        let mut start = BytesStart::new("node");
        if let Some(name) = &node.name {
            start.push_attribute(("name", name.as_str()));
        }
        write_element(writer, Event::Start(start))?;
        for interface in &node.interfaces {
            let mut start = BytesStart::new("interface");
            if let Some(name) = &interface.name {
                start.push_attribute(("name", name.as_str()));
            }
            write_element(writer, Event::Start(start))?;
            for member in &interface.members {
                let mut start = BytesStart::new(member.kind.element());
                if let Some(name) = &member.name {
                    start.push_attribute(("name", name.as_str()));
                }
                write_element(writer, Event::Start(start))?;
                for action in &member.actions {
                    let mut annotation = BytesStart::new("annotation");
                    annotation.push_attribute(("name", ACTION_ANNOTATION));
                    annotation.push_attribute(("value", action.value()));
                    write_element(writer, Event::Empty(annotation))?;
                }
                write_element(writer, Event::End(BytesEnd::new(member.kind.element())))?;
            }
            write_element(writer, Event::End(BytesEnd::new("interface")))?;
        }
        write_element(writer, Event::End(BytesEnd::new("node")))?;
    }
    Ok(())
}

/// Read the text content of a simple `<tag>text</tag>` element whose start
/// tag has already been consumed.
pub(crate) fn read_text_element(reader: &mut Reader<&[u8]>, tag: &str) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Text(content) => {
                text.push_str(&content.unescape().map_err(xml_error)?);
            }
            Event::End(end) if end.name().as_ref() == tag.as_bytes() => break,
            Event::Eof => {
                return Err(SecurityError::malformed_document(format!(
                    "unterminated <{tag}>"
                )))
            }
            other => return Err(unexpected(&other, "text content")),
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_canonical_xml_is_stable() {
        let first = RuleSet::allow_all().canonical_xml().unwrap();
        let second = RuleSet::allow_all().canonical_xml().unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("<rules>"));
        assert!(first.ends_with("</rules>"));
        assert!(first.contains(r#"<annotation name="org.alljoyn.Bus.Action" value="Modify"/>"#));
    }

    #[test]
    fn canonical_xml_includes_names_only_when_set() {
        let rules = RuleSet {
            nodes: vec![NodeRule {
                name: Some("/Node0".into()),
                interfaces: vec![InterfaceRule {
                    name: Some("org.test.Interface".into()),
                    members: vec![Member {
                        kind: MemberKind::Method,
                        name: Some("MethodName".into()),
                        actions: vec![Action::Modify],
                    }],
                }],
            }],
        };
        let xml = rules.canonical_xml().unwrap();
        assert!(xml.contains(r#"<node name="/Node0">"#));
        assert!(xml.contains(r#"<interface name="org.test.Interface">"#));
        assert!(xml.contains(r#"<method name="MethodName">"#));
    }
}
