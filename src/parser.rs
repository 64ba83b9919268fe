//! XML fragment parsing and serialization.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand
//! entities). Fragments are parsed into a small owned element tree so header
//! sections can be checked for well-formedness and then imported into an
//! outbound envelope. Parsing is namespace-aware: every prefix used on an
//! element or attribute must be bound in scope.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

/// SOAP 1.1 envelope namespace.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// Prefix the gateway binds to the SOAP 1.1 envelope namespace.
pub const SOAP_ENV_PREFIX: &str = "SOAP-ENV";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// An element with its attributes and children, in document order.
///
/// Attribute names are kept as written (`prefix:local`), including
/// `xmlns` declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Content of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder-style text child.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Builder-style element child.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Append an element child.
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Value of the attribute written as `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Part of the name after the prefix.
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Element children only.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First element child with the given local name.
    pub fn find(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == local_name)
    }

    /// Concatenated text of direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Serialize to a string.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    /// Serialize into `out`. Childless elements are written self-closed.
    pub fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&xml_escape(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_xml(out),
                Node::Text(t) => out.push_str(&escape_text(t)),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Split `prefix:local` into its parts; the prefix is empty when absent.
pub fn split_qname(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", name),
    }
}

/// Parse a standalone XML fragment with exactly one root element.
///
/// Comments, processing instructions and the XML declaration are dropped;
/// DOCTYPE declarations and unbound namespace prefixes are rejected.
pub fn parse_fragment(xml: &str) -> Result<Element, String> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = match reader.read_resolved_event() {
            Ok((ResolveResult::Unknown(prefix), _)) => {
                return Err(format!(
                    "unbound namespace prefix '{}'",
                    String::from_utf8_lossy(&prefix)
                ));
            }
            Ok((_, event)) => event,
            Err(e) => return Err(format!("XML parse error: {}", e)),
        };

        match event {
            Event::Start(ref e) => {
                if root.is_some() {
                    return Err("multiple root elements".to_string());
                }
                stack.push(start_element(&reader, e)?);
            }

            Event::Empty(ref e) => {
                if root.is_some() {
                    return Err("multiple root elements".to_string());
                }
                let element = start_element(&reader, e)?;
                match stack.last_mut() {
                    Some(parent) => parent.push(element),
                    None => root = Some(element),
                }
            }

            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "unexpected closing tag".to_string())?;
                match stack.last_mut() {
                    Some(parent) => parent.push(element),
                    None => root = Some(element),
                }
            }

            Event::Text(ref e) => {
                let text = e.unescape().map_err(|e| format!("XML parse error: {}", e))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Text(text.into_owned())),
                    None if text.trim().is_empty() => {}
                    None => return Err("text outside of root element".to_string()),
                }
            }

            Event::CData(ref e) => {
                let text = std::str::from_utf8(e)
                    .map_err(|e| format!("Invalid UTF-8 in CDATA: {}", e))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Text(text.to_string())),
                    None => return Err("CDATA outside of root element".to_string()),
                }
            }

            Event::DocType(_) => {
                return Err("DOCTYPE declarations are not allowed".to_string());
            }

            Event::Eof => break,

            // declarations, comments, processing instructions
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    root.ok_or_else(|| "no root element".to_string())
}

/// Check that `xml` is a well-formed single-rooted fragment.
pub fn check_well_formed(xml: &str) -> Result<(), String> {
    parse_fragment(xml).map(|_| ())
}

fn start_element(reader: &NsReader<&[u8]>, e: &BytesStart) -> Result<Element, String> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| format!("Invalid UTF-8 in element name: {}", e))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("Invalid attribute in <{}>: {}", name, e))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| format!("Invalid UTF-8 in attribute name: {}", e))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| format!("Invalid value for attribute {}: {}", key, e))?
            .into_owned();

        if let Some(prefix) = key.strip_prefix("xmlns:") {
            if !is_ncname(prefix) {
                return Err(format!("invalid namespace prefix '{}' in <{}>", prefix, name));
            }
            if value.is_empty() {
                return Err(format!("prefix '{}' bound to an empty namespace in <{}>", prefix, name));
            }
        } else if let (ResolveResult::Unknown(prefix), _) = reader.resolve_attribute(attr.key) {
            return Err(format!(
                "unbound namespace prefix '{}' on attribute {}",
                String::from_utf8_lossy(&prefix),
                key
            ));
        }

        attributes.push((key, value));
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

/// Whether `name` is an XML NCName (a name without a colon).
pub fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Escape a string for use in attribute values or fault text.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}
