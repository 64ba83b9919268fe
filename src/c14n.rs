//! Exclusive XML canonicalization (`http://www.w3.org/2001/10/xml-exc-c14n#`),
//! comments omitted.
//!
//! Covers what signed header fragments need: namespace declarations are
//! emitted only where visibly utilized and not already rendered by an output
//! ancestor, attributes are sorted, empty elements are expanded and
//! character content is escaped with the canonical rules. Processing
//! instructions are not retained by the fragment parser and so never appear
//! in the output.

use crate::parser::{parse_fragment, split_qname, Element, Node};
use std::collections::{BTreeMap, BTreeSet};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

type NsMap<'a> = BTreeMap<&'a str, &'a str>;

/// Canonicalize a serialized fragment.
pub fn canonicalize(xml: &str) -> Result<String, String> {
    let root = parse_fragment(xml)?;
    Ok(canonicalize_element(&root))
}

/// Canonicalize an element subtree as a document apex.
pub fn canonicalize_element(root: &Element) -> String {
    let mut out = String::new();
    write_element(root, &NsMap::new(), &NsMap::new(), &mut out);
    out
}

fn write_element<'a>(
    element: &'a Element,
    in_scope: &NsMap<'a>,
    rendered: &NsMap<'a>,
    out: &mut String,
) {
    let mut scope = in_scope.clone();
    let mut attributes: Vec<(&str, &str, &str, &str)> = Vec::new();
    for (key, value) in &element.attributes {
        if key == "xmlns" {
            scope.insert("", value.as_str());
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.insert(prefix, value.as_str());
        }
    }

    let (element_prefix, _) = split_qname(&element.name);
    let mut utilized: BTreeSet<&str> = BTreeSet::new();
    utilized.insert(element_prefix);

    for (key, value) in &element.attributes {
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let (prefix, local) = split_qname(key);
        let ns = match prefix {
            "" => "",
            "xml" => XML_NS,
            p => {
                utilized.insert(p);
                scope.get(p).copied().unwrap_or("")
            }
        };
        attributes.push((ns, local, key.as_str(), value.as_str()));
    }
    attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut rendered_here = rendered.clone();
    let mut declarations: Vec<(&str, &str)> = Vec::new();
    for prefix in utilized {
        let uri = scope.get(prefix).copied().unwrap_or("");
        let current = rendered.get(prefix).copied().unwrap_or("");
        if uri == current || (uri.is_empty() && !prefix.is_empty()) {
            continue;
        }
        declarations.push((prefix, uri));
        rendered_here.insert(prefix, uri);
    }

    out.push('<');
    out.push_str(&element.name);
    for (prefix, uri) in &declarations {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        out.push_str(&escape_attr(uri));
        out.push('"');
    }
    for (_, _, name, value) in &attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(e) => write_element(e, &scope, &rendered_here, out),
            Node::Text(t) => out.push_str(&escape_text(t)),
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn escape_text(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' => escaped.push_str("&#xD;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_attr(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            '\t' => escaped.push_str("&#x9;"),
            '\n' => escaped.push_str("&#xA;"),
            '\r' => escaped.push_str("&#xD;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
