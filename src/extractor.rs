//! Payload extraction.
//!
//! The caller's payload is not required to be well-formed, so the fragment
//! is located with plain string search. Only the re-wrapped output is
//! checked as XML.

use crate::error::ExtractionError;
use crate::parser::{check_well_formed, is_ncname, split_qname, xml_escape};

/// A request fragment ready to be placed in a SOAP body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedRequest {
    /// Element name derived from the start tag
    pub tag_name: String,
    /// Trimmed inner content of the caller's fragment
    pub content: String,
    /// `<tag xmlns="ns">content</tag>`
    pub xml: String,
}

/// Extract the fragment bounded by `start_tag`/`end_tag` and re-wrap its
/// content under `request_namespace`.
pub fn extract_payload(
    payload: &str,
    start_tag: &str,
    end_tag: &str,
    request_namespace: &str,
) -> Result<FormattedRequest, ExtractionError> {
    let tag_name = tag_name(start_tag)?;

    let start = payload
        .find(start_tag)
        .ok_or_else(|| ExtractionError::MissingStartTag {
            start_tag: start_tag.to_string(),
        })?;

    let end = match payload[start..].find(end_tag) {
        Some(offset) => start + offset + end_tag.len(),
        None if payload.contains(end_tag) => {
            return Err(ExtractionError::OutOfOrder {
                start_tag: start_tag.to_string(),
                end_tag: end_tag.to_string(),
            })
        }
        None => {
            return Err(ExtractionError::MissingEndTag {
                end_tag: end_tag.to_string(),
            })
        }
    };

    let fragment = &payload[start..end];
    let content = inner_content(fragment)
        .ok_or_else(|| ExtractionError::Malformed(format!("cannot strip tags from {}", fragment)))?
        .trim();

    // a prefixed name binds its own prefix to the request namespace
    let declaration = match split_qname(&tag_name) {
        ("", _) => "xmlns".to_string(),
        (prefix, _) => format!("xmlns:{}", prefix),
    };
    let xml = format!(
        "<{tag} {decl}=\"{ns}\">{content}</{tag}>",
        tag = tag_name,
        decl = declaration,
        ns = xml_escape(request_namespace),
        content = content,
    );
    check_well_formed(&xml).map_err(ExtractionError::Malformed)?;

    Ok(FormattedRequest {
        tag_name,
        content: content.to_string(),
        xml,
    })
}

/// Element name of a start tag: `<Add>` gives `Add`, `<m:Add a="1">` gives `m:Add`.
fn tag_name(start_tag: &str) -> Result<String, ExtractionError> {
    let no_name = || ExtractionError::NoTagName(start_tag.to_string());

    let inner = start_tag
        .trim()
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(no_name)?;

    let name = inner.split_whitespace().next().ok_or_else(no_name)?;
    let valid = match name.split_once(':') {
        Some((prefix, local)) => {
            is_ncname(prefix) && is_ncname(local) && !prefix.eq_ignore_ascii_case("xmlns")
        }
        None => is_ncname(name),
    };
    if !valid {
        return Err(no_name());
    }
    Ok(name.to_string())
}

/// Text strictly between the first `>` and the last `<`.
fn inner_content(fragment: &str) -> Option<&str> {
    let open_end = fragment.find('>')? + 1;
    let close_start = fragment.rfind('<')?;
    fragment.get(open_end..close_start)
}
