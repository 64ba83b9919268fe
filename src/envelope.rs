//! Outbound SOAP 1.1 envelope.

use crate::config::ServiceConfig;
use crate::extractor::FormattedRequest;
use crate::parser::{xml_escape, Element, SOAP_11_NS, SOAP_ENV_PREFIX};

/// A namespace declaration `xmlns:prefix="uri"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub prefix: String,
    pub uri: String,
}

impl NamespaceDecl {
    fn write(&self, out: &mut String) {
        // the envelope prefix is always bound; config validation rejects rebinding it
        if self.prefix == SOAP_ENV_PREFIX {
            return;
        }
        out.push_str(" xmlns:");
        out.push_str(&self.prefix);
        out.push_str("=\"");
        out.push_str(&xml_escape(&self.uri));
        out.push('"');
    }
}

/// Everything the serializer needs for one request. Built per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEnvelope {
    /// Effective SOAP action, sent as the `SOAPAction` header
    pub soap_action: String,
    /// Extra declaration on `Envelope`
    pub envelope_namespace: Option<NamespaceDecl>,
    /// Extra declaration on `Body`
    pub body_namespace: Option<NamespaceDecl>,
    /// Security header, when the service requires one
    pub header: Option<Element>,
    /// Well-formed body payload
    pub body: String,
}

impl OutboundEnvelope {
    /// Envelope for `service` carrying `request`.
    pub fn for_service(
        service: &ServiceConfig,
        soap_action: impl Into<String>,
        request: &FormattedRequest,
        header: Option<Element>,
    ) -> Self {
        let envelope_namespace = service.envelope_namespace.as_ref().map(|uri| NamespaceDecl {
            prefix: service.effective_envelope_prefix().to_string(),
            uri: uri.clone(),
        });
        let body_namespace = service.body_namespace.as_ref().map(|uri| NamespaceDecl {
            prefix: service.effective_body_prefix().to_string(),
            uri: uri.clone(),
        });

        Self {
            soap_action: soap_action.into(),
            envelope_namespace,
            body_namespace,
            header,
            body: request.xml.clone(),
        }
    }

    /// Serialize the complete envelope document.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 512);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");

        out.push_str(&format!(
            "<{p}:Envelope xmlns:{p}=\"{ns}\"",
            p = SOAP_ENV_PREFIX,
            ns = SOAP_11_NS
        ));
        if let Some(decl) = &self.envelope_namespace {
            decl.write(&mut out);
        }
        out.push('>');

        match &self.header {
            Some(header) => {
                out.push_str(&format!("<{}:Header>", SOAP_ENV_PREFIX));
                header.write_xml(&mut out);
                out.push_str(&format!("</{}:Header>", SOAP_ENV_PREFIX));
            }
            None => out.push_str(&format!("<{}:Header/>", SOAP_ENV_PREFIX)),
        }

        out.push_str(&format!("<{}:Body", SOAP_ENV_PREFIX));
        if let Some(decl) = &self.body_namespace {
            decl.write(&mut out);
        }
        out.push('>');
        out.push_str(&self.body);
        out.push_str(&format!("</{}:Body>", SOAP_ENV_PREFIX));

        out.push_str(&format!("</{}:Envelope>", SOAP_ENV_PREFIX));
        out
    }
}
