//! Error types for the SOAP gateway.

use crate::parser::{xml_escape, SOAP_11_NS};
use std::path::PathBuf;
use thiserror::Error;

/// Terminal result of one gateway call.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unknown service: {0}")]
    ConfigNotFound(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Failed to create security header: {0}")]
    Security(#[from] SecurityError),

    #[error("Error dispatching SOAP request: {0}")]
    Dispatch(#[from] DispatchError),
}

impl GatewayError {
    /// Stable code for this failure class.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConfigNotFound(_) => ErrorCode::ServiceNotFound,
            Self::Extraction(_) => ErrorCode::ExtractionFailed,
            Self::Security(_) => ErrorCode::SecurityHeaderFailed,
            Self::Dispatch(_) => ErrorCode::DispatchFailed,
        }
    }

    /// Whether the caller sent something this gateway cannot process.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::ConfigNotFound(_) | Self::Extraction(_))
    }
}

/// Failure to pull the request fragment out of a caller payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Could not find start tag {start_tag} in payload")]
    MissingStartTag { start_tag: String },

    #[error("Could not find end tag {end_tag} in payload")]
    MissingEndTag { end_tag: String },

    #[error("End tag {end_tag} appears before start tag {start_tag}")]
    OutOfOrder { start_tag: String, end_tag: String },

    #[error("Cannot derive an element name from start tag {0}")]
    NoTagName(String),

    #[error("Formatted request is not well-formed XML: {0}")]
    Malformed(String),
}

/// Failure while building a WS-Security header.
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Keystore file not found at: {0}")]
    KeystoreNotFound(PathBuf),

    #[error("Failed to read keystore {path}: {source}")]
    KeystoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The specified key alias '{0}' does not contain a private key")]
    NotPrivateKey(String),

    #[error("Invalid key material for alias '{alias}': {reason}")]
    InvalidKey { alias: String, reason: String },

    #[error("Canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("Header fragment is not well-formed: {0}")]
    FragmentParse(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Failure while sending the envelope to the backend.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to build transport: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Invalid request header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("HTTP I/O failure: {0}")]
    Io(#[source] reqwest::Error),

    #[error("Backend responded with status {status}")]
    Status { status: u16, body: String },

    #[error("Backend response body is not valid UTF-8: {0}")]
    InvalidBody(#[source] std::string::FromUtf8Error),
}

/// Configuration load/validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse services JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration for service '{service}': {reason}")]
    InvalidService { service: String, reason: String },
}

/// Codes surfaced to callers for each failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No service registered under the requested name
    ServiceNotFound,
    /// Payload did not contain the configured fragment
    ExtractionFailed,
    /// Security header could not be built
    SecurityHeaderFailed,
    /// Backend could not be reached or rejected the call
    DispatchFailed,
}

impl ErrorCode {
    /// Get the string code for this error.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceNotFound => "SERVICE_NOT_FOUND",
            Self::ExtractionFailed => "EXTRACTION_FAILED",
            Self::SecurityHeaderFailed => "SECURITY_HEADER_FAILED",
            Self::DispatchFailed => "DISPATCH_FAILED",
        }
    }
}

/// Render a SOAP 1.1 Fault describing a gateway error.
pub fn soap_fault_response(error: &GatewayError) -> String {
    let fault_code = if error.is_caller_error() {
        "soap:Client"
    } else {
        "soap:Server"
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">
  <soap:Body>
    <soap:Fault>
      <faultcode>{}</faultcode>
      <faultstring>{}</faultstring>
      <detail>
        <zentinel:error xmlns:zentinel="urn:zentinel:soap:gateway" code="{}"/>
      </detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        SOAP_11_NS,
        fault_code,
        xml_escape(&error.to_string()),
        error.code().as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ServiceNotFound.as_str(), "SERVICE_NOT_FOUND");
        assert_eq!(ErrorCode::DispatchFailed.as_str(), "DISPATCH_FAILED");
    }

    #[test]
    fn test_error_codes_by_class() {
        let err = GatewayError::ConfigNotFound("nope".to_string());
        assert_eq!(err.code(), ErrorCode::ServiceNotFound);
        assert!(err.is_caller_error());

        let err = GatewayError::from(SecurityError::NotPrivateKey("signer".to_string()));
        assert_eq!(err.code(), ErrorCode::SecurityHeaderFailed);
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_client_fault() {
        let err = GatewayError::from(ExtractionError::MissingEndTag {
            end_tag: "</Add>".to_string(),
        });
        let fault = soap_fault_response(&err);
        assert!(fault.contains(SOAP_11_NS));
        assert!(fault.contains("soap:Client"));
        assert!(fault.contains("EXTRACTION_FAILED"));
        // tag text must be escaped inside the fault string
        assert!(fault.contains("&lt;/Add&gt;"));
    }

    #[test]
    fn test_server_fault() {
        let err = GatewayError::from(DispatchError::Status {
            status: 503,
            body: String::new(),
        });
        let fault = soap_fault_response(&err);
        assert!(fault.contains("soap:Server"));
        assert!(fault.contains("DISPATCH_FAILED"));
    }
}
