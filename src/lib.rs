//! SOAP gateway for Zentinel
//!
//! Accepts simplified XML fragments over HTTP, wraps them in a SOAP 1.1
//! envelope for a named backend service, optionally adds a WS-Security
//! header, and returns the backend's raw response body.
//!
//! # Features
//!
//! - Delimiter-based payload extraction with namespace re-wrapping
//! - WS-Security headers: RSA-SHA1 signed token or UsernameToken digest profile
//! - Direct or HTTP proxy transport per service, with header normalization
//! - Per-call dispatch plans; no shared mutable client state
//! - SOAP Fault responses for every failure class
//!
//! # Example
//!
//! ```ignore
//! use std::collections::HashMap;
//! use zentinel_soap_gateway::{GatewayConfig, SoapGateway};
//!
//! let gateway = SoapGateway::new(GatewayConfig::load("config.yaml".as_ref())?);
//! let response = gateway
//!     .handle("addService", "<wrap><Add>5</Add></wrap>", None, &HashMap::new())
//!     .await?;
//! ```

pub mod c14n;
pub mod config;
pub mod envelope;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod keystore;
pub mod parser;
pub mod security;
pub mod server;
pub mod transport;

pub use config::{GatewayConfig, SecurityPolicyKind, ServiceConfig};
pub use error::{ErrorCode, GatewayError};
pub use gateway::{GatewayMetrics, SoapGateway};
pub use security::HeaderBuilder;
