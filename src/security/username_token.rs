//! UsernameToken profile header with password digest, nonce and Timestamp.

use super::{HeaderBuilder, SecurityContext};
use crate::config::ServiceConfig;
use crate::error::SecurityError;
use crate::parser::{Element, SOAP_11_NS, SOAP_ENV_PREFIX, WSSE_NS, WSU_NS};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};
use uuid::Uuid;

pub const PASSWORD_DIGEST_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
pub const BASE64_ENCODING_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// Validity window of the Timestamp block.
pub const TIMESTAMP_TTL_SECS: i64 = 300;

const NONCE_LEN: usize = 16;

/// Header policy following the OASIS UsernameToken profile.
#[derive(Debug, Default)]
pub struct UsernameTokenPolicy;

impl UsernameTokenPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Build the header for the given instant and nonce.
    pub fn build_header_with(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
        nonce: &[u8],
    ) -> Element {
        let created = format_instant(now);
        let expires = format_instant(now + Duration::seconds(TIMESTAMP_TTL_SECS));
        let context = SecurityContext {
            username: username.to_string(),
            correlation: STANDARD.encode(nonce),
            digest: password_digest(nonce, &created, password),
            timestamp: created,
            signature: None,
        };

        let timestamp = Element::new("wsu:Timestamp")
            .with_attr("wsu:Id", format!("TS-{}", Uuid::new_v4()))
            .with_child(Element::new("wsu:Created").with_text(context.timestamp.clone()))
            .with_child(Element::new("wsu:Expires").with_text(expires));

        let token = Element::new("wsse:UsernameToken")
            .with_attr("wsu:Id", format!("UsernameToken-{}", Uuid::new_v4()))
            .with_child(Element::new("wsse:Username").with_text(context.username.clone()))
            .with_child(
                Element::new("wsse:Password")
                    .with_attr("Type", PASSWORD_DIGEST_TYPE)
                    .with_text(context.digest.clone()),
            )
            .with_child(
                Element::new("wsse:Nonce")
                    .with_attr("EncodingType", BASE64_ENCODING_TYPE)
                    .with_text(context.correlation.clone()),
            )
            .with_child(Element::new("wsu:Created").with_text(context.timestamp.clone()));

        Element::new("wsse:Security")
            .with_attr("xmlns:wsse", WSSE_NS)
            .with_attr("xmlns:wsu", WSU_NS)
            .with_attr(format!("xmlns:{}", SOAP_ENV_PREFIX), SOAP_11_NS)
            .with_attr(format!("{}:mustUnderstand", SOAP_ENV_PREFIX), "1")
            .with_child(timestamp)
            .with_child(token)
    }
}

impl HeaderBuilder for UsernameTokenPolicy {
    fn name(&self) -> &'static str {
        "username_token"
    }

    fn build_header(
        &self,
        _service: &ServiceConfig,
        username: &str,
        password: &str,
    ) -> Result<Element, SecurityError> {
        let nonce = generate_nonce();
        Ok(self.build_header_with(username, password, Utc::now(), &nonce))
    }
}

/// Fresh nonce from the operating system CSPRNG.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// `base64(SHA1(nonce ++ created ++ password))`.
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// ISO-8601 UTC with millisecond precision.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
