//! Signed UserInfo token header.
//!
//! The header asserts `USER=<user>;CORR=<corr>;TIMESTAMP=<yyyyMMddHHmm>` in
//! a UsernameToken and carries an RSA-SHA1 signature over a SignedInfo whose
//! digest is the SHA-1 of that string.

use super::{HeaderBuilder, SecurityContext};
use crate::c14n;
use crate::config::ServiceConfig;
use crate::error::SecurityError;
use crate::keystore::KeyStore;
use crate::parser::{parse_fragment, xml_escape, Element, XMLDSIG_NS};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};
use tracing::debug;

/// Namespace of the `Security` and `UsernameToken` elements.
pub const SECEXT_NS: &str = "http://schemas.xmlsoap.org/ws/2002/4/secext";
const WSS_CLIENT_NS: &str = "htt://schemas.sun.com/2006/03/wss/client";

/// Id the SignedInfo reference points at.
pub const TOKEN_ID: &str = "secinfo";
/// Correlation used when the service does not configure one.
pub const DEFAULT_CORRELATION: &str = "_CORR_";

/// Header policy signing a UserInfo token with a keystore RSA key.
pub struct SignedTokenPolicy {
    keystore: KeyStore,
}

impl SignedTokenPolicy {
    pub fn new(keystore: KeyStore) -> Self {
        Self { keystore }
    }

    /// Build the header for the given instant.
    pub fn build_header_at(
        &self,
        service: &ServiceConfig,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Element, SecurityError> {
        let correlation = service
            .correlation
            .as_deref()
            .unwrap_or(DEFAULT_CORRELATION);
        let info = user_info(username, correlation, now);
        let digest = create_digest(&info);
        let signed_info = signed_info(&digest);
        let canonical = c14n::canonicalize(&signed_info).map_err(SecurityError::Canonicalization)?;

        let key = self.keystore.signing_key()?;
        let signature = create_signature(&key, &canonical)?;

        let context = SecurityContext {
            username: username.to_string(),
            correlation: correlation.to_string(),
            timestamp: info_timestamp(now),
            digest,
            signature: Some(signature),
        };
        debug!(
            alias = %self.keystore.alias(),
            username = %context.username,
            timestamp = %context.timestamp,
            "Signed UserInfo token"
        );

        assemble(&context, &info, &signed_info)
    }
}

impl HeaderBuilder for SignedTokenPolicy {
    fn name(&self) -> &'static str {
        "signed"
    }

    fn build_header(
        &self,
        service: &ServiceConfig,
        username: &str,
        _password: &str,
    ) -> Result<Element, SecurityError> {
        self.build_header_at(service, username, Utc::now())
    }
}

/// Minute-resolution GMT timestamp, `yyyyMMddHHmm`.
pub fn info_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M").to_string()
}

/// The UserInfo string carried by the token.
pub fn user_info(username: &str, correlation: &str, now: DateTime<Utc>) -> String {
    format!(
        "USER={};CORR={};TIMESTAMP={}",
        username,
        correlation,
        info_timestamp(now)
    )
}

/// Base64 SHA-1 of the UserInfo bytes.
pub fn create_digest(user_info: &str) -> String {
    STANDARD.encode(Sha1::digest(user_info.as_bytes()))
}

/// SignedInfo referencing the token by id.
pub fn signed_info(digest: &str) -> String {
    format!(
        concat!(
            r#"<ds:SignedInfo xmlns:ds="{ns}">"#,
            r#"<ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
            r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#rsa-sha1"/>"#,
            r##"<ds:Reference URI="#{id}">"##,
            r#"<ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/>"#,
            r#"<ds:DigestValue>{digest}</ds:DigestValue>"#,
            r#"<ds:Transforms>"#,
            r#"<ds:Transform Algorithm="http://www.w3.org/TR/1999/REC-xpath-19991116">"#,
            r#"<ds:XPath>//*[@id='{id}']/child::*/text()</ds:XPath>"#,
            r#"</ds:Transform>"#,
            r#"</ds:Transforms>"#,
            r#"</ds:Reference>"#,
            r#"</ds:SignedInfo>"#,
        ),
        ns = XMLDSIG_NS,
        id = TOKEN_ID,
        digest = digest,
    )
}

/// Base64 RSA-SHA1 (PKCS#1 v1.5) signature over the canonical bytes.
pub fn create_signature(key: &RsaPrivateKey, canonical: &str) -> Result<String, SecurityError> {
    let signing_key = SigningKey::<Sha1>::new(key.clone());
    let signature = signing_key
        .try_sign(canonical.as_bytes())
        .map_err(|e| SecurityError::Signing(e.to_string()))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// Parse the three header sections and import them, in order, under a
/// `wsse:Security` element.
fn assemble(
    context: &SecurityContext,
    info: &str,
    signed_info: &str,
) -> Result<Element, SecurityError> {
    let marker = format!(
        r#"<sunsp:DisableInclusivePrefixList xmlns:sunsp="{}"></sunsp:DisableInclusivePrefixList>"#,
        WSS_CLIENT_NS
    );

    let signature = format!(
        concat!(
            r#"<ds:Signature xmlns:ds="{ns}">"#,
            "{signed_info}",
            "<ds:SignatureValue>{value}</ds:SignatureValue>",
            "<ds:KeyInfo><ds:KeyName>{key_name}</ds:KeyName></ds:KeyInfo>",
            "</ds:Signature>",
        ),
        ns = XMLDSIG_NS,
        signed_info = signed_info,
        value = context.signature.as_deref().unwrap_or_default(),
        key_name = xml_escape(&context.username),
    );

    let token = format!(
        r#"<t:UsernameToken xmlns:t="{}" id="{}"><t:UserInfo>{}</t:UserInfo></t:UsernameToken>"#,
        SECEXT_NS,
        TOKEN_ID,
        xml_escape(info),
    );

    let mut security = Element::new("wsse:Security").with_attr("xmlns:wsse", SECEXT_NS);
    for section in [&marker, &signature, &token] {
        security.push(parse_fragment(section).map_err(SecurityError::FragmentParse)?);
    }
    Ok(security)
}
