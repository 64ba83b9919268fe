//! RSA signing key loading.
//!
//! A keystore location is either a single PEM file holding the entry for the
//! configured alias, or a directory holding one `<alias>.pem` per alias.
//! Locations prefixed with `file:` are taken as filesystem paths; anything
//! else is resolved against the configured resource root.

use crate::config::KeystoreConfig;
use crate::error::SecurityError;
use parking_lot::RwLock;
use pkcs8::DecodePrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Keystore with a lazily loaded, cached signing key.
pub struct KeyStore {
    config: KeystoreConfig,
    cached: RwLock<Option<Arc<RsaPrivateKey>>>,
}

impl KeyStore {
    pub fn new(config: KeystoreConfig) -> Self {
        Self {
            config,
            cached: RwLock::new(None),
        }
    }

    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    /// Return the signing key, loading it on first use.
    ///
    /// Failed loads are not cached, so a keystore that appears later is
    /// picked up by the next call.
    pub fn signing_key(&self) -> Result<Arc<RsaPrivateKey>, SecurityError> {
        if let Some(key) = self.cached.read().as_ref() {
            return Ok(Arc::clone(key));
        }

        let mut cached = self.cached.write();
        if let Some(key) = cached.as_ref() {
            return Ok(Arc::clone(key));
        }
        let key = Arc::new(load_private_key(&self.config)?);
        info!(alias = %self.config.alias, "Signing key loaded from keystore");
        *cached = Some(Arc::clone(&key));
        Ok(key)
    }
}

/// Resolve the configured location to a filesystem path.
pub fn resolve_location(config: &KeystoreConfig) -> PathBuf {
    match config.path.strip_prefix("file:") {
        Some(path) => PathBuf::from(path),
        None => config
            .resource_root
            .join(config.path.trim_start_matches('/')),
    }
}

/// Load the private key stored under the configured alias.
pub fn load_private_key(config: &KeystoreConfig) -> Result<RsaPrivateKey, SecurityError> {
    let mut path = resolve_location(config);
    if path.is_dir() {
        path = path.join(format!("{}.pem", config.alias));
    }
    if !path.is_file() {
        return Err(SecurityError::KeystoreNotFound(path));
    }

    debug!(path = %path.display(), alias = %config.alias, "Reading keystore");
    let pem = std::fs::read_to_string(&path).map_err(|source| SecurityError::KeystoreRead {
        path: path.clone(),
        source,
    })?;

    decode_private_key(&pem, &config.password, &config.alias)
}

/// Decode an RSA private key from PEM text.
pub fn decode_private_key(
    pem: &str,
    password: &str,
    alias: &str,
) -> Result<RsaPrivateKey, SecurityError> {
    let invalid = |reason: String| SecurityError::InvalidKey {
        alias: alias.to_string(),
        reason,
    };

    match pem_label(pem) {
        Some("ENCRYPTED PRIVATE KEY") => {
            RsaPrivateKey::from_pkcs8_encrypted_pem(pem, password.as_bytes())
                .map_err(|e| invalid(e.to_string()))
        }
        Some("PRIVATE KEY") => {
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| invalid(e.to_string()))
        }
        Some("RSA PRIVATE KEY") => {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| invalid(e.to_string()))
        }
        _ => Err(SecurityError::NotPrivateKey(alias.to_string())),
    }
}

/// Label of the first PEM block, e.g. `PRIVATE KEY`.
fn pem_label(pem: &str) -> Option<&str> {
    let rest = &pem[pem.find("-----BEGIN ")? + "-----BEGIN ".len()..];
    rest.find("-----").map(|end| &rest[..end])
}
