//! WS-Security header construction.
//!
//! Two header policies share one capability, [`HeaderBuilder`]. A deployment
//! picks one through [`SecurityPolicyKind`]; the gateway never mixes them.

pub mod signed;
pub mod username_token;

pub use signed::SignedTokenPolicy;
pub use username_token::UsernameTokenPolicy;

use crate::config::{GatewayConfig, SecurityPolicyKind, ServiceConfig};
use crate::error::SecurityError;
use crate::keystore::KeyStore;
use crate::parser::Element;
use std::sync::Arc;

/// Values computed for one security header. Lives for a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    /// Username the header asserts
    pub username: String,
    /// Correlation value (signed policy) or base64 nonce (token policy)
    pub correlation: String,
    /// Timestamp as rendered into the header
    pub timestamp: String,
    /// Base64 digest value
    pub digest: String,
    /// Base64 signature value, when the policy signs
    pub signature: Option<String>,
}

/// Builds the WS-Security element for one outbound call.
pub trait HeaderBuilder: Send + Sync {
    /// Policy name for logs.
    fn name(&self) -> &'static str;

    /// Build a complete `Security` element. No partial header is ever
    /// returned; any failure aborts the call.
    fn build_header(
        &self,
        service: &ServiceConfig,
        username: &str,
        password: &str,
    ) -> Result<Element, SecurityError>;
}

/// Instantiate the header policy configured for this deployment.
pub fn policy_for(config: &GatewayConfig) -> Arc<dyn HeaderBuilder> {
    match config.security.policy {
        SecurityPolicyKind::Signed => Arc::new(SignedTokenPolicy::new(KeyStore::new(
            config.keystore.clone(),
        ))),
        SecurityPolicyKind::UsernameToken => Arc::new(UsernameTokenPolicy::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_selection() {
        let mut config = GatewayConfig::default();
        assert_eq!(policy_for(&config).name(), "signed");

        config.security.policy = SecurityPolicyKind::UsernameToken;
        assert_eq!(policy_for(&config).name(), "username_token");
    }
}
