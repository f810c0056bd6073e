//! Fixed credential pairs for chat access and analytics access.

use crate::config::GateConfig;

/// Identifier (email) and secret (password).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub identifier: String,
    pub secret: String,
}

impl CredentialPair {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    fn matches(&self, identifier: &str, secret: &str) -> bool {
        !self.identifier.is_empty() && self.identifier == identifier && self.secret == secret
    }
}

/// Checks submitted credentials against the configured pairs.
#[derive(Debug, Clone)]
pub struct CredentialGate {
    chat: CredentialPair,
    analytics: CredentialPair,
}

impl CredentialGate {
    pub fn new(chat: CredentialPair, analytics: CredentialPair) -> Self {
        Self { chat, analytics }
    }

    /// Build from config, with env overrides already applied by [`crate::config::resolve_gate_credentials`].
    pub fn from_config(gate: &GateConfig) -> Self {
        let (chat, analytics) = crate::config::resolve_gate_credentials(gate);
        Self::new(chat, analytics)
    }

    /// True when a chat login pair is set; an unset pair rejects every login.
    pub fn is_configured(&self) -> bool {
        !self.chat.identifier.is_empty() && !self.chat.secret.is_empty()
    }

    pub fn check_credentials(&self, identifier: &str, secret: &str) -> bool {
        self.chat.matches(identifier, secret)
    }

    pub fn check_analytics_credentials(&self, identifier: &str, secret: &str) -> bool {
        self.analytics.matches(identifier, secret)
    }
}
