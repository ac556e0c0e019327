//! Routing key derivation
//!
//! Keys follow the dotted `<prefix>.<lowercased-suffix>` convention, e.g.
//! `stasis.channel.channelcreated` or `stasis.app.myapp`.

use crate::error::{BridgeError, Result};
use std::fmt;

/// Routing key prefix for each event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingPrefix {
    /// Per-application events (`stasis.app`)
    Application,
    /// Bus-wide channel events (`stasis.channel`)
    Channel,
    /// Management-protocol events (`ami`)
    Ami,
}

impl RoutingPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingPrefix::Application => "stasis.app",
            RoutingPrefix::Channel => "stasis.channel",
            RoutingPrefix::Ami => "ami",
        }
    }
}

impl fmt::Display for RoutingPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived AMQP routing key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Build `prefix + "." + lowercase(suffix)`
    ///
    /// Only ASCII letters are lowered; other bytes pass through untouched.
    /// Embedded dots and whitespace in `suffix` are kept verbatim.
    pub fn build(prefix: &str, suffix: &str) -> Result<Self> {
        if suffix.is_empty() {
            return Err(BridgeError::InvalidInput(format!(
                "empty routing key suffix for prefix '{}'",
                prefix
            )));
        }

        let mut key = String::with_capacity(prefix.len() + suffix.len() + 1);
        key.push_str(prefix);
        key.push('.');
        key.push_str(&suffix.to_ascii_lowercase());
        Ok(Self(key))
    }

    /// Build a key for one of the known event sources
    pub fn for_source(prefix: RoutingPrefix, suffix: &str) -> Result<Self> {
        Self::build(prefix.as_str(), suffix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_lowercases_suffix() {
        let key = RoutingKey::build("stasis.channel", "ChannelCreated").unwrap();
        assert_eq!(key.as_str(), "stasis.channel.channelcreated");
    }

    #[test]
    fn test_prefix_is_not_lowered() {
        let key = RoutingKey::build("Custom.Prefix", "ABC").unwrap();
        assert_eq!(key.as_str(), "Custom.Prefix.abc");
    }

    #[test]
    fn test_empty_suffix_rejected() {
        let err = RoutingKey::build("ami", "").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
    }

    #[test]
    fn test_non_ascii_passes_through() {
        let key = RoutingKey::build("stasis.app", "ÉcoleApp").unwrap();
        assert_eq!(key.as_str(), "stasis.app.Écoleapp");
    }

    #[test]
    fn test_dots_and_whitespace_kept() {
        let key = RoutingKey::for_source(RoutingPrefix::Application, "Foo.Bar baz").unwrap();
        assert_eq!(key.as_str(), "stasis.app.foo.bar baz");
    }

    #[test]
    fn test_source_prefixes() {
        assert_eq!(RoutingPrefix::Application.as_str(), "stasis.app");
        assert_eq!(RoutingPrefix::Channel.as_str(), "stasis.channel");
        assert_eq!(RoutingPrefix::Ami.as_str(), "ami");
        let key = RoutingKey::for_source(RoutingPrefix::Ami, "Newstate").unwrap();
        assert_eq!(key.to_string(), "ami.newstate");
    }
}
