//! Mixnet accounts.

use std::fmt;

use serde::Deserialize;

/// An account on a mixnet provider, written `user@provider`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Account {
    #[serde(rename = "User")]
    user: String,

    #[serde(rename = "Provider")]
    provider: String,
}

impl Account {
    pub fn new(user: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            provider: provider.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The canonical `user@provider` address of this account.
    pub fn address(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address() {
        let account = Account::new("anonymous", "provider2");
        assert_eq!(account.address(), "anonymous@provider2");
        assert_eq!(account.user(), "anonymous");
        assert_eq!(account.provider(), "provider2");
    }
}
