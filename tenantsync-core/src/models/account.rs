//! Account and identity types.
//!
//! - [`AccountInfo`] - One discovered tenant
//! - [`Identity`] - The authenticated user

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Account Info
// ============================================================================

/// A discovered account (tenant) the user can reach.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account identifier as used in API paths.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl AccountInfo {
    /// Creates a new account record.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AccountInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// The authenticated user's profile, shared by every account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Person identifier.
    pub id: u64,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Email address.
    pub email_address: String,
}

impl Identity {
    /// Returns a display string for this identity.
    pub fn display_string(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        match (name.is_empty(), self.email_address.is_empty()) {
            (false, false) => format!("{name} <{}>", self.email_address),
            (false, true) => name.to_string(),
            (true, _) => self.email_address.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let mut id = Identity {
            id: 1,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email_address: "ada@example.com".into(),
        };
        assert_eq!(id.display_string(), "Ada Lovelace <ada@example.com>");

        id.email_address.clear();
        assert_eq!(id.display_string(), "Ada Lovelace");

        id.first_name.clear();
        id.last_name.clear();
        id.email_address = "x@example.com".into();
        assert_eq!(id.display_string(), "x@example.com");
    }
}
