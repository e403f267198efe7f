//! Per-function permission tables for surface proxies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a surface proxy may expose a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Permission {
    Allow,
    Deny,
}

impl Permission {
    pub fn is_allowed(self) -> bool {
        matches!(self, Permission::Allow)
    }
}

/// Anything other than `"allow"` denies.
impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        if s == "allow" {
            Permission::Allow
        } else {
            Permission::Deny
        }
    }
}

impl From<String> for Permission {
    fn from(s: String) -> Self {
        Permission::from(s.as_str())
    }
}

impl From<bool> for Permission {
    fn from(allowed: bool) -> Self {
        if allowed {
            Permission::Allow
        } else {
            Permission::Deny
        }
    }
}

/// Function name → permission.
pub type PermissionTable = BTreeMap<String, Permission>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_from_strings() {
        assert_eq!(Permission::from("allow"), Permission::Allow);
        assert_eq!(Permission::from("deny"), Permission::Deny);
        assert_eq!(Permission::from("ALLOW"), Permission::Deny);
        assert_eq!(Permission::from("yes"), Permission::Deny);
    }

    #[test]
    fn test_table_from_toml() {
        let table: PermissionTable = toml::from_str(
            r#"
            add = "allow"
            sub = "deny"
            mul = "maybe"
        "#,
        )
        .unwrap();
        assert_eq!(table["add"], Permission::Allow);
        assert_eq!(table["sub"], Permission::Deny);
        assert_eq!(table["mul"], Permission::Deny);
    }

    #[test]
    fn test_serialize_lowercase() {
        let json = serde_json::to_string(&Permission::Allow).unwrap();
        assert_eq!(json, "\"allow\"");
    }
}
