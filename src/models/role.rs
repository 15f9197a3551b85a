use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Account role, normalized once at the authentication boundary.
///
/// Older clients and stored tokens spell the owner role several ways
/// (`owner`, `LIBRARY_OWNER`, `library_owner`); all of them parse to
/// [`Role::Owner`]. Serialization always uses the lowercase form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Role {
    Admin,
    Owner,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Student => "student",
        }
    }

    /// Owners and admins manage library resources.
    pub fn is_manager(&self) -> bool {
        matches!(self, Role::Admin | Role::Owner)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "admin" => Ok(Role::Admin),
            "owner" | "library_owner" | "libraryowner" => Ok(Role::Owner),
            "student" => Ok(Role::Student),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("admin", Role::Admin)]
    #[case("ADMIN", Role::Admin)]
    #[case("owner", Role::Owner)]
    #[case("LIBRARY_OWNER", Role::Owner)]
    #[case(" library_owner ", Role::Owner)]
    #[case("student", Role::Student)]
    #[case("STUDENT", Role::Student)]
    fn test_role_spellings_normalize(#[case] raw: &str, #[case] expected: Role) {
        assert_eq!(raw.parse::<Role>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!("librarian".parse::<Role>().is_err());
        assert!(serde_json::from_str::<Role>("\"superuser\"").is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Owner).unwrap(), "\"owner\"");
        let parsed: Role = serde_json::from_str("\"LIBRARY_OWNER\"").unwrap();
        assert_eq!(parsed, Role::Owner);
    }

    #[test]
    fn test_manager_roles() {
        assert!(Role::Admin.is_manager());
        assert!(Role::Owner.is_manager());
        assert!(!Role::Student.is_manager());
    }
}
