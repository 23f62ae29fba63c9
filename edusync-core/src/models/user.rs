use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::coerce;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    Owner,
    Admin,
    Teacher,
    Parent,
    Student,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserRole::Owner => "Owner",
            UserRole::Admin => "Admin",
            UserRole::Teacher => "Teacher",
            UserRole::Parent => "Parent",
            UserRole::Student => "Student",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(UserRole::Owner),
            "admin" => Ok(UserRole::Admin),
            "teacher" => Ok(UserRole::Teacher),
            "parent" => Ok(UserRole::Parent),
            "student" => Ok(UserRole::Student),
            _ => Err(format!(
                "Invalid role: '{}'. Valid options: owner, admin, teacher, parent, student",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    #[serde(rename = "Pending Approval")]
    PendingApproval,
    Suspended,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "Active",
            UserStatus::PendingApproval => "Pending Approval",
            UserStatus::Suspended => "Suspended",
            UserStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user profile. The stored credential is intentionally absent: it is never
/// read back from the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
    #[serde(default)]
    pub school_id: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "coerce::timestamp")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "coerce::json_map")]
    pub permissions_overrides: BTreeMap<String, bool>,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        role: UserRole,
        school_id: Option<String>,
    ) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            email: email.into(),
            role,
            status: UserStatus::Active,
            school_id,
            avatar_url: None,
            last_login: None,
            permissions_overrides: BTreeMap::new(),
        }
    }

    pub fn is_owner(&self) -> bool {
        self.role == UserRole::Owner
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> [{}, {}]", self.name, self.email, self.role, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_decode_ignores_password() {
        let user: User = serde_json::from_value(json!({
            "id": "u1",
            "name": "Ayesha",
            "email": "a@example.com",
            "password": "secret",
            "role": "Admin",
            "status": "Pending Approval",
            "schoolId": "s1",
            "permissionsOverrides": "{\"fees.collect\": false}"
        }))
        .unwrap();

        assert_eq!(user.status, UserStatus::PendingApproval);
        assert_eq!(user.permissions_overrides.get("fees.collect"), Some(&false));
        let out = serde_json::to_value(&user).unwrap();
        assert!(out.get("password").is_none());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("OWNER".parse::<UserRole>().unwrap(), UserRole::Owner);
        assert!("janitor".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_status_serializes_with_space() {
        let json = serde_json::to_string(&UserStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"Pending Approval\"");
    }
}
