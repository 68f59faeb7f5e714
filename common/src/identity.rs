use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The signed-in user as remembered between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

/// A storefront customer account, as listed in the back office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "UserID")]
    pub id: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "PhoneNumber", default)]
    pub phone: Option<String>,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

/// A staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(rename = "EmployeeID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Role")]
    pub role: String,
    #[serde(rename = "Permissions", default)]
    pub permissions: Vec<String>,
}

/// Editable copy of an employee record, or the body for a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeDraft {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Role")]
    pub role: String,
    #[serde(rename = "Permissions")]
    pub permissions: Vec<String>,
    /// Only sent when creating an account or resetting its password.
    #[serde(rename = "Password", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl From<&Employee> for EmployeeDraft {
    fn from(e: &Employee) -> Self {
        Self {
            name: e.name.clone(),
            email: e.email.clone(),
            role: e.role.clone(),
            permissions: e.permissions.clone(),
            password: None,
        }
    }
}

impl EmployeeDraft {
    /// Problems to show before submitting; empty when the draft can be sent.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.name.trim().is_empty() {
            out.push("name is required");
        }
        if !self.email.contains('@') {
            out.push("email is invalid");
        }
        if self.role.trim().is_empty() {
            out.push("role is required");
        }
        out
    }
}
