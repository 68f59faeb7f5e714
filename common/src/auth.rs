//! Token claims and route guarding.
//!
//! Claims are read from the token payload without checking its signature. The
//! result only decides what to show; the backend re-checks every call.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role that bypasses all permission checks.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("token payload is not valid base64url")]
    Encoding,
    #[error("token payload is not valid claims JSON: {0}")]
    Claims(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

impl Claims {
    /// Read the claims from a JWT's payload segment.
    pub fn decode_unverified(token: &str) -> Result<Self, TokenError> {
        let mut parts = token.trim().split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        // Some issuers pad the segments; base64url in JWTs is unpadded.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| TokenError::Encoding)?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Claims(e.to_string()))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp < now.timestamp()
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ADMIN_ROLE)
    }

    pub fn has_any_permission(&self, required: &[&str]) -> bool {
        self.permissions
            .iter()
            .any(|p| required.iter().any(|r| r == p))
    }
}

/// What a route asks of the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequirement {
    /// Any signed-in user with a live token.
    Authenticated,
    /// At least one of these permissions.
    AnyOf(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted(Claims),
    /// Missing, unreadable or expired token.
    RedirectLogin { clear_token: bool },
    /// Signed in but lacking every required permission.
    Unauthorized,
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted(_))
    }
}

/// Decide whether the holder of `token` may open a route.
pub fn guard(token: Option<&str>, now: DateTime<Utc>, requirement: RouteRequirement) -> Access {
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        return Access::RedirectLogin { clear_token: false };
    };
    let claims = match Claims::decode_unverified(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("Discarding unreadable token: {e}");
            return Access::RedirectLogin { clear_token: true };
        }
    };
    if claims.is_expired(now) {
        return Access::RedirectLogin { clear_token: true };
    }
    if claims.is_admin() {
        return Access::Granted(claims);
    }
    match requirement {
        RouteRequirement::Authenticated => Access::Granted(claims),
        RouteRequirement::AnyOf(required) if claims.has_any_permission(required) => {
            Access::Granted(claims)
        }
        RouteRequirement::AnyOf(_) => Access::Unauthorized,
    }
}

/// Permission tags issued by the backend.
pub mod permissions {
    pub const MANAGE_ORDERS: &str = "manage_orders";
    pub const MANAGE_INVENTORY: &str = "manage_inventory";
    pub const MANAGE_EMPLOYEES: &str = "manage_employees";
    pub const MANAGE_CUSTOMERS: &str = "manage_customers";
    pub const MODERATE_REVIEWS: &str = "moderate_reviews";
    pub const HANDLE_CHAT: &str = "handle_chat";
    pub const VIEW_REPORTS: &str = "view_reports";
}

/// Back-office routes and what they require.
pub fn route_table() -> &'static [(&'static str, RouteRequirement)] {
    use permissions::*;
    const ROUTES: &[(&str, RouteRequirement)] = &[
        ("/admin", RouteRequirement::Authenticated),
        ("/admin/orders", RouteRequirement::AnyOf(&[MANAGE_ORDERS])),
        ("/admin/inventory", RouteRequirement::AnyOf(&[MANAGE_INVENTORY])),
        ("/admin/employees", RouteRequirement::AnyOf(&[MANAGE_EMPLOYEES])),
        ("/admin/customers", RouteRequirement::AnyOf(&[MANAGE_CUSTOMERS])),
        ("/admin/reviews", RouteRequirement::AnyOf(&[MODERATE_REVIEWS])),
        ("/admin/chat", RouteRequirement::AnyOf(&[HANDLE_CHAT])),
        (
            "/admin/reports",
            RouteRequirement::AnyOf(&[VIEW_REPORTS, MANAGE_ORDERS]),
        ),
    ];
    ROUTES
}

/// Requirement for a path, if it is a guarded route.
pub fn requirement_for(path: &str) -> Option<RouteRequirement> {
    route_table()
        .iter()
        .find(|(route, _)| *route == path)
        .map(|(_, req)| *req)
}

/// Build an unsigned token around `claims`. Used by tests and local tooling.
pub fn encode_unsigned(claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    format!("{header}.{payload}.")
}
