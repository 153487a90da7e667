//! Organization (tenant) models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A tenant organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Industry sector (optional, from the industries catalogue)
    pub industry: Option<String>,

    /// Company size bracket (optional)
    pub size: Option<String>,

    /// VAT registration number (optional)
    pub vat_number: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Role of a user within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    /// Full control over the organization, its members and settings
    Admin,
    /// Regular member with read/write access to organization data
    Member,
    /// Read-only access
    Viewer,
}

impl OrgRole {
    /// Get all available roles
    pub fn all() -> Vec<OrgRole> {
        vec![OrgRole::Admin, OrgRole::Member, OrgRole::Viewer]
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Admin => "admin",
            OrgRole::Member => "member",
            OrgRole::Viewer => "viewer",
        }
    }

    /// Parse a role from its database representation
    pub fn parse(value: &str) -> Option<OrgRole> {
        match value {
            "admin" => Some(OrgRole::Admin),
            "member" => Some(OrgRole::Member),
            "viewer" => Some(OrgRole::Viewer),
            _ => None,
        }
    }
}

/// A user's membership in an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationMember {
    /// Membership row identifier
    pub id: Uuid,

    /// Organization the membership belongs to
    pub organization_id: Uuid,

    /// The member's user id (from the auth provider)
    pub user_id: Uuid,

    /// Role within the organization
    pub role: OrgRole,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// One row of a user's organization listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOrganization {
    pub organization_id: Uuid,
    pub organization_name: String,
    pub role: OrgRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub industry: Option<String>,
    pub size: Option<String>,
    #[validate(length(max = 32))]
    pub vat_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub vat_number: Option<String>,
}

impl UpdateOrganizationRequest {
    /// True when no field is set; such a request is rejected early.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.industry.is_none()
            && self.size.is_none()
            && self.vat_number.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in OrgRole::all() {
            assert_eq!(OrgRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn test_role_parse_rejects_unknown() {
        assert_eq!(OrgRole::parse("owner"), None);
        assert_eq!(OrgRole::parse("ADMIN"), None);
        assert_eq!(OrgRole::parse(""), None);
    }

    #[test]
    fn test_role_serde_representation() {
        let json = serde_json::to_string(&OrgRole::Admin).unwrap();
        assert_eq!(json, "\"admin\"");

        let parsed: OrgRole = serde_json::from_str("\"viewer\"").unwrap();
        assert_eq!(parsed, OrgRole::Viewer);
    }

    #[test]
    fn test_update_request_is_empty() {
        assert!(UpdateOrganizationRequest::default().is_empty());

        let req = UpdateOrganizationRequest {
            name: Some("New Name".to_string()),
            ..Default::default()
        };
        assert!(!req.is_empty());
    }
}
