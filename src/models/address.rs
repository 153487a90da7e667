//! Organization address models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Classification of an organization address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    /// Registered company address
    #[default]
    Company,
    /// Billing address
    Billing,
    /// Shipping address
    Shipping,
    /// Anything else
    Other,
}

impl AddressType {
    /// Get all available address types
    pub fn all() -> Vec<AddressType> {
        vec![
            AddressType::Company,
            AddressType::Billing,
            AddressType::Shipping,
            AddressType::Other,
        ]
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Company => "company",
            AddressType::Billing => "billing",
            AddressType::Shipping => "shipping",
            AddressType::Other => "other",
        }
    }

    /// Parse an address type from its database representation
    pub fn parse(value: &str) -> Option<AddressType> {
        match value {
            "company" => Some(AddressType::Company),
            "billing" => Some(AddressType::Billing),
            "shipping" => Some(AddressType::Shipping),
            "other" => Some(AddressType::Other),
            _ => None,
        }
    }
}

/// A postal address attached to an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    /// Unique identifier
    pub id: Uuid,

    /// Owning organization
    pub organization_id: Uuid,

    /// First street line (required)
    pub street_line1: String,

    /// Second street line
    pub street_line2: Option<String>,

    /// Postal code
    pub postal_code: Option<String>,

    /// City
    pub city: Option<String>,

    /// Province or state
    pub province: Option<String>,

    /// ISO 3166-1 alpha-2 country code, uppercase
    pub country: Option<String>,

    /// Address classification
    pub address_type: AddressType,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAddressRequest {
    #[validate(length(min = 1, max = 255))]
    pub street_line1: String,
    pub street_line2: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub address_type: AddressType,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateAddressRequest {
    pub street_line1: Option<String>,
    pub street_line2: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub address_type: Option<AddressType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_type_roundtrip() {
        for kind in AddressType::all() {
            assert_eq!(AddressType::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_address_type_parse_rejects_unknown() {
        assert_eq!(AddressType::parse("warehouse"), None);
        assert_eq!(AddressType::parse("Company"), None);
    }

    #[test]
    fn test_address_type_default() {
        assert_eq!(AddressType::default(), AddressType::Company);
    }

    #[test]
    fn test_create_request_defaults_address_type() {
        let req: CreateAddressRequest =
            serde_json::from_str(r#"{"street_line1": "Main St 1"}"#).unwrap();
        assert_eq!(req.address_type, AddressType::Company);
        assert!(req.country.is_none());
    }
}
