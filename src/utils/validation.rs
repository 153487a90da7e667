//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for validating ISO 3166-1 alpha-2 country codes
static COUNTRY_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{2}$").unwrap()
});

/// Regex for validating VAT numbers (country prefix plus identifier)
static VAT_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9][A-Z0-9 .\-]*$").unwrap()
});

/// Validate an organization name
pub fn validate_organization_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.len() <= 200
}

/// Validate a two-letter uppercase country code
pub fn validate_country_code(code: &str) -> bool {
    COUNTRY_CODE_REGEX.is_match(code)
}

/// Validate a VAT number
pub fn validate_vat_number(vat: &str) -> bool {
    !vat.is_empty() && vat.len() <= 32 && VAT_NUMBER_REGEX.is_match(vat)
}

/// Validate the first street line of an address
pub fn validate_street_line(street: &str) -> bool {
    let trimmed = street.trim();
    !trimmed.is_empty() && trimmed.len() <= 255
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_organization_name_valid() {
        assert!(validate_organization_name("Acme GmbH"));
        assert!(validate_organization_name("  padded  "));
        assert!(validate_organization_name("O"));
    }

    #[test]
    fn test_validate_organization_name_invalid() {
        assert!(!validate_organization_name(""));
        assert!(!validate_organization_name("   "));
        assert!(!validate_organization_name(&"x".repeat(201)));
    }

    #[test]
    fn test_validate_country_code_valid() {
        assert!(validate_country_code("DE"));
        assert!(validate_country_code("US"));
        assert!(validate_country_code("PT"));
    }

    #[test]
    fn test_validate_country_code_invalid() {
        assert!(!validate_country_code(""));
        assert!(!validate_country_code("de")); // Must be uppercase
        assert!(!validate_country_code("DEU")); // Alpha-2, not alpha-3
        assert!(!validate_country_code("D1"));
    }

    #[test]
    fn test_validate_vat_number_valid() {
        assert!(validate_vat_number("DE123456789"));
        assert!(validate_vat_number("PT 502 011 378"));
    }

    #[test]
    fn test_validate_vat_number_invalid() {
        assert!(!validate_vat_number(""));
        assert!(!validate_vat_number(" leading-space"));
        assert!(!validate_vat_number(&"9".repeat(33)));
    }

    #[test]
    fn test_validate_street_line() {
        assert!(validate_street_line("Hauptstrasse 12"));
        assert!(!validate_street_line(""));
        assert!(!validate_street_line("   "));
    }
}
