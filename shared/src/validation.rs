//! Validation utilities for ledger inputs
//!
//! These run before the matching core is invoked; the core assumes its
//! inputs already passed them.

use chrono::NaiveDateTime;

use crate::types::Barcode;

// ============================================================================
// Event Validations
// ============================================================================

/// Validate a barcode is a positive SKU key
pub fn validate_barcode(barcode: Barcode) -> Result<(), &'static str> {
    if barcode <= 0 {
        return Err("Barcode must be a positive number");
    }
    Ok(())
}

/// Parse a barcode from a query string value
pub fn parse_barcode(raw: &str) -> Result<Barcode, &'static str> {
    let barcode = raw
        .trim()
        .parse::<Barcode>()
        .map_err(|_| "Barcode must be numeric")?;
    validate_barcode(barcode)?;
    Ok(barcode)
}

/// Validate a sale or supply quantity
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a unit price or unit cost in the smallest currency unit
pub fn validate_unit_amount(amount: i32) -> Result<(), &'static str> {
    if amount < 0 {
        return Err("Price cannot be negative");
    }
    Ok(())
}

// ============================================================================
// Query Validations
// ============================================================================

/// Validate a report window. Both bounds are inclusive.
pub fn validate_time_range(from: NaiveDateTime, to: NaiveDateTime) -> Result<(), &'static str> {
    if from > to {
        return Err("fromTime must not be after toTime");
    }
    Ok(())
}

/// Validate page size for listings
pub fn validate_page_size(per_page: u32) -> Result<(), &'static str> {
    if per_page == 0 {
        return Err("per_page must be at least 1");
    }
    if per_page > 1000 {
        return Err("per_page must be at most 1000");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_time;

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode(123).is_ok());
        assert!(validate_barcode(0).is_err());
        assert!(validate_barcode(-5).is_err());
    }

    #[test]
    fn test_parse_barcode() {
        assert_eq!(parse_barcode("4600000000123"), Ok(4_600_000_000_123));
        assert_eq!(parse_barcode(" 42 "), Ok(42));
        assert!(parse_barcode("abc").is_err());
        assert!(parse_barcode("").is_err());
        assert!(parse_barcode("-1").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn test_validate_unit_amount() {
        assert!(validate_unit_amount(0).is_ok());
        assert!(validate_unit_amount(1500).is_ok());
        assert!(validate_unit_amount(-1).is_err());
    }

    #[test]
    fn test_validate_time_range() {
        let early = parse_time("2024-01-01 00:00:00").unwrap();
        let late = parse_time("2024-01-31 23:59:59").unwrap();
        assert!(validate_time_range(early, late).is_ok());
        assert!(validate_time_range(early, early).is_ok());
        assert!(validate_time_range(late, early).is_err());
    }

    #[test]
    fn test_parse_time_format() {
        assert!(parse_time("2024-03-05 14:30:00").is_ok());
        assert!(parse_time("2024-03-05T14:30:00").is_err());
        assert!(parse_time("05/03/2024").is_err());
    }

    #[test]
    fn test_validate_page_size() {
        assert!(validate_page_size(20).is_ok());
        assert!(validate_page_size(0).is_err());
        assert!(validate_page_size(5000).is_err());
    }
}
