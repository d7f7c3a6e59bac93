//! Input validation for API requests.
//!
//! This module provides validation functions for API request data,
//! ensuring all inputs meet the required format and constraints.
//!
//! For collecting multiple validation errors and returning them as an
//! ApiError, use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating email addresses
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"
    ).unwrap();

    /// Regex for validating 10-digit phone numbers
    static ref PHONE_REGEX: Regex = Regex::new(r"^[0-9]{10}$").unwrap();

    /// Regex for validating 6-digit postal pincodes
    static ref PINCODE_REGEX: Regex = Regex::new(r"^[0-9]{6}$").unwrap();

    /// Regex for validating UUID v4 format
    static ref UUID_REGEX: Regex = Regex::new(
        r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Please provide a valid email".to_string());
    }
    Ok(())
}

/// Validate a 10-digit phone number
pub fn validate_phone(phone: &str) -> Result<(), String> {
    if !PHONE_REGEX.is_match(phone) {
        return Err("Please provide a valid 10-digit phone number".to_string());
    }
    Ok(())
}

/// Validate a 6-digit postal pincode
pub fn validate_pincode(pincode: &str) -> Result<(), String> {
    if !PINCODE_REGEX.is_match(pincode) {
        return Err("Pincode must be 6 digits".to_string());
    }
    Ok(())
}

/// Validate a UUID path/body parameter
pub fn validate_uuid(id: &str, field: &str) -> Result<(), String> {
    if !UUID_REGEX.is_match(id) {
        return Err(format!("{} must be a valid UUID", field));
    }
    Ok(())
}

/// Validate a person's display name
pub fn validate_person_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.len() < 2 {
        return Err("Name must be at least 2 characters long".to_string());
    }
    if trimmed.len() > 50 {
        return Err("Name cannot be more than 50 characters".to_string());
    }
    Ok(())
}

/// Validate a property listing name (5-100 characters)
pub fn validate_property_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.len() < 5 || trimmed.len() > 100 {
        return Err("Property name must be between 5 and 100 characters".to_string());
    }
    Ok(())
}

/// Validate a property description (20-1000 characters)
pub fn validate_description(description: &str) -> Result<(), String> {
    let trimmed = description.trim();
    if trimmed.len() < 20 || trimmed.len() > 1000 {
        return Err("Description must be between 20 and 1000 characters".to_string());
    }
    Ok(())
}

/// Validate a non-negative price
pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price < 0.0 {
        return Err("Price must be a positive number".to_string());
    }
    Ok(())
}

/// Validate a non-negative area
pub fn validate_area(area: f64) -> Result<(), String> {
    if !area.is_finite() || area < 0.0 {
        return Err("Area must be a positive number".to_string());
    }
    Ok(())
}

/// Validate a non-negative room count
pub fn validate_room_count(count: i64, field: &str) -> Result<(), String> {
    if count < 0 {
        return Err(format!("{} must be a non-negative integer", field));
    }
    Ok(())
}

/// Validate a review rating (1-5)
pub fn validate_rating(rating: i64) -> Result<(), String> {
    if !(1..=5).contains(&rating) {
        return Err("Rating must be between 1 and 5".to_string());
    }
    Ok(())
}

/// Validate an optional review comment (max 500 characters)
pub fn validate_comment(comment: &str) -> Result<(), String> {
    if comment.len() > 500 {
        return Err("Comment cannot exceed 500 characters".to_string());
    }
    Ok(())
}

/// Validate a contact subject (5-100 characters)
pub fn validate_subject(subject: &str) -> Result<(), String> {
    let trimmed = subject.trim();
    if trimmed.len() < 5 || trimmed.len() > 100 {
        return Err("Subject must be between 5 and 100 characters".to_string());
    }
    Ok(())
}

/// Validate a contact message (10-1000 characters)
pub fn validate_message(message: &str) -> Result<(), String> {
    let trimmed = message.trim();
    if trimmed.len() < 10 || trimmed.len() > 1000 {
        return Err("Message must be between 10 and 1000 characters".to_string());
    }
    Ok(())
}

/// Validate a required non-empty field
pub fn validate_required(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }
    Ok(())
}

/// Validate a password at registration (minimum 6 characters, matching the
/// original product's policy)
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 6 {
        return Err("Password must be at least 6 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.domain.org").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("missing@tld").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("123").is_err());
        assert!(validate_phone("98765432100").is_err());
        assert!(validate_phone("98765abc10").is_err());
    }

    #[test]
    fn test_validate_pincode() {
        assert!(validate_pincode("400001").is_ok());
        assert!(validate_pincode("4000").is_err());
        assert!(validate_pincode("40000a").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "id").is_ok());
        assert!(validate_uuid("not-a-uuid", "id").is_err());
        assert!(validate_uuid("", "id").is_err());
    }

    #[test]
    fn test_validate_property_name() {
        assert!(validate_property_name("Modern 3 BHK Apartment").is_ok());
        assert!(validate_property_name("Flat").is_err());
        assert!(validate_property_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_description() {
        assert!(validate_description("A lovely apartment near the park").is_ok());
        assert!(validate_description("Too short").is_err());
        assert!(validate_description(&"x".repeat(1001)).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0.0).is_ok());
        assert!(validate_price(8500000.0).is_ok());
        assert!(validate_price(-1.0).is_err());
        assert!(validate_price(f64::NAN).is_err());
        assert!(validate_price(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_rating() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn test_validate_room_count() {
        assert!(validate_room_count(0, "Bedrooms").is_ok());
        assert!(validate_room_count(-1, "Bedrooms").is_err());
    }
}
