// src/models/driver.rs
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Prefix shared by every bcrypt variant ($2a$, $2b$, $2y$).
const BCRYPT_PREFIX: &str = "$2";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub license: String, // free text, e.g. "B, C"
    #[serde(default)]
    pub is_admin: bool,
    /// bcrypt hash, or the plaintext 4 digits in files written by older versions
    #[serde(default)]
    pub pin: String,
}

/// Driver as sent by admin clients; the PIN is optional so that edits keep the stored one.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DriverInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub pin: Option<String>,
}

/// Driver as returned by the API, never carries the PIN.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverResponse {
    pub id: String,
    pub name: String,
    pub license: String,
    pub is_admin: bool,
    pub has_pin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinChange {
    pub pin: String,
}

impl Driver {
    pub fn has_hashed_pin(&self) -> bool {
        self.pin.starts_with(BCRYPT_PREFIX)
    }

    pub fn to_response(&self) -> DriverResponse {
        DriverResponse {
            id: self.id.clone(),
            name: self.name.clone(),
            license: self.license.clone(),
            is_admin: self.is_admin,
            has_pin: !self.pin.is_empty(),
        }
    }
}

impl DriverInput {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(ValidationError::new("name", "Name is required"));
        }
        if let Some(pin) = self.pin.as_deref().filter(|p| !p.is_empty()) {
            if !is_valid_pin_format(pin) {
                errors.push(ValidationError::new("pin", "PIN must be exactly 4 digits"));
            }
        }
        errors
    }
}

pub fn is_valid_pin_format(pin: &str) -> bool {
    pin.len() == 4 && pin.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_format() {
        assert!(is_valid_pin_format("0000"));
        assert!(is_valid_pin_format("1234"));
        assert!(!is_valid_pin_format("123"));
        assert!(!is_valid_pin_format("12345"));
        assert!(!is_valid_pin_format("12a4"));
        assert!(!is_valid_pin_format("١٢٣٤"));
    }

    #[test]
    fn test_response_hides_pin() {
        let driver = Driver {
            id: "1".to_string(),
            name: "Mario Rossi".to_string(),
            license: "B, C".to_string(),
            is_admin: true,
            pin: "1234".to_string(),
        };
        let value = serde_json::to_value(driver.to_response()).unwrap();
        assert!(value.get("pin").is_none());
        assert_eq!(value["hasPin"], true);
        assert_eq!(value["isAdmin"], true);
        assert!(!driver.has_hashed_pin());
    }

    #[test]
    fn test_input_validation() {
        let input = DriverInput {
            name: "".to_string(),
            pin: Some("99".to_string()),
            ..Default::default()
        };
        let fields: Vec<String> = input.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "pin"]);

        let keep_pin = DriverInput {
            name: "Luigi Bianchi".to_string(),
            pin: Some(String::new()),
            ..Default::default()
        };
        assert!(keep_pin.validate().is_empty());
    }
}
