//! Safe coercion of loosely-typed request data

use crate::error::{Result, SandboxError};
use crate::types::{Coordinates, LocationHints, RequestHints};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Accept a JSON number or a numeric string; anything non-finite is `None`.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Accept a non-blank string and return it in Unicode NFC form.
pub fn normalize_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.nfc().collect())
            }
        }
        _ => None,
    }
}

/// Normalize request hints; `None` only when every field is unusable.
pub fn extract_location_hints(hints: &RequestHints) -> Option<LocationHints> {
    let location = LocationHints {
        latitude: coerce_number(hints.latitude.as_ref()),
        longitude: coerce_number(hints.longitude.as_ref()),
        city: normalize_text(hints.city.as_ref()),
        country: normalize_text(hints.country.as_ref()),
    };
    (!location.is_empty()).then_some(location)
}

/// Check that a coordinate pair is finite and on the globe.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<Coordinates> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(SandboxError::Validation(
            "latitude must be a finite number between -90 and 90".to_string(),
        ));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(SandboxError::Validation(
            "longitude must be a finite number between -180 and 180".to_string(),
        ));
    }
    Ok(Coordinates {
        latitude,
        longitude,
    })
}

/// Validate a `{latitude, longitude}` object received from the isolate.
pub fn coordinates_from_value(payload: &Value) -> Result<Coordinates> {
    let Value::Object(fields) = payload else {
        return Err(SandboxError::Validation(
            "coordinates must be an object with latitude and longitude".to_string(),
        ));
    };
    let latitude = fields.get("latitude").and_then(Value::as_f64);
    let longitude = fields.get("longitude").and_then(Value::as_f64);
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => validate_coordinates(latitude, longitude),
        _ => Err(SandboxError::Validation(
            "latitude and longitude must be numbers".to_string(),
        )),
    }
}

/// Serde helper: numbers pass through, everything else becomes `None`.
pub fn deserialize_lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(Some(&json!(12.5))), Some(12.5));
        assert_eq!(coerce_number(Some(&json!(" 42 "))), Some(42.0));
        assert_eq!(coerce_number(Some(&json!("-7.25"))), Some(-7.25));
        assert_eq!(coerce_number(Some(&json!(""))), None);
        assert_eq!(coerce_number(Some(&json!("north"))), None);
        assert_eq!(coerce_number(Some(&json!("Infinity"))), None);
        assert_eq!(coerce_number(Some(&json!("NaN"))), None);
        assert_eq!(coerce_number(Some(&json!(true))), None);
        assert_eq!(coerce_number(None), None);
    }

    #[test]
    fn test_normalize_text_nfc() {
        // "e" + combining acute accent composes to a single code point
        let decomposed = json!("Cafe\u{0301}");
        assert_eq!(normalize_text(Some(&decomposed)).as_deref(), Some("Caf\u{00e9}"));
        assert_eq!(normalize_text(Some(&json!("   "))), None);
        assert_eq!(normalize_text(Some(&json!(3))), None);
    }

    #[test]
    fn test_extract_all_missing_is_none() {
        let hints = RequestHints {
            latitude: Some(json!("abc")),
            longitude: None,
            city: Some(json!("")),
            country: Some(json!(null)),
        };
        assert_eq!(extract_location_hints(&hints), None);
    }

    #[test]
    fn test_extract_partial_hints() {
        let hints = RequestHints {
            latitude: Some(json!("52.52")),
            longitude: None,
            city: Some(json!("Berlin")),
            country: None,
        };
        let location = extract_location_hints(&hints).unwrap();
        assert_eq!(location.latitude, Some(52.52));
        assert_eq!(location.longitude, None);
        assert_eq!(location.city.as_deref(), Some("Berlin"));
        assert_eq!(location.country, None);
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(10.0, 20.0).is_ok());
        assert!(validate_coordinates(-90.0, 180.0).is_ok());
        assert!(validate_coordinates(999.0, 20.0).is_err());
        assert!(validate_coordinates(10.0, -180.5).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_coordinates_from_value() {
        let coords = coordinates_from_value(&json!({ "latitude": 1, "longitude": 2.5 })).unwrap();
        assert_eq!(coords.latitude, 1.0);
        assert_eq!(coords.longitude, 2.5);
        assert!(coordinates_from_value(&json!({ "latitude": "1", "longitude": 2 })).is_err());
        assert!(coordinates_from_value(&json!([1, 2])).is_err());
    }
}
