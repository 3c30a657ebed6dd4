use once_cell::sync::Lazy;
use regex::Regex;
use rocket::serde::json::{self, Json};
use serde::{Deserialize, Deserializer};
use validator::Validate;

use crate::error::AppError;

/// Usernames are 1 to 64 characters without whitespace.
pub static USERNAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S{1,64}$").unwrap());

/// A JSON request body whose parse failure reaches the handler instead of
/// the 422 catcher.
pub type JsonBody<'r, T> = Result<Json<T>, json::Error<'r>>;

pub fn parse_body<T>(body: JsonBody<'_, T>) -> Result<T, AppError> {
    body.map(Json::into_inner)
        .map_err(|e| AppError::Validation(format!("Malformed request body: {}", e)))
}

pub trait JsonValidateExt<T> {
    fn validated(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

impl<T: Validate> JsonValidateExt<T> for JsonBody<'_, T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = parse_body(self)?;
        inner.validate()?;
        Ok(inner)
    }
}

/// Distinguishes an absent key from an explicit `null`. Pair with
/// `#[serde(default)]`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_pattern() {
        assert!(USERNAME_PATTERN.is_match("alice"));
        assert!(USERNAME_PATTERN.is_match("a.b-c_d"));
        assert!(!USERNAME_PATTERN.is_match(""));
        assert!(!USERNAME_PATTERN.is_match("two words"));
        assert!(!USERNAME_PATTERN.is_match(&"x".repeat(65)));
    }

    #[test]
    fn test_double_option() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(default, deserialize_with = "double_option")]
            field: Option<Option<i64>>,
        }

        let absent: Probe = serde_json::from_str("{}").unwrap();
        let null: Probe = serde_json::from_str(r#"{"field": null}"#).unwrap();
        let value: Probe = serde_json::from_str(r#"{"field": 3}"#).unwrap();

        assert_eq!(absent.field, None);
        assert_eq!(null.field, Some(None));
        assert_eq!(value.field, Some(Some(3)));
    }
}
