//! Common types for adtap
//!
//! Shared types used across the config, auth, and client modules.

use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A wrapper around `SecretString` that provides safe handling of sensitive values.
///
/// This type:
/// - Redacts the value in `Debug` and `Display` output to prevent credential leaks in logs
/// - Serializes as `"***REDACTED***"` to prevent accidental exposure in config dumps
/// - Provides `expose_secret()` method to access the actual value when needed
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Create a new sensitive string from any string-like value
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value.
    ///
    /// Use sparingly - only when the actual value is needed (e.g., for authentication).
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Serialize as redacted to prevent accidental exposure in config dumps/logs
impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

/// Deserialize from the actual string value
impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

impl JsonSchema for SensitiveString {
    fn schema_name() -> String {
        "SensitiveString".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        // Schema looks like a normal string but with format hint
        let mut schema = gen.subschema_for::<String>();
        if let schemars::schema::Schema::Object(obj) = &mut schema {
            obj.format = Some("password".to_string());
            obj.metadata().description = Some(
                "Sensitive value (access tokens, client secrets). Will be redacted in logs."
                    .to_string(),
            );
        }
        schema
    }
}
