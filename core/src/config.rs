//! Per-operation settings.

use serde::{Deserialize, Serialize};

/// Options applied when an operation is submitted and completed.
///
/// Deserializes from JSON with every field optional, e.g.
/// `{"enforce_content_type": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Fail with `UnacceptableContentType` when the response declares a
    /// media type the decoder does not list. A missing header is accepted.
    pub enforce_content_type: bool,

    /// Add an `Accept` header with the decoder's media types on submit,
    /// unless the request already carries one.
    pub set_accept_header: bool,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            enforce_content_type: false,
            set_accept_header: true,
        }
    }
}

impl OperationConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = OperationConfig::default();
        assert!(!config.enforce_content_type);
        assert!(config.set_accept_header);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = OperationConfig::from_json_str(r#"{"enforce_content_type":true}"#).unwrap();
        assert!(config.enforce_content_type);
        assert!(config.set_accept_header);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(OperationConfig::from_json_str("{}").unwrap(), OperationConfig::default());
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(OperationConfig::from_json_str(r#"{"set_accept_header":"yes"}"#).is_err());
    }
}
