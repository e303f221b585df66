//! Structured SOAP faults.

use serde_json::Value;

/// A structured error response from the mail server.
///
/// Faults are semantic failures (missing message, quota exceeded, invalid
/// recipient) as opposed to transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Human-readable reason (`Fault.Reason.Text`).
    pub reason_text: String,
    /// Machine error code (`Fault.Detail.Error.Code`), e.g. `mail.NO_SUCH_MSG`.
    pub error_code: String,
    /// Server trace or additional detail, if any.
    pub detail: Option<String>,
}

impl Fault {
    /// Creates a fault with no detail.
    #[must_use]
    pub fn new(reason_text: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            reason_text: reason_text.into(),
            error_code: error_code.into(),
            detail: None,
        }
    }

    /// Parses a `Body.Fault` JSON object.
    ///
    /// Missing fields degrade to empty strings rather than failing, since the
    /// fault itself is already the error being reported.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let reason_text = value
            .pointer("/Reason/Text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let error_code = value
            .pointer("/Detail/Error/Code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let detail = value
            .pointer("/Detail/Error/Trace")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            reason_text,
            error_code,
            detail,
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.error_code.is_empty() {
            write!(f, "Server fault: {}", self.reason_text)
        } else {
            write!(f, "Server fault {}: {}", self.error_code, self.reason_text)
        }
    }
}
