//! Errors raised by the inference core.
//!
//! Every variant is fatal for the whole run: a partial model would render
//! definitions that compile but mis-serialize data.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// An explicit default is not an immutable scalar.
    #[error("invalid default for field '{field}' at '{path}': {reason}")]
    InvalidDefault {
        path: String,
        field: String,
        reason: String,
    },

    /// A key (or serializer name) that cannot become an identifier.
    #[error("invalid identifier '{source_key}' at '{path}': {reason}")]
    InvalidIdentifier {
        path: String,
        source_key: String,
        reason: String,
    },

    /// The example document is not a tree of accepted value kinds.
    #[error("malformed input: {message}")]
    MalformedInput { message: String },
}

impl InferenceError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput { message: message.into() }
    }

    pub fn invalid_identifier(
        path: impl Into<String>,
        source_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidIdentifier {
            path: path.into(),
            source_key: source_key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_default(
        path: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidDefault {
            path: path.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = InferenceError::invalid_identifier("a.b", "123", "no alphabetic character");
        assert_eq!(err.to_string(), "invalid identifier '123' at 'a.b': no alphabetic character");

        let err = InferenceError::malformed("document root is a scalar");
        assert_eq!(err.to_string(), "malformed input: document root is a scalar");
    }
}
