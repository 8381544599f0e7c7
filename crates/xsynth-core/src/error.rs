//! Error types for xsynth-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Main error type for xsynth-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A setting is missing or malformed
    #[error("Invalid setting '{key}': {message}")]
    SettingsValidation {
        /// Setting key, dotted path into the settings document
        key: String,
        /// Error message
        message: String,
    },

    /// The serialized chain-proxy descriptor could not be parsed
    #[error("Malformed chain proxy descriptor: {0}")]
    ChainDescriptor(String),

    /// DNS resolution failed
    #[error("DNS resolution failed for '{domain}': {reason}")]
    DnsResolution {
        /// Domain that failed to resolve
        domain: String,
        /// Failure reason
        reason: String,
    },

    /// HTTP client for resolver queries could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Settings store could not be read or written
    #[error("Settings store error: {0}")]
    Store(String),

    /// A generated document references a tag it does not define
    #[error("Document '{document}' references unknown tag '{tag}'")]
    DanglingTag {
        /// Document label
        document: String,
        /// The unresolved tag
        tag: String,
    },

    /// Two outbounds of a generated document share a tag
    #[error("Document '{document}' defines tag '{tag}' more than once")]
    DuplicateTag {
        /// Document label
        document: String,
        /// The repeated tag
        tag: String,
    },

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a settings validation error
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SettingsValidation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a chain descriptor error
    pub fn chain(message: impl Into<String>) -> Self {
        Self::ChainDescriptor(message.into())
    }

    /// Create a DNS resolution error
    pub fn resolution(domain: impl Into<String>, reason: impl ToString) -> Self {
        Self::DnsResolution {
            domain: domain.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller may continue synthesis after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ChainDescriptor(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid("fragment.length_min", "must not exceed length_max");
        assert!(err.to_string().contains("fragment.length_min"));
        assert!(err.to_string().contains("must not exceed"));

        let err = Error::resolution("example.com", "timed out");
        assert!(err.to_string().contains("example.com"));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_only_chain_errors_are_recoverable() {
        assert!(Error::chain("missing port").is_recoverable());
        assert!(!Error::invalid("dns.local_dns", "empty").is_recoverable());
        assert!(!Error::resolution("example.com", "nxdomain").is_recoverable());
    }
}
