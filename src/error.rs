//! Error types for the edge agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Attribute validation failures
///
/// Each variant names the attribute that failed so callers never see a bare
/// generic rejection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A mandatory attribute has no value
    #[error("missing mandatory attribute '{name}' for {microservice}")]
    MissingAttribute { microservice: String, name: String },

    /// A value does not match the declared type
    #[error("attribute '{name}' must be of type {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// The definition does not declare this attribute and is not extensible
    #[error("unknown attribute '{name}' for {microservice}")]
    UnknownAttribute { microservice: String, name: String },
}

impl ValidationError {
    /// Name of the attribute that failed validation
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::MissingAttribute { name, .. }
            | Self::TypeMismatch { name, .. }
            | Self::UnknownAttribute { name, .. } => name,
        }
    }
}

/// Errors that can occur in the edge agent
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or invalid request input
    #[error("invalid input '{input}': {message}")]
    UserInput { input: String, message: String },

    /// Attribute validation failure
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A configuration record already exists for this identity
    #[error("microservice {0} is already configured; pass force to replace it")]
    AlreadyConfigured(String),

    /// Catalog unreachable, timed out, or identity unknown
    #[error("catalog lookup failed: {0}")]
    CatalogLookup(String),

    /// Dependency cycle or unresolvable dependency
    #[error("dependency resolution failed: {0}")]
    DependencyResolution(String),

    /// Configuration store cannot be reached
    #[error("configuration store unavailable: {0}")]
    StoreUnavailable(String),

    /// The node has no registration record
    #[error("node is not registered")]
    NotRegistered,

    /// Event could not be handed to the event sink
    #[error("event publish failed: {0}")]
    EventPublish(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Build a user input error for the named input
    pub fn user_input(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UserInput {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Processing stage that produced this error
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::UserInput { .. } => "decode",
            Self::Serialization(_) => "serialization",
            Self::Validation(_) => "attributes",
            Self::AlreadyConfigured(_) => "existing-record",
            Self::CatalogLookup(_) | Self::Http(_) => "catalog",
            Self::DependencyResolution(_) => "dependencies",
            Self::StoreUnavailable(_) | Self::Database(_) | Self::Sqlite(_) => "store",
            Self::NotRegistered => "node",
            Self::EventPublish(_) => "events",
            Self::Config(_) | Self::Io(_) | Self::Toml(_) => "config",
        }
    }

    /// Whether the caller caused this error with bad input
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::UserInput { .. } | Self::Validation(_))
    }

    /// Offending input name, for user input errors
    #[must_use]
    pub fn input(&self) -> Option<&str> {
        match self {
            Self::UserInput { input, .. } => Some(input),
            Self::Validation(e) => Some(e.attribute()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_attribute_names_the_attribute() {
        let err = Error::from(ValidationError::MissingAttribute {
            microservice: "org/sensor-svc/1.0/amd64".to_string(),
            name: "pollInterval".to_string(),
        });

        assert!(err.is_user_error());
        assert_eq!(err.input(), Some("pollInterval"));
        assert_eq!(err.stage(), "attributes");
        assert!(err.to_string().contains("pollInterval"));
    }

    #[test]
    fn upstream_failures_are_system_errors() {
        let err = Error::DependencyResolution("org/missing/1.0/amd64 not found".to_string());
        assert!(!err.is_user_error());
        assert_eq!(err.stage(), "dependencies");
        assert!(err.input().is_none());
    }
}
