//! # Error Handling
//!
//! Error types for vaultdex built with `thiserror`.
//!
//! None of these errors is fatal to the process. Decryption failures on the
//! persistent cache degrade to an empty cache, per-vault and per-subscription
//! failures are recorded in the indexing pass report, and persistence failures
//! leave the in-memory cache usable.

/// Custom result type for vaultdex operations
pub type Result<T> = std::result::Result<T, VaultdexError>;

/// Main error type for vaultdex
#[derive(thiserror::Error, Debug)]
pub enum VaultdexError {
    /// Wrong password, wrong key, or corrupted ciphertext
    #[error("Decryption failed: {message}")]
    Decryption { message: String },

    /// Encryption or key derivation could not run
    #[error("Encryption failed: {message}")]
    Encryption { message: String },

    /// One vault could not be crawled (unreachable, unauthorized, timed out)
    #[error("Failed to index vault '{vault}': {reason}")]
    PerVaultIndex { vault: String, reason: String },

    /// Vaults of one subscription could not be listed
    #[error("Failed to enumerate subscription '{subscription}': {reason}")]
    SubscriptionEnumeration { subscription: String, reason: String },

    /// Cache artifacts could not be written or removed
    #[error("Persistence error: {context}")]
    Persistence {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// An indexing pass is already in progress
    #[error("Indexing is already running (progress {progress_percent}%)")]
    AlreadyRunning { progress_percent: u8 },

    /// Failure reported by a vault data source
    #[error("Data source error: {message}")]
    DataSource { message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Timeout errors
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// I/O errors outside the persistence path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultdexError {
    pub fn decryption<S: Into<String>>(message: S) -> Self {
        Self::Decryption { message: message.into() }
    }

    pub fn encryption<S: Into<String>>(message: S) -> Self {
        Self::Encryption { message: message.into() }
    }

    pub fn per_vault<V: Into<String>, R: Into<String>>(vault: V, reason: R) -> Self {
        Self::PerVaultIndex { vault: vault.into(), reason: reason.into() }
    }

    pub fn subscription<S: Into<String>, R: Into<String>>(subscription: S, reason: R) -> Self {
        Self::SubscriptionEnumeration { subscription: subscription.into(), reason: reason.into() }
    }

    pub fn persistence<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Persistence { context: context.into(), source }
    }

    pub fn data_source<S: Into<String>>(message: S) -> Self {
        Self::DataSource { message: message.into() }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn serialization<S: Into<String>>(context: S, source: serde_json::Error) -> Self {
        Self::Serialization { context: context.into(), source }
    }

    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the session can carry on after this error.
    ///
    /// Only configuration and internal errors stop a command; everything else
    /// degrades to a stale or empty cache.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Internal(_))
    }

    /// Short machine-readable name used in logs and pass reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decryption { .. } => "decryption",
            Self::Encryption { .. } => "encryption",
            Self::PerVaultIndex { .. } => "per_vault_index",
            Self::SubscriptionEnumeration { .. } => "subscription_enumeration",
            Self::Persistence { .. } => "persistence",
            Self::AlreadyRunning { .. } => "already_running",
            Self::DataSource { .. } => "data_source",
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Serialization { .. } => "serialization",
            Self::Timeout { .. } => "timeout",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for VaultdexError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization("JSON serialization failed", error)
    }
}

impl From<validator::ValidationErrors> for VaultdexError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");
        // nested struct errors are not listed in field_errors
        let message = if message.is_empty() { errors.to_string() } else { message };

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultdexError::per_vault("kv-prod", "403 Forbidden");
        assert_eq!(err.to_string(), "Failed to index vault 'kv-prod': 403 Forbidden");

        let err = VaultdexError::AlreadyRunning { progress_percent: 40 };
        assert_eq!(err.to_string(), "Indexing is already running (progress 40%)");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(VaultdexError::decryption("bad padding").is_recoverable());
        assert!(VaultdexError::subscription("sub-1", "denied").is_recoverable());
        assert!(VaultdexError::AlreadyRunning { progress_percent: 0 }.is_recoverable());
        assert!(!VaultdexError::config("bad batch size").is_recoverable());
    }

    #[test]
    fn test_error_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: VaultdexError = json_error.into();
        assert!(matches!(err, VaultdexError::Serialization { .. }));
        assert_eq!(err.kind(), "serialization");

        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = VaultdexError::persistence("writing cache.dat", io_error);
        assert!(err.to_string().contains("cache.dat"));
        assert_eq!(err.kind(), "persistence");
    }
}
