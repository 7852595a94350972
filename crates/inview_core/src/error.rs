//! Viewport observation error types

use thiserror::Error;

/// Errors raised while configuring or registering viewport watches
///
/// Unwatching an unknown element and calling into a destroyed coordinator are
/// deliberately not errors: both are silent no-ops.
#[derive(Error, Debug)]
pub enum InViewportError {
    /// Tolerance or threshold values the native observer cannot accept
    #[error("Invalid viewport configuration: {0}")]
    InvalidConfiguration(String),

    /// The resolved strategy needs a capability the host does not provide
    #[error("Unsupported by host: {0}")]
    Unsupported(String),

    /// The host failed to construct a native observer
    #[error("Host error: {0}")]
    Host(String),

    /// Failed to read a configuration file
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a configuration file
    #[error("Failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for viewport observation operations
pub type Result<T> = std::result::Result<T, InViewportError>;
