//! Error types for the service-center registry client
//!
//! Remote-call failures never surface here: the coordinator absorbs them and
//! reports `false` or an empty result. This enum covers caller-contract
//! violations, lifecycle misuse, and configuration problems.

use thiserror::Error;

/// Unified error type for the registry client
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Registry already initialized")]
    AlreadyInitialized,

    #[error("Registry not initialized: call init() first")]
    NotInitialized,

    #[error("Registry already running")]
    AlreadyRunning,

    // =========================================================================
    // Local Microservice Errors
    // =========================================================================
    #[error("Microservice not found: {name}")]
    MicroserviceNotFound { name: String },

    #[error("No default microservice configured")]
    NoDefaultMicroservice,

    #[error("Duplicate microservice definition: {app_id}/{name}")]
    DuplicateMicroservice { app_id: String, name: String },

    // =========================================================================
    // Remote Errors (used inside collaborators, never crosses the coordinator)
    // =========================================================================
    #[error("Remote call failed: {operation} - {reason}")]
    RemoteCall { operation: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Caller-contract violations: asking for a microservice that is not
    /// configured locally. Callers that need non-fatal behavior should check
    /// existence through the microservice manager first.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::MicroserviceNotFound { .. } | Error::NoDefaultMicroservice
        )
    }

    /// Failures worth retrying: the service center may answer next time
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RemoteCall { .. })
    }
}

/// Result type alias for the registry client
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors() {
        let err = Error::MicroserviceNotFound {
            name: "svcA".into(),
        };
        assert!(err.is_caller_error());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Microservice not found: svcA");

        assert!(Error::NoDefaultMicroservice.is_caller_error());
        assert!(!Error::NotInitialized.is_caller_error());
    }

    #[test]
    fn test_transient_errors() {
        let err = Error::RemoteCall {
            operation: "heartbeat".into(),
            reason: "connection refused".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Remote call failed: heartbeat - connection refused");

        let err = Error::Configuration("bad address".into());
        assert!(!err.is_transient());
        assert!(!err.is_caller_error());
    }
}
