//! Common error infrastructure for game-core.
//!
//! Domain errors (currently [`CommandError`](crate::command::CommandError))
//! implement [`GameError`] so the session layer can decide whether a failure
//! is reported to the user, logged, or tears the session down.

/// Severity level of an error, used for categorization and recovery strategies.
///
/// - **Recoverable**: conditions that may succeed later (funds, pause)
/// - **Validation**: invalid input that should be rejected without retry
/// - **Internal**: unexpected inconsistencies that require investigation
/// - **Fatal**: invariant violations; the caller must not continue as if nothing happened
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Recoverable error - may succeed once world state changes.
    ///
    /// Examples: insufficient funds, session paused
    Recoverable,

    /// Validation error - invalid input, should not retry without changes.
    ///
    /// Examples: tile occupied, not the owner, parameter out of range
    Validation,

    /// Internal error - unexpected state inconsistency.
    Internal,

    /// Fatal error - an invariant of the command table or participant table
    /// was violated.
    ///
    /// Examples: unknown command id, participant id out of range
    Fatal,
}

impl ErrorSeverity {
    /// Returns a human-readable description of this severity level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
            Self::Fatal => "fatal",
        }
    }

    /// Returns true if this error is potentially recoverable.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    /// Returns true if this error indicates a bug or a hostile peer.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Fatal)
    }
}

/// Common trait for all game-core errors.
///
/// # Implementation Guidelines
///
/// - Use `#[derive(thiserror::Error)]` for Display/Error impl
/// - Classify severity based on recoverability, not impact
pub trait GameError: core::fmt::Display + core::fmt::Debug {
    /// Returns the severity level of this error.
    fn severity(&self) -> ErrorSeverity;

    /// Returns a static string identifier for this error variant.
    ///
    /// Useful for metrics, logging and testing.
    fn error_code(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}
