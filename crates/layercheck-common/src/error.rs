//! Error types for layercheck
//!
//! Errors carry the resource kind and name they concern so a failed scenario
//! report says which object misbehaved, not just that something did. The
//! [`ErrorKind`] projection is what scenario reports print as the
//! distinguishing category.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for layercheck operations
#[derive(Debug, Error)]
pub enum Error {
    /// Optimistic-concurrency failure: the resource changed since it was read
    #[error("conflict updating {kind} {name}: {message}")]
    Conflict {
        /// Resource kind (e.g. "Pool")
        kind: String,
        /// Resource name
        name: String,
        /// Description from the control plane
        message: String,
    },

    /// Conflict retries were used up without a successful commit
    #[error("gave up updating {kind} {name} after {attempts} conflicting attempts")]
    ConflictExhausted {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Number of fetch-mutate-commit cycles attempted
        attempts: u32,
    },

    /// Referenced resource does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Resource with the same name already exists
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// A wait exhausted its budget without the condition being satisfied
    #[error("timed out after {waited:?} waiting for {description}")]
    Timeout {
        /// What was being waited for
        description: String,
        /// How long the waiter polled before giving up
        waited: Duration,
    },

    /// A wait observed a state that can never become satisfied
    #[error("unrecoverable state while waiting for {description}: {reason}")]
    Unrecoverable {
        /// What was being waited for
        description: String,
        /// Why the observed state is terminal
        reason: String,
    },

    /// Any other control-plane failure (transport, server error, rejected request)
    #[error("control plane error [{context}]: {message}")]
    ControlPlane {
        /// Operation that failed (e.g. "get MachineConfigPool")
        context: String,
        /// Description of what failed
        message: String,
        /// Whether repeating the call may succeed
        retryable: bool,
    },

    /// Remote command execution on a node failed
    #[error("exec on node {node} failed: {message}")]
    Exec {
        /// Node the command targeted
        node: String,
        /// Description of what failed
        message: String,
    },

    /// Invalid options or malformed configuration
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// Offending field or key, when known
        field: Option<String>,
    },

    /// Failed to translate between the resource model and a wire object
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// Resource kind being translated, when known
        kind: Option<String>,
    },

    /// One or more cleanup actions failed
    #[error("cleanup failed for: {}", .failed.join(", "))]
    CleanupFailed {
        /// Names of the cleanup actions that returned an error
        failed: Vec<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred
        context: String,
    },
}

/// Coarse category of an [`Error`], used in scenario reports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stale version on update
    Conflict,
    /// Conflict retry budget exhausted
    ConflictExhausted,
    /// Missing resource
    NotFound,
    /// Duplicate resource
    AlreadyExists,
    /// Wait budget exhausted
    Timeout,
    /// Terminal failure observed while waiting
    Unrecoverable,
    /// Other control-plane failure
    ControlPlane,
    /// Remote execution failure
    Exec,
    /// Bad configuration
    Validation,
    /// Translation failure
    Serialization,
    /// Teardown failure
    Cleanup,
    /// Anything else
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Conflict => "Conflict",
            ErrorKind::ConflictExhausted => "ConflictExhausted",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unrecoverable => "UnrecoverableState",
            ErrorKind::ControlPlane => "ControlPlane",
            ErrorKind::Exec => "Exec",
            ErrorKind::Validation => "Validation",
            ErrorKind::Serialization => "Serialization",
            ErrorKind::Cleanup => "Cleanup",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Create a conflict error for a resource
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for a resource
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an already-exists error for a resource
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a retryable control-plane error
    pub fn control_plane(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ControlPlane {
            context: context.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a control-plane error that will not succeed on retry
    pub fn control_plane_permanent(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ControlPlane {
            context: context.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create an exec error for a node
    pub fn exec(node: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Exec {
            node: node.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error for a resource kind
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::ConflictExhausted { .. } => ErrorKind::ConflictExhausted,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Unrecoverable { .. } => ErrorKind::Unrecoverable,
            Error::ControlPlane { .. } => ErrorKind::ControlPlane,
            Error::Exec { .. } => ErrorKind::Exec,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Serialization { .. } => ErrorKind::Serialization,
            Error::CleanupFailed { .. } => ErrorKind::Cleanup,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether this is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Whether the referenced resource was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if repeating the failed call may succeed
    ///
    /// Only transport-level control-plane failures qualify. Conflicts are
    /// retried by re-reading, which is the mutator's job, not a plain repeat.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ControlPlane { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
