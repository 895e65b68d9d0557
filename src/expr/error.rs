//! Expression error types
//!
//! Defines every error condition of graph construction and node evaluation.
//! `ErrorKind` gives the stable name the API layer reports verbatim.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while building or evaluating an expression graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    /// Malformed reference or expression syntax
    #[error("Parse error: {0}")]
    Parse(String),

    /// A node references a RefID that is not among the supplied nodes
    #[error("Unresolved reference: '{referenced_by}' references unknown node '{missing}'")]
    UnresolvedReference {
        missing: String,
        referenced_by: String,
    },

    /// A node references itself
    #[error("Self reference: node '{0}' references itself")]
    SelfReference(String),

    /// The dependency graph contains a cycle
    #[error("Cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// Two nodes share a RefID
    #[error("Duplicate refId: '{0}'")]
    DuplicateRefId(String),

    /// Node payload does not fit its declared query type
    #[error("Invalid node '{ref_id}': {reason}")]
    InvalidNode { ref_id: String, reason: String },

    /// An operand has not been evaluated (scheduler invariant violated)
    #[error("Missing dependency: '{0}' has not been evaluated")]
    MissingDependency(String),

    /// Incompatible frame shapes or time axes
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Reducer (or resampler) id not in the registry
    #[error("Unknown reducer: '{0}'")]
    UnknownReducer(String),

    /// Resample window could not be parsed
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Non-numeric data fed to a numeric operator
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Run cancelled or deadline exceeded
    #[error("Evaluation cancelled")]
    Cancelled,

    /// Node skipped because one of its dependencies failed
    #[error("Dependency failed: '{0}'")]
    DependencyFailed(String),

    /// Executor-level failure (worker task panicked, context misuse)
    #[error("Execution error: {0}")]
    Execution(String),
}

impl ExprError {
    /// Create an invalid-node error
    pub fn invalid_node(ref_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ExprError::InvalidNode {
            ref_id: ref_id.into(),
            reason: reason.into(),
        }
    }

    /// Stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExprError::Parse(_) => ErrorKind::Parse,
            ExprError::UnresolvedReference { .. } => ErrorKind::UnresolvedReference,
            ExprError::SelfReference(_) => ErrorKind::SelfReference,
            ExprError::CycleDetected(_) => ErrorKind::CycleDetected,
            ExprError::DuplicateRefId(_) => ErrorKind::DuplicateRefId,
            ExprError::InvalidNode { .. } => ErrorKind::InvalidNode,
            ExprError::MissingDependency(_) => ErrorKind::MissingDependency,
            ExprError::ShapeMismatch(_) => ErrorKind::ShapeMismatch,
            ExprError::UnknownReducer(_) => ErrorKind::UnknownReducer,
            ExprError::InvalidDuration(_) => ErrorKind::InvalidDuration,
            ExprError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            ExprError::Cancelled => ErrorKind::Cancelled,
            ExprError::DependencyFailed(_) => ErrorKind::DependencyFailed,
            ExprError::Execution(_) => ErrorKind::Execution,
        }
    }
}

/// Error kind names surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "ParseError")]
    Parse,
    #[serde(rename = "UnresolvedReferenceError")]
    UnresolvedReference,
    #[serde(rename = "SelfReferenceError")]
    SelfReference,
    #[serde(rename = "CycleDetectedError")]
    CycleDetected,
    #[serde(rename = "DuplicateRefIdError")]
    DuplicateRefId,
    #[serde(rename = "InvalidNodeError")]
    InvalidNode,
    #[serde(rename = "MissingDependencyError")]
    MissingDependency,
    #[serde(rename = "ShapeMismatchError")]
    ShapeMismatch,
    #[serde(rename = "UnknownReducerError")]
    UnknownReducer,
    #[serde(rename = "InvalidDurationError")]
    InvalidDuration,
    #[serde(rename = "TypeMismatchError")]
    TypeMismatch,
    #[serde(rename = "CancelledError")]
    Cancelled,
    #[serde(rename = "DependencyFailedError")]
    DependencyFailed,
    #[serde(rename = "ExecutionError")]
    Execution,
}

impl ErrorKind {
    /// Name as reported to the API layer
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "ParseError",
            Self::UnresolvedReference => "UnresolvedReferenceError",
            Self::SelfReference => "SelfReferenceError",
            Self::CycleDetected => "CycleDetectedError",
            Self::DuplicateRefId => "DuplicateRefIdError",
            Self::InvalidNode => "InvalidNodeError",
            Self::MissingDependency => "MissingDependencyError",
            Self::ShapeMismatch => "ShapeMismatchError",
            Self::UnknownReducer => "UnknownReducerError",
            Self::InvalidDuration => "InvalidDurationError",
            Self::TypeMismatch => "TypeMismatchError",
            Self::Cancelled => "CancelledError",
            Self::DependencyFailed => "DependencyFailedError",
            Self::Execution => "ExecutionError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for expression operations
pub type ExprResult<T> = Result<T, ExprError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExprError::UnresolvedReference {
            missing: "C".to_string(),
            referenced_by: "B".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unresolved reference: 'B' references unknown node 'C'"
        );

        let err = ExprError::CycleDetected(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(err.to_string(), "Cycle detected: A -> B -> A");
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ExprError::Cancelled.kind().to_string(), "CancelledError");
        assert_eq!(
            ExprError::ShapeMismatch("x".into()).kind().as_str(),
            "ShapeMismatchError"
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::CycleDetected).unwrap(),
            "\"CycleDetectedError\""
        );
    }
}
