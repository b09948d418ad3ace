//! Error Types
//!
//! Every fallible graph operation returns [`GraphError`]. Structural errors
//! (type mismatch, cycles, read-only plugs) are raised before anything is
//! changed, so a failed call always leaves the graph exactly as it was.
//!
//! Listener failures are a separate type, [`crate::signal::ListenerError`],
//! because they are captured and logged rather than returned to the caller.

use thiserror::Error;

/// Why a plug refused a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOnlyReason {
    /// The plug has an input connection and takes its value from it.
    Connected,
    /// The plug (or a parent plug) carries the `READ_ONLY` flag.
    Locked,
    /// The plug is an output computed by its node.
    Computed,
}

impl std::fmt::Display for ReadOnlyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => f.write_str("it has an input connection"),
            Self::Locked => f.write_str("it is locked"),
            Self::Computed => f.write_str("it is computed by its node"),
        }
    }
}

/// Errors produced by the graph, cache, undo and serialisation layers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    /// Two plugs (or a plug and a value) have incompatible types.
    #[error("type mismatch: \"{plug}\" ({expected}) cannot accept {found}")]
    TypeMismatch {
        plug: String,
        expected: String,
        found: String,
    },

    /// Connecting `input` into `plug` would make the graph cyclic.
    #[error("connecting \"{input}\" to \"{plug}\" would create a cycle")]
    Cycle { plug: String, input: String },

    /// Attempt to write a plug that is connected or locked.
    #[error("plug \"{plug}\" is read-only because {reason}")]
    ReadOnly { plug: String, reason: ReadOnlyReason },

    /// A path or id did not resolve.
    #[error("{kind} \"{path}\" not found")]
    NotFound { kind: &'static str, path: String },

    /// A structural edit that the graph cannot perform, such as removing the
    /// root or reattaching under a name that is now taken.
    #[error("invalid structural edit: {0}")]
    Structure(String),

    /// A node type has no registered constructor.
    #[error("unknown node type \"{0}\"")]
    UnknownNodeType(String),

    /// A node type's compute step failed.
    #[error("computing \"{plug}\" failed: {message}")]
    Compute { plug: String, message: String },

    /// Replaying a transaction failed; the transaction was rolled back.
    #[error("cannot {operation} \"{transaction}\": {message}")]
    Undo {
        operation: &'static str,
        transaction: String,
        message: String,
    },

    /// A script could not be encoded, decoded or executed.
    #[error("serialisation error: {0}")]
    Serialisation(String),
}

impl GraphError {
    /// Shorthand for a missing node.
    pub fn node_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "node",
            path: path.into(),
        }
    }

    /// Shorthand for a missing plug.
    pub fn plug_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "plug",
            path: path.into(),
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for GraphError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for GraphError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
