//! Error types for avahi-aliasd.

use std::fmt;
use thiserror::Error;

use crate::avahi::publisher::GroupState;

/// Boxed error returned by a responder backend.
pub type ResponderError = Box<dyn std::error::Error + Send + Sync>;

/// Wire-format violations found while encoding a name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// A label does not fit its one-byte length prefix.
    #[error("label '{label}' is {len} bytes, limit is 255")]
    LabelTooLong { label: String, len: usize },

    /// Only the root name may contain an empty label.
    #[error("name '{name}' contains an empty label")]
    EmptyLabel { name: String },

    /// Encoding did not fill the precomputed buffer exactly.
    #[error("encoded name needs {actual} bytes, buffer holds {expected}")]
    Overflow { expected: usize, actual: usize },
}

/// A step of the record group lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    Allocate,
    Populate,
    Commit,
    Reset,
    Release,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            PublishStep::Allocate => "allocate",
            PublishStep::Populate => "populate",
            PublishStep::Commit => "commit",
            PublishStep::Reset => "reset",
            PublishStep::Release => "release",
        };
        f.write_str(step)
    }
}

/// Errors that can occur while reconciling aliases.
#[derive(Debug, Error)]
pub enum AliasError {
    /// No hostname rule exists for this resource kind.
    #[error("unsupported resource kind: {0}")]
    UnsupportedKind(String),

    /// The resource spec does not match the schema of its kind.
    #[error("malformed {kind} '{name}': {source}")]
    MalformedResource {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A hostname or target exceeds wire-format limits.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A responder call failed.
    #[error("failed to {step} alias {hostname}: {source}")]
    Publish {
        hostname: String,
        step: PublishStep,
        #[source]
        source: ResponderError,
    },

    /// A lifecycle step was requested from the wrong state.
    #[error("cannot {step} a record group in state {state:?}")]
    InvalidTransition { step: PublishStep, state: GroupState },

    /// A watch stream terminated with an error.
    #[error("watch stream for {kind} failed: {message}")]
    Watch { kind: String, message: String },
}
