//! Error types shared by the reference and walking primitives.

/// A `$ref` string that cannot be classified.
///
/// Engines treat this as "skip this reference" rather than aborting the walk:
/// many documents carry benign references that never need resolving.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReferenceError {
    /// The reference string is empty or whitespace.
    #[error("empty reference")]
    Empty,

    /// The reference is structurally malformed (e.g. more than one `#`).
    #[error("malformed reference '{reference}': {reason}")]
    Malformed {
        /// The offending reference text.
        reference: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The reference looks like a URL but does not parse as one.
    #[error("invalid URL in reference '{reference}'")]
    Url {
        /// The offending reference text.
        reference: String,
        /// Underlying parse failure.
        #[source]
        source: url::ParseError,
    },
}

/// Errors raised by the document walker itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WalkError {
    /// The walk observed a cancelled [`CancelToken`](crate::CancelToken).
    #[error("operation cancelled")]
    Cancelled,
}
