//! Typed error enums for the `oaskit` library API.
//!
//! Library consumers can match on specific variants. The CLI (`main.rs`)
//! converts these to `anyhow::Error` at the binary boundary for richer
//! context messages.

use oaskit_core::WalkError;

/// Errors produced by `oaskit` document operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// File I/O failure (reading config or document files).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error(transparent)]
    Yaml(#[from] serde_yaml_ng::Error),

    /// The walk was cancelled.
    #[error(transparent)]
    Walk(#[from] WalkError),

    /// An external reference could not be fetched, parsed, or evaluated.
    ///
    /// The operation is aborted; the document may be partially mutated.
    #[error("failed to resolve reference '{reference}'")]
    Resolution {
        /// The reference as written in the document.
        reference: String,
        /// Underlying failure.
        #[source]
        source: ResolveError,
    },

    /// A localized file could not be written.
    #[error("failed to write '{path}'")]
    Write {
        /// Target path.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Invalid options, reported before any traversal begins.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures of the resolution collaborator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// Filesystem read failure.
    #[error("cannot read '{path}'")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// HTTP fetch failure, or HTTP support not enabled.
    #[error("cannot fetch '{url}': {message}")]
    Http {
        /// URL that was fetched.
        url: String,
        /// Failure description.
        message: String,
    },

    /// The fetched content is not valid YAML or JSON.
    #[error("cannot parse '{location}'")]
    Parse {
        /// Document location.
        location: String,
        /// Underlying parse failure.
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// The JSON-pointer fragment does not exist in the target document.
    #[error("fragment '#{fragment}' not found in '{location}'")]
    FragmentNotFound {
        /// Document location.
        location: String,
        /// Pointer that failed to evaluate (without `#`).
        fragment: String,
    },

    /// The reference or its base location is not a valid URL or path.
    #[error("invalid reference location: {0}")]
    InvalidUrl(String),

    /// Cancelled before or during I/O.
    #[error(transparent)]
    Cancelled(#[from] WalkError),
}

/// Convenience alias used throughout the library's public API.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time assertion that the error types are `Send + Sync`.
    const _: () = {
        const fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
        assert_send_sync::<ResolveError>();
    };

    #[test]
    fn resolution_error_keeps_reference_and_cause() {
        let err = Error::Resolution {
            reference: "./missing.yaml#/Pet".to_string(),
            source: ResolveError::FragmentNotFound {
                location: "specs/missing.yaml".to_string(),
                fragment: "/Pet".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "failed to resolve reference './missing.yaml#/Pet'"
        );
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("fragment '#/Pet' not found in 'specs/missing.yaml'")
        );
    }
}
