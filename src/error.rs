//! Error taxonomy for host selection.
//!
//! Three classes of failure exist in this crate:
//! - **Fatal**: configuration that can never work (an empty endpoint list, a
//!   malformed `host:port` spec). Construction and updates fail loudly.
//! - **Transient**: a candidate could not be resolved right now, or a source
//!   fetch failed. Traversal skips forward; refresh retries on the next tick.
//! - **Interrupted**: the owning client is shutting down. Propagates out of
//!   any blocked wait, never swallowed.

use snafu::{Location, Snafu};

use crate::{resolve::ResolveError, source::SourceError};

/// Result type alias for host provider operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors produced by host providers and their collaborators.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HostError {
    /// Configuration that can never produce a working provider.
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfiguration {
        /// What was wrong with the configuration.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A candidate hostname could not be resolved.
    ///
    /// Non-fatal: traversal treats the candidate as currently unusable and
    /// moves to the next one in permutation order.
    #[snafu(display("Failed to resolve {host}: {source}"))]
    Resolution {
        /// The hostname that failed to resolve.
        host: String,
        /// Underlying resolution error.
        source: ResolveError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A blocked wait was cancelled by the owning client's shutdown path.
    #[snafu(display("Interrupted by shutdown"))]
    Interrupted,

    /// An endpoint source fetch failed.
    ///
    /// Non-fatal to the provider: the previous endpoint set stays in effect
    /// and the refresh task retries at its next tick.
    #[snafu(display("Endpoint source error: {source}"))]
    Source {
        /// Underlying source error.
        source: SourceError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },
}

impl HostError {
    /// Returns true if the error means the provider cannot function at all.
    ///
    /// Fatal errors require operator intervention (fix the configuration);
    /// everything else is a transient condition or a shutdown signal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidConfiguration { .. } => true,
            Self::Resolution { .. } | Self::Interrupted | Self::Source { .. } => false,
        }
    }

    /// Returns true if the error is a cancellation signal.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
