//! Sync error types.

use crate::gateway::GatewayError;

/// Errors that end a sync pass. Cloneable so a coalesced pass can hand the
/// same outcome to every waiting caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// No user is signed in
    #[error("Not signed in. Run 'edusync login' first.")]
    NotSignedIn,
    /// A non-owner profile without a school has nothing to sync
    #[error("Your profile is not assigned to a school.")]
    NoSchool,
    /// A fetch failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The local mirror could not be read
    #[error("Mirror error: {0}")]
    Mirror(String),
}
