//! Errors surfaced by CLI commands.

use edusync_core::{
    AuthError, BackupError, DriveError, GatewayError, MirrorError, MutationError, SyncError,
};

use crate::config::ConfigError;

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Gateway(GatewayError),
    Mirror(MirrorError),
    Auth(AuthError),
    Sync(SyncError),
    Mutation(MutationError),
    Backup(BackupError),
    Drive(DriveError),
    /// Bad command-line input
    Input(String),
    /// Destructive action not confirmed
    Aborted,
    Io(std::io::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Gateway(e) => write!(f, "{}", e),
            CliError::Mirror(e) => write!(f, "{}", e),
            CliError::Auth(e) => write!(f, "{}", e),
            CliError::Sync(e) => write!(f, "Sync failed: {}", e),
            CliError::Mutation(e) => write!(f, "{}", e),
            CliError::Backup(e) => write!(f, "{}", e),
            CliError::Drive(e) => write!(f, "{}", e),
            CliError::Input(e) => write!(f, "{}", e),
            CliError::Aborted => write!(f, "Aborted."),
            CliError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Gateway(e) => Some(e),
            CliError::Mirror(e) => Some(e),
            CliError::Auth(e) => Some(e),
            CliError::Sync(e) => Some(e),
            CliError::Mutation(e) => Some(e),
            CliError::Backup(e) => Some(e),
            CliError::Drive(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::Input(_) | CliError::Aborted => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<GatewayError> for CliError {
    fn from(e: GatewayError) -> Self {
        CliError::Gateway(e)
    }
}

impl From<MirrorError> for CliError {
    fn from(e: MirrorError) -> Self {
        CliError::Mirror(e)
    }
}

impl From<AuthError> for CliError {
    fn from(e: AuthError) -> Self {
        CliError::Auth(e)
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        CliError::Sync(e)
    }
}

impl From<MutationError> for CliError {
    fn from(e: MutationError) -> Self {
        CliError::Mutation(e)
    }
}

impl From<BackupError> for CliError {
    fn from(e: BackupError) -> Self {
        CliError::Backup(e)
    }
}

impl From<DriveError> for CliError {
    fn from(e: DriveError) -> Self {
        CliError::Drive(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
