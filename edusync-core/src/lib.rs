//! EduSync Core Library
//!
//! Data layer for the EduSync school administration system: entity models,
//! the remote SQL gateway, the sync orchestrator with its local mirror,
//! mutations, sessions and backups.

pub mod backup;
pub mod case;
pub mod gateway;
pub mod mirror;
pub mod models;
pub mod mutations;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod sync;

#[cfg(test)]
mod testing;

pub use backup::{BackupError, BackupTarget, DriveClient, DriveError, RemoteBackup, RestoreSummary};
pub use gateway::{GatewayError, HttpGateway, QueryGateway, Row, Statement};
pub use mirror::{MirrorError, MirrorStore, Settings};
pub use models::{
    ActivityLog, Attendance, AttendanceStatus, ChallanStatus, Class, EntityKind, Exam, ExamResult,
    FeeChallan, FeeHead, FeeItem, Notification, PaymentRecord, School, SchoolEvent, Student,
    StudentStatus, Subject, User, UserRole, UserStatus,
};
pub use mutations::{MutationError, Mutations};
pub use scheduler::{AutoBackupConfig, AutoBackupScheduler, BackupFrequency, CheckOutcome};
pub use session::{AuthError, AuthService, Session, SyncScope};
pub use snapshot::DataSnapshot;
pub use sync::{SyncError, SyncReport, SyncStatus, Synchronizer};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
