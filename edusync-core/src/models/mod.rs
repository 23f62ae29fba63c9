pub mod academic;
pub mod activity;
pub mod coerce;
pub mod fee;
pub mod school;
pub mod student;
pub mod user;

pub use academic::{Attendance, AttendanceStatus, Class, Exam, ExamResult, Subject};
pub use activity::{ActivityLog, Notification, SchoolEvent};
pub use fee::{ChallanStatus, FeeChallan, FeeHead, FeeItem, PaymentRecord, PaymentUpdate};
pub use school::School;
pub use student::{FeeStructureItem, Student, StudentStatus};
pub use user::{User, UserRole, UserStatus};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Every entity kind the data layer fetches, mirrors and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Schools,
    Users,
    Classes,
    Subjects,
    Exams,
    FeeHeads,
    Events,
    Logs,
    Notifications,
    Students,
    Fees,
    Attendance,
    Results,
}

impl EntityKind {
    pub const ALL: [EntityKind; 13] = [
        EntityKind::Schools,
        EntityKind::Users,
        EntityKind::Classes,
        EntityKind::Subjects,
        EntityKind::Exams,
        EntityKind::FeeHeads,
        EntityKind::Events,
        EntityKind::Logs,
        EntityKind::Notifications,
        EntityKind::Students,
        EntityKind::Fees,
        EntityKind::Attendance,
        EntityKind::Results,
    ];

    /// Table name in the remote database.
    pub fn remote_table(&self) -> &'static str {
        match self {
            EntityKind::Schools => "schools",
            EntityKind::Users => "profiles",
            EntityKind::Classes => "classes",
            EntityKind::Subjects => "subjects",
            EntityKind::Exams => "exams",
            EntityKind::FeeHeads => "fee_heads",
            EntityKind::Events => "school_events",
            EntityKind::Logs => "activity_logs",
            EntityKind::Notifications => "notifications",
            EntityKind::Students => "students",
            EntityKind::Fees => "fee_challans",
            EntityKind::Attendance => "attendance",
            EntityKind::Results => "results",
        }
    }

    /// Table name in the local mirror database.
    pub fn mirror_table(&self) -> &'static str {
        match self {
            EntityKind::Schools => "mirror_schools",
            EntityKind::Users => "mirror_users",
            EntityKind::Classes => "mirror_classes",
            EntityKind::Subjects => "mirror_subjects",
            EntityKind::Exams => "mirror_exams",
            EntityKind::FeeHeads => "mirror_fee_heads",
            EntityKind::Events => "mirror_events",
            EntityKind::Logs => "mirror_logs",
            EntityKind::Notifications => "mirror_notifications",
            EntityKind::Students => "mirror_students",
            EntityKind::Fees => "mirror_fees",
            EntityKind::Attendance => "mirror_attendance",
            EntityKind::Results => "mirror_results",
        }
    }

    /// Whether the kind can be written back from an export file.
    ///
    /// Logs and notifications are append-only audit data and are not restored.
    pub fn is_restorable(&self) -> bool {
        !matches!(self, EntityKind::Logs | EntityKind::Notifications)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.remote_table())
    }
}

/// A record that lives in one remote table and one mirror table.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

macro_rules! impl_entity {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Entity for $ty {
                const KIND: EntityKind = EntityKind::$kind;

                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

impl_entity! {
    School => Schools,
    User => Users,
    Class => Classes,
    Subject => Subjects,
    Exam => Exams,
    FeeHead => FeeHeads,
    SchoolEvent => Events,
    ActivityLog => Logs,
    Notification => Notifications,
    Student => Students,
    FeeChallan => Fees,
    Attendance => Attendance,
    ExamResult => Results,
}

/// Generates a new opaque record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_names_are_unique() {
        let remote: HashSet<_> = EntityKind::ALL.iter().map(|k| k.remote_table()).collect();
        let mirror: HashSet<_> = EntityKind::ALL.iter().map(|k| k.mirror_table()).collect();
        assert_eq!(remote.len(), EntityKind::ALL.len());
        assert_eq!(mirror.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_new_id_is_unique() {
        assert_ne!(new_id(), new_id());
    }
}
