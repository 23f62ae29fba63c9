//! The in-memory picture of everything the current actor can see.

use serde::{Deserialize, Serialize};

use crate::models::{
    ActivityLog, Attendance, Class, EntityKind, Exam, ExamResult, FeeChallan, FeeHead,
    Notification, School, SchoolEvent, Student, Subject, User,
};

/// One collection per entity kind. Serialized as the export document: one
/// camelCase array field per kind. Missing fields deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSnapshot {
    pub schools: Vec<School>,
    pub users: Vec<User>,
    pub classes: Vec<Class>,
    pub subjects: Vec<Subject>,
    pub exams: Vec<Exam>,
    pub students: Vec<Student>,
    pub fees: Vec<FeeChallan>,
    pub attendance: Vec<Attendance>,
    pub results: Vec<ExamResult>,
    pub logs: Vec<ActivityLog>,
    pub fee_heads: Vec<FeeHead>,
    pub events: Vec<SchoolEvent>,
    /// Per-user inbox; never part of an export document.
    #[serde(skip)]
    pub notifications: Vec<Notification>,
}

impl DataSnapshot {
    pub fn school(&self, id: &str) -> Option<&School> {
        self.schools.iter().find(|s| s.id == id)
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn challan(&self, id: &str) -> Option<&FeeChallan> {
        self.fees.iter().find(|f| f.id == id)
    }

    pub fn fee_head(&self, id: &str) -> Option<&FeeHead> {
        self.fee_heads.iter().find(|h| h.id == id)
    }

    pub fn class(&self, id: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.id == id)
    }

    /// Students that are not soft-deleted, left or graduated.
    pub fn active_students(&self) -> impl Iterator<Item = &Student> {
        self.students.iter().filter(|s| s.is_active())
    }

    pub fn challans_for<'a>(&'a self, student_id: &'a str) -> impl Iterator<Item = &'a FeeChallan> {
        self.fees.iter().filter(move |f| f.student_id == student_id)
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Schools => self.schools.len(),
            EntityKind::Users => self.users.len(),
            EntityKind::Classes => self.classes.len(),
            EntityKind::Subjects => self.subjects.len(),
            EntityKind::Exams => self.exams.len(),
            EntityKind::FeeHeads => self.fee_heads.len(),
            EntityKind::Events => self.events.len(),
            EntityKind::Logs => self.logs.len(),
            EntityKind::Notifications => self.notifications.len(),
            EntityKind::Students => self.students.len(),
            EntityKind::Fees => self.fees.len(),
            EntityKind::Attendance => self.attendance.len(),
            EntityKind::Results => self.results.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.iter().all(|k| self.count(*k) == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentStatus;
    use serde_json::json;

    #[test]
    fn test_active_students_excludes_soft_deleted() {
        let mut gone = Student::new("Gone", "2", "c1", "s1");
        gone.status = StudentStatus::Deleted;
        let snapshot = DataSnapshot {
            students: vec![Student::new("Here", "1", "c1", "s1"), gone],
            ..Default::default()
        };
        let names: Vec<_> = snapshot.active_students().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Here"]);
        assert_eq!(snapshot.count(EntityKind::Students), 2);
    }

    #[test]
    fn test_export_shape_uses_camel_case_arrays() {
        let snapshot = DataSnapshot {
            fee_heads: vec![FeeHead::new("Tuition Fee", 1000.0, "s1")],
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value["feeHeads"].is_array());
        assert!(value["fees"].is_array());
        assert!(value.get("notifications").is_none());
    }

    #[test]
    fn test_missing_arrays_are_empty() {
        let snapshot: DataSnapshot = serde_json::from_value(json!({"schools": []})).unwrap();
        assert!(snapshot.is_empty());
    }
}
