//! JSON export and restore of a data snapshot, plus cloud backup targets.
//!
//! An export document is the snapshot serialized as one camelCase array per
//! entity kind. Restoring parses the whole document first; nothing is written
//! unless every record decodes. Records are then upserted by id in one
//! transaction, parents before children, and the session is resynced.
//! A restore by anyone working inside a school is confined to that school:
//! a document holding records of another school is refused as a whole.

mod drive;

pub use drive::{BackupTarget, DriveClient, DriveError, RemoteBackup, DEFAULT_DRIVE_API_BASE};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use crate::gateway::{to_row, GatewayError, Statement};
use crate::models::{EntityKind, UserRole};
use crate::session::Session;
use crate::snapshot::DataSnapshot;
use crate::sync::Synchronizer;

/// Prefix shared by every backup file name.
pub const BACKUP_FILE_PREFIX: &str = "edusync_backup_";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup file is not a valid EduSync export: {0}")]
    Malformed(String),
    #[error("Not signed in. Run 'edusync login' first.")]
    NotSignedIn,
    #[error("Only an Owner or Admin can restore a backup.")]
    NotPermitted,
    #[error("Backup holds {kind} record {id} from outside the current school.")]
    OutOfScope { kind: EntityKind, id: String },
    #[error("Only an Owner can restore Owner account {0}.")]
    OwnerAccount(String),
    #[error("Failed to access {0}: {1}")]
    Io(String, std::io::Error),
    #[error("Failed to encode {0} record: {1}")]
    Encode(EntityKind, String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Drive(#[from] DriveError),
}

/// Serializes a snapshot as a pretty-printed export document.
pub fn export_json(snapshot: &DataSnapshot) -> Result<String, BackupError> {
    serde_json::to_string_pretty(snapshot).map_err(|e| BackupError::Malformed(e.to_string()))
}

/// `edusync_backup_2024-03-01T08-30-00-000Z.json`
pub fn backup_file_name(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{BACKUP_FILE_PREFIX}{stamp}.json")
}

/// Parses an export document. Missing collections are empty; any record that
/// does not decode fails the whole document.
pub fn parse_backup(contents: &str) -> Result<DataSnapshot, BackupError> {
    serde_json::from_str(contents).map_err(|e| BackupError::Malformed(e.to_string()))
}

pub fn read_backup_file(path: &Path) -> Result<DataSnapshot, BackupError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| BackupError::Io(path.display().to_string(), e))?;
    parse_backup(&contents)
}

pub fn write_backup_file(path: &Path, snapshot: &DataSnapshot) -> Result<(), BackupError> {
    let contents = export_json(snapshot)?;
    std::fs::write(path, contents).map_err(|e| BackupError::Io(path.display().to_string(), e))
}

/// Records written per entity kind by a restore.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreSummary {
    pub restored: BTreeMap<EntityKind, usize>,
}

impl RestoreSummary {
    pub fn total(&self) -> usize {
        self.restored.values().sum()
    }
}

impl fmt::Display for RestoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Restored {} records", self.total())?;
        let parts: Vec<String> = self
            .restored
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(kind, n)| format!("{n} {kind}"))
            .collect();
        if !parts.is_empty() {
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Writes every restorable record of `snapshot` back to the remote database
/// and resyncs `session`.
pub async fn restore(
    sync: &Synchronizer,
    session: &Session,
    snapshot: &DataSnapshot,
) -> Result<RestoreSummary, BackupError> {
    let actor = session.user().ok_or(BackupError::NotSignedIn)?;
    let role = session.effective_role().ok_or(BackupError::NotSignedIn)?;
    if !matches!(role, UserRole::Owner | UserRole::Admin) {
        return Err(BackupError::NotPermitted);
    }
    if !actor.is_owner() {
        if let Some(user) = snapshot.users.iter().find(|u| u.is_owner()) {
            return Err(BackupError::OwnerAccount(user.id.clone()));
        }
    }
    match session.effective_school_id() {
        Some(school_id) => check_school_scope(school_id, &sync.snapshot(), snapshot)?,
        None if !actor.is_owner() => return Err(BackupError::NotPermitted),
        None => {}
    }

    let mut statements = Vec::new();
    let mut summary = RestoreSummary::default();
    for kind in EntityKind::ALL.into_iter().filter(EntityKind::is_restorable) {
        let added = match kind {
            EntityKind::Schools => push_upserts(&mut statements, kind, &snapshot.schools)?,
            EntityKind::Users => push_upserts(&mut statements, kind, &snapshot.users)?,
            EntityKind::Classes => push_upserts(&mut statements, kind, &snapshot.classes)?,
            EntityKind::Subjects => push_upserts(&mut statements, kind, &snapshot.subjects)?,
            EntityKind::Exams => push_upserts(&mut statements, kind, &snapshot.exams)?,
            EntityKind::FeeHeads => push_upserts(&mut statements, kind, &snapshot.fee_heads)?,
            EntityKind::Events => push_upserts(&mut statements, kind, &snapshot.events)?,
            EntityKind::Students => push_upserts(&mut statements, kind, &snapshot.students)?,
            EntityKind::Fees => push_upserts(&mut statements, kind, &snapshot.fees)?,
            EntityKind::Attendance => push_upserts(&mut statements, kind, &snapshot.attendance)?,
            EntityKind::Results => push_upserts(&mut statements, kind, &snapshot.results)?,
            EntityKind::Logs | EntityKind::Notifications => 0,
        };
        summary.restored.insert(kind, added);
    }

    if statements.is_empty() {
        return Ok(summary);
    }
    sync.gateway().transaction(&statements).await?;
    tracing::info!("{}", summary);

    if let Err(e) = sync.sync(session).await {
        tracing::warn!("Resync after restore failed: {}", e);
    }
    Ok(summary)
}

/// Every record must belong to `school_id`. Student-owned records must
/// point at a student of the school, from the document or already synced.
fn check_school_scope(
    school_id: &str,
    current: &DataSnapshot,
    document: &DataSnapshot,
) -> Result<(), BackupError> {
    fn ensure<'a>(
        kind: EntityKind,
        records: impl IntoIterator<Item = (&'a str, bool)>,
    ) -> Result<(), BackupError> {
        match records.into_iter().find(|(_, in_scope)| !in_scope) {
            Some((id, _)) => Err(BackupError::OutOfScope {
                kind,
                id: id.to_string(),
            }),
            None => Ok(()),
        }
    }
    let here = |id: &str| id == school_id;

    ensure(EntityKind::Schools, document.schools.iter().map(|r| (r.id.as_str(), here(&r.id))))?;
    ensure(
        EntityKind::Users,
        document
            .users
            .iter()
            .map(|r| (r.id.as_str(), r.school_id.as_deref().is_some_and(here))),
    )?;
    ensure(EntityKind::Classes, document.classes.iter().map(|r| (r.id.as_str(), here(&r.school_id))))?;
    ensure(EntityKind::Subjects, document.subjects.iter().map(|r| (r.id.as_str(), here(&r.school_id))))?;
    ensure(EntityKind::Exams, document.exams.iter().map(|r| (r.id.as_str(), here(&r.school_id))))?;
    ensure(EntityKind::FeeHeads, document.fee_heads.iter().map(|r| (r.id.as_str(), here(&r.school_id))))?;
    ensure(EntityKind::Events, document.events.iter().map(|r| (r.id.as_str(), here(&r.school_id))))?;
    ensure(EntityKind::Students, document.students.iter().map(|r| (r.id.as_str(), here(&r.school_id))))?;

    let students: BTreeSet<&str> = document
        .students
        .iter()
        .chain(current.students.iter().filter(|s| here(&s.school_id)))
        .map(|s| s.id.as_str())
        .collect();
    let enrolled = |id: &str| students.contains(id);
    ensure(EntityKind::Fees, document.fees.iter().map(|r| (r.id.as_str(), enrolled(&r.student_id))))?;
    ensure(
        EntityKind::Attendance,
        document.attendance.iter().map(|r| (r.id.as_str(), enrolled(&r.student_id))),
    )?;
    ensure(EntityKind::Results, document.results.iter().map(|r| (r.id.as_str(), enrolled(&r.student_id))))
}

fn push_upserts<T: Serialize>(
    statements: &mut Vec<Statement>,
    kind: EntityKind,
    records: &[T],
) -> Result<usize, BackupError> {
    for record in records {
        let row = to_row(record).map_err(|e| BackupError::Encode(kind, e.to_string()))?;
        statements.push(Statement::upsert(kind.remote_table(), &row, &["id"])?);
    }
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fee::test_challan;
    use crate::models::{Class, School, Student, User};
    use crate::testing::RecordingGateway;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn admin() -> Session {
        Session::signed_in(User::new(
            "Ayesha",
            "a@example.com",
            UserRole::Admin,
            Some("s1".to_string()),
        ))
    }

    fn sample() -> DataSnapshot {
        let mut school = School::new("Iqra", "Main Road");
        school.id = "s1".into();
        let mut class = Class::new("Grade 1", "s1");
        class.id = "c1".into();
        DataSnapshot {
            schools: vec![school],
            classes: vec![class],
            ..Default::default()
        }
    }

    #[test]
    fn test_backup_file_name() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 5).unwrap();
        assert_eq!(
            backup_file_name(now),
            "edusync_backup_2024-03-01T08-30-05-000Z.json"
        );
    }

    #[test]
    fn test_export_uses_camel_case_collections() {
        let json: serde_json::Value = serde_json::from_str(&export_json(&sample()).unwrap()).unwrap();
        assert!(json.get("feeHeads").is_some());
        assert!(json.get("notifications").is_none());
        assert_eq!(json["classes"][0]["schoolId"], json!("s1"));
    }

    #[test]
    fn test_parse_missing_collections_are_empty() {
        let snapshot = parse_backup(r#"{"schools": [{"id": "s1", "name": "Iqra"}]}"#).unwrap();
        assert_eq!(snapshot.schools.len(), 1);
        assert!(snapshot.students.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_documents() {
        assert!(matches!(parse_backup("not json"), Err(BackupError::Malformed(_))));
        assert!(matches!(
            parse_backup(r#"{"schools": [{"name": "no id"}]}"#),
            Err(BackupError::Malformed(_))
        ));
        assert!(matches!(
            parse_backup(r#"{"students": {}}"#),
            Err(BackupError::Malformed(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("backup.json");
        write_backup_file(&path, &sample()).unwrap();
        assert_eq!(read_backup_file(&path).unwrap(), sample());
    }

    #[tokio::test]
    async fn test_restore_upserts_parents_first_in_one_transaction() {
        let gateway = RecordingGateway::new();
        let sync = Synchronizer::new(Arc::new(gateway.clone()));

        let summary = restore(&sync, &admin(), &sample()).await.unwrap();
        assert_eq!(summary.total(), 2);

        let batch = &gateway.transactions()[0];
        assert_eq!(batch.len(), 2);
        assert!(batch[0].text().starts_with("INSERT INTO schools"));
        assert!(batch[0].text().contains("ON CONFLICT (id) DO UPDATE"));
        assert!(batch[1].text().contains("school_id"));
        // Resync follows the write.
        assert!(gateway.count_matching("FROM students") > 0);
    }

    #[tokio::test]
    async fn test_restore_requires_admin() {
        let gateway = RecordingGateway::new();
        let sync = Synchronizer::new(Arc::new(gateway.clone()));
        let teacher = Session::signed_in(User::new(
            "T",
            "t@example.com",
            UserRole::Teacher,
            Some("s1".to_string()),
        ));
        assert!(matches!(
            restore(&sync, &teacher, &sample()).await,
            Err(BackupError::NotPermitted)
        ));
        assert!(matches!(
            restore(&sync, &Session::anonymous(), &sample()).await,
            Err(BackupError::NotSignedIn)
        ));
        assert!(gateway.statements().is_empty());
    }

    #[tokio::test]
    async fn test_restore_refuses_records_of_another_school() {
        let gateway = RecordingGateway::new();
        let sync = Synchronizer::new(Arc::new(gateway.clone()));

        let mut foreign_class = sample();
        foreign_class.classes[0].school_id = "s2".into();
        assert!(matches!(
            restore(&sync, &admin(), &foreign_class).await,
            Err(BackupError::OutOfScope { kind: EntityKind::Classes, .. })
        ));

        let mut foreign_school = sample();
        foreign_school.schools[0].id = "s2".into();
        assert!(matches!(
            restore(&sync, &admin(), &foreign_school).await,
            Err(BackupError::OutOfScope { kind: EntityKind::Schools, .. })
        ));

        let mut stray_fee = sample();
        stray_fee.fees.push(test_challan("f1", "st9", 500.0, 0.0));
        assert!(matches!(
            restore(&sync, &admin(), &stray_fee).await,
            Err(BackupError::OutOfScope { kind: EntityKind::Fees, .. })
        ));
        assert!(gateway.statements().is_empty());
    }

    #[tokio::test]
    async fn test_restore_accepts_fees_of_documented_students() {
        let gateway = RecordingGateway::new();
        let sync = Synchronizer::new(Arc::new(gateway.clone()));
        let mut doc = sample();
        let mut student = Student::new("Ali", "7", "c1", "s1");
        student.id = "st1".into();
        doc.students.push(student);
        doc.fees.push(test_challan("f1", "st1", 500.0, 0.0));

        let summary = restore(&sync, &admin(), &doc).await.unwrap();
        assert_eq!(summary.total(), 4);
    }

    #[tokio::test]
    async fn test_restoring_owner_accounts_needs_an_owner() {
        let gateway = RecordingGateway::new();
        let sync = Synchronizer::new(Arc::new(gateway.clone()));
        let mut doc = sample();
        doc.users
            .push(User::new("Mallory", "m@example.com", UserRole::Owner, Some("s1".to_string())));

        assert!(matches!(
            restore(&sync, &admin(), &doc).await,
            Err(BackupError::OwnerAccount(_))
        ));
        assert!(gateway.statements().is_empty());

        let owner = Session::signed_in(User::new("O", "o@example.com", UserRole::Owner, None));
        let summary = restore(&sync, &owner, &doc).await.unwrap();
        assert_eq!(summary.restored[&EntityKind::Users], 1);
    }

    #[tokio::test]
    async fn test_admin_without_school_cannot_restore() {
        let gateway = RecordingGateway::new();
        let sync = Synchronizer::new(Arc::new(gateway.clone()));
        let stray = Session::signed_in(User::new("A", "a@example.com", UserRole::Admin, None));
        assert!(matches!(
            restore(&sync, &stray, &sample()).await,
            Err(BackupError::NotPermitted)
        ));
    }

    #[tokio::test]
    async fn test_restore_empty_document_writes_nothing() {
        let gateway = RecordingGateway::new();
        let sync = Synchronizer::new(Arc::new(gateway.clone()));
        let summary = restore(&sync, &admin(), &DataSnapshot::default()).await.unwrap();
        assert_eq!(summary.total(), 0);
        assert!(gateway.transactions().is_empty());
    }
}
