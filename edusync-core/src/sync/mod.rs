//! Sync orchestrator.
//!
//! A pass fetches everything the session can see in dependency order:
//!
//! 1. reference tables (schools, classes, subjects, exams, fee heads, events,
//!    recent activity logs, the user's notifications), concurrently
//! 2. profiles
//! 3. students
//! 4. fee challans, attendance and results for those students, concurrently
//!
//! The result is committed to the observable snapshot in one step once every
//! fetch has succeeded. In offline mode the snapshot is then mirrored to the
//! local store; mirror failures are logged and reported but never fail the
//! pass.
//!
//! Passes are serialized. A caller that arrives while a pass is running
//! waits, and takes the outcome of a pass for the same scope that started
//! after it arrived instead of running another one.

mod error;
mod status;

pub use error::SyncError;
pub use status::{SyncReport, SyncStatus};

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::gateway::{fetch_decoded, Decoded, GatewayError, QueryGateway, Statement};
use crate::mirror::MirrorStore;
use crate::models::{
    ActivityLog, Attendance, Class, EntityKind, Exam, ExamResult, FeeChallan, FeeHead,
    Notification, School, SchoolEvent, Student, Subject, User,
};
use crate::session::{Session, SyncScope, PROFILE_COLUMNS};
use crate::snapshot::DataSnapshot;

struct CompletedPass {
    seq: u64,
    scope: SyncScope,
    outcome: Result<SyncReport, SyncError>,
}

pub struct Synchronizer {
    gateway: Arc<dyn QueryGateway>,
    mirror: Option<MirrorStore>,
    snapshot: watch::Sender<Arc<DataSnapshot>>,
    status: watch::Sender<SyncStatus>,
    last_pass: Mutex<Option<CompletedPass>>,
    started: AtomicU64,
}

impl Synchronizer {
    /// Online-mode synchronizer: nothing is mirrored.
    pub fn new(gateway: Arc<dyn QueryGateway>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(DataSnapshot::default()));
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            gateway,
            mirror: None,
            snapshot,
            status,
            last_pass: Mutex::new(None),
            started: AtomicU64::new(0),
        }
    }

    /// Offline mode: every successful pass is mirrored to `mirror`.
    pub fn with_mirror(mut self, mirror: MirrorStore) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn gateway(&self) -> &Arc<dyn QueryGateway> {
        &self.gateway
    }

    pub fn mirror(&self) -> Option<&MirrorStore> {
        self.mirror.as_ref()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<DataSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<DataSnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Refetches everything visible to `session`.
    pub async fn sync(&self, session: &Session) -> Result<SyncReport, SyncError> {
        let user = session.user().ok_or(SyncError::NotSignedIn)?;
        let scope = session.scope().ok_or(SyncError::NotSignedIn)?;
        if scope.school_id.is_none() && !user.is_owner() {
            return Err(SyncError::NoSchool);
        }

        let arrived = self.started.load(Ordering::SeqCst);
        let mut last_pass = self.last_pass.lock().await;
        if let Some(last) = last_pass.as_ref() {
            if last.seq > arrived && last.scope == scope {
                tracing::debug!("Sharing outcome of sync pass {}", last.seq);
                return last.outcome.clone();
            }
        }

        let seq = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self.run_pass(&scope).await;
        *last_pass = Some(CompletedPass {
            seq,
            scope,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Loads the local mirror into the snapshot. Returns the number of
    /// records loaded; `0` when there is no mirror or it is empty.
    pub async fn hydrate_from_mirror(&self) -> Result<usize, SyncError> {
        let Some(mirror) = &self.mirror else {
            return Ok(0);
        };
        let snapshot = mirror
            .load_snapshot()
            .await
            .map_err(|e| SyncError::Mirror(e.to_string()))?;
        if snapshot.is_empty() {
            return Ok(0);
        }
        let total = EntityKind::ALL
            .iter()
            .map(|k| snapshot.count(*k))
            .sum();
        self.snapshot.send_replace(Arc::new(snapshot));
        tracing::info!("Loaded {} records from the local mirror", total);
        Ok(total)
    }

    async fn run_pass(&self, scope: &SyncScope) -> Result<SyncReport, SyncError> {
        self.status.send_modify(|s| {
            s.loading = true;
            s.progress = 0;
        });

        match self.fetch_all(scope).await {
            Ok((snapshot, dropped)) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot.send_replace(Arc::clone(&snapshot));
                self.report_progress(95, "Saving");
                let mirrored = self.mirror_snapshot(&snapshot).await;
                let report = SyncReport::new(&snapshot, dropped, mirrored);
                self.status.send_modify(|s| {
                    s.loading = false;
                    s.progress = 100;
                    s.message = "Sync complete".to_string();
                    s.last_sync = Some(report.finished_at);
                    s.error = None;
                    s.initial_load = false;
                });
                tracing::info!("Sync complete: {}", report);
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("Sync failed: {}", e);
                let error = SyncError::from(e);
                self.status.send_modify(|s| {
                    s.loading = false;
                    s.message = "Sync failed".to_string();
                    s.error = Some(error.clone());
                    s.initial_load = false;
                });
                Err(error)
            }
        }
    }

    async fn fetch_all(
        &self,
        scope: &SyncScope,
    ) -> Result<(DataSnapshot, BTreeMap<EntityKind, usize>), GatewayError> {
        let gw = self.gateway.as_ref();
        let school = scope.school_id.as_deref();
        let mut dropped = BTreeMap::new();

        self.report_progress(5, "Fetching school data");
        let schools_query = Statement::new("SELECT * FROM schools ORDER BY name");
        let classes_query = scoped("classes", school, "ORDER BY sort_order, name");
        let subjects_query = scoped("subjects", school, "ORDER BY name");
        let exams_query = scoped("exams", school, "ORDER BY name");
        let fee_heads_query = scoped("fee_heads", school, "ORDER BY name");
        let events_query = scoped("school_events", school, "ORDER BY date DESC");
        let logs_query = scoped("activity_logs", school, "ORDER BY timestamp DESC LIMIT 100");
        let notifications_query = Statement::new(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY timestamp DESC LIMIT 50",
        )
        .bind(scope.user_id.as_str());
        let (schools, classes, subjects, exams, fee_heads, events, logs, notifications) = futures::try_join!(
            fetch_decoded::<School>(gw, &schools_query),
            fetch_decoded::<Class>(gw, &classes_query),
            fetch_decoded::<Subject>(gw, &subjects_query),
            fetch_decoded::<Exam>(gw, &exams_query),
            fetch_decoded::<FeeHead>(gw, &fee_heads_query),
            fetch_decoded::<SchoolEvent>(gw, &events_query),
            fetch_decoded::<ActivityLog>(gw, &logs_query),
            fetch_decoded::<Notification>(gw, &notifications_query),
        )?;

        self.report_progress(35, "Fetching users");
        let users_query = match school {
            Some(id) => Statement::new(format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles \
                 WHERE school_id = $1 OR school_id IS NULL ORDER BY name"
            ))
            .bind(id),
            None => Statement::new(format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY name")),
        };
        let users = fetch_decoded::<User>(gw, &users_query).await?;

        self.report_progress(50, "Fetching students");
        let students_query = scoped("students", school, "ORDER BY name");
        let students = fetch_decoded::<Student>(gw, &students_query).await?;

        let ids: Vec<Value> = students
            .records
            .iter()
            .map(|s| Value::from(s.id.as_str()))
            .collect();
        let (fees, attendance, results) = if ids.is_empty() {
            (Decoded::default(), Decoded::default(), Decoded::default())
        } else {
            self.report_progress(70, "Fetching fees, attendance and results");
            let fees_query = by_students("fee_challans", &ids, "ORDER BY year, due_date");
            let attendance_query = by_students("attendance", &ids, "ORDER BY date");
            let results_query = by_students("results", &ids, "");
            futures::try_join!(
                fetch_decoded::<FeeChallan>(gw, &fees_query),
                fetch_decoded::<Attendance>(gw, &attendance_query),
                fetch_decoded::<ExamResult>(gw, &results_query),
            )?
        };

        let snapshot = DataSnapshot {
            schools: take(&mut dropped, EntityKind::Schools, schools),
            users: take(&mut dropped, EntityKind::Users, users),
            classes: take(&mut dropped, EntityKind::Classes, classes),
            subjects: take(&mut dropped, EntityKind::Subjects, subjects),
            exams: take(&mut dropped, EntityKind::Exams, exams),
            students: take(&mut dropped, EntityKind::Students, students),
            fees: take(&mut dropped, EntityKind::Fees, fees),
            attendance: take(&mut dropped, EntityKind::Attendance, attendance),
            results: take(&mut dropped, EntityKind::Results, results),
            logs: take(&mut dropped, EntityKind::Logs, logs),
            fee_heads: take(&mut dropped, EntityKind::FeeHeads, fee_heads),
            events: take(&mut dropped, EntityKind::Events, events),
            notifications: take(&mut dropped, EntityKind::Notifications, notifications),
        };
        Ok((snapshot, dropped))
    }

    async fn mirror_snapshot(&self, snapshot: &DataSnapshot) -> bool {
        let Some(mirror) = &self.mirror else {
            return false;
        };
        match mirror.write_snapshot(snapshot).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to update local mirror: {}", e);
                false
            }
        }
    }

    fn report_progress(&self, progress: u8, message: &str) {
        tracing::debug!("sync {}%: {}", progress, message);
        self.status.send_modify(|s| {
            s.progress = s.progress.max(progress);
            s.message = message.to_string();
        });
    }
}

fn take<T>(dropped: &mut BTreeMap<EntityKind, usize>, kind: EntityKind, decoded: Decoded<T>) -> Vec<T> {
    dropped.insert(kind, decoded.dropped);
    decoded.records
}

/// `SELECT * FROM <table> [WHERE school_id = $1] <suffix>`
fn scoped(table: &str, school_id: Option<&str>, suffix: &str) -> Statement {
    match school_id {
        Some(id) => {
            Statement::new(format!("SELECT * FROM {table} WHERE school_id = $1 {suffix}")).bind(id)
        }
        None => Statement::new(format!("SELECT * FROM {table} {suffix}")),
    }
}

fn by_students(table: &str, ids: &[Value], suffix: &str) -> Statement {
    Statement::new(format!(
        "SELECT * FROM {table} WHERE student_id = ANY($1) {suffix}"
    ))
    .bind(Value::Array(ids.to_vec()))
}
