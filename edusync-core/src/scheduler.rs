//! Periodic automatic backups to a [`BackupTarget`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use crate::backup::{backup_file_name, export_json, BackupTarget, DriveError};
use crate::mirror::{
    MirrorError, Settings, AUTO_BACKUP_ENABLED_KEY, AUTO_BACKUP_FREQUENCY_KEY, LAST_BACKUP_KEY,
};
use crate::snapshot::DataSnapshot;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupFrequency {
    #[default]
    Weekly,
    Monthly,
}

impl BackupFrequency {
    pub fn period(&self) -> ChronoDuration {
        match self {
            BackupFrequency::Weekly => ChronoDuration::days(7),
            BackupFrequency::Monthly => ChronoDuration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupFrequency::Weekly => "weekly",
            BackupFrequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for BackupFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackupFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(BackupFrequency::Weekly),
            "monthly" => Ok(BackupFrequency::Monthly),
            other => Err(format!("Unknown backup frequency '{other}'. Use weekly or monthly.")),
        }
    }
}

/// Auto-backup settings, persisted in the settings table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoBackupConfig {
    pub enabled: bool,
    pub frequency: BackupFrequency,
    pub last_backup: Option<DateTime<Utc>>,
}

impl AutoBackupConfig {
    pub async fn load(settings: &Settings) -> Result<Self, MirrorError> {
        let enabled = settings
            .get(AUTO_BACKUP_ENABLED_KEY)
            .await?
            .is_some_and(|v| v == "true");
        let frequency = match settings.get(AUTO_BACKUP_FREQUENCY_KEY).await? {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                BackupFrequency::default()
            }),
            None => BackupFrequency::default(),
        };
        let last_backup = settings
            .get(LAST_BACKUP_KEY)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));
        Ok(Self {
            enabled,
            frequency,
            last_backup,
        })
    }

    /// Persists the enabled flag and frequency. The last-backup time is only
    /// written by a successful backup.
    pub async fn save(&self, settings: &Settings) -> Result<(), MirrorError> {
        settings
            .set(AUTO_BACKUP_ENABLED_KEY, if self.enabled { "true" } else { "false" })
            .await?;
        settings
            .set(AUTO_BACKUP_FREQUENCY_KEY, self.frequency.as_str())
            .await
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_backup {
            None => true,
            Some(last) => now - last >= self.frequency.period(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Disabled,
    /// Checked less than one interval ago, or a check is already running
    Throttled,
    NotDue,
    BackedUp(String),
    AuthorizationRequired,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

struct SchedulerInner {
    state: SchedulerState,
    last_check: Option<DateTime<Utc>>,
}

pub struct AutoBackupScheduler {
    settings: Settings,
    target: Arc<dyn BackupTarget>,
    check_interval: Duration,
    inner: Mutex<SchedulerInner>,
}

impl AutoBackupScheduler {
    pub fn new(settings: Settings, target: Arc<dyn BackupTarget>) -> Self {
        Self {
            settings,
            target,
            check_interval: DEFAULT_CHECK_INTERVAL,
            inner: Mutex::new(SchedulerInner {
                state: SchedulerState::Idle,
                last_check: None,
            }),
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub async fn state(&self) -> SchedulerState {
        self.inner.lock().await.state
    }

    /// Backs `snapshot` up if auto-backup is enabled and due.
    pub async fn check(&self, snapshot: &DataSnapshot, now: DateTime<Utc>) -> CheckOutcome {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == SchedulerState::Running {
                return CheckOutcome::Throttled;
            }
            let interval = ChronoDuration::from_std(self.check_interval)
                .unwrap_or_else(|_| ChronoDuration::hours(1));
            if inner.last_check.is_some_and(|last| now - last < interval) {
                return CheckOutcome::Throttled;
            }
            inner.last_check = Some(now);
            inner.state = SchedulerState::Running;
        }

        let outcome = self.backup_if_due(snapshot, now).await;
        self.inner.lock().await.state = SchedulerState::Idle;
        outcome
    }

    async fn backup_if_due(&self, snapshot: &DataSnapshot, now: DateTime<Utc>) -> CheckOutcome {
        let config = match AutoBackupConfig::load(&self.settings).await {
            Ok(config) => config,
            Err(e) => return CheckOutcome::Failed(e.to_string()),
        };
        if !config.enabled {
            return CheckOutcome::Disabled;
        }
        if !config.is_due(now) {
            return CheckOutcome::NotDue;
        }

        let contents = match export_json(snapshot) {
            Ok(contents) => contents,
            Err(e) => return CheckOutcome::Failed(e.to_string()),
        };
        let name = backup_file_name(now);
        match self.target.upload(&name, contents.into_bytes()).await {
            Ok(file) => {
                if let Err(e) = self.settings.set(LAST_BACKUP_KEY, &now.to_rfc3339()).await {
                    tracing::warn!("Backup uploaded but its time was not saved: {}", e);
                }
                tracing::info!("Automatic backup {} complete", file.name);
                CheckOutcome::BackedUp(file.name)
            }
            Err(DriveError::AuthorizationRequired) => {
                tracing::warn!(
                    "Automatic backup skipped: cloud storage needs authorization. Run 'edusync backup upload' after setting a token."
                );
                CheckOutcome::AuthorizationRequired
            }
            Err(e) => {
                tracing::warn!("Automatic backup failed: {}", e);
                CheckOutcome::Failed(e.to_string())
            }
        }
    }

    /// Checks on every interval tick against the latest published snapshot.
    /// Never returns.
    pub async fn run(&self, snapshots: watch::Receiver<Arc<DataSnapshot>>) {
        let mut ticker = tokio::time::interval(self.check_interval);
        loop {
            ticker.tick().await;
            let snapshot = snapshots.borrow().clone();
            let outcome = self.check(&snapshot, Utc::now()).await;
            tracing::debug!("Auto-backup check: {:?}", outcome);
        }
    }
}
