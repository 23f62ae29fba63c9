//! Export, restore and cloud backup commands.

use chrono::Utc;
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use edusync_core::backup::{self, backup_file_name, export_json, parse_backup};
use edusync_core::{
    AutoBackupConfig, AutoBackupScheduler, BackupFrequency, BackupTarget, CheckOutcome,
    DriveClient, DriveError,
};

use crate::commands::confirm;
use crate::context::AppContext;
use crate::error::CliError;

/// Export, restore and cloud backups
#[derive(Args)]
pub struct BackupCommand {
    #[command(subcommand)]
    command: BackupSubcommand,
}

#[derive(Subcommand)]
enum BackupSubcommand {
    /// Write the current data to a JSON file
    Export {
        /// Output path (default: ./edusync_backup_<timestamp>.json)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Restore records from a JSON export
    Restore {
        file: PathBuf,
        #[arg(long)]
        yes: bool,
    },

    /// Upload a backup to cloud storage
    Upload,

    /// List backups in cloud storage
    List,

    /// Restore a backup from cloud storage
    RestoreCloud {
        id: String,
        #[arg(long)]
        yes: bool,
    },

    /// Run the auto-backup check once, or keep running with --watch
    Auto {
        #[arg(long)]
        watch: bool,
    },

    /// Configure automatic backups
    Configure {
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// weekly or monthly
        #[arg(long)]
        frequency: Option<String>,
    },
}

impl BackupCommand {
    pub async fn run(&self, ctx: &AppContext) -> Result<(), CliError> {
        match &self.command {
            BackupSubcommand::Export { output } => {
                let sync = ctx.synchronizer()?;
                let snapshot = ctx.load_snapshot(&sync).await?;
                let path = output
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(backup_file_name(Utc::now())));
                backup::write_backup_file(&path, &snapshot)?;
                println!("Exported to {}", path.display());
                Ok(())
            }
            BackupSubcommand::Restore { file, yes } => {
                let snapshot = backup::read_backup_file(file)?;
                confirm(
                    &format!("Restore {} into the database? Existing records with the same ids are overwritten.", file.display()),
                    *yes,
                )?;
                let sync = ctx.synchronizer()?;
                let summary = backup::restore(&sync, &ctx.session, &snapshot).await?;
                println!("{}", summary);
                Ok(())
            }
            BackupSubcommand::Upload => {
                let drive = self.drive(ctx)?;
                let sync = ctx.synchronizer()?;
                let snapshot = ctx.load_snapshot(&sync).await?;
                let name = backup_file_name(Utc::now());
                let file = drive
                    .upload(&name, export_json(&snapshot)?.into_bytes())
                    .await?;
                ctx.settings()
                    .set(edusync_core::mirror::LAST_BACKUP_KEY, &Utc::now().to_rfc3339())
                    .await?;
                println!("Uploaded {} ({})", file.name, file.id);
                Ok(())
            }
            BackupSubcommand::List => {
                let files = self.drive(ctx)?.list().await?;
                if files.is_empty() {
                    println!("No backups found.");
                }
                for file in files {
                    println!(
                        "{}  {}  {}",
                        file.id,
                        file.name,
                        file.created_time.unwrap_or_default()
                    );
                }
                Ok(())
            }
            BackupSubcommand::RestoreCloud { id, yes } => {
                let bytes = self.drive(ctx)?.download(id).await?;
                let contents = String::from_utf8(bytes)
                    .map_err(|e| CliError::Backup(backup::BackupError::Malformed(e.to_string())))?;
                let snapshot = parse_backup(&contents)?;
                confirm(
                    "Restore this backup into the database? Existing records with the same ids are overwritten.",
                    *yes,
                )?;
                let sync = ctx.synchronizer()?;
                let summary = backup::restore(&sync, &ctx.session, &snapshot).await?;
                println!("{}", summary);
                Ok(())
            }
            BackupSubcommand::Auto { watch } => self.auto(ctx, *watch).await,
            BackupSubcommand::Configure {
                enable,
                disable,
                frequency,
            } => {
                let settings = ctx.settings();
                let mut config = AutoBackupConfig::load(&settings).await?;
                if *enable {
                    config.enabled = true;
                }
                if *disable {
                    config.enabled = false;
                }
                if let Some(frequency) = frequency {
                    config.frequency = frequency
                        .parse::<BackupFrequency>()
                        .map_err(CliError::Input)?;
                }
                config.save(&settings).await?;
                println!(
                    "Auto-backup {} ({}).",
                    if config.enabled { "enabled" } else { "disabled" },
                    config.frequency
                );
                match config.last_backup {
                    Some(last) => println!("Last backup: {}", last.to_rfc3339()),
                    None => println!("Last backup: never"),
                }
                Ok(())
            }
        }
    }

    fn drive(&self, ctx: &AppContext) -> Result<DriveClient, CliError> {
        let drive = &ctx.config.drive;
        if !drive.is_configured() {
            return Err(CliError::Drive(DriveError::AuthorizationRequired));
        }
        Ok(DriveClient::new(
            drive.access_token.clone(),
            drive.api_base.as_deref(),
        ))
    }

    async fn auto(&self, ctx: &AppContext, watch: bool) -> Result<(), CliError> {
        let target: Arc<dyn BackupTarget> = Arc::new(self.drive(ctx)?);
        let interval = Duration::from_secs(ctx.config.backup.check_interval_minutes.max(1) * 60);
        let scheduler =
            AutoBackupScheduler::new(ctx.settings(), target).with_check_interval(interval);
        let sync = ctx.synchronizer()?;
        let snapshot = ctx.load_snapshot(&sync).await?;

        if !watch {
            let outcome = scheduler.check(&snapshot, Utc::now()).await;
            print_outcome(&outcome);
            return match outcome {
                CheckOutcome::AuthorizationRequired => {
                    Err(CliError::Drive(DriveError::AuthorizationRequired))
                }
                CheckOutcome::Failed(e) => Err(CliError::Input(format!("Backup failed: {}", e))),
                _ => Ok(()),
            };
        }

        println!(
            "Checking every {} minute(s). Press Ctrl-C to stop.",
            interval.as_secs() / 60
        );
        let snapshots = sync.subscribe_snapshot();
        let session = ctx.session.clone();
        let refresher = {
            let sync = Arc::clone(&sync);
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = sync.sync(&session).await {
                        tracing::warn!("Background sync failed: {}", e);
                    }
                }
            }
        };
        tokio::select! {
            _ = scheduler.run(snapshots) => {}
            _ = refresher => {}
            _ = tokio::signal::ctrl_c() => println!("Stopped."),
        }
        Ok(())
    }
}

fn print_outcome(outcome: &CheckOutcome) {
    match outcome {
        CheckOutcome::Disabled => {
            println!("Auto-backup is disabled. Run 'edusync backup configure --enable'.")
        }
        CheckOutcome::Throttled => println!("Checked recently; nothing to do."),
        CheckOutcome::NotDue => println!("No backup due yet."),
        CheckOutcome::BackedUp(name) => println!("Uploaded {}", name),
        CheckOutcome::AuthorizationRequired => {
            println!("Cloud storage needs authorization.")
        }
        CheckOutcome::Failed(e) => println!("Backup failed: {}", e),
    }
}
