use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod context;
mod error;

use commands::{
    BackupCommand, CacheCommand, ConfigCommand, FeeCommand, LoginCommand, PasswdCommand,
    RegisterCommand, SchoolCommand, StudentCommand, SyncCommand,
};
use config::Config;
use context::AppContext;
use error::CliError;

#[derive(Parser)]
#[command(name = "edusync")]
#[command(version)]
#[command(about = "School administration data sync and cache", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in
    Login(LoginCommand),

    /// Sign out and forget the saved session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Request a new account
    Register(RegisterCommand),

    /// Change your password
    Passwd(PasswdCommand),

    /// Fetch everything visible to the signed-in user
    Sync(SyncCommand),

    /// Manage the local cache
    Cache(CacheCommand),

    /// Manage schools
    School(SchoolCommand),

    /// Manage students
    Student(StudentCommand),

    /// Manage fee challans
    Fee(FeeCommand),

    /// Export, restore and cloud backups
    Backup(BackupCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edusync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(execute_command(&cli.command, &config, cli_config_path))?;
    Ok(())
}

async fn execute_command(
    command: &Option<Commands>,
    config: &Config,
    cli_config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let Some(command) = command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    if let Commands::Config(cmd) = command {
        return cmd.run(config, cli_config_path);
    }

    let mut ctx = AppContext::open(config).await?;
    match command {
        Commands::Login(cmd) => cmd.run(&mut ctx).await,
        Commands::Logout => commands::logout(&mut ctx).await,
        Commands::Whoami => commands::whoami(&ctx),
        Commands::Register(cmd) => cmd.run(&ctx).await,
        Commands::Passwd(cmd) => cmd.run(&ctx).await,
        Commands::Sync(cmd) => cmd.run(&ctx).await,
        Commands::Cache(cmd) => cmd.run(&ctx).await,
        Commands::School(cmd) => cmd.run(&mut ctx).await,
        Commands::Student(cmd) => cmd.run(&ctx).await,
        Commands::Fee(cmd) => cmd.run(&ctx).await,
        Commands::Backup(cmd) => cmd.run(&ctx).await,
        Commands::Config(cmd) => cmd.run(config, cli_config_path),
    }
}
