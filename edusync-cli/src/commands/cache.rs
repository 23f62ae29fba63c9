use clap::{Args, Subcommand};

use crate::commands::confirm;
use crate::context::AppContext;
use crate::error::CliError;

/// Manage the local offline cache
#[derive(Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand)]
enum CacheSubcommand {
    /// Delete every cached record (settings and session are kept)
    Reset {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
}

impl CacheCommand {
    pub async fn run(&self, ctx: &AppContext) -> Result<(), CliError> {
        match &self.command {
            CacheSubcommand::Reset { yes } => {
                confirm("Clear the local cache?", *yes)?;
                ctx.store.clear().await?;
                println!("Local cache cleared. Run 'edusync sync' to rebuild it.");
                Ok(())
            }
        }
    }
}
