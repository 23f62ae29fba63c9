use clap::{Args, Subcommand};

use edusync_core::School;

use crate::commands::{confirm, OutputFormat};
use crate::context::AppContext;
use crate::error::CliError;

/// Manage schools and the acting school
#[derive(Args)]
pub struct SchoolCommand {
    #[command(subcommand)]
    command: SchoolSubcommand,
}

#[derive(Subcommand)]
enum SchoolSubcommand {
    /// List schools visible to the signed-in user
    List {
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Act inside a school (Owner only); omit the id to leave school context
    Switch { id: Option<String> },

    /// Add a school (Owner only)
    Add {
        name: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long)]
        logo_url: Option<String>,
    },

    /// Update a school's details
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        logo_url: Option<String>,
    },

    /// Delete a school (Owner only)
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },
}

impl SchoolCommand {
    pub async fn run(&self, ctx: &mut AppContext) -> Result<(), CliError> {
        match &self.command {
            SchoolSubcommand::List { format } => {
                let sync = ctx.synchronizer()?;
                let snapshot = ctx.load_snapshot(&sync).await?;
                match format {
                    OutputFormat::Json => {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&snapshot.schools)
                                .map_err(|e| CliError::Input(e.to_string()))?
                        );
                    }
                    OutputFormat::Text => {
                        if snapshot.schools.is_empty() {
                            println!("No schools.");
                        }
                        let active = ctx.session.effective_school_id();
                        for school in &snapshot.schools {
                            let marker = if active == Some(school.id.as_str()) { "*" } else { " " };
                            println!("{} {}  {}", marker, school.id, school);
                        }
                    }
                }
                Ok(())
            }
            SchoolSubcommand::Switch { id } => {
                ctx.session.switch_school_context(id.clone())?;
                ctx.save_session().await?;
                match id {
                    Some(id) => println!("Now acting in school {}.", id),
                    None => println!("Left school context."),
                }
                Ok(())
            }
            SchoolSubcommand::Add {
                name,
                address,
                logo_url,
            } => {
                let mut school = School::new(name, address);
                school.logo_url = logo_url.clone();
                let id = ctx.mutations()?.add_school(&ctx.session, school).await?;
                println!("Added school {} ({}).", name, id);
                Ok(())
            }
            SchoolSubcommand::Update {
                id,
                name,
                address,
                logo_url,
            } => {
                let mutations = ctx.mutations()?;
                let snapshot = ctx.load_snapshot(mutations.synchronizer()).await?;
                let mut school = snapshot
                    .school(id)
                    .cloned()
                    .ok_or_else(|| CliError::Input(format!("School not found: {}", id)))?;
                if let Some(name) = name {
                    school.name = name.clone();
                }
                if let Some(address) = address {
                    school.address = address.clone();
                }
                if let Some(logo_url) = logo_url {
                    school.logo_url = Some(logo_url.clone()).filter(|u| !u.is_empty());
                }
                mutations.update_school(&ctx.session, &school).await?;
                println!("Updated school {}.", school.name);
                Ok(())
            }
            SchoolSubcommand::Delete { id, yes } => {
                confirm(&format!("Delete school {}?", id), *yes)?;
                ctx.mutations()?.delete_school(&ctx.session, id).await?;
                println!("Deleted school {}.", id);
                Ok(())
            }
        }
    }
}
