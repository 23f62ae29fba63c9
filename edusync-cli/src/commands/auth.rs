//! Sign-in, registration and password commands.

use clap::Args;

use edusync_core::{AuthService, UserRole};

use crate::commands::prompt_line;
use crate::context::AppContext;
use crate::error::CliError;

/// Sign in with email and password
#[derive(Args)]
pub struct LoginCommand {
    /// Account email
    email: String,

    /// Password (prompted when omitted)
    #[arg(long)]
    password: Option<String>,
}

impl LoginCommand {
    pub async fn run(&self, ctx: &mut AppContext) -> Result<(), CliError> {
        let password = match &self.password {
            Some(p) => p.clone(),
            None => prompt_line("Password")?,
        };
        let auth = AuthService::new(ctx.gateway()?);
        ctx.session = auth.login(&self.email, &password).await?;
        ctx.save_session().await?;

        if let Some(user) = ctx.session.user() {
            println!("Signed in as {} ({})", user.name, user.role);
            if user.is_owner() {
                println!("Run 'edusync school switch <id>' to act inside a school.");
            }
        }
        Ok(())
    }
}

/// Request a new account (an administrator approves it)
#[derive(Args)]
pub struct RegisterCommand {
    /// Full name
    name: String,

    /// Account email
    email: String,

    /// Requested role (admin, teacher, parent, student)
    #[arg(long, default_value = "parent")]
    role: String,

    /// Password (prompted when omitted)
    #[arg(long)]
    password: Option<String>,
}

impl RegisterCommand {
    pub async fn run(&self, ctx: &AppContext) -> Result<(), CliError> {
        let role: UserRole = self.role.parse().map_err(CliError::Input)?;
        if role == UserRole::Owner {
            return Err(CliError::Input("Owner accounts cannot self-register.".to_string()));
        }
        let password = match &self.password {
            Some(p) => p.clone(),
            None => prompt_line("Password")?,
        };
        let auth = AuthService::new(ctx.gateway()?);
        auth.register(&self.name, &self.email, &password, role).await?;
        println!("Registered {}. The account is pending approval.", self.email);
        Ok(())
    }
}

/// Change the signed-in user's password
#[derive(Args)]
pub struct PasswdCommand {
    /// New password (prompted when omitted)
    #[arg(long)]
    password: Option<String>,
}

impl PasswdCommand {
    pub async fn run(&self, ctx: &AppContext) -> Result<(), CliError> {
        ctx.session.require_user()?;
        let password = match &self.password {
            Some(p) => p.clone(),
            None => prompt_line("New password")?,
        };
        let auth = AuthService::new(ctx.gateway()?);
        auth.update_password(&ctx.session, &password).await?;
        println!("Password updated.");
        Ok(())
    }
}

pub(crate) async fn logout(ctx: &mut AppContext) -> Result<(), CliError> {
    if !ctx.session.is_signed_in() {
        println!("Not signed in.");
        return Ok(());
    }
    let settings = ctx.settings();
    ctx.session.clear(&settings).await?;
    println!("Signed out.");
    Ok(())
}

pub(crate) fn whoami(ctx: &AppContext) -> Result<(), CliError> {
    let Some(user) = ctx.session.user() else {
        println!("Not signed in. Run 'edusync login <email>'.");
        return Ok(());
    };
    println!("{} <{}>", user.name, user.email);
    println!("  role:   {}", user.role);
    if let Some(role) = ctx.session.effective_role() {
        if role != user.role {
            println!("  acting: {}", role);
        }
    }
    match ctx.session.effective_school_id() {
        Some(school) => println!("  school: {}", school),
        None => println!("  school: (none)"),
    }
    Ok(())
}
