use clap::{Args, Subcommand};

use edusync_core::mutations::ChallanRequest;
use edusync_core::{ChallanStatus, FeeChallan};

use crate::commands::{confirm, parse_date, OutputFormat};
use crate::context::AppContext;
use crate::error::CliError;

/// Manage fee challans of the acting school
#[derive(Args)]
pub struct FeeCommand {
    #[command(subcommand)]
    command: FeeSubcommand,
}

#[derive(Subcommand)]
enum FeeSubcommand {
    /// List challans
    List {
        /// Month name, e.g. March
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        /// Only challans that are not fully paid
        #[arg(long)]
        unpaid: bool,
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Record a payment against a challan
    Pay {
        challan_id: String,
        amount: f64,
        /// Discount for the challan (replaces the current one)
        #[arg(long)]
        discount: Option<f64>,
        /// Payment date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Accept a payment larger than the balance
        #[arg(long)]
        force: bool,
    },

    /// Generate challans for a month
    Generate {
        #[arg(long)]
        month: String,
        #[arg(long)]
        year: i32,
        /// Fee head id to bill (repeatable)
        #[arg(long = "head", required = true)]
        heads: Vec<String>,
        /// Bill only these students (repeatable); default is all active
        #[arg(long = "student")]
        students: Vec<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
    },

    /// Cancel a challan
    Cancel { id: String },

    /// Notify linked users about outstanding challans
    Remind {
        /// Challan to remind about (repeatable)
        #[arg(long = "challan", value_name = "ID", required_unless_present = "month")]
        challans: Vec<String>,
        /// Every challan of this month instead
        #[arg(long, conflicts_with = "challans", requires = "year")]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },

    /// Delete the unpaid challans of a month
    DeleteMonth {
        #[arg(long)]
        month: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        yes: bool,
    },
}

impl FeeCommand {
    pub async fn run(&self, ctx: &AppContext) -> Result<(), CliError> {
        match &self.command {
            FeeSubcommand::List {
                month,
                year,
                unpaid,
                format,
            } => {
                let sync = ctx.synchronizer()?;
                let snapshot = ctx.load_snapshot(&sync).await?;
                let challans: Vec<&FeeChallan> = snapshot
                    .fees
                    .iter()
                    .filter(|c| month.as_ref().map_or(true, |m| c.month.eq_ignore_ascii_case(m)))
                    .filter(|c| year.map_or(true, |y| c.year == y))
                    .filter(|c| {
                        !*unpaid || !matches!(c.status, ChallanStatus::Paid | ChallanStatus::Cancelled)
                    })
                    .collect();
                match format {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::to_string_pretty(&challans)
                            .map_err(|e| CliError::Input(e.to_string()))?
                    ),
                    OutputFormat::Text => {
                        if challans.is_empty() {
                            println!("No challans found.");
                        }
                        for challan in challans {
                            let student = snapshot
                                .student(&challan.student_id)
                                .map(|s| s.name.as_str())
                                .unwrap_or("(unknown)");
                            println!(
                                "{:<14} {:<24} {:>10.2} {:>10.2}  {}",
                                challan.challan_number,
                                student,
                                challan.total_amount,
                                challan.balance(),
                                challan.status
                            );
                        }
                    }
                }
                Ok(())
            }
            FeeSubcommand::Pay {
                challan_id,
                amount,
                discount,
                date,
                force,
            } => {
                let paid_date = match date {
                    Some(d) => parse_date(d)?,
                    None => chrono::Local::now().date_naive(),
                };
                let mutations = ctx.mutations()?;
                let snapshot = ctx.load_snapshot(mutations.synchronizer()).await?;
                let challan = snapshot
                    .challan(challan_id)
                    .ok_or_else(|| CliError::Input(format!("Challan not found: {}", challan_id)))?;
                let discount = discount.unwrap_or(challan.discount);
                if challan.would_overpay(*amount, discount) && !*force {
                    return Err(CliError::Input(format!(
                        "Payment exceeds the balance of {:.2}. Pass --force to record it anyway.",
                        challan.balance()
                    )));
                }
                let update = mutations
                    .record_fee_payment(&ctx.session, challan_id, *amount, discount, paid_date)
                    .await?;
                println!(
                    "Recorded {:.2}. Paid {:.2}, status {}.",
                    amount, update.paid_amount, update.status
                );
                Ok(())
            }
            FeeSubcommand::Generate {
                month,
                year,
                heads,
                students,
                due,
            } => {
                let request = ChallanRequest {
                    month: month.clone(),
                    year: *year,
                    fee_head_ids: heads.clone(),
                    student_ids: (!students.is_empty()).then(|| students.clone()),
                    due_date: due.as_deref().map(parse_date).transpose()?,
                };
                let mutations = ctx.mutations()?;
                ctx.load_snapshot(mutations.synchronizer()).await?;
                let summary = mutations
                    .generate_challans_for_month(&ctx.session, &request)
                    .await?;
                println!(
                    "Generated {} challan(s) for {} {}; {} student(s) already billed.",
                    summary.created, month, year, summary.skipped
                );
                Ok(())
            }
            FeeSubcommand::Cancel { id } => {
                ctx.mutations()?.cancel_challan(&ctx.session, id).await?;
                println!("Cancelled challan {}.", id);
                Ok(())
            }
            FeeSubcommand::Remind {
                challans,
                month,
                year,
            } => {
                let mutations = ctx.mutations()?;
                let snapshot = ctx.load_snapshot(mutations.synchronizer()).await?;
                let selected: Vec<String> = match (month, year) {
                    (Some(month), Some(year)) => snapshot
                        .fees
                        .iter()
                        .filter(|c| c.month.eq_ignore_ascii_case(month.trim()) && c.year == *year)
                        .map(|c| c.id.clone())
                        .collect(),
                    _ => challans.clone(),
                };
                let sent = mutations.send_fee_reminders(&ctx.session, &selected).await?;
                println!("Sent {} reminder(s).", sent);
                Ok(())
            }
            FeeSubcommand::DeleteMonth { month, year, yes } => {
                confirm(&format!("Delete unpaid challans for {} {}?", month, year), *yes)?;
                let mutations = ctx.mutations()?;
                ctx.load_snapshot(mutations.synchronizer()).await?;
                let deleted = mutations
                    .delete_challans_for_month(&ctx.session, month, *year)
                    .await?;
                println!("Deleted {} challan(s).", deleted);
                Ok(())
            }
        }
    }
}
