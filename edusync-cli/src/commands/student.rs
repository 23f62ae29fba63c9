use clap::{Args, Subcommand};
use std::collections::{BTreeMap, BTreeSet};

use edusync_core::mutations::{FeeIncrease, LeavingCertificate, PromotionPlan, PromotionTarget};
use edusync_core::{Student, StudentStatus};

use crate::commands::{confirm, parse_date, OutputFormat};
use crate::context::AppContext;
use crate::error::CliError;

/// Manage students of the acting school
#[derive(Args)]
pub struct StudentCommand {
    #[command(subcommand)]
    command: StudentSubcommand,
}

#[derive(Subcommand)]
enum StudentSubcommand {
    /// List students
    List {
        /// Only students of this class id
        #[arg(long)]
        class: Option<String>,

        /// Include students who left, graduated or were deleted
        #[arg(long)]
        all: bool,

        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Admit a student
    Add {
        name: String,
        #[arg(long)]
        roll: String,
        #[arg(long)]
        class: String,
        #[arg(long, default_value = "")]
        father: String,
        #[arg(long, default_value_t = 0.0)]
        opening_balance: f64,
    },

    /// Remove a student (kept for fee and result history)
    Delete { id: String },

    /// Issue a leaving certificate
    Leave {
        id: String,
        /// Date of leaving (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        conduct: Option<String>,
    },

    /// Promote every active student by class mapping
    Promote {
        /// FROM_CLASS=TO_CLASS (repeatable)
        #[arg(long = "move", value_name = "FROM=TO")]
        moves: Vec<String>,

        /// Class whose students graduate (repeatable)
        #[arg(long)]
        graduate: Vec<String>,

        /// Student held back (repeatable)
        #[arg(long)]
        exempt: Vec<String>,

        #[arg(long)]
        yes: bool,
    },

    /// Raise tuition fees of active students
    IncreaseFee {
        /// Student to raise (repeatable); defaults to every active student
        #[arg(long = "student", value_name = "ID")]
        students: Vec<String>,

        /// Only students of this class id
        #[arg(long, conflicts_with = "students")]
        class: Option<String>,

        #[arg(long, conflicts_with = "percent")]
        amount: Option<f64>,
        #[arg(long)]
        percent: Option<f64>,
        #[arg(long)]
        yes: bool,
    },
}

impl StudentCommand {
    pub async fn run(&self, ctx: &AppContext) -> Result<(), CliError> {
        match &self.command {
            StudentSubcommand::List { class, all, format } => {
                let sync = ctx.synchronizer()?;
                let snapshot = ctx.load_snapshot(&sync).await?;
                let students: Vec<&Student> = snapshot
                    .students
                    .iter()
                    .filter(|s| *all || s.status == StudentStatus::Active)
                    .filter(|s| class.as_ref().map_or(true, |c| &s.class_id == c))
                    .collect();
                match format {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::to_string_pretty(&students)
                            .map_err(|e| CliError::Input(e.to_string()))?
                    ),
                    OutputFormat::Text => {
                        if students.is_empty() {
                            println!("No students found.");
                        }
                        for student in students {
                            let class_name = snapshot
                                .class(&student.class_id)
                                .map(|c| c.to_string())
                                .unwrap_or_else(|| student.class_id.clone());
                            println!(
                                "{:<6} {:<28} {:<16} {}",
                                student.roll_number, student.name, class_name, student.status
                            );
                        }
                    }
                }
                Ok(())
            }
            StudentSubcommand::Add {
                name,
                roll,
                class,
                father,
                opening_balance,
            } => {
                let school_id = ctx.session.effective_school_id().unwrap_or_default();
                let mut student = Student::new(name, roll, class, school_id);
                student.father_name = father.clone();
                student.opening_balance = *opening_balance;
                let id = ctx.mutations()?.add_student(&ctx.session, student).await?;
                println!("Admitted {} ({}).", name, id);
                Ok(())
            }
            StudentSubcommand::Delete { id } => {
                ctx.mutations()?.delete_student(&ctx.session, id).await?;
                println!("Deleted student {}.", id);
                Ok(())
            }
            StudentSubcommand::Leave {
                id,
                date,
                reason,
                conduct,
            } => {
                let date_of_leaving = match date {
                    Some(d) => parse_date(d)?,
                    None => chrono::Local::now().date_naive(),
                };
                let certificate = LeavingCertificate {
                    date_of_leaving: Some(date_of_leaving),
                    reason_for_leaving: reason.clone(),
                    conduct: conduct.clone(),
                    ..Default::default()
                };
                let mutations = ctx.mutations()?;
                ctx.load_snapshot(mutations.synchronizer()).await?;
                mutations
                    .issue_leaving_certificate(&ctx.session, id, certificate)
                    .await?;
                println!("Leaving certificate issued for {}.", id);
                Ok(())
            }
            StudentSubcommand::Promote {
                moves,
                graduate,
                exempt,
                yes,
            } => {
                let plan = promotion_plan(moves, graduate, exempt)?;
                if plan.moves.is_empty() {
                    return Err(CliError::Input(
                        "Nothing to promote. Pass --move FROM=TO or --graduate CLASS.".to_string(),
                    ));
                }
                confirm("Promote all matching students?", *yes)?;
                let mutations = ctx.mutations()?;
                ctx.load_snapshot(mutations.synchronizer()).await?;
                let moved = mutations.promote_all_students(&ctx.session, &plan).await?;
                println!("Promoted {} student(s).", moved);
                Ok(())
            }
            StudentSubcommand::IncreaseFee {
                students,
                class,
                amount,
                percent,
                yes,
            } => {
                let increase = match (amount, percent) {
                    (Some(a), None) => FeeIncrease::Amount(*a),
                    (None, Some(p)) => FeeIncrease::Percent(*p),
                    _ => {
                        return Err(CliError::Input(
                            "Pass exactly one of --amount or --percent.".to_string(),
                        ))
                    }
                };
                let mutations = ctx.mutations()?;
                let snapshot = ctx.load_snapshot(mutations.synchronizer()).await?;
                let selected: Vec<String> = if students.is_empty() {
                    let school_id = ctx.session.effective_school_id().unwrap_or_default();
                    snapshot
                        .active_students()
                        .filter(|s| s.school_id == school_id)
                        .filter(|s| class.as_ref().map_or(true, |c| &s.class_id == c))
                        .map(|s| s.id.clone())
                        .collect()
                } else {
                    students.clone()
                };
                confirm(
                    &format!("Raise tuition fees for {} student(s)?", selected.len()),
                    *yes,
                )?;
                let updated = mutations
                    .increase_tuition_fees(&ctx.session, &selected, increase)
                    .await?;
                println!("Updated fees of {} student(s).", updated);
                Ok(())
            }
        }
    }
}

fn promotion_plan(
    moves: &[String],
    graduate: &[String],
    exempt: &[String],
) -> Result<PromotionPlan, CliError> {
    let mut plan_moves = BTreeMap::new();
    for entry in moves {
        let (from, to) = entry
            .split_once('=')
            .filter(|(f, t)| !f.trim().is_empty() && !t.trim().is_empty())
            .ok_or_else(|| CliError::Input(format!("Invalid move '{}'. Use FROM=TO.", entry)))?;
        plan_moves.insert(
            from.trim().to_string(),
            PromotionTarget::Class(to.trim().to_string()),
        );
    }
    for class in graduate {
        plan_moves.insert(class.clone(), PromotionTarget::Graduate);
    }
    Ok(PromotionPlan {
        moves: plan_moves,
        exempt: exempt.iter().cloned().collect::<BTreeSet<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_plan_from_flags() {
        let plan = promotion_plan(
            &["c1=c2".to_string(), " c2 = c3 ".to_string()],
            &["c3".to_string()],
            &["st9".to_string()],
        )
        .unwrap();
        assert_eq!(plan.moves["c1"], PromotionTarget::Class("c2".into()));
        assert_eq!(plan.moves["c2"], PromotionTarget::Class("c3".into()));
        assert_eq!(plan.moves["c3"], PromotionTarget::Graduate);
        assert!(plan.exempt.contains("st9"));
    }

    #[test]
    fn test_promotion_plan_rejects_bad_moves() {
        assert!(promotion_plan(&["c1".to_string()], &[], &[]).is_err());
        assert!(promotion_plan(&["=c2".to_string()], &[], &[]).is_err());
    }
}
