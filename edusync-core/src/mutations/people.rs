//! Users and students.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::{ensure_amount, ensure_name, invalid, MutationError, Mutations, BULK_CHUNK_SIZE};
use crate::case::to_snake_case;
use crate::gateway::{to_row, GatewayError, Statement};
use crate::models::{
    new_id, EntityKind, FeeStructureItem, Student, StudentStatus, User, UserRole, UserStatus,
};
use crate::session::Session;
use crate::snapshot::DataSnapshot;

/// A profile created by an administrator.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default)]
pub struct LeavingCertificate {
    pub date_of_leaving: Option<NaiveDate>,
    pub reason_for_leaving: Option<String>,
    pub conduct: Option<String>,
    pub progress: Option<String>,
    pub place_of_birth: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionTarget {
    Class(String),
    Graduate,
}

/// Class-to-class mapping for end-of-year promotion.
#[derive(Debug, Clone, Default)]
pub struct PromotionPlan {
    pub moves: BTreeMap<String, PromotionTarget>,
    /// Students held back.
    pub exempt: BTreeSet<String>,
}

impl PromotionPlan {
    /// Active, non-exempt students of `school_id` whose class is mapped.
    pub fn resolve<'a>(
        &'a self,
        snapshot: &'a DataSnapshot,
        school_id: &'a str,
    ) -> impl Iterator<Item = (&'a Student, &'a PromotionTarget)> + 'a {
        snapshot
            .active_students()
            .filter(move |s| s.school_id == school_id && !self.exempt.contains(&s.id))
            .filter_map(move |s| self.moves.get(&s.class_id).map(|target| (s, target)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeeIncrease {
    Amount(f64),
    Percent(f64),
}

impl FeeIncrease {
    pub fn apply(&self, amount: f64) -> f64 {
        let raised = match self {
            FeeIncrease::Amount(delta) => amount + delta,
            FeeIncrease::Percent(pct) => amount * (1.0 + pct / 100.0),
        };
        raised.round()
    }

    fn validate(&self) -> Result<(), MutationError> {
        match self {
            FeeIncrease::Amount(v) => ensure_amount("Increase", *v),
            FeeIncrease::Percent(v) => ensure_amount("Increase percentage", *v),
        }
    }
}

impl Mutations {
    pub async fn update_user(&self, session: &Session, user: &User) -> Result<(), MutationError> {
        self.authorize_user_change(session, &user.id, Some(user.role))?;
        ensure_name("Name", &user.name)?;
        let statement = Statement::new(
            "UPDATE profiles SET name = $1, avatar_url = $2, status = $3, role = $4, \
             permissions_overrides = $5 WHERE id = $6 RETURNING id",
        )
        .bind(user.name.trim())
        .bind(user.avatar_url.as_deref())
        .bind(user.status.as_str())
        .bind(user.role.to_string())
        .bind_json(&user.permissions_overrides)
        .bind(user.id.as_str());
        self.execute_on(EntityKind::Users, &user.id, &statement).await?;
        self.refresh(session).await;
        Ok(())
    }

    /// Soft delete: the profile is marked Inactive and can no longer sign in.
    pub async fn delete_user(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.authorize_user_change(session, id, None)?;
        let statement = Statement::new("UPDATE profiles SET status = $1 WHERE id = $2 RETURNING id")
            .bind(UserStatus::Inactive.as_str())
            .bind(id);
        self.execute_on(EntityKind::Users, id, &statement).await?;
        self.refresh(session).await;
        Ok(())
    }

    /// Owner accounts, and the Owner role, are managed by Owners only.
    /// Other profiles need an Admin of the profile's own school.
    fn authorize_user_change(
        &self,
        session: &Session,
        id: &str,
        new_role: Option<UserRole>,
    ) -> Result<(), MutationError> {
        let actor = self.actor(session)?;
        let snapshot = self.snapshot();
        let target = snapshot.users.iter().find(|u| u.id == id);
        let touches_owner = new_role == Some(UserRole::Owner) || target.is_some_and(User::is_owner);
        if actor.is_owner() {
            return Ok(());
        }
        if touches_owner {
            return Err(MutationError::OwnerOnly("manage Owner accounts"));
        }
        let target = target.ok_or_else(|| MutationError::NotFound {
            kind: EntityKind::Users,
            id: id.to_string(),
        })?;
        self.require_admin_of(session, target.school_id.as_deref(), "manage users")
    }

    pub async fn add_user_by_admin(
        &self,
        session: &Session,
        user: NewUser,
    ) -> Result<String, MutationError> {
        let ids = self.bulk_add_users(session, vec![user]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| invalid("No user was created."))
    }

    /// Creates active profiles in the actor's school. Emails must be new.
    pub async fn bulk_add_users(
        &self,
        session: &Session,
        users: Vec<NewUser>,
    ) -> Result<Vec<String>, MutationError> {
        let school_id = self.school(session)?.to_string();
        self.require_admin_of(session, Some(&school_id), "add users")?;
        if users.iter().any(|u| u.role == UserRole::Owner) {
            self.require_owner(session, "create Owner accounts")?;
        }
        let mut seen = BTreeSet::new();
        for user in &users {
            ensure_name("Name", &user.name)?;
            ensure_name("Email", &user.email)?;
            ensure_name("Password", &user.password)?;
            if !seen.insert(user.email.trim().to_lowercase()) {
                return Err(invalid(format!("Duplicate email in batch: {}", user.email)));
            }
        }
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let emails: Vec<Value> = users.iter().map(|u| Value::from(u.email.trim())).collect();
        let existing = self
            .execute(
                &Statement::new("SELECT email FROM profiles WHERE email = ANY($1)")
                    .bind(Value::Array(emails)),
            )
            .await?;
        if let Some(taken) = existing.first().and_then(|row| row.get("email")) {
            return Err(invalid(format!(
                "Email already registered: {}",
                taken.as_str().unwrap_or_default()
            )));
        }

        let mut ids = Vec::with_capacity(users.len());
        let statements: Vec<Statement> = users
            .iter()
            .map(|user| {
                let id = new_id();
                let statement = Statement::new(
                    "INSERT INTO profiles (id, name, email, password, role, status, school_id) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(id.as_str())
                .bind(user.name.trim())
                .bind(user.email.trim())
                .bind(user.password.as_str())
                .bind(user.role.to_string())
                .bind(UserStatus::Active.as_str())
                .bind(school_id.as_str());
                ids.push(id);
                statement
            })
            .collect();
        self.execute_all(&statements).await?;
        tracing::info!("Added {} user(s)", ids.len());
        self.refresh(session).await;
        Ok(ids)
    }

    /// Enrolls a student in the actor's school.
    pub async fn add_student(
        &self,
        session: &Session,
        mut student: Student,
    ) -> Result<String, MutationError> {
        let school_id = self.school(session)?;
        validate_student(&student)?;
        student.school_id = school_id.to_string();
        student.status = StudentStatus::Active;

        let statement = Statement::insert("students", &to_row(&student)?)?;
        self.execute(&statement).await?;
        self.log_activity(session, "Add Student", &format!("Added: {}", student.name))
            .await;
        self.refresh(session).await;
        Ok(student.id)
    }

    pub async fn update_student(
        &self,
        session: &Session,
        student: &Student,
    ) -> Result<(), MutationError> {
        self.school(session)?;
        validate_student(student)?;
        let statement = Statement::update_by_id("students", &to_row(student)?)?;
        self.execute_on(EntityKind::Students, &student.id, &statement)
            .await?;
        self.refresh(session).await;
        Ok(())
    }

    /// Soft delete: the row stays for historical fees and results.
    pub async fn delete_student(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.school(session)?;
        let statement = Statement::new("UPDATE students SET status = $1 WHERE id = $2 RETURNING id")
            .bind(StudentStatus::Deleted.as_str())
            .bind(id);
        self.execute_on(EntityKind::Students, id, &statement).await?;
        self.refresh(session).await;
        Ok(())
    }

    /// Enrolls many students, one transaction per chunk. A failed chunk
    /// leaves earlier chunks committed; the snapshot is resynced before the
    /// error is returned.
    pub async fn bulk_add_students(
        &self,
        session: &Session,
        students: Vec<Student>,
    ) -> Result<usize, MutationError> {
        let school_id = self.school(session)?.to_string();
        for student in &students {
            validate_student(student)?;
        }

        let mut statements = Vec::with_capacity(students.len());
        for mut student in students {
            student.school_id = school_id.clone();
            student.status = StudentStatus::Active;
            statements.push(Statement::insert("students", &to_row(&student)?)?);
        }
        let total = statements.len();
        let mut added = 0;
        for chunk in statements.chunks(BULK_CHUNK_SIZE) {
            if let Err(e) = self.execute_all(chunk).await {
                tracing::warn!("Bulk enrollment stopped after {} of {} students: {}", added, total, e);
                if added > 0 {
                    self.refresh(session).await;
                }
                return Err(e);
            }
            added += chunk.len();
        }
        if total > 0 {
            self.log_activity(session, "Bulk Add Students", &format!("Added {total} students"))
                .await;
            self.refresh(session).await;
        }
        Ok(total)
    }

    /// Marks a student as Left and records the certificate fields.
    pub async fn issue_leaving_certificate(
        &self,
        session: &Session,
        student_id: &str,
        certificate: LeavingCertificate,
    ) -> Result<(), MutationError> {
        self.school(session)?;
        let statement = Statement::new(
            "UPDATE students SET status = $1, date_of_leaving = $2, reason_for_leaving = $3, \
             conduct = $4, progress = $5, place_of_birth = $6 WHERE id = $7 RETURNING id",
        )
        .bind(StudentStatus::Left.as_str())
        .bind(certificate.date_of_leaving.map(|d| d.to_string()))
        .bind(certificate.reason_for_leaving)
        .bind(certificate.conduct)
        .bind(certificate.progress)
        .bind(certificate.place_of_birth)
        .bind(student_id);
        self.execute_on(EntityKind::Students, student_id, &statement)
            .await?;

        let name = self
            .snapshot()
            .student(student_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| student_id.to_string());
        self.log_activity(
            session,
            "Issue Leaving Certificate",
            &format!("Issued for: {name}"),
        )
        .await;
        self.refresh(session).await;
        Ok(())
    }

    /// Moves every mapped student up a class, or graduates them, in one
    /// transaction. Returns the number of students changed.
    pub async fn promote_all_students(
        &self,
        session: &Session,
        plan: &PromotionPlan,
    ) -> Result<usize, MutationError> {
        let school_id = self.school(session)?;
        let snapshot = self.snapshot();
        for target in plan.moves.values() {
            if let PromotionTarget::Class(class_id) = target {
                if snapshot.class(class_id).is_none() {
                    return Err(invalid(format!("Unknown target class: {class_id}")));
                }
            }
        }

        let statements: Vec<Statement> = plan
            .resolve(&snapshot, school_id)
            .map(|(student, target)| match target {
                PromotionTarget::Class(class_id) => {
                    Statement::new("UPDATE students SET class_id = $1 WHERE id = $2")
                        .bind(class_id.as_str())
                        .bind(student.id.as_str())
                }
                PromotionTarget::Graduate => {
                    Statement::new("UPDATE students SET status = $1 WHERE id = $2")
                        .bind(StudentStatus::Graduated.as_str())
                        .bind(student.id.as_str())
                }
            })
            .collect();
        let count = statements.len();
        if count == 0 {
            return Ok(0);
        }
        self.execute_all(&statements).await?;
        self.log_activity(session, "Promote Students", &format!("Promoted {count} students"))
            .await;
        self.refresh(session).await;
        Ok(count)
    }

    /// Raises the tuition of the selected active students in the actor's
    /// school. A student without a tuition override gets one, starting from
    /// the head's default. Returns the number of students changed.
    pub async fn increase_tuition_fees(
        &self,
        session: &Session,
        student_ids: &[String],
        increase: FeeIncrease,
    ) -> Result<usize, MutationError> {
        let school_id = self.school(session)?;
        increase.validate()?;
        if student_ids.is_empty() {
            return Ok(0);
        }
        let snapshot = self.snapshot();
        let head = snapshot
            .fee_heads
            .iter()
            .find(|h| h.school_id == school_id && h.is_tuition())
            .ok_or_else(|| invalid("No 'Tuition Fee' head is configured for this school."))?;

        let selected: BTreeSet<&str> = student_ids.iter().map(String::as_str).collect();
        let students: Vec<&Student> = snapshot
            .active_students()
            .filter(|s| s.school_id == school_id && selected.contains(s.id.as_str()))
            .collect();
        if let Some(missing) = selected
            .iter()
            .find(|id| !students.iter().any(|s| s.id == **id))
        {
            return Err(invalid(format!(
                "Student {missing} is not an active student of this school."
            )));
        }

        let mut statements = Vec::with_capacity(students.len());
        for student in &students {
            let current = student.fee_override(&head.id).unwrap_or(head.default_amount);
            let mut structure: Vec<FeeStructureItem> = student
                .fee_structure
                .iter()
                .filter(|item| item.fee_head_id != head.id)
                .cloned()
                .collect();
            structure.push(FeeStructureItem {
                fee_head_id: head.id.clone(),
                amount: increase.apply(current),
            });
            let structure = serde_json::to_value(&structure)
                .map(to_snake_case)
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            statements.push(
                Statement::new("UPDATE students SET fee_structure = $1 WHERE id = $2")
                    .bind(structure.to_string())
                    .bind(student.id.as_str()),
            );
        }

        let changed = statements.len();
        self.execute_all(&statements).await?;
        self.log_activity(
            session,
            "Increase Tuition Fees",
            &format!("Raised tuition for {changed} students"),
        )
        .await;
        self.refresh(session).await;
        Ok(changed)
    }
}

fn validate_student(student: &Student) -> Result<(), MutationError> {
    ensure_name("Student name", &student.name)?;
    ensure_name("Class", &student.class_id)?;
    if !student.opening_balance.is_finite() {
        return Err(invalid("Opening balance must be a number."));
    }
    for item in &student.fee_structure {
        ensure_amount("Fee amount", item.amount)?;
    }
    Ok(())
}
