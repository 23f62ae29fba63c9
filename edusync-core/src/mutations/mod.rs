//! Write operations.
//!
//! Every operation validates its input, writes to the remote database and
//! then runs a full resync. Local state is never patched directly; the new
//! snapshot only appears through that resync. A resync failure after a
//! successful write does not fail the operation: it is reported through the
//! synchronizer's sticky error.

mod academic;
mod fees;
mod people;
mod schools;

pub use academic::ResultEntry;
pub use fees::{ChallanRequest, GenerationSummary};
pub use people::{FeeIncrease, LeavingCertificate, NewUser, PromotionPlan, PromotionTarget};

use chrono::Utc;
use std::sync::Arc;

use crate::gateway::{GatewayError, QueryGateway, Row, Statement};
use crate::models::{new_id, EntityKind, User, UserRole};
use crate::session::Session;
use crate::snapshot::DataSnapshot;
use crate::sync::Synchronizer;

/// Statements per concurrent insert burst in bulk operations.
pub const BULK_CHUNK_SIZE: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("Not signed in. Run 'edusync login' first.")]
    NotSignedIn,
    #[error("No school selected. Run 'edusync school switch <id>' first.")]
    NoSchool,
    #[error("Only an Owner can {0}.")]
    OwnerOnly(&'static str),
    #[error("Only an Admin of this school can {0}.")]
    AdminOnly(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{kind} record not found: {id}")]
    NotFound { kind: EntityKind, id: String },
    #[error("Rejected by the database: {0}")]
    Constraint(String),
    #[error("The database did not confirm the change in time. Check the record and retry.")]
    TimedOut,
    #[error(transparent)]
    Transport(GatewayError),
}

impl From<GatewayError> for MutationError {
    fn from(e: GatewayError) -> Self {
        if e.is_constraint_violation() {
            match e {
                GatewayError::Query { message, .. } => MutationError::Constraint(message),
                other => MutationError::Transport(other),
            }
        } else {
            MutationError::Transport(e)
        }
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> MutationError {
    MutationError::Validation(message.into())
}

/// Rejects negative, NaN and infinite amounts.
pub(crate) fn ensure_amount(label: &str, value: f64) -> Result<(), MutationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(format!("{label} must be a non-negative number.")));
    }
    Ok(())
}

pub(crate) fn ensure_name(label: &str, value: &str) -> Result<(), MutationError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{label} is required.")));
    }
    Ok(())
}

/// Mutation operations over the remote database.
pub struct Mutations {
    sync: Arc<Synchronizer>,
}

impl Mutations {
    pub fn new(sync: Arc<Synchronizer>) -> Self {
        Self { sync }
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.sync
    }

    fn gateway(&self) -> &dyn QueryGateway {
        self.sync.gateway().as_ref()
    }

    fn snapshot(&self) -> Arc<DataSnapshot> {
        self.sync.snapshot()
    }

    fn actor<'a>(&self, session: &'a Session) -> Result<&'a User, MutationError> {
        session.user().ok_or(MutationError::NotSignedIn)
    }

    /// The school the actor is working in; required by school-scoped writes.
    fn school<'a>(&self, session: &'a Session) -> Result<&'a str, MutationError> {
        self.actor(session)?;
        session.effective_school_id().ok_or(MutationError::NoSchool)
    }

    fn require_owner(&self, session: &Session, action: &'static str) -> Result<(), MutationError> {
        if self.actor(session)?.role == UserRole::Owner {
            Ok(())
        } else {
            Err(MutationError::OwnerOnly(action))
        }
    }

    /// Owners pass everywhere. Anyone else must be an Admin working in
    /// `school_id`.
    fn require_admin_of(
        &self,
        session: &Session,
        school_id: Option<&str>,
        action: &'static str,
    ) -> Result<(), MutationError> {
        if self.actor(session)?.is_owner() {
            return Ok(());
        }
        let in_school = school_id.is_some() && session.effective_school_id() == school_id;
        if in_school && session.effective_role() == Some(UserRole::Admin) {
            Ok(())
        } else {
            Err(MutationError::AdminOnly(action))
        }
    }

    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, MutationError> {
        Ok(self.gateway().query(statement).await?)
    }

    /// Runs a `... RETURNING id` statement that must touch exactly the
    /// record `id`.
    async fn execute_on(
        &self,
        kind: EntityKind,
        id: &str,
        statement: &Statement,
    ) -> Result<(), MutationError> {
        if self.execute(statement).await?.is_empty() {
            return Err(MutationError::NotFound {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn execute_all(&self, statements: &[Statement]) -> Result<(), MutationError> {
        if statements.is_empty() {
            return Ok(());
        }
        self.gateway().transaction(statements).await?;
        Ok(())
    }

    /// Appends an audit entry. Failures are logged, the write already
    /// happened.
    async fn log_activity(&self, session: &Session, action: &str, details: &str) {
        let Some(user) = session.user() else {
            return;
        };
        let statement = Statement::new(
            "INSERT INTO activity_logs \
             (id, user_id, user_name, user_avatar, school_id, action, details, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(new_id())
        .bind(user.id.as_str())
        .bind(user.name.as_str())
        .bind(user.avatar_url.clone().unwrap_or_default())
        .bind(session.effective_school_id())
        .bind(action)
        .bind(details)
        .bind(Utc::now().to_rfc3339());
        if let Err(e) = self.gateway().query(&statement).await {
            tracing::warn!("Failed to record activity '{}': {}", action, e);
        }
    }

    /// Resyncs after a successful write.
    async fn refresh(&self, session: &Session) {
        if let Err(e) = self.sync.sync(session).await {
            tracing::warn!("Resync after write failed: {}", e);
        }
    }

    pub(crate) async fn delete_by_id(
        &self,
        session: &Session,
        kind: EntityKind,
        id: &str,
    ) -> Result<(), MutationError> {
        self.school(session)?;
        let statement = Statement::new(format!(
            "DELETE FROM {} WHERE id = $1 RETURNING id",
            kind.remote_table()
        ))
        .bind(id);
        self.execute_on(kind, id, &statement).await?;
        self.refresh(session).await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::User;
    use crate::testing::RecordingGateway;

    pub fn admin() -> Session {
        Session::signed_in(User::new(
            "Ayesha",
            "a@example.com",
            UserRole::Admin,
            Some("s1".to_string()),
        ))
    }

    pub fn owner() -> Session {
        Session::signed_in(User::new("Olivia", "o@example.com", UserRole::Owner, None))
    }

    pub fn teacher() -> Session {
        Session::signed_in(User::new(
            "Tariq",
            "t@example.com",
            UserRole::Teacher,
            Some("s1".to_string()),
        ))
    }

    pub fn mutations(gateway: &RecordingGateway) -> Mutations {
        Mutations::new(Arc::new(Synchronizer::new(Arc::new(gateway.clone()))))
    }

    /// Mutations whose synchronizer already holds the fixture snapshot.
    pub async fn synced(gateway: &RecordingGateway) -> Mutations {
        let m = mutations(gateway);
        m.sync.sync(&admin()).await.unwrap();
        gateway.clear_log();
        m
    }
}
