//! Signed-in user, acting-as school context and the authentication service.

use chrono::Utc;
use std::sync::Arc;

use crate::gateway::{fetch_as, GatewayError, QueryGateway, Statement};
use crate::mirror::{MirrorError, Settings, ACTIVE_SCHOOL_KEY, SESSION_USER_KEY};
use crate::models::{new_id, User, UserRole, UserStatus};

/// Profile columns read into [`User`]. The credential column is deliberately
/// not selected.
pub const PROFILE_COLUMNS: &str =
    "id, name, email, role, status, school_id, avatar_url, last_login, permissions_overrides";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("Your account is pending approval.")]
    PendingApproval,
    #[error("Your account is inactive.")]
    Inactive,
    #[error("Email already registered.")]
    EmailTaken,
    #[error("Not signed in. Run 'edusync login' first.")]
    NotSignedIn,
    #[error("Only an Owner can switch school context.")]
    OwnerOnly,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Storage(#[from] MirrorError),
}

/// Whose data the next sync fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncScope {
    pub user_id: String,
    /// `None` means every school (an Owner with no active school).
    pub school_id: Option<String>,
}

/// The explicit session: current user plus the school an Owner is acting as.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    user: Option<User>,
    active_school_id: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Session for a freshly authenticated user. Non-owners are pinned to
    /// their own school.
    pub fn signed_in(user: User) -> Self {
        let active_school_id = if user.is_owner() {
            None
        } else {
            user.school_id.clone()
        };
        Self {
            user: Some(user),
            active_school_id,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> Result<&User, AuthError> {
        self.user.as_ref().ok_or(AuthError::NotSignedIn)
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn active_school_id(&self) -> Option<&str> {
        self.active_school_id.as_deref()
    }

    /// School the actor is working in: the acting-as school for an Owner,
    /// the profile's school for everyone else.
    pub fn effective_school_id(&self) -> Option<&str> {
        let user = self.user.as_ref()?;
        if user.is_owner() {
            self.active_school_id.as_deref()
        } else {
            user.school_id.as_deref()
        }
    }

    /// An Owner acting as a school is treated as that school's Admin.
    pub fn effective_role(&self) -> Option<UserRole> {
        let user = self.user.as_ref()?;
        if user.is_owner() && self.active_school_id.is_some() {
            Some(UserRole::Admin)
        } else {
            Some(user.role)
        }
    }

    pub fn switch_school_context(&mut self, school_id: Option<String>) -> Result<(), AuthError> {
        match &self.user {
            Some(user) if user.is_owner() => {
                self.active_school_id = school_id.filter(|id| !id.is_empty());
                Ok(())
            }
            Some(_) => Err(AuthError::OwnerOnly),
            None => Err(AuthError::NotSignedIn),
        }
    }

    pub fn scope(&self) -> Option<SyncScope> {
        let user = self.user.as_ref()?;
        Some(SyncScope {
            user_id: user.id.clone(),
            school_id: self.effective_school_id().map(str::to_string),
        })
    }

    /// Restores the persisted session, if any.
    pub async fn load(settings: &Settings) -> Result<Self, MirrorError> {
        let Some(user) = settings.get_json::<User>(SESSION_USER_KEY).await? else {
            return Ok(Self::anonymous());
        };
        let mut session = Self::signed_in(user);
        if session.user.as_ref().is_some_and(User::is_owner) {
            session.active_school_id = settings.get(ACTIVE_SCHOOL_KEY).await?;
        }
        Ok(session)
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), MirrorError> {
        match &self.user {
            Some(user) => settings.set_json(SESSION_USER_KEY, user).await?,
            None => settings.remove(SESSION_USER_KEY).await?,
        }
        match &self.active_school_id {
            Some(id) => settings.set(ACTIVE_SCHOOL_KEY, id).await,
            None => settings.remove(ACTIVE_SCHOOL_KEY).await,
        }
    }

    /// Signs out and forgets the persisted session.
    pub async fn clear(&mut self, settings: &Settings) -> Result<(), MirrorError> {
        self.user = None;
        self.active_school_id = None;
        self.save(settings).await
    }
}

/// Login, registration and credential changes against the `profiles` table.
#[derive(Clone)]
pub struct AuthService {
    gateway: Arc<dyn QueryGateway>,
}

impl AuthService {
    pub fn new(gateway: Arc<dyn QueryGateway>) -> Self {
        Self { gateway }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let statement = Statement::new(format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = $1 AND password = $2 LIMIT 1"
        ))
        .bind(email)
        .bind(password);
        let mut user = fetch_as::<User>(self.gateway.as_ref(), &statement)
            .await?
            .into_iter()
            .next()
            .ok_or(AuthError::InvalidCredentials)?;

        match user.status {
            UserStatus::PendingApproval => return Err(AuthError::PendingApproval),
            UserStatus::Suspended | UserStatus::Inactive => return Err(AuthError::Inactive),
            UserStatus::Active => {}
        }

        let now = Utc::now();
        self.gateway
            .query(
                &Statement::new("UPDATE profiles SET last_login = $1 WHERE id = $2")
                    .bind(now.to_rfc3339())
                    .bind(user.id.as_str()),
            )
            .await?;
        user.last_login = Some(now);

        tracing::info!("Signed in as {} ({})", user.email, user.role);
        Ok(Session::signed_in(user))
    }

    /// Self-registration. New accounts wait for approval.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<String, AuthError> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() {
            return Err(AuthError::Validation("Name and email are required.".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required.".to_string()));
        }

        let existing = self
            .gateway
            .query(&Statement::new("SELECT id FROM profiles WHERE email = $1").bind(email))
            .await?;
        if !existing.is_empty() {
            return Err(AuthError::EmailTaken);
        }

        let id = new_id();
        self.gateway
            .query(
                &Statement::new(
                    "INSERT INTO profiles (id, name, email, password, role, status) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(id.as_str())
                .bind(name)
                .bind(email)
                .bind(password)
                .bind(role.to_string())
                .bind(UserStatus::PendingApproval.as_str()),
            )
            .await?;
        tracing::info!("Registered {} as {}, pending approval", email, role);
        Ok(id)
    }

    pub async fn update_password(
        &self,
        session: &Session,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = session.require_user()?;
        if new_password.is_empty() {
            return Err(AuthError::Validation("Password is required.".to_string()));
        }
        self.gateway
            .query(
                &Statement::new("UPDATE profiles SET password = $1 WHERE id = $2")
                    .bind(new_password)
                    .bind(user.id.as_str()),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MirrorStore;
    use crate::testing::RecordingGateway;
    use serde_json::json;
    use tempfile::tempdir;

    fn owner() -> User {
        User::new("Olivia", "owner@example.com", UserRole::Owner, None)
    }

    #[test]
    fn test_owner_acting_as_school_is_admin() {
        let mut session = Session::signed_in(owner());
        assert_eq!(session.effective_role(), Some(UserRole::Owner));
        assert_eq!(session.effective_school_id(), None);

        session.switch_school_context(Some("s1".to_string())).unwrap();
        assert_eq!(session.effective_role(), Some(UserRole::Admin));
        assert_eq!(session.scope().unwrap().school_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_non_owner_cannot_switch() {
        let teacher = User::new("Tariq", "t@example.com", UserRole::Teacher, Some("s1".into()));
        let mut session = Session::signed_in(teacher);
        assert!(matches!(
            session.switch_school_context(Some("s2".to_string())),
            Err(AuthError::OwnerOnly)
        ));
        assert_eq!(session.effective_school_id(), Some("s1"));
    }

    #[test]
    fn test_anonymous_session_has_no_scope() {
        let session = Session::anonymous();
        assert!(session.scope().is_none());
        assert!(matches!(session.require_user(), Err(AuthError::NotSignedIn)));
    }

    #[tokio::test]
    async fn test_session_persists_across_loads() {
        let temp_dir = tempdir().unwrap();
        let store = MirrorStore::open(&temp_dir.path().join("mirror.db")).await.unwrap();
        let settings = store.settings();

        let mut session = Session::signed_in(owner());
        session.switch_school_context(Some("s9".to_string())).unwrap();
        session.save(&settings).await.unwrap();

        let loaded = Session::load(&settings).await.unwrap();
        assert_eq!(loaded, session);

        session.clear(&settings).await.unwrap();
        assert!(!Session::load(&settings).await.unwrap().is_signed_in());
    }

    #[tokio::test]
    async fn test_login_rejects_pending_accounts() {
        let gateway = RecordingGateway::new().with_rows(
            "profiles",
            vec![json!({
                "id": "u1", "name": "New", "email": "n@example.com",
                "role": "Teacher", "status": "Pending Approval", "school_id": "s1"
            })],
        );
        let auth = AuthService::new(Arc::new(gateway.clone()));
        let err = auth.login("n@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::PendingApproval));
        assert!(!gateway.statements().iter().any(|s| s.text().starts_with("UPDATE")));
    }

    #[tokio::test]
    async fn test_login_updates_last_login() {
        let gateway = RecordingGateway::new().with_rows(
            "profiles",
            vec![json!({
                "id": "u1", "name": "Ayesha", "email": "a@example.com",
                "role": "Admin", "status": "Active", "school_id": "s1"
            })],
        );
        let auth = AuthService::new(Arc::new(gateway.clone()));
        let session = auth.login("a@example.com", "pw").await.unwrap();

        assert_eq!(session.effective_school_id(), Some("s1"));
        let statements = gateway.statements();
        assert!(!statements[0].text().contains("password,"));
        assert!(statements[1].text().starts_with("UPDATE profiles SET last_login"));
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let gateway = RecordingGateway::new();
        let auth = AuthService::new(Arc::new(gateway));
        assert!(matches!(
            auth.login("x@example.com", "pw").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_existing_email() {
        let gateway = RecordingGateway::new().with_rows("profiles", vec![json!({"id": "u1"})]);
        let auth = AuthService::new(Arc::new(gateway));
        let err = auth
            .register("Ali", "a@example.com", "pw", UserRole::Teacher)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn test_register_inserts_pending_profile() {
        let gateway = RecordingGateway::new();
        let auth = AuthService::new(Arc::new(gateway.clone()));
        auth.register("Ali", "a@example.com", "pw", UserRole::Teacher)
            .await
            .unwrap();

        let insert = gateway
            .statements()
            .into_iter()
            .find(|s| s.text().starts_with("INSERT INTO profiles"))
            .unwrap();
        assert_eq!(insert.params()[5], json!("Pending Approval"));
    }
}
