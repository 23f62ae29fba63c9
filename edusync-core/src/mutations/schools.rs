//! Schools, events and notifications.

use std::time::Duration;

use super::{ensure_name, MutationError, Mutations};
use crate::gateway::{fetch_as, to_row, Statement};
use crate::models::{EntityKind, School, SchoolEvent};
use crate::session::Session;

/// How long a school update may take before it is confirmed by reading the
/// row back.
pub const SCHOOL_UPDATE_TIMEOUT: Duration = Duration::from_secs(15);

impl Mutations {
    pub async fn add_school(&self, session: &Session, school: School) -> Result<String, MutationError> {
        self.require_owner(session, "add a school")?;
        ensure_name("School name", &school.name)?;
        self.execute(&Statement::insert("schools", &to_row(&school)?)?)
            .await?;
        tracing::info!("Added school {}", school.name);
        self.refresh(session).await;
        Ok(school.id)
    }

    /// Updates a school's details.
    ///
    /// The write races [`SCHOOL_UPDATE_TIMEOUT`]. When it does not answer in
    /// time the row is read back: the update counts as applied only if the
    /// stored values match, otherwise [`MutationError::TimedOut`] is returned
    /// and the caller may retry.
    pub async fn update_school(&self, session: &Session, school: &School) -> Result<(), MutationError> {
        self.require_admin_of(session, Some(&school.id), "update a school")?;
        ensure_name("School name", &school.name)?;
        let statement = Statement::new(
            "UPDATE schools SET name = $1, address = $2, logo_url = $3 WHERE id = $4 RETURNING id",
        )
        .bind(school.name.trim())
        .bind(school.address.as_str())
        .bind(school.logo_url.as_deref())
        .bind(school.id.as_str());

        match tokio::time::timeout(SCHOOL_UPDATE_TIMEOUT, self.execute(&statement)).await {
            Ok(result) => {
                if result?.is_empty() {
                    return Err(MutationError::NotFound {
                        kind: EntityKind::Schools,
                        id: school.id.clone(),
                    });
                }
            }
            Err(_) => {
                tracing::warn!(
                    "School update did not answer within {:?}; reading back",
                    SCHOOL_UPDATE_TIMEOUT
                );
                if !self.school_matches(school).await {
                    return Err(MutationError::TimedOut);
                }
            }
        }
        self.refresh(session).await;
        Ok(())
    }

    pub async fn delete_school(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.require_owner(session, "delete a school")?;
        let statement = Statement::new("DELETE FROM schools WHERE id = $1 RETURNING id").bind(id);
        self.execute_on(EntityKind::Schools, id, &statement).await?;
        self.refresh(session).await;
        Ok(())
    }

    pub async fn add_event(
        &self,
        session: &Session,
        mut event: SchoolEvent,
    ) -> Result<String, MutationError> {
        let school_id = self.school(session)?;
        ensure_name("Event title", &event.title)?;
        event.school_id = school_id.to_string();
        self.execute(&Statement::insert("school_events", &to_row(&event)?)?)
            .await?;
        self.refresh(session).await;
        Ok(event.id)
    }

    pub async fn update_event(&self, session: &Session, event: &SchoolEvent) -> Result<(), MutationError> {
        self.school(session)?;
        ensure_name("Event title", &event.title)?;
        let statement = Statement::update_by_id("school_events", &to_row(event)?)?;
        self.execute_on(EntityKind::Events, &event.id, &statement)
            .await?;
        self.refresh(session).await;
        Ok(())
    }

    pub async fn delete_event(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.delete_by_id(session, EntityKind::Events, id).await
    }

    pub async fn mark_notification_read(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        let user = self.actor(session)?;
        let statement = Statement::new(
            "UPDATE notifications SET is_read = true WHERE id = $1 AND user_id = $2 RETURNING id",
        )
        .bind(id)
        .bind(user.id.as_str());
        self.execute_on(EntityKind::Notifications, id, &statement)
            .await?;
        self.refresh(session).await;
        Ok(())
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_notifications_read(&self, session: &Session) -> Result<usize, MutationError> {
        let user = self.actor(session)?;
        let statement = Statement::new(
            "UPDATE notifications SET is_read = true WHERE user_id = $1 AND is_read = false RETURNING id",
        )
        .bind(user.id.as_str());
        let changed = self.execute(&statement).await?.len();
        if changed > 0 {
            self.refresh(session).await;
        }
        Ok(changed)
    }

    async fn school_matches(&self, expected: &School) -> bool {
        let statement = Statement::new("SELECT * FROM schools WHERE id = $1").bind(expected.id.as_str());
        match fetch_as::<School>(self.gateway(), &statement).await {
            Ok(rows) => rows.first().is_some_and(|stored| {
                stored.name == expected.name.trim()
                    && stored.address == expected.address
                    && stored.logo_url == expected.logo_url
            }),
            Err(e) => {
                tracing::warn!("Read-back of school {} failed: {}", expected.id, e);
                false
            }
        }
    }
}
