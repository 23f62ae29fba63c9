//! Classes, subjects, exams, attendance and results.

use chrono::NaiveDate;

use super::{ensure_amount, ensure_name, invalid, MutationError, Mutations};
use crate::gateway::{to_row, Statement};
use crate::models::{new_id, AttendanceStatus, Class, EntityKind, Exam, Subject};
use crate::session::Session;

/// Marks for one (student, class, exam, subject).
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEntry {
    pub student_id: String,
    pub class_id: String,
    pub exam: String,
    pub subject: String,
    pub marks: f64,
    pub total_marks: f64,
}

impl Mutations {
    pub async fn add_class(&self, session: &Session, class: Class) -> Result<String, MutationError> {
        Ok(self
            .bulk_add_classes(session, vec![class])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    pub async fn update_class(&self, session: &Session, class: &Class) -> Result<(), MutationError> {
        self.school(session)?;
        ensure_name("Class name", &class.name)?;
        let statement = Statement::update_by_id("classes", &to_row(class)?)?;
        self.execute_on(EntityKind::Classes, &class.id, &statement)
            .await?;
        self.refresh(session).await;
        Ok(())
    }

    pub async fn delete_class(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.delete_by_id(session, EntityKind::Classes, id).await
    }

    /// Creates classes in the actor's school in one transaction.
    pub async fn bulk_add_classes(
        &self,
        session: &Session,
        classes: Vec<Class>,
    ) -> Result<Vec<String>, MutationError> {
        let school_id = self.school(session)?;
        let mut statements = Vec::with_capacity(classes.len());
        let mut ids = Vec::with_capacity(classes.len());
        for mut class in classes {
            ensure_name("Class name", &class.name)?;
            class.school_id = school_id.to_string();
            statements.push(Statement::insert("classes", &to_row(&class)?)?);
            ids.push(class.id);
        }
        if statements.is_empty() {
            return Ok(ids);
        }
        self.execute_all(&statements).await?;
        self.refresh(session).await;
        Ok(ids)
    }

    /// Applies a new display order: `(class id, sort order)` pairs.
    pub async fn bulk_update_class_order(
        &self,
        session: &Session,
        order: &[(String, i64)],
    ) -> Result<(), MutationError> {
        self.school(session)?;
        let statements: Vec<Statement> = order
            .iter()
            .map(|(id, sort_order)| {
                Statement::new("UPDATE classes SET sort_order = $1 WHERE id = $2")
                    .bind(*sort_order)
                    .bind(id.as_str())
            })
            .collect();
        if statements.is_empty() {
            return Ok(());
        }
        self.execute_all(&statements).await?;
        self.refresh(session).await;
        Ok(())
    }

    pub async fn add_subject(&self, session: &Session, name: &str) -> Result<String, MutationError> {
        self.add_named(session, EntityKind::Subjects, name).await
    }

    pub async fn update_subject(
        &self,
        session: &Session,
        subject: &Subject,
    ) -> Result<(), MutationError> {
        self.rename(session, EntityKind::Subjects, &subject.id, &subject.name)
            .await
    }

    pub async fn delete_subject(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.delete_by_id(session, EntityKind::Subjects, id).await
    }

    pub async fn add_exam(&self, session: &Session, name: &str) -> Result<String, MutationError> {
        self.add_named(session, EntityKind::Exams, name).await
    }

    pub async fn update_exam(&self, session: &Session, exam: &Exam) -> Result<(), MutationError> {
        self.rename(session, EntityKind::Exams, &exam.id, &exam.name)
            .await
    }

    pub async fn delete_exam(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.delete_by_id(session, EntityKind::Exams, id).await
    }

    /// Records attendance for one date. Existing marks for the same
    /// (student, date) are overwritten.
    pub async fn set_attendance(
        &self,
        session: &Session,
        date: NaiveDate,
        marks: &[(String, AttendanceStatus)],
    ) -> Result<usize, MutationError> {
        self.school(session)?;
        let date = date.to_string();
        let statements: Vec<Statement> = marks
            .iter()
            .map(|(student_id, status)| {
                Statement::new(
                    "INSERT INTO attendance (id, student_id, date, status) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (student_id, date) DO UPDATE SET status = EXCLUDED.status",
                )
                .bind(new_id())
                .bind(student_id.as_str())
                .bind(date.as_str())
                .bind(status.as_str())
            })
            .collect();
        if statements.is_empty() {
            return Ok(0);
        }
        self.execute_all(&statements).await?;
        self.refresh(session).await;
        Ok(statements.len())
    }

    /// Saves marks. Existing results for the same (student, class, exam,
    /// subject) are overwritten.
    pub async fn save_results(
        &self,
        session: &Session,
        entries: &[ResultEntry],
    ) -> Result<usize, MutationError> {
        self.school(session)?;
        for entry in entries {
            ensure_amount("Marks", entry.marks)?;
            ensure_amount("Total marks", entry.total_marks)?;
            ensure_name("Exam", &entry.exam)?;
            ensure_name("Subject", &entry.subject)?;
            if entry.total_marks > 0.0 && entry.marks > entry.total_marks {
                return Err(invalid(format!(
                    "Marks {} exceed total {} for {}",
                    entry.marks, entry.total_marks, entry.subject
                )));
            }
        }

        let statements: Vec<Statement> = entries
            .iter()
            .map(|entry| {
                Statement::new(
                    "INSERT INTO results (id, student_id, class_id, exam, subject, marks, total_marks) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) \
                     ON CONFLICT (student_id, class_id, exam, subject) \
                     DO UPDATE SET marks = EXCLUDED.marks, total_marks = EXCLUDED.total_marks",
                )
                .bind(new_id())
                .bind(entry.student_id.as_str())
                .bind(entry.class_id.as_str())
                .bind(entry.exam.trim())
                .bind(entry.subject.trim())
                .bind(entry.marks)
                .bind(entry.total_marks)
            })
            .collect();
        if statements.is_empty() {
            return Ok(0);
        }
        self.execute_all(&statements).await?;
        self.refresh(session).await;
        Ok(statements.len())
    }

    async fn add_named(
        &self,
        session: &Session,
        kind: EntityKind,
        name: &str,
    ) -> Result<String, MutationError> {
        let school_id = self.school(session)?;
        ensure_name("Name", name)?;
        let id = new_id();
        let statement = Statement::new(format!(
            "INSERT INTO {} (id, name, school_id) VALUES ($1, $2, $3)",
            kind.remote_table()
        ))
        .bind(id.as_str())
        .bind(name.trim())
        .bind(school_id);
        self.execute(&statement).await?;
        self.refresh(session).await;
        Ok(id)
    }

    async fn rename(
        &self,
        session: &Session,
        kind: EntityKind,
        id: &str,
        name: &str,
    ) -> Result<(), MutationError> {
        self.school(session)?;
        ensure_name("Name", name)?;
        let statement = Statement::new(format!(
            "UPDATE {} SET name = $1 WHERE id = $2 RETURNING id",
            kind.remote_table()
        ))
        .bind(name.trim())
        .bind(id);
        self.execute_on(kind, id, &statement).await?;
        self.refresh(session).await;
        Ok(())
    }
}
