//! Fee heads, challans, payments and reminders.

use chrono::{Month, NaiveDate, Utc};
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::BTreeSet;

use super::{ensure_amount, ensure_name, invalid, MutationError, Mutations, BULK_CHUNK_SIZE};
use crate::gateway::{to_row, Statement};
use crate::models::fee::arrears;
use crate::models::{
    new_id, ChallanStatus, EntityKind, FeeChallan, FeeHead, FeeItem, PaymentRecord, PaymentUpdate,
};
use crate::session::Session;
use crate::snapshot::DataSnapshot;

/// Which challans to generate for a billing period.
#[derive(Debug, Clone)]
pub struct ChallanRequest {
    pub month: String,
    pub year: i32,
    pub fee_head_ids: Vec<String>,
    /// Restrict generation to these students; `None` bills every active
    /// student of the school.
    pub student_ids: Option<Vec<String>>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub created: usize,
    /// Students that already had a live challan for the period.
    pub skipped: usize,
}

impl ChallanRequest {
    /// Builds the challans to insert. Students that already have a
    /// non-cancelled challan for the period are skipped. Arrears come from
    /// earlier periods only.
    pub fn build(
        &self,
        snapshot: &DataSnapshot,
        school_id: &str,
    ) -> Result<(Vec<FeeChallan>, usize), MutationError> {
        ensure_name("Month", &self.month)?;
        let month: Month = self
            .month
            .trim()
            .parse()
            .map_err(|_| invalid(format!("Unknown month: {}", self.month)))?;
        let period = (self.year, month.number_from_month());
        if self.fee_head_ids.is_empty() {
            return Err(invalid("Select at least one fee head."));
        }
        let heads: Vec<&FeeHead> = self
            .fee_head_ids
            .iter()
            .map(|id| {
                snapshot
                    .fee_head(id)
                    .ok_or_else(|| invalid(format!("Unknown fee head: {id}")))
            })
            .collect::<Result<_, _>>()?;

        let mut challans = Vec::new();
        let mut skipped = 0;
        for student in snapshot.active_students().filter(|s| s.school_id == school_id) {
            if let Some(ids) = &self.student_ids {
                if !ids.contains(&student.id) {
                    continue;
                }
            }
            let existing: Vec<&FeeChallan> = snapshot
                .challans_for(&student.id)
                .filter(|c| !c.is_cancelled())
                .collect();
            if existing.iter().any(|c| c.period() == period) {
                skipped += 1;
                continue;
            }

            let fee_items: Vec<FeeItem> = heads
                .iter()
                .map(|head| FeeItem {
                    description: head.name.clone(),
                    amount: student.fee_override(&head.id).unwrap_or(head.default_amount),
                })
                .collect();
            let subtotal: f64 = fee_items.iter().map(|i| i.amount).sum();
            let carried = arrears(
                student.opening_balance,
                existing.iter().copied().filter(|c| c.period() < period),
            );

            challans.push(FeeChallan {
                id: new_id(),
                challan_number: format!("{}{}-{}", self.year, month.name(), student.roll_number),
                student_id: student.id.clone(),
                class_id: student.class_id.clone(),
                month: month.name().to_string(),
                year: self.year,
                due_date: self.due_date,
                status: ChallanStatus::Unpaid,
                fee_items,
                previous_balance: carried,
                total_amount: subtotal + carried,
                discount: 0.0,
                paid_amount: 0.0,
                paid_date: None,
                payment_history: Vec::new(),
            });
        }
        Ok((challans, skipped))
    }
}

impl Mutations {
    pub async fn add_fee_head(
        &self,
        session: &Session,
        name: &str,
        default_amount: f64,
    ) -> Result<String, MutationError> {
        let school_id = self.school(session)?;
        ensure_name("Fee head name", name)?;
        ensure_amount("Default amount", default_amount)?;
        let head = FeeHead::new(name.trim(), default_amount, school_id);
        self.execute(&Statement::insert("fee_heads", &to_row(&head)?)?)
            .await?;
        self.refresh(session).await;
        Ok(head.id)
    }

    pub async fn update_fee_head(
        &self,
        session: &Session,
        head: &FeeHead,
    ) -> Result<(), MutationError> {
        self.school(session)?;
        ensure_name("Fee head name", &head.name)?;
        ensure_amount("Default amount", head.default_amount)?;
        let statement = Statement::new(
            "UPDATE fee_heads SET name = $1, default_amount = $2 WHERE id = $3 RETURNING id",
        )
        .bind(head.name.trim())
        .bind(head.default_amount)
        .bind(head.id.as_str());
        self.execute_on(EntityKind::FeeHeads, &head.id, &statement)
            .await?;
        self.refresh(session).await;
        Ok(())
    }

    pub async fn delete_fee_head(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.delete_by_id(session, EntityKind::FeeHeads, id).await
    }

    /// Adds a payment to a challan and replaces its discount.
    ///
    /// Overpayment is not rejected here; callers check
    /// [`FeeChallan::would_overpay`] and confirm first.
    pub async fn record_fee_payment(
        &self,
        session: &Session,
        challan_id: &str,
        amount: f64,
        discount: f64,
        paid_date: NaiveDate,
    ) -> Result<PaymentUpdate, MutationError> {
        self.school(session)?;
        ensure_amount("Amount", amount)?;
        ensure_amount("Discount", discount)?;
        let challan = self.live_challan(challan_id)?;

        let update = challan.apply_payment(amount, discount, paid_date);
        self.write_payment(challan_id, &update).await?;
        tracing::info!(
            "Recorded payment of {} on challan {} ({})",
            amount,
            challan.challan_number,
            update.status
        );
        self.refresh(session).await;
        Ok(update)
    }

    /// Replaces a challan's payment history (correction of earlier entries).
    pub async fn update_fee_payment(
        &self,
        session: &Session,
        challan_id: &str,
        history: Vec<PaymentRecord>,
        discount: f64,
    ) -> Result<(), MutationError> {
        self.school(session)?;
        ensure_amount("Discount", discount)?;
        for record in &history {
            ensure_amount("Amount", record.amount)?;
        }
        let challan = self.live_challan(challan_id)?;

        let update = challan.with_payment_history(history, discount);
        self.write_payment(challan_id, &update).await?;
        self.refresh(session).await;
        Ok(())
    }

    pub async fn cancel_challan(&self, session: &Session, id: &str) -> Result<(), MutationError> {
        self.school(session)?;
        let statement = Statement::new("UPDATE fee_challans SET status = $1 WHERE id = $2 RETURNING id")
            .bind(ChallanStatus::Cancelled.as_str())
            .bind(id);
        self.execute_on(EntityKind::Fees, id, &statement).await?;
        self.refresh(session).await;
        Ok(())
    }

    /// Generates one challan per eligible student, carrying arrears forward.
    /// Inserts run in concurrent bursts of [`BULK_CHUNK_SIZE`]. When a burst
    /// fails the snapshot is resynced before the error is returned, so a
    /// retry skips the challans that did land.
    pub async fn generate_challans_for_month(
        &self,
        session: &Session,
        request: &ChallanRequest,
    ) -> Result<GenerationSummary, MutationError> {
        let school_id = self.school(session)?;
        let snapshot = self.snapshot();
        let (challans, skipped) = request.build(&snapshot, school_id)?;

        let statements = challans
            .iter()
            .map(|c| Ok(Statement::insert("fee_challans", &to_row(c)?)?))
            .collect::<Result<Vec<_>, MutationError>>()?;

        let mut created = 0;
        for chunk in statements.chunks(BULK_CHUNK_SIZE) {
            if let Err(e) = try_join_all(chunk.iter().map(|s| self.execute(s))).await {
                tracing::warn!(
                    "Challan generation for {} {} stopped after {} challans: {}",
                    request.month,
                    request.year,
                    created,
                    e
                );
                self.refresh(session).await;
                return Err(e);
            }
            created += chunk.len();
        }

        if created > 0 {
            self.log_activity(
                session,
                "Generate Challans",
                &format!("{} {}: {} challans", request.month, request.year, created),
            )
            .await;
            self.refresh(session).await;
        }
        tracing::info!(
            "Generated {} challans for {} {} ({} skipped)",
            created,
            request.month,
            request.year,
            skipped
        );
        Ok(GenerationSummary { created, skipped })
    }

    /// Deletes the period's challans that have no payment recorded, for the
    /// students of the actor's school. Returns how many were deleted.
    pub async fn delete_challans_for_month(
        &self,
        session: &Session,
        month: &str,
        year: i32,
    ) -> Result<usize, MutationError> {
        let school_id = self.school(session)?;
        ensure_name("Month", month)?;
        let snapshot = self.snapshot();
        let ids: Vec<Value> = snapshot
            .students
            .iter()
            .filter(|s| s.school_id == school_id)
            .map(|s| Value::from(s.id.as_str()))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let statement = Statement::new(
            "DELETE FROM fee_challans WHERE month = $1 AND year = $2 AND paid_amount = 0 \
             AND student_id = ANY($3) RETURNING id",
        )
        .bind(month)
        .bind(year)
        .bind(Value::Array(ids));
        let deleted = self.execute(&statement).await?.len();
        if deleted > 0 {
            self.log_activity(
                session,
                "Delete Challans",
                &format!("{month} {year}: {deleted} challans"),
            )
            .await;
        }
        self.refresh(session).await;
        Ok(deleted)
    }

    /// Sends an in-app reminder for each selected challan that is still
    /// outstanding and whose student, enrolled in the actor's school, has a
    /// linked user account. Returns how many were sent.
    pub async fn send_fee_reminders(
        &self,
        session: &Session,
        challan_ids: &[String],
    ) -> Result<usize, MutationError> {
        let school_id = self.school(session)?;
        let snapshot = self.snapshot();
        let now = Utc::now().to_rfc3339();
        let selected: BTreeSet<&str> = challan_ids.iter().map(String::as_str).collect();

        let statements: Vec<Statement> = selected
            .iter()
            .filter_map(|id| snapshot.challan(id))
            .filter(|c| !c.is_cancelled() && c.status != ChallanStatus::Paid && c.balance() > 0.0)
            .filter_map(|c| {
                let student = snapshot.student(&c.student_id)?;
                let user_id = student.user_id.as_deref()?;
                (student.school_id == school_id).then(|| {
                    Statement::new(
                        "INSERT INTO notifications (id, user_id, title, message, link, is_read, timestamp) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    )
                    .bind(new_id())
                    .bind(user_id)
                    .bind("Fee Reminder")
                    .bind(format!(
                        "Fee of {:.0} for {} {} is outstanding for {}.",
                        c.balance(),
                        c.month,
                        c.year,
                        student.name
                    ))
                    .bind("/fees")
                    .bind(false)
                    .bind(now.as_str())
                })
            })
            .collect();

        let sent = statements.len();
        if sent < selected.len() {
            tracing::debug!(
                "Skipped {} of {} selected challans for reminders",
                selected.len() - sent,
                selected.len()
            );
        }
        if sent == 0 {
            return Ok(0);
        }
        self.execute_all(&statements).await?;
        tracing::info!("Sent {} fee reminders", sent);
        self.refresh(session).await;
        Ok(sent)
    }

    fn live_challan(&self, challan_id: &str) -> Result<FeeChallan, MutationError> {
        let challan = self
            .snapshot()
            .challan(challan_id)
            .cloned()
            .ok_or_else(|| MutationError::NotFound {
                kind: EntityKind::Fees,
                id: challan_id.to_string(),
            })?;
        if challan.is_cancelled() {
            return Err(invalid("Cannot record a payment on a cancelled challan."));
        }
        Ok(challan)
    }

    async fn write_payment(
        &self,
        challan_id: &str,
        update: &PaymentUpdate,
    ) -> Result<(), MutationError> {
        let statement = Statement::new(
            "UPDATE fee_challans SET paid_amount = $1, discount = $2, status = $3, \
             paid_date = $4, payment_history = $5 WHERE id = $6 RETURNING id",
        )
        .bind(update.paid_amount)
        .bind(update.discount)
        .bind(update.status.as_str())
        .bind(update.paid_date.map(|d| d.to_string()))
        .bind_json(&update.payment_history)
        .bind(challan_id);
        self.execute_on(EntityKind::Fees, challan_id, &statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::gateway::GatewayError;
    use crate::testing::{fixture_row, RecordingGateway};
    use serde_json::json;

    fn ledger() -> RecordingGateway {
        RecordingGateway::new()
            .with_rows(
                "fee_heads",
                vec![
                    json!({"id": "h1", "name": "Tuition Fee", "default_amount": 1000, "school_id": "s1"}),
                    json!({"id": "h2", "name": "Computer Lab", "default_amount": "200", "school_id": "s1"}),
                ],
            )
            .with_rows(
                "students",
                vec![
                    json!({"id": "st1", "name": "Ali", "roll_number": "7", "class_id": "c1",
                           "school_id": "s1", "status": "Active", "opening_balance": 300,
                           "user_id": "u7", "fee_structure": [{"fee_head_id": "h1", "amount": 800}]}),
                    json!({"id": "st2", "name": "Sara", "roll_number": "8", "class_id": "c1",
                           "school_id": "s1", "status": "Active"}),
                    json!({"id": "st3", "name": "Left", "roll_number": "9", "class_id": "c1",
                           "school_id": "s1", "status": "Left"}),
                ],
            )
            .with_rows(
                "fee_challans",
                vec![
                    json!({"id": "f1", "student_id": "st1", "month": "January", "year": 2024,
                           "status": "Partial", "total_amount": 1300, "previous_balance": 300,
                           "paid_amount": 600, "discount": 100}),
                    json!({"id": "f2", "student_id": "st1", "month": "February", "year": 2024,
                           "status": "Cancelled", "total_amount": 5000}),
                    json!({"id": "f3", "student_id": "st2", "month": "March", "year": 2024,
                           "status": "Unpaid", "total_amount": 1200}),
                    json!({"id": "f4", "student_id": "st2", "month": "February", "year": 2024,
                           "status": "Cancelled", "total_amount": 1200}),
                ],
            )
    }

    fn march() -> ChallanRequest {
        ChallanRequest {
            month: "March".into(),
            year: 2024,
            fee_head_ids: vec!["h1".into(), "h2".into()],
            student_ids: None,
            due_date: NaiveDate::from_ymd_opt(2024, 3, 10),
        }
    }

    #[tokio::test]
    async fn test_generation_carries_arrears_and_overrides() {
        let gateway = ledger();
        let m = synced(&gateway).await;
        let (challans, skipped) = march().build(&m.snapshot(), "s1").unwrap();

        // st2 already has a March challan; st3 has left.
        assert_eq!(skipped, 1);
        assert_eq!(challans.len(), 1);
        let c = &challans[0];
        assert_eq!(c.student_id, "st1");
        assert_eq!(c.fee_items[0].amount, 800.0);
        assert_eq!(c.fee_items[1].amount, 200.0);
        // 300 opening + (1300 - 300) charged - (600 + 100) collected; the
        // cancelled February challan is ignored.
        assert_eq!(c.previous_balance, 600.0);
        assert_eq!(c.total_amount, 1600.0);
        assert_eq!(c.challan_number, "2024March-7");
    }

    #[tokio::test]
    async fn test_generation_carries_unpaid_prior_challan_for_each_student() {
        let students = (1..=3)
            .map(|i| {
                json!({"id": format!("st{i}"), "name": format!("S{i}"), "roll_number": i.to_string(),
                       "class_id": "c1", "school_id": "s1", "status": "Active"})
            })
            .collect();
        let prior = (1..=3)
            .map(|i| {
                json!({"id": format!("f{i}"), "student_id": format!("st{i}"), "month": "February",
                       "year": 2024, "status": "Unpaid", "total_amount": 500, "previous_balance": 0})
            })
            .collect();
        let gateway = ledger()
            .with_rows("students", students)
            .with_rows("fee_challans", prior);
        let m = synced(&gateway).await;

        let (challans, skipped) = march().build(&m.snapshot(), "s1").unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(challans.len(), 3);
        for c in &challans {
            let subtotal: f64 = c.fee_items.iter().map(|i| i.amount).sum();
            assert_eq!(subtotal, 1200.0);
            assert_eq!(c.previous_balance, 500.0);
            assert_eq!(c.total_amount, subtotal + 500.0);
        }

        let summary = m.generate_challans_for_month(&admin(), &march()).await.unwrap();
        assert_eq!(summary, GenerationSummary { created: 3, skipped: 0 });
    }

    #[tokio::test]
    async fn test_later_periods_do_not_count_as_arrears() {
        let gateway = ledger().with_rows(
            "fee_challans",
            vec![
                json!({"id": "f1", "student_id": "st2", "month": "February", "year": 2024,
                       "status": "Unpaid", "total_amount": 400}),
                json!({"id": "f2", "student_id": "st2", "month": "April", "year": 2024,
                       "status": "Unpaid", "total_amount": 1200}),
                json!({"id": "f3", "student_id": "st2", "month": "January", "year": 2025,
                       "status": "Unpaid", "total_amount": 1200}),
            ],
        );
        let m = synced(&gateway).await;
        let (challans, _) = march().build(&m.snapshot(), "s1").unwrap();
        let c = challans.iter().find(|c| c.student_id == "st2").unwrap();
        assert_eq!(c.previous_balance, 400.0);
    }

    #[tokio::test]
    async fn test_existing_period_matches_month_name_loosely() {
        let gateway = ledger();
        let m = synced(&gateway).await;
        let mut request = march();
        request.month = "march".into();
        let (challans, skipped) = request.build(&m.snapshot(), "s1").unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(challans[0].month, "March");

        request.month = "Marchember".into();
        assert!(matches!(
            request.build(&m.snapshot(), "s1"),
            Err(MutationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_after_failed_burst_bills_each_student_once() {
        let students = (0..25)
            .map(|i| {
                json!({"id": format!("st{i}"), "name": format!("S{i}"), "roll_number": i.to_string(),
                       "class_id": "c1", "school_id": "s1", "status": "Active"})
            })
            .collect();
        let gateway = ledger()
            .with_rows("students", students)
            .with_rows("fee_challans", vec![])
            .storing_inserts()
            .fail_after(
                "INSERT INTO fee_challans",
                BULK_CHUNK_SIZE,
                GatewayError::Transport("connection reset".into()),
            );
        let m = synced(&gateway).await;

        let err = m.generate_challans_for_month(&admin(), &march()).await.unwrap_err();
        assert!(matches!(err, MutationError::Transport(_)));
        let landed = gateway.rows("fee_challans").len();
        assert!(landed >= BULK_CHUNK_SIZE && landed < 25);
        // The failure resynced, so the snapshot already holds what landed.
        assert_eq!(m.snapshot().fees.len(), landed);

        let summary = m.generate_challans_for_month(&admin(), &march()).await.unwrap();
        assert_eq!(summary.created, 25 - landed);
        assert_eq!(summary.skipped, landed);

        let billed: BTreeSet<String> = gateway
            .rows("fee_challans")
            .iter()
            .filter_map(|r| r["student_id"].as_str().map(str::to_string))
            .collect();
        assert_eq!(gateway.rows("fee_challans").len(), 25);
        assert_eq!(billed.len(), 25);
    }

    #[tokio::test]
    async fn test_generation_inserts_in_chunks() {
        let mut students = Vec::new();
        for i in 0..45 {
            students.push(json!({"id": format!("st{i}"), "name": format!("S{i}"),
                                 "class_id": "c1", "school_id": "s1", "status": "Active"}));
        }
        let gateway = ledger().with_rows("students", students).with_rows("fee_challans", vec![]);
        let m = synced(&gateway).await;

        let summary = m.generate_challans_for_month(&admin(), &march()).await.unwrap();
        assert_eq!(summary, GenerationSummary { created: 45, skipped: 0 });
        assert_eq!(gateway.count_matching("INSERT INTO fee_challans"), 45);
    }

    #[tokio::test]
    async fn test_generation_rejects_unknown_head() {
        let gateway = ledger();
        let m = synced(&gateway).await;
        let mut request = march();
        request.fee_head_ids.push("h9".into());
        assert!(matches!(
            m.generate_challans_for_month(&admin(), &request).await,
            Err(MutationError::Validation(_))
        ));
        assert!(gateway.statements().is_empty());
    }

    #[tokio::test]
    async fn test_payment_updates_status_and_history() {
        let gateway = ledger();
        let m = synced(&gateway).await;
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        let update = m
            .record_fee_payment(&admin(), "f3", 1000.0, 200.0, date)
            .await
            .unwrap();
        assert_eq!(update.status, ChallanStatus::Paid);

        let write = &gateway.statements()[0];
        assert!(write.text().starts_with("UPDATE fee_challans SET paid_amount"));
        assert_eq!(write.params()[2], json!("Paid"));
        assert_eq!(write.params()[3], json!("2024-03-15"));
        assert_eq!(write.params()[4], json!(r#"[{"amount":1000.0,"date":"2024-03-15"}]"#));
    }

    #[tokio::test]
    async fn test_payment_on_cancelled_challan_is_rejected() {
        let gateway = ledger();
        let m = synced(&gateway).await;
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert!(matches!(
            m.record_fee_payment(&admin(), "f2", 10.0, 0.0, date).await,
            Err(MutationError::Validation(_))
        ));
        assert!(matches!(
            m.record_fee_payment(&admin(), "nope", 10.0, 0.0, date).await,
            Err(MutationError::NotFound { .. })
        ));
        assert!(matches!(
            m.record_fee_payment(&admin(), "f3", -5.0, 0.0, date).await,
            Err(MutationError::Validation(_))
        ));
        assert!(gateway.statements().is_empty());
    }

    #[tokio::test]
    async fn test_clearing_payment_history_nulls_paid_date() {
        let gateway = ledger();
        let m = synced(&gateway).await;
        m.update_fee_payment(&admin(), "f3", Vec::new(), 0.0).await.unwrap();

        let write = &gateway.statements()[0];
        assert_eq!(write.params()[0], json!(0.0));
        assert_eq!(write.params()[2], json!("Unpaid"));
        assert_eq!(write.params()[3], Value::Null);
    }

    #[tokio::test]
    async fn test_delete_for_month_is_scoped_to_school_students() {
        let gateway = ledger();
        let m = synced(&gateway).await;
        let deleted = m.delete_challans_for_month(&admin(), "March", 2024).await.unwrap();
        assert_eq!(deleted, 1);

        let delete = &gateway.statements()[0];
        assert!(delete.text().contains("paid_amount = 0"));
        assert_eq!(delete.params()[2], json!(["st1", "st2", "st3"]));
    }

    #[tokio::test]
    async fn test_reminders_go_to_linked_users_only() {
        let gateway = ledger().with_rows(
            "fee_challans",
            vec![
                json!({"id": "f5", "student_id": "st1", "month": "April", "year": 2024,
                       "status": "Unpaid", "total_amount": 1000}),
                json!({"id": "f6", "student_id": "st2", "month": "April", "year": 2024,
                       "status": "Unpaid", "total_amount": 1000}),
            ],
        );
        let m = synced(&gateway).await;
        let selected = vec!["f5".to_string(), "f6".to_string()];
        assert_eq!(m.send_fee_reminders(&admin(), &selected).await.unwrap(), 1);
        let batch = &gateway.transactions()[0];
        assert_eq!(batch[0].params()[1], json!("u7"));
        assert!(batch[0].params()[3].as_str().unwrap().contains("April 2024"));
    }

    #[tokio::test]
    async fn test_reminders_skip_unselected_paid_and_foreign_challans() {
        let mut students = ledger().rows("students");
        students.push(fixture_row(json!({"id": "st9", "name": "Zain", "class_id": "c9",
                                         "school_id": "s2", "status": "Active", "user_id": "u9"})));
        let gateway = ledger()
            .with_rows("students", students.into_iter().map(Value::Object).collect())
            .with_rows(
                "fee_challans",
                vec![
                    json!({"id": "f5", "student_id": "st1", "month": "April", "year": 2024,
                           "status": "Unpaid", "total_amount": 1000}),
                    json!({"id": "f6", "student_id": "st1", "month": "May", "year": 2024,
                           "status": "Paid", "total_amount": 1000, "paid_amount": 1000}),
                    json!({"id": "f7", "student_id": "st9", "month": "April", "year": 2024,
                           "status": "Unpaid", "total_amount": 1000}),
                    json!({"id": "f8", "student_id": "st1", "month": "June", "year": 2024,
                           "status": "Unpaid", "total_amount": 1000}),
                ],
            );
        let m = synced(&gateway).await;
        let selected = vec!["f5".to_string(), "f6".to_string(), "f7".to_string(), "nope".to_string()];
        assert_eq!(m.send_fee_reminders(&admin(), &selected).await.unwrap(), 1);

        let batch = &gateway.transactions()[0];
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].params()[1], json!("u7"));
        assert!(batch[0].params()[3].as_str().unwrap().contains("April"));
    }

    #[tokio::test]
    async fn test_reminders_with_nothing_selected_send_nothing() {
        let gateway = ledger();
        let m = synced(&gateway).await;
        assert_eq!(m.send_fee_reminders(&admin(), &[]).await.unwrap(), 0);
        assert!(gateway.statements().is_empty());
    }

    #[tokio::test]
    async fn test_fee_head_amount_must_be_valid() {
        let gateway = RecordingGateway::new();
        let m = mutations(&gateway);
        assert!(m.add_fee_head(&admin(), "Transport", f64::NAN).await.is_err());
        assert!(m.add_fee_head(&admin(), "", 100.0).await.is_err());
        assert!(gateway.statements().is_empty());
    }
}
