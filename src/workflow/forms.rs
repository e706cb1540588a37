//! External "form submitted" checks that gate workflow progress.

use std::sync::Arc;

use async_trait::async_trait;

use crate::store::{Database, form_types};
use crate::workflow::weekly_plan::PlanWeek;

/// Whether the user has filled the forms a workflow waits for.
///
/// Lookup failures count as "not submitted": the handler re-prompts.
#[async_trait]
pub trait FormChecker: Send + Sync {
    /// Onboarding form: submitting it creates the household.
    async fn onboarding_form_submitted(&self, phone_number: &str) -> bool;

    /// Weekly plan review form, submitted during `week`.
    async fn workflow_form_submitted(&self, phone_number: &str, week: PlanWeek) -> bool;
}

/// Checks backed by the document store.
pub struct StoreFormChecker {
    db: Arc<dyn Database>,
}

impl StoreFormChecker {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FormChecker for StoreFormChecker {
    async fn onboarding_form_submitted(&self, phone_number: &str) -> bool {
        if phone_number.is_empty() {
            return false;
        }
        match super::household_for_phone(self.db.as_ref(), phone_number).await {
            Ok(household) => {
                let submitted = household.is_some();
                tracing::info!(phone = %phone_number, submitted, "Onboarding form check");
                submitted
            }
            Err(e) => {
                tracing::error!(phone = %phone_number, "Onboarding form check failed: {}", e);
                false
            }
        }
    }

    async fn workflow_form_submitted(&self, phone_number: &str, week: PlanWeek) -> bool {
        if phone_number.is_empty() {
            return false;
        }
        let Some((since, until)) = week.bounds() else {
            tracing::warn!(week = %week.key(), "No such ISO week");
            return false;
        };
        match self
            .db
            .has_form_submission(phone_number, form_types::WEEKLY_PLAN_REVIEW, since, until)
            .await
        {
            Ok(submitted) => {
                tracing::info!(phone = %phone_number, week = %week.key(), submitted, "Workflow form check");
                submitted
            }
            Err(e) => {
                tracing::error!(phone = %phone_number, "Workflow form check failed: {}", e);
                false
            }
        }
    }
}

/// Fixed answers, for tests and local runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFormChecker {
    pub onboarding: bool,
    pub workflow: bool,
}

impl StaticFormChecker {
    pub fn all_submitted() -> Self {
        Self {
            onboarding: true,
            workflow: true,
        }
    }
}

#[async_trait]
impl FormChecker for StaticFormChecker {
    async fn onboarding_form_submitted(&self, _phone_number: &str) -> bool {
        self.onboarding
    }

    async fn workflow_form_submitted(&self, _phone_number: &str, _week: PlanWeek) -> bool {
        self.workflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LibSqlBackend, UserRecord};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn store_checker_reads_households_and_forms() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let checker = StoreFormChecker::new(Arc::clone(&db));
        let week = PlanWeek::current();

        assert!(!checker.onboarding_form_submitted("+911").await);
        assert!(!checker.workflow_form_submitted("+911", week).await);
        assert!(!checker.onboarding_form_submitted("").await);

        db.upsert_user(&UserRecord {
            id: "u1".into(),
            whatsapp_number: "+911".into(),
            household_id: Some("hh1".into()),
            data: serde_json::json!({}),
        })
        .await
        .unwrap();
        db.upsert_household("hh1", &serde_json::json!({})).await.unwrap();
        db.record_form_submission("+911", form_types::WEEKLY_PLAN_REVIEW, Utc::now())
            .await
            .unwrap();

        assert!(checker.onboarding_form_submitted("+911").await);
        assert!(checker.workflow_form_submitted("+911", week).await);
    }

    #[tokio::test]
    async fn last_weeks_review_does_not_count_this_week() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let checker = StoreFormChecker::new(Arc::clone(&db));
        let week = PlanWeek::current();
        let (monday, _) = week.bounds().unwrap();

        db.record_form_submission(
            "+911",
            form_types::WEEKLY_PLAN_REVIEW,
            monday - Duration::seconds(1),
        )
        .await
        .unwrap();
        assert!(!checker.workflow_form_submitted("+911", week).await);
        assert!(
            checker
                .workflow_form_submitted("+911", PlanWeek::of(monday - Duration::days(1)))
                .await
        );

        db.record_form_submission("+911", form_types::WEEKLY_PLAN_REVIEW, monday)
            .await
            .unwrap();
        assert!(checker.workflow_form_submitted("+911", week).await);
    }
}
