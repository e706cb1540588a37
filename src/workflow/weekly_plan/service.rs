//! WeeklyPlanService: weekly meal plan review and approval.

use std::sync::Arc;

use chrono::Utc;

use crate::config::ReplyConfig;
use crate::error::WorkflowError;
use crate::store::{Database, Household, MessageRole, collections};
use crate::tools::BackendClient;
use crate::workflow::{FormChecker, StepLog, keywords};

use super::state::{PlanWeek, WeeklyPlanStep};

/// Reply when anything inside a turn fails.
pub const ERROR_REPLY: &str = "Sorry, We're facing some trouble. Please try again.";

const APPROVED_REPLY: &str = "Great! Thanks for confirming your preferences for the week.";
const ALREADY_APPROVED_REPLY: &str =
    "Your meal plan for this week is already approved. We'll check in with you next week!";

const WORKFLOW_TYPE: &str = "generic";

/// Whether this household's plan is approved for the current ISO week.
///
/// A missing household counts as locked so the caller does not start a
/// plan conversation it cannot complete.
pub fn is_weekly_plan_locked(household: Option<&Household>) -> bool {
    let Some(household) = household else {
        tracing::error!("Weekly plan lock check without household data");
        return true;
    };
    let week = PlanWeek::current();
    let plan = household
        .data
        .get("weekly_plan")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    let locked = week.is_approved_in(&plan);
    tracing::info!(
        household_id = %household.id,
        locked,
        current_week = %week.key(),
        "Weekly plan lock status"
    );
    locked
}

pub struct WeeklyPlanService {
    db: Arc<dyn Database>,
    forms: Arc<dyn FormChecker>,
    backend: Arc<BackendClient>,
    replies: ReplyConfig,
}

impl WeeklyPlanService {
    pub fn new(
        db: Arc<dyn Database>,
        forms: Arc<dyn FormChecker>,
        backend: Arc<BackendClient>,
        replies: ReplyConfig,
    ) -> Self {
        Self {
            db,
            forms,
            backend,
            replies,
        }
    }

    /// Log scoped to the week being planned.
    fn log(&self, week: PlanWeek) -> StepLog {
        StepLog::new(
            Arc::clone(&self.db),
            collections::WEEKLY_PLAN_CHATS,
            WORKFLOW_TYPE,
        )
        .with_scope(week.key())
    }

    /// Handle one inbound message for a household. Never fails.
    pub async fn process_message(
        &self,
        text: &str,
        phone_number: &str,
        household: &Household,
    ) -> String {
        let week = PlanWeek::current();

        tracing::info!(household_id = %household.id, "Triggering meal plan generation");
        match self.backend.generate_weekly_meal_plan(&household.id).await {
            Ok(Some(_)) => tracing::info!(household_id = %household.id, "Meal plan generated"),
            Ok(None) => {}
            Err(e) => tracing::warn!(household_id = %household.id, "Meal plan generation failed: {}", e),
        }

        match self.try_process(text, phone_number, household, week).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(phone = %phone_number, "Weekly plan turn failed: {}", e);
                if let Err(e) = self
                    .log(week)
                    .record::<WeeklyPlanStep>(phone_number, MessageRole::Bot, ERROR_REPLY)
                    .await
                {
                    tracing::warn!(phone = %phone_number, "Failed to log error reply: {}", e);
                }
                ERROR_REPLY.to_string()
            }
        }
    }

    async fn try_process(
        &self,
        text: &str,
        phone_number: &str,
        household: &Household,
        week: PlanWeek,
    ) -> Result<String, WorkflowError> {
        let log = self.log(week);
        let step: WeeklyPlanStep = log.record(phone_number, MessageRole::User, text).await?;
        tracing::info!(
            phone = %phone_number,
            week = %week.key(),
            step = %step,
            "Processing weekly plan message"
        );

        let reply = match step {
            WeeklyPlanStep::Started => {
                log.set_step(phone_number, WeeklyPlanStep::PlanApproval).await?;
                format!(
                    "Welcome to your weekly meal planning! 🍽️\n\nYour personalized meal plan is ready!\n\nPlease review and approve your meal plan at: {}\n\nOnce you've reviewed the plan, reply with 'approved' to confirm.",
                    self.replies.dashboard_url(&household.id)
                )
            }
            WeeklyPlanStep::PlanApproval => {
                if keywords::approves(text)
                    && self.forms.workflow_form_submitted(phone_number, week).await
                {
                    log.set_step(phone_number, WeeklyPlanStep::Completed).await?;
                    self.save_final_data(&log, phone_number, household, week, text)
                        .await?;
                    APPROVED_REPLY.to_string()
                } else {
                    format!(
                        "Please review your weekly meal plan first at: {} to move ahead.",
                        self.replies.dashboard_url(&household.id)
                    )
                }
            }
            WeeklyPlanStep::Completed => ALREADY_APPROVED_REPLY.to_string(),
        };

        log.record::<WeeklyPlanStep>(phone_number, MessageRole::Bot, &reply)
            .await?;
        Ok(reply)
    }

    async fn save_final_data(
        &self,
        log: &StepLog,
        phone_number: &str,
        household: &Household,
        week: PlanWeek,
        approval: &str,
    ) -> Result<(), WorkflowError> {
        let now = Utc::now();
        let started_at = log.started_at(phone_number).await?.unwrap_or(now);
        let record = serde_json::json!({
            "phone_number": phone_number,
            "workflow_type": WORKFLOW_TYPE,
            "current_step": WeeklyPlanStep::Completed.to_string(),
            "user_data": {"plan_approval": approval},
            "household_id": household.id,
            "week": week.key(),
            "started_at": started_at.to_rfc3339(),
            "completed_at": now.to_rfc3339(),
            "status": "completed",
        });
        self.db
            .save_workflow_status(collections::WEEKLY_PLAN_STATUS, phone_number, &record)
            .await?;

        let lock = serde_json::json!({
            "status": "approved",
            "week": week.week,
            "year": week.year,
        });
        self.db
            .update_household_field(&household.id, "weekly_plan", &lock)
            .await?;
        tracing::info!(household_id = %household.id, week = %week.key(), "Weekly plan approved");
        Ok(())
    }

    /// Step for the current week; `Started` when the log cannot be read.
    pub async fn get_current_step(&self, phone_number: &str) -> WeeklyPlanStep {
        match self.log(PlanWeek::current()).current_step(phone_number).await {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(phone = %phone_number, "Failed to read weekly plan step: {}", e);
                WeeklyPlanStep::Started
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use crate::store::form_types;
    use crate::workflow::{StaticFormChecker, StoreFormChecker};
    use chrono::Duration;

    async fn setup(forms: StaticFormChecker) -> (WeeklyPlanService, Arc<dyn Database>, Household) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.upsert_household("hh1", &serde_json::json!({"name": "Home"}))
            .await
            .unwrap();
        let household = db.get_household("hh1").await.unwrap().unwrap();
        let svc = WeeklyPlanService::new(
            Arc::clone(&db),
            Arc::new(forms),
            Arc::new(BackendClient::stub()),
            ReplyConfig::default(),
        );
        (svc, db, household)
    }

    fn household_with_plan(plan: serde_json::Value) -> Household {
        Household {
            id: "hh1".into(),
            data: serde_json::json!({"weekly_plan": plan}),
        }
    }

    #[test]
    fn lock_requires_current_week_approval() {
        let week = PlanWeek::current();
        let current = household_with_plan(serde_json::json!({"status": "approved", "week": week.week}));
        assert!(is_weekly_plan_locked(Some(&current)));

        let stale_week = if week.week == 1 { 2 } else { week.week - 1 };
        let stale = household_with_plan(serde_json::json!({"status": "approved", "week": stale_week}));
        assert!(!is_weekly_plan_locked(Some(&stale)));

        let none = Household {
            id: "hh1".into(),
            data: serde_json::json!({}),
        };
        assert!(!is_weekly_plan_locked(Some(&none)));
        assert!(is_weekly_plan_locked(None));
    }

    #[tokio::test]
    async fn first_message_sends_dashboard_link() {
        let (svc, _, household) = setup(StaticFormChecker::default()).await;
        let reply = svc.process_message("hi", "+911", &household).await;
        assert!(reply.contains("https://bettermeals.in/app/dashboard/hh1"));
        assert!(reply.contains("reply with 'approved'"));
        assert_eq!(svc.get_current_step("+911").await, WeeklyPlanStep::PlanApproval);
    }

    #[tokio::test]
    async fn approval_needs_form_submission() {
        let (svc, _, household) = setup(StaticFormChecker::default()).await;
        svc.process_message("hi", "+911", &household).await;

        let reply = svc.process_message("approved", "+911", &household).await;
        assert_eq!(
            reply,
            "Please review your weekly meal plan first at: https://bettermeals.in/app/dashboard/hh1 to move ahead."
        );
        assert_eq!(svc.get_current_step("+911").await, WeeklyPlanStep::PlanApproval);
    }

    #[tokio::test]
    async fn approval_locks_the_week() {
        let (svc, db, household) = setup(StaticFormChecker::all_submitted()).await;
        svc.process_message("hi", "+911", &household).await;

        let reply = svc.process_message("Approved", "+911", &household).await;
        assert_eq!(reply, APPROVED_REPLY);
        assert_eq!(svc.get_current_step("+911").await, WeeklyPlanStep::Completed);

        let updated = db.get_household("hh1").await.unwrap().unwrap();
        assert_eq!(updated.data["weekly_plan"]["status"], "approved");
        assert_eq!(updated.data["name"], "Home");
        assert!(is_weekly_plan_locked(Some(&updated)));

        let summaries = db
            .list_workflow_status(collections::WEEKLY_PLAN_STATUS, "+911")
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0]["user_data"]["plan_approval"], "Approved");
    }

    #[tokio::test]
    async fn replaying_approval_does_not_regress() {
        let (svc, db, household) = setup(StaticFormChecker::all_submitted()).await;
        for text in ["hi", "approved"] {
            svc.process_message(text, "+911", &household).await;
        }

        let reply = svc.process_message("approved", "+911", &household).await;
        assert_eq!(reply, ALREADY_APPROVED_REPLY);
        assert_eq!(svc.get_current_step("+911").await, WeeklyPlanStep::Completed);
        assert_eq!(
            db.list_workflow_status(collections::WEEKLY_PLAN_STATUS, "+911")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn previous_week_log_is_ignored() {
        let (svc, db, household) = setup(StaticFormChecker::all_submitted()).await;
        let last_week = StepLog::new(Arc::clone(&db), collections::WEEKLY_PLAN_CHATS, WORKFLOW_TYPE)
            .with_scope("1999-W01");
        last_week
            .set_step("+911", WeeklyPlanStep::Completed)
            .await
            .unwrap();

        assert_eq!(svc.get_current_step("+911").await, WeeklyPlanStep::Started);
        let reply = svc.process_message("hi", "+911", &household).await;
        assert!(reply.starts_with("Welcome to your weekly meal planning!"));
    }

    #[tokio::test]
    async fn review_from_last_week_does_not_approve_this_week() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.upsert_household("hh1", &serde_json::json!({})).await.unwrap();
        let household = db.get_household("hh1").await.unwrap().unwrap();
        let svc = WeeklyPlanService::new(
            Arc::clone(&db),
            Arc::new(StoreFormChecker::new(Arc::clone(&db))),
            Arc::new(BackendClient::stub()),
            ReplyConfig::default(),
        );
        let (monday, _) = PlanWeek::current().bounds().unwrap();
        db.record_form_submission(
            "+911",
            form_types::WEEKLY_PLAN_REVIEW,
            monday - Duration::hours(1),
        )
        .await
        .unwrap();

        svc.process_message("hi", "+911", &household).await;
        let reply = svc.process_message("approved", "+911", &household).await;
        assert!(reply.starts_with("Please review your weekly meal plan first"));
        assert_eq!(svc.get_current_step("+911").await, WeeklyPlanStep::PlanApproval);

        db.record_form_submission("+911", form_types::WEEKLY_PLAN_REVIEW, Utc::now())
            .await
            .unwrap();
        let reply = svc.process_message("approved", "+911", &household).await;
        assert_eq!(reply, APPROVED_REPLY);
    }
}
