//! OnboardingService: coordinates the step log, cohort handlers, and
//! completion bookkeeping.

use std::sync::Arc;

use chrono::Utc;

use crate::config::ReplyConfig;
use crate::error::WorkflowError;
use crate::store::{Database, Household, MessageRole, collections};
use crate::workflow::{FormChecker, StepLog, household_for_phone};

use super::flow::{
    Cohort, FALLBACK_REPLY, FlowContext, GenericOnboarding, OnboardingFlow, ReferralOnboarding,
    UserData, determine_cohort,
};
use super::state::OnboardingStep;

/// Reply when anything inside a turn fails.
pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// Routes onboarding messages to the right cohort and persists both sides
/// of every exchange.
pub struct OnboardingService {
    db: Arc<dyn Database>,
    forms: Arc<dyn FormChecker>,
    replies: ReplyConfig,
    generic: GenericOnboarding,
    referral: ReferralOnboarding,
}

impl OnboardingService {
    pub fn new(db: Arc<dyn Database>, forms: Arc<dyn FormChecker>, replies: ReplyConfig) -> Self {
        Self {
            db,
            forms,
            replies,
            generic: GenericOnboarding,
            referral: ReferralOnboarding,
        }
    }

    fn flow(&self, cohort: Cohort) -> &dyn OnboardingFlow {
        match cohort {
            Cohort::Generic => &self.generic,
            Cohort::Referral => &self.referral,
        }
    }

    /// Log for a cohort. Step reconstruction reads every entry for the phone
    /// number, whichever cohort wrote it.
    fn log(&self, cohort: Cohort) -> StepLog {
        StepLog::new(
            Arc::clone(&self.db),
            collections::ONBOARDING_MESSAGES,
            cohort.as_str(),
        )
    }

    /// Handle one inbound message. Never fails: internal errors are logged
    /// and answered with [`ERROR_REPLY`].
    pub async fn process_message(
        &self,
        text: &str,
        phone_number: &str,
        referral_code: Option<&str>,
    ) -> String {
        let cohort = determine_cohort(referral_code);
        match self.try_process(text, phone_number, cohort).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    phone = %phone_number,
                    cohort = cohort.as_str(),
                    "Onboarding turn failed: {}",
                    e
                );
                if let Err(e) = self
                    .log(cohort)
                    .record::<OnboardingStep>(phone_number, MessageRole::Bot, ERROR_REPLY)
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
        cohort: Cohort,
    ) -> Result<String, WorkflowError> {
        let log = self.log(cohort);
        let step: OnboardingStep = log.record(phone_number, MessageRole::User, text).await?;
        tracing::info!(
            phone = %phone_number,
            cohort = cohort.as_str(),
            step = %step,
            "Processing onboarding message"
        );

        let user_data = UserData::from_entries(&log.entries(phone_number).await?);
        let ctx = FlowContext {
            phone_number,
            user_data: &user_data,
            replies: &self.replies,
            forms: self.forms.as_ref(),
        };

        let reply = match self.flow(cohort).handle(step, text, &ctx).await {
            Some(outcome) => {
                if let Some(next) = outcome.next {
                    log.set_step(phone_number, next).await?;
                    tracing::info!(phone = %phone_number, from = %step, to = %next, "Onboarding step advanced");
                    if next.is_terminal() {
                        self.save_final_data(&log, phone_number, cohort, &user_data)
                            .await?;
                    }
                }
                outcome.reply
            }
            None => FALLBACK_REPLY.to_string(),
        };

        log.record::<OnboardingStep>(phone_number, MessageRole::Bot, &reply)
            .await?;
        Ok(reply)
    }

    /// Summary written once, when the conversation first reaches Completed.
    async fn save_final_data(
        &self,
        log: &StepLog,
        phone_number: &str,
        cohort: Cohort,
        user_data: &UserData,
    ) -> Result<(), WorkflowError> {
        let existing = self
            .db
            .list_workflow_status(collections::WORKFLOW_STATUS, phone_number)
            .await?;
        if existing.iter().any(|r| r["status"] == "completed") {
            tracing::info!(phone = %phone_number, "Onboarding summary already saved");
            return Ok(());
        }

        let now = Utc::now();
        let started_at = log.started_at(phone_number).await?.unwrap_or(now);
        let record = serde_json::json!({
            "phone_number": phone_number,
            "workflow_type": cohort.as_str(),
            "current_step": OnboardingStep::Completed.to_string(),
            "user_data": user_data.to_json(cohort),
            "started_at": started_at.to_rfc3339(),
            "completed_at": now.to_rfc3339(),
            "status": "completed",
        });

        self.db
            .save_workflow_status(collections::WORKFLOW_STATUS, phone_number, &record)
            .await?;
        if let Some(household) = household_for_phone(self.db.as_ref(), phone_number).await? {
            self.db
                .update_household_field(&household.id, "onboarding", &record)
                .await?;
        }
        tracing::info!(phone = %phone_number, cohort = cohort.as_str(), "Onboarding completed");
        Ok(())
    }

    /// Reconstructed step; the initial step when the log cannot be read.
    pub async fn get_current_step(&self, phone_number: &str) -> OnboardingStep {
        match self
            .log(Cohort::Generic)
            .current_step(phone_number)
            .await
        {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(phone = %phone_number, "Failed to read onboarding step: {}", e);
                OnboardingStep::Greeting
            }
        }
    }

    /// Append a step update without a conversational turn.
    pub async fn set_step(
        &self,
        phone_number: &str,
        step: OnboardingStep,
    ) -> Result<(), WorkflowError> {
        self.log(Cohort::Generic).set_step(phone_number, step).await?;
        Ok(())
    }

    pub async fn is_completed(&self, phone_number: &str) -> bool {
        self.get_current_step(phone_number).await.is_terminal()
    }

    /// Household for the phone number, `None` on lookup failure.
    pub async fn get_household_from_phone_num(&self, phone_number: &str) -> Option<Household> {
        if phone_number.is_empty() {
            tracing::info!("No phone number in payload");
            return None;
        }
        match household_for_phone(self.db.as_ref(), phone_number).await {
            Ok(household) => household,
            Err(e) => {
                tracing::error!(phone = %phone_number, "Household lookup failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LibSqlBackend, UserRecord};
    use crate::workflow::StaticFormChecker;

    async fn service(forms: StaticFormChecker) -> (OnboardingService, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let svc = OnboardingService::new(Arc::clone(&db), Arc::new(forms), ReplyConfig::default());
        (svc, db)
    }

    #[tokio::test]
    async fn no_log_starts_at_greeting() {
        let (svc, _) = service(StaticFormChecker::default()).await;
        assert_eq!(svc.get_current_step("+911").await, OnboardingStep::Greeting);
        assert!(!svc.is_completed("+911").await);
    }

    #[tokio::test]
    async fn generic_flow_reaches_completed() {
        let (svc, db) = service(StaticFormChecker::all_submitted()).await;
        let phone = "+919000000001";

        let mut replies = Vec::new();
        for text in ["hi", "Shiwani", "done", "yes", "yes"] {
            replies.push(svc.process_message(text, phone, None).await);
        }

        assert!(replies[0].contains("May I know your name?"));
        assert!(replies[1].contains("Nice to meet you, Shiwani!"));
        assert!(replies[2].contains("₹149"));
        assert!(replies[3].contains("Is it Shiwani?"));
        assert!(replies[4].contains("9639293454@ybl"));
        assert_eq!(svc.get_current_step(phone).await, OnboardingStep::Completed);

        let summaries = db
            .list_workflow_status(collections::WORKFLOW_STATUS, phone)
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0]["status"], "completed");
        assert_eq!(summaries[0]["user_data"]["name"], "Shiwani");
        assert_eq!(summaries[0]["workflow_type"], "generic");
    }

    #[tokio::test]
    async fn every_turn_is_logged() {
        let (svc, db) = service(StaticFormChecker::default()).await;
        svc.process_message("hi", "+911", None).await;

        let entries = db
            .list_workflow_messages(collections::ONBOARDING_MESSAGES, "+911", None)
            .await
            .unwrap();
        // Newest first: bot reply, step update, user message.
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].role, MessageRole::Bot);
        assert_eq!(entries[0].current_step, "name_collection");
        assert_eq!(entries[1].role, MessageRole::System);
        assert!(entries[1].step_update);
        assert_eq!(entries[2].role, MessageRole::User);
        assert_eq!(entries[2].current_step, "greeting");
    }

    #[tokio::test]
    async fn blank_name_does_not_advance() {
        let (svc, _) = service(StaticFormChecker::default()).await;
        svc.process_message("hi", "+911", None).await;

        let reply = svc.process_message("   ", "+911", None).await;
        assert_eq!(reply, "Please tell me your name so I can help you better!");
        assert_eq!(svc.get_current_step("+911").await, OnboardingStep::NameCollection);
    }

    #[tokio::test]
    async fn form_gate_blocks_until_submitted() {
        let (svc, _) = service(StaticFormChecker::default()).await;
        for text in ["hi", "Asha", "done"] {
            svc.process_message(text, "+911", None).await;
        }
        assert_eq!(svc.get_current_step("+911").await, OnboardingStep::FormCompletion);
    }

    #[tokio::test]
    async fn referral_code_switches_copy() {
        // Same phone and text on fresh stores, so only the code differs.
        let (svc, _) = service(StaticFormChecker::all_submitted()).await;
        let generic = svc.process_message("hi", "+911", None).await;
        let (svc, _) = service(StaticFormChecker::all_submitted()).await;
        let referral = svc.process_message("hi", "+911", Some("SH1")).await;

        assert!(!generic.contains("Super Health hospital"));
        assert!(referral.contains("I see you were referred by Super Health hospital!"));
        assert_ne!(generic, referral);

        // A blank code is no referral.
        let (svc, _) = service(StaticFormChecker::all_submitted()).await;
        assert_eq!(svc.process_message("hi", "+911", Some("")).await, generic);
    }

    #[tokio::test]
    async fn referral_flow_completes_through_group_invitation() {
        let (svc, db) = service(StaticFormChecker::default()).await;
        let phone = "+913";
        db.upsert_user(&UserRecord {
            id: "u1".into(),
            whatsapp_number: phone.into(),
            household_id: Some("hh1".into()),
            data: serde_json::json!({}),
        })
        .await
        .unwrap();
        db.upsert_household("hh1", &serde_json::json!({})).await.unwrap();

        let code = Some("SH1");
        for text in ["hi", "Ravi", "Heart Health", "ok", "yes"] {
            svc.process_message(text, phone, code).await;
        }
        assert_eq!(svc.get_current_step(phone).await, OnboardingStep::GroupInvitation);

        let reply = svc.process_message("paid", phone, code).await;
        assert!(reply.contains("WhatsApp group"));
        assert!(svc.is_completed(phone).await);

        let household = db.get_household("hh1").await.unwrap().unwrap();
        assert_eq!(household.data["onboarding"]["status"], "completed");
        assert_eq!(household.data["onboarding"]["user_data"]["treatment_plan"], "Heart Health");
        assert_eq!(household.data["onboarding"]["workflow_type"], "referral");
    }

    #[tokio::test]
    async fn completed_conversation_gets_fallback() {
        let (svc, db) = service(StaticFormChecker::default()).await;
        svc.set_step("+911", OnboardingStep::Completed).await.unwrap();

        let reply = svc.process_message("hello again", "+911", None).await;
        assert_eq!(reply, FALLBACK_REPLY);
        assert!(svc.is_completed("+911").await);
        // No summary: completion was not reached through a turn.
        assert!(
            db.list_workflow_status(collections::WORKFLOW_STATUS, "+911")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn household_lookup_handles_blank_phone() {
        let (svc, _) = service(StaticFormChecker::default()).await;
        assert!(svc.get_household_from_phone_num("").await.is_none());
        assert!(svc.get_household_from_phone_num("+911").await.is_none());
    }
}
