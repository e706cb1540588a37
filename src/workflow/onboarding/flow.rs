//! Step handlers for the onboarding cohorts.
//!
//! Handlers are pure with respect to the log: they read the reconstructed
//! [`UserData`], decide on a reply and an optional next step, and leave all
//! persistence to the service.

use async_trait::async_trait;

use crate::config::ReplyConfig;
use crate::store::WorkflowMessage;
use crate::workflow::FormChecker;
use crate::workflow::keywords;
use crate::workflow::log::user_messages_at;

use super::state::OnboardingStep;

/// Fallback name when none was collected.
const DEFAULT_NAME: &str = "there";

/// Onboarding variant for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cohort {
    Generic,
    Referral,
}

impl Cohort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Referral => "referral",
        }
    }
}

/// Pick the cohort from the inbound payload. Any non-blank referral code
/// selects the referral flow; nothing about the choice is persisted.
pub fn determine_cohort(referral_code: Option<&str>) -> Cohort {
    match referral_code {
        Some(code) if !code.trim().is_empty() => Cohort::Referral,
        _ => Cohort::Generic,
    }
}

/// What the user has told us so far, rebuilt from the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserData {
    pub name: Option<String>,
    pub treatment_plan: Option<String>,
}

impl UserData {
    /// Rebuild from log entries ordered newest first.
    pub fn from_entries(entries: &[WorkflowMessage]) -> Self {
        let latest = |step: OnboardingStep| {
            user_messages_at(entries, step)
                .into_iter()
                .map(str::trim)
                .find(|m| !m.is_empty())
                .map(str::to_string)
        };
        Self {
            name: latest(OnboardingStep::NameCollection),
            treatment_plan: latest(OnboardingStep::NeedsAssessment),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    pub fn to_json(&self, cohort: Cohort) -> serde_json::Value {
        let mut data = serde_json::json!({});
        if let Some(name) = &self.name {
            data["name"] = serde_json::json!(name);
        }
        if cohort == Cohort::Referral {
            data["is_referral"] = serde_json::json!(true);
            data["referral_source"] = serde_json::json!("Super Health Hospital");
            if let Some(plan) = &self.treatment_plan {
                data["treatment_plan"] = serde_json::json!(plan);
            }
        }
        data
    }
}

/// Everything a handler may consult.
pub struct FlowContext<'a> {
    pub phone_number: &'a str,
    pub user_data: &'a UserData,
    pub replies: &'a ReplyConfig,
    pub forms: &'a dyn FormChecker,
}

/// Result of one handler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub reply: String,
    /// Step to enter, or `None` to stay and re-prompt.
    pub next: Option<OnboardingStep>,
}

impl StepOutcome {
    fn stay(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            next: None,
        }
    }

    fn advance(next: OnboardingStep, reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            next: Some(next),
        }
    }
}

/// One onboarding cohort's handler set.
#[async_trait]
pub trait OnboardingFlow: Send + Sync {
    fn cohort(&self) -> Cohort;

    /// Run the handler for `step`. `None` when this cohort has no handler
    /// for it.
    async fn handle(
        &self,
        step: OnboardingStep,
        text: &str,
        ctx: &FlowContext<'_>,
    ) -> Option<StepOutcome>;
}

/// Reply for a step with no handler.
pub const FALLBACK_REPLY: &str = "Welcome to BetterMeals! Let's get you started. What's your name?";

const NAME_REPROMPT: &str = "Please tell me your name so I can help you better!";

fn collected_name(text: &str) -> Option<&str> {
    let name = text.trim();
    (!name.is_empty()).then_some(name)
}

fn confirm_name_reply(ctx: &FlowContext<'_>) -> String {
    format!(
        "Awesome! Can you confirm your name for the payment link? Is it {}?",
        ctx.user_data.display_name()
    )
}

/// Default flow: form link, ₹149 trial, UPI payment.
pub struct GenericOnboarding;

impl GenericOnboarding {
    fn greeting(&self) -> StepOutcome {
        StepOutcome::advance(
            OnboardingStep::NameCollection,
            "Hey! I'm Zuko from Bettermeals. May I know your name?",
        )
    }

    fn name_collection(&self, text: &str, ctx: &FlowContext<'_>) -> StepOutcome {
        let Some(name) = collected_name(text) else {
            return StepOutcome::stay(NAME_REPROMPT);
        };
        StepOutcome::advance(
            OnboardingStep::FormCompletion,
            format!(
                "Nice to meet you, {name}! Please complete this quick onboarding form to get started: {} \n\n Let me know once you've completed the form!",
                ctx.replies.onboarding_form_url
            ),
        )
    }

    async fn form_completion(&self, text: &str, ctx: &FlowContext<'_>) -> StepOutcome {
        if keywords::reports_form_done(text)
            && ctx.forms.onboarding_form_submitted(ctx.phone_number).await
        {
            return StepOutcome::advance(
                OnboardingStep::TrialOffer,
                format!(
                    "Perfect, {}! Thanks for completing the form. Want to try BetterMeals for a month at just ₹149?",
                    ctx.user_data.display_name()
                ),
            );
        }
        StepOutcome::stay(format!(
            "Please complete the onboarding form first: {} \n\nLet me know once you're done!",
            ctx.replies.onboarding_form_url
        ))
    }

    fn trial_offer(&self, text: &str, ctx: &FlowContext<'_>) -> StepOutcome {
        if !keywords::accepts_offer(text) {
            return StepOutcome::stay(
                "No worries! Take your time. Feel free to reach out when you're ready to try BetterMeals.",
            );
        }
        StepOutcome::advance(OnboardingStep::PaymentConfirmation, confirm_name_reply(ctx))
    }

    fn payment_confirmation(&self, text: &str, ctx: &FlowContext<'_>) -> StepOutcome {
        if !keywords::confirms(text) {
            return StepOutcome::stay(
                "Please confirm your name once, before the payment process starts",
            );
        }
        StepOutcome::advance(
            OnboardingStep::Completed,
            format!(
                "You can pay for the ₹149 trial at this UPI ID: {}\n\nLet me know once you've paid, {}! 😊",
                ctx.replies.upi_id,
                ctx.user_data.display_name()
            ),
        )
    }
}

#[async_trait]
impl OnboardingFlow for GenericOnboarding {
    fn cohort(&self) -> Cohort {
        Cohort::Generic
    }

    async fn handle(
        &self,
        step: OnboardingStep,
        text: &str,
        ctx: &FlowContext<'_>,
    ) -> Option<StepOutcome> {
        let outcome = match step {
            OnboardingStep::Greeting => self.greeting(),
            OnboardingStep::NameCollection => self.name_collection(text, ctx),
            OnboardingStep::FormCompletion => self.form_completion(text, ctx).await,
            OnboardingStep::TrialOffer => self.trial_offer(text, ctx),
            OnboardingStep::PaymentConfirmation => self.payment_confirmation(text, ctx),
            _ => return None,
        };
        Some(outcome)
    }
}

/// Hospital referral flow: treatment plan menu, ₹299 pricing, group invite.
pub struct ReferralOnboarding;

impl ReferralOnboarding {
    fn greeting(&self) -> StepOutcome {
        StepOutcome::advance(
            OnboardingStep::NameCollection,
            "Hey! I'm Zuko from Bettermeals. I see you were referred by Super Health hospital! May I know your name?",
        )
    }

    fn name_collection(&self, text: &str) -> StepOutcome {
        let Some(name) = collected_name(text) else {
            return StepOutcome::stay(NAME_REPROMPT);
        };
        StepOutcome::advance(
            OnboardingStep::NeedsAssessment,
            format!(
                "Nice to meet you, {name}! Since you were referred by Super Health hospital, you get a special discount! Which treatment plan are you looking for?\n\n1. Diabetes Management\n2. Heart Health\n3. Weight Management\n4. General Wellness\n5. Post-Surgery Recovery\n6. Other specific condition"
            ),
        )
    }

    fn treatment_plan(&self, text: &str) -> StepOutcome {
        StepOutcome::advance(
            OnboardingStep::TrialOffer,
            format!(
                "Perfect! BetterMeals will create personalized meal plans for your {} needs. Since you were referred by Super Health hospital, you get the first month for just ₹299 instead of ₹499!",
                text.trim().to_lowercase()
            ),
        )
    }

    fn trial_offer(&self, text: &str, ctx: &FlowContext<'_>) -> StepOutcome {
        if !keywords::accepts_offer(text) {
            return StepOutcome::stay(
                "No worries! Take your time. Feel free to reach out when you're ready to try BetterMeals with Super Health hospital's special pricing.",
            );
        }
        StepOutcome::advance(OnboardingStep::PaymentConfirmation, confirm_name_reply(ctx))
    }

    fn payment_confirmation(&self, text: &str, ctx: &FlowContext<'_>) -> StepOutcome {
        if !keywords::confirms(text) {
            return StepOutcome::stay("Please confirm your name so I send you the payment details");
        }
        StepOutcome::advance(
            OnboardingStep::GroupInvitation,
            format!(
                "Here's the UPI ID for the ₹299 trial (referral discount): {}\n\nLet me know once you've paid, {}! 😊",
                ctx.replies.upi_id,
                ctx.user_data.display_name()
            ),
        )
    }

    fn group_invitation(&self, text: &str) -> StepOutcome {
        if !keywords::reports_payment_done(text) {
            return StepOutcome::stay(
                "Please let me know once you've completed the payment so I can send you the group invitation.",
            );
        }
        StepOutcome::advance(
            OnboardingStep::Completed,
            "You have received the invite for WhatsApp group. Please join the group and our team will lead you from there. Thanks for joining through Super Health hospital referral!",
        )
    }
}

#[async_trait]
impl OnboardingFlow for ReferralOnboarding {
    fn cohort(&self) -> Cohort {
        Cohort::Referral
    }

    async fn handle(
        &self,
        step: OnboardingStep,
        text: &str,
        ctx: &FlowContext<'_>,
    ) -> Option<StepOutcome> {
        let outcome = match step {
            OnboardingStep::Greeting => self.greeting(),
            OnboardingStep::NameCollection => self.name_collection(text),
            OnboardingStep::NeedsAssessment => self.treatment_plan(text),
            OnboardingStep::TrialOffer => self.trial_offer(text, ctx),
            OnboardingStep::PaymentConfirmation => self.payment_confirmation(text, ctx),
            OnboardingStep::GroupInvitation => self.group_invitation(text),
            _ => return None,
        };
        Some(outcome)
    }
}
