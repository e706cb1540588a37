//! Routes an inbound message to the service that owns the conversation.

use std::fmt;
use std::sync::Arc;

use crate::agent::{ConversationAgent, CookAssistant, SenderRole, resolve_thread_id};
use crate::store::Database;
use crate::workflow::onboarding::OnboardingService;
use crate::workflow::weekly_plan::{WeeklyPlanService, is_weekly_plan_locked};

use super::payload::{InboundMessage, WebhookReply};

/// Reply for payloads that cannot be processed at all.
pub const INVALID_PAYLOAD_REPLY: &str =
    "Sorry, I couldn't read that message. Please try again.";

/// Which service handled a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Cook,
    Onboarding,
    WeeklyPlan,
    Agent,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cook => "cook",
            Self::Onboarding => "onboarding",
            Self::WeeklyPlan => "weekly_plan",
            Self::Agent => "agent",
        };
        f.write_str(s)
    }
}

pub struct Dispatcher {
    db: Arc<dyn Database>,
    cook: Arc<CookAssistant>,
    onboarding: Arc<OnboardingService>,
    weekly_plan: Arc<WeeklyPlanService>,
    agent: Arc<ConversationAgent>,
}

impl Dispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        cook: Arc<CookAssistant>,
        onboarding: Arc<OnboardingService>,
        weekly_plan: Arc<WeeklyPlanService>,
        agent: Arc<ConversationAgent>,
    ) -> Self {
        Self {
            db,
            cook,
            onboarding,
            weekly_plan,
            agent,
        }
    }

    pub fn onboarding(&self) -> &Arc<OnboardingService> {
        &self.onboarding
    }

    /// Handle one raw webhook body. Never fails.
    pub async fn dispatch_raw(&self, body: &str) -> WebhookReply {
        match InboundMessage::parse(body) {
            Some(msg) => self.dispatch(&msg).await.1,
            None => WebhookReply::text(INVALID_PAYLOAD_REPLY),
        }
    }

    /// Handle a parsed message, returning the route taken and the reply.
    pub async fn dispatch(&self, msg: &InboundMessage) -> (Route, WebhookReply) {
        let phone = msg.phone_number.trim();

        if self.is_cook(phone).await {
            tracing::info!(phone = %phone, route = %Route::Cook, "Dispatching message");
            let reply = self.cook.process_message(&msg.text, phone).await;
            return (Route::Cook, WebhookReply::text(reply));
        }

        let household = self.onboarding.get_household_from_phone_num(phone).await;
        let household = match household {
            Some(household) if self.onboarding.is_completed(phone).await => household,
            _ => {
                tracing::info!(phone = %phone, route = %Route::Onboarding, "Dispatching message");
                let reply = self
                    .onboarding
                    .process_message(&msg.text, phone, msg.referral_code.as_deref())
                    .await;
                return (Route::Onboarding, WebhookReply::text(reply));
            }
        };

        if !is_weekly_plan_locked(Some(&household)) {
            tracing::info!(phone = %phone, route = %Route::WeeklyPlan, "Dispatching message");
            let reply = self
                .weekly_plan
                .process_message(&msg.text, phone, &household)
                .await;
            return (Route::WeeklyPlan, WebhookReply::text(reply));
        }

        let household_id = msg.household_id.as_deref().or(Some(household.id.as_str()));
        let thread_id = resolve_thread_id(msg.thread_id.as_deref(), household_id);
        tracing::info!(phone = %phone, thread = %thread_id, route = %Route::Agent, "Dispatching message");
        let reply = self
            .agent
            .handle(
                &msg.text,
                thread_id,
                household_id,
                SenderRole::parse(msg.sender_role.as_deref()),
            )
            .await;
        (Route::Agent, reply.into())
    }

    async fn is_cook(&self, phone: &str) -> bool {
        match self.db.is_cook(phone).await {
            Ok(is_cook) => is_cook,
            Err(e) => {
                tracing::warn!(phone = %phone, "Cook lookup failed: {}", e);
                false
            }
        }
    }
}
