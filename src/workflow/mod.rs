//! Conversational workflows driven by an append-only step log.
//!
//! A workflow's current step is never stored directly: it is reconstructed
//! on every turn from the most recent step-update entry in the log (see
//! [`StepLog`]). Onboarding and weekly-plan approval are the two workflows.

pub mod forms;
pub mod keywords;
pub mod log;
pub mod onboarding;
pub mod weekly_plan;

use crate::error::DatabaseError;
use crate::store::{Database, Household};

pub use forms::{FormChecker, StaticFormChecker, StoreFormChecker};
pub use log::{StepLog, WorkflowStep, step_from_entries};

/// Household for a WhatsApp number: user by number, then household by id.
pub async fn household_for_phone(
    db: &dyn Database,
    phone_number: &str,
) -> Result<Option<Household>, DatabaseError> {
    let Some(user) = db.get_user_by_whatsapp(phone_number).await? else {
        tracing::info!(phone = %phone_number, "No user found for phone");
        return Ok(None);
    };
    let Some(household_id) = user.household_id.as_deref() else {
        tracing::warn!(phone = %phone_number, "User has no household id");
        return Ok(None);
    };
    db.get_household(household_id).await
}
