//! Onboarding: the scripted first-contact conversation that turns a new
//! phone number into a registered household.
//!
//! Two cohorts share one step enum and one log. The cohort is chosen per
//! message from the inbound `referral_code`.

pub mod flow;
pub mod routes;
pub mod service;
pub mod state;

pub use flow::{Cohort, OnboardingFlow, StepOutcome, UserData, determine_cohort};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use service::OnboardingService;
pub use state::OnboardingStep;
