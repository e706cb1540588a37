//! Onboarding steps.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::workflow::WorkflowStep;

/// The steps of the onboarding conversation.
///
/// Generic cohort: Greeting → NameCollection → FormCompletion → TrialOffer →
/// PaymentConfirmation → Completed.
/// Referral cohort: Greeting → NameCollection → NeedsAssessment → TrialOffer
/// → PaymentConfirmation → GroupInvitation → Completed.
///
/// The remaining variants belong to retired flows. They stay parseable so old
/// logs still reconstruct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Greeting,
    NameCollection,
    FormCompletion,
    NeedsAssessment,
    StressPoints,
    CookCoordinationDetails,
    CookStatus,
    TrialOffer,
    PaymentConfirmation,
    GroupInvitation,
    Completed,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 11] = [
        Self::Greeting,
        Self::NameCollection,
        Self::FormCompletion,
        Self::NeedsAssessment,
        Self::StressPoints,
        Self::CookCoordinationDetails,
        Self::CookStatus,
        Self::TrialOffer,
        Self::PaymentConfirmation,
        Self::GroupInvitation,
        Self::Completed,
    ];

    /// Whether onboarding is done.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl WorkflowStep for OnboardingStep {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::NameCollection => "name_collection",
            Self::FormCompletion => "form_completion",
            Self::NeedsAssessment => "needs_assessment",
            Self::StressPoints => "stress_points",
            Self::CookCoordinationDetails => "cook_coordination_details",
            Self::CookStatus => "cook_status",
            Self::TrialOffer => "trial_offer",
            Self::PaymentConfirmation => "payment_confirmation",
            Self::GroupInvitation => "group_invitation",
            Self::Completed => "completed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    fn initial() -> Self {
        Self::Greeting
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        Self::Greeting
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnboardingStep {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as WorkflowStep>::parse(s).ok_or_else(|| WorkflowError::UnknownStep {
            workflow: "onboarding".to_string(),
            value: s.to_string(),
        })
    }
}
