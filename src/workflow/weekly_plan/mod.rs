//! Weekly meal plan approval.
//!
//! Once a household is onboarded, each ISO week opens a short conversation:
//! the user is sent the dashboard link and replies "approved". Approval
//! writes `household.weekly_plan = {status, week, year}`, which locks the
//! workflow until the next week. Log entries are scoped by week key, so a
//! new week starts again at `started`.

pub mod service;
pub mod state;

pub use service::{WeeklyPlanService, is_weekly_plan_locked};
pub use state::{PlanWeek, WeeklyPlanStep};
