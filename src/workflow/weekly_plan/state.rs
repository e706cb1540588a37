//! Weekly plan steps and ISO-week helpers.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowStep;

/// Started → PlanApproval → Completed, once per ISO week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeeklyPlanStep {
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "plan_approval")]
    PlanApproval,
    /// Logged as `approved`.
    #[serde(rename = "approved")]
    Completed,
}

impl WorkflowStep for WeeklyPlanStep {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::PlanApproval => "plan_approval",
            Self::Completed => "approved",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "started" => Some(Self::Started),
            "plan_approval" => Some(Self::PlanApproval),
            "approved" => Some(Self::Completed),
            _ => None,
        }
    }

    fn initial() -> Self {
        Self::Started
    }
}

impl std::fmt::Display for WeeklyPlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ISO week of a moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanWeek {
    pub year: i32,
    pub week: u32,
}

impl PlanWeek {
    pub fn of(at: DateTime<Utc>) -> Self {
        let iso = at.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn current() -> Self {
        Self::of(Utc::now())
    }

    /// Log scope key, e.g. `2025-W07`.
    pub fn key(&self) -> String {
        format!("{}-W{:02}", self.year, self.week)
    }

    /// `[Monday 00:00, next Monday 00:00)` in UTC. `None` for a week number
    /// the year does not have.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let monday = NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)?;
        let start = monday.and_hms_opt(0, 0, 0)?.and_utc();
        Some((start, start + Duration::days(7)))
    }

    /// Whether a household's `weekly_plan` document is approved for this
    /// week. A document without `year` matches on week number alone.
    pub fn is_approved_in(&self, weekly_plan: &serde_json::Value) -> bool {
        let approved = weekly_plan.get("status").and_then(|v| v.as_str()) == Some("approved");
        let week_matches = weekly_plan.get("week").and_then(|v| v.as_u64()) == Some(self.week as u64);
        let year_matches = match weekly_plan.get("year").and_then(|v| v.as_i64()) {
            Some(year) => year == self.year as i64,
            None => true,
        };
        approved && week_matches && year_matches
    }
}
