//! BetterMeals WhatsApp agent: onboarding and weekly-plan state machines,
//! a tool-using conversational agent, and the webhook that routes between
//! them.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod secrets;
pub mod store;
pub mod tools;
pub mod webhook;
pub mod workflow;
