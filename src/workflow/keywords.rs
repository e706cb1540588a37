//! Fixed keyword vocabulary used by the step handlers.
//!
//! Matching is case-insensitive. "Exact" sets compare the trimmed message;
//! "contains" sets match anywhere in it.

const TRIAL_ACCEPT: &[&str] = &["sure", "yes", "y", "yeah", "yep", "ok", "okay"];
const CONFIRM: &[&str] = &["yes", "y", "yeah", "yep"];
const APPROVAL: &[&str] = &["approved", "approve", "yes", "y", "yeah", "yep", "ok", "okay"];
const FORM_DONE: &[&str] = &["done", "completed", "finished"];
const PAYMENT_DONE: &[&str] = &["done", "paid", "✅"];

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn exact(text: &str, words: &[&str]) -> bool {
    let text = normalize(text);
    words.contains(&text.as_str())
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    let text = text.to_lowercase();
    words.iter().any(|w| text.contains(w))
}

/// Acceptance of the trial offer.
pub fn accepts_offer(text: &str) -> bool {
    exact(text, TRIAL_ACCEPT)
}

/// A plain yes, used for name and payment confirmation.
pub fn confirms(text: &str) -> bool {
    exact(text, CONFIRM)
}

/// Weekly plan approval.
pub fn approves(text: &str) -> bool {
    exact(text, APPROVAL)
}

/// The user says a form is done.
pub fn reports_form_done(text: &str) -> bool {
    contains_any(text, FORM_DONE)
}

/// The user says payment is done.
pub fn reports_payment_done(text: &str) -> bool {
    contains_any(text, PAYMENT_DONE)
}
