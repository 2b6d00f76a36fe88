//! Moderation gate — the auto-vs-pending decision before sending a reply.

use uuid::Uuid;

use crate::model::ReviewRule;

/// Outcome of the moderation gate for one generated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    /// May be sent without human review (still subject to the process-wide
    /// auto-send toggle).
    Auto,
    /// Requires an external approval before sending.
    Pending,
}

/// Decide whether a generated reply needs human approval.
///
/// Pending if the rule demands moderation or the rating is 3 stars or
/// below; Auto otherwise. Pure, no side effects.
pub fn decide(rule: &ReviewRule, rating: u8) -> ModerationDecision {
    if rule.require_moderation || rating <= 3 {
        ModerationDecision::Pending
    } else {
        ModerationDecision::Auto
    }
}

/// Emitted when a reply enters the moderation queue, for an external
/// approver surface to pick up.
#[derive(Debug, Clone)]
pub struct ModerationEvent {
    pub review_id: Uuid,
    pub account_id: Uuid,
    pub rating: u8,
    pub response_text: String,
}
