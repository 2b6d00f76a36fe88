//! The review processing pipeline: rule matching, moderation gating,
//! orchestration, and the periodic sync loop.

pub mod moderation;
pub mod processor;
pub mod rules;
pub mod scheduler;

pub use moderation::{ModerationDecision, ModerationEvent};
pub use processor::{BatchSummary, ProcessorDeps, ReviewProcessor};
pub use scheduler::spawn_sync_loop;
