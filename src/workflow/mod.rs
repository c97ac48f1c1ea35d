//! Approval workflow engine.
//!
//! Templates (an ordered list of role-bound levels per trigger type) are
//! plain data owned by `models::workflow`; this module holds the runtime
//! state machine that advances a submitted request through its snapshot of
//! those levels.

pub mod engine;

pub use engine::{ApprovalOutcome, LevelState, LevelStatus, LevelTemplate, RequestStatus};

/// The only trigger type currently wired to request submission.
pub const TRIGGER_REQUEST_SUBMITTED: &str = "request_submitted";
