use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Overall request lifecycle. `Rejected` and `Fulfilled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Fulfilled,
}

impl RequestStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "fulfilled" => Some(Self::Fulfilled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Fulfilled => "fulfilled",
        }
    }
}

/// Per-level runtime status. Exactly one level is `Pending` while the
/// chain is live; everything after it stays `Awaiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    Awaiting,
    Pending,
    Approved,
    Rejected,
}

impl LevelStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting" => Some(Self::Awaiting),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awaiting => "awaiting",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// One level of a workflow template.
#[derive(Debug, Clone)]
pub struct LevelTemplate {
    pub level_order: i64,
    pub role_id: Uuid,
}

/// Runtime state of one snapshotted level.
#[derive(Debug, Clone)]
pub struct LevelState {
    pub level_order: i64,
    pub role_id: Uuid,
    pub status: LevelStatus,
}

/// Result of approving the current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The next level moved from `Awaiting` to `Pending`.
    Advanced { next_level: i64 },
    /// That was the last level; the request as a whole is approved.
    Completed,
}

/// Materialize the runtime chain from a template snapshot: level 1 starts
/// `Pending`, every later level `Awaiting`.
pub fn instantiate(templates: &[LevelTemplate]) -> Vec<LevelState> {
    templates
        .iter()
        .map(|t| LevelState {
            level_order: t.level_order,
            role_id: t.role_id,
            status: if t.level_order == 1 {
                LevelStatus::Pending
            } else {
                LevelStatus::Awaiting
            },
        })
        .collect()
}

/// The single level currently awaiting a decision, if the chain is live.
pub fn pending_level(levels: &[LevelState]) -> Option<&LevelState> {
    levels.iter().find(|l| l.status == LevelStatus::Pending)
}

/// Decide the transition for approving level `level_order`.
///
/// The caller persists the transition; this only validates the current
/// chain state and names the outcome.
pub fn approve(levels: &[LevelState], level_order: i64) -> Result<ApprovalOutcome, AppError> {
    let level = find_actionable(levels, level_order)?;

    let last = levels.iter().map(|l| l.level_order).max().unwrap_or(level.level_order);
    if level.level_order == last {
        Ok(ApprovalOutcome::Completed)
    } else {
        Ok(ApprovalOutcome::Advanced {
            next_level: level.level_order + 1,
        })
    }
}

/// Decide the transition for rejecting level `level_order`. A reason is
/// mandatory; the remaining levels stay `Awaiting` permanently.
pub fn reject(levels: &[LevelState], level_order: i64, reason: &str) -> Result<(), AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::validation("rejection reason is required"));
    }
    find_actionable(levels, level_order)?;
    Ok(())
}

fn find_actionable(levels: &[LevelState], level_order: i64) -> Result<&LevelState, AppError> {
    let level = levels
        .iter()
        .find(|l| l.level_order == level_order)
        .ok_or_else(|| AppError::not_found(format!("approval level {} not found", level_order)))?;

    match level.status {
        LevelStatus::Pending => Ok(level),
        LevelStatus::Approved | LevelStatus::Rejected => Err(AppError::already_processed(format!(
            "approval level {} was already {}",
            level_order,
            level.status.as_str()
        ))),
        LevelStatus::Awaiting => Err(AppError::invalid_request_status(format!(
            "approval level {} is not yet pending",
            level_order
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level_chain() -> Vec<LevelState> {
        instantiate(&[
            LevelTemplate {
                level_order: 1,
                role_id: Uuid::new_v4(),
            },
            LevelTemplate {
                level_order: 2,
                role_id: Uuid::new_v4(),
            },
        ])
    }

    #[test]
    fn instantiation_sets_first_level_pending() {
        let levels = two_level_chain();
        assert_eq!(levels[0].status, LevelStatus::Pending);
        assert_eq!(levels[1].status, LevelStatus::Awaiting);
        assert_eq!(pending_level(&levels).map(|l| l.level_order), Some(1));
    }

    #[test]
    fn approving_intermediate_level_advances() {
        let levels = two_level_chain();
        assert_eq!(
            approve(&levels, 1).unwrap(),
            ApprovalOutcome::Advanced { next_level: 2 }
        );
    }

    #[test]
    fn approving_last_level_completes() {
        let mut levels = two_level_chain();
        levels[0].status = LevelStatus::Approved;
        levels[1].status = LevelStatus::Pending;
        assert_eq!(approve(&levels, 2).unwrap(), ApprovalOutcome::Completed);
    }

    #[test]
    fn single_level_chain_completes_immediately() {
        let levels = instantiate(&[LevelTemplate {
            level_order: 1,
            role_id: Uuid::new_v4(),
        }]);
        assert_eq!(approve(&levels, 1).unwrap(), ApprovalOutcome::Completed);
    }

    #[test]
    fn acting_on_awaiting_level_is_invalid_status() {
        let levels = two_level_chain();
        let err = approve(&levels, 2).unwrap_err();
        assert_eq!(err.code(), "invalid_request_status");
    }

    #[test]
    fn acting_on_resolved_level_is_already_processed() {
        let mut levels = two_level_chain();
        levels[0].status = LevelStatus::Approved;
        let err = approve(&levels, 1).unwrap_err();
        assert_eq!(err.code(), "request_already_processed");

        levels[0].status = LevelStatus::Rejected;
        let err = reject(&levels, 1, "duplicate order").unwrap_err();
        assert_eq!(err.code(), "request_already_processed");
    }

    #[test]
    fn rejection_requires_a_reason() {
        let levels = two_level_chain();
        let err = reject(&levels, 1, "  ").unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(reject(&levels, 1, "budget exceeded").is_ok());
    }

    #[test]
    fn unknown_level_is_not_found() {
        let levels = two_level_chain();
        assert_eq!(approve(&levels, 9).unwrap_err().code(), "not_found");
    }
}
