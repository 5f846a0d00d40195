//! Role-gated transition table for an application's pipeline status.
//!
//! `TrackedStatus` can only be advanced through [`ApplicationStateMachine::transition`]; every
//! stage component plans its status change here before committing it.

use serde::{Deserialize, Serialize};

use super::domain::{Actor, ActorRole, ApplicationStatus};

use ActorRole::{Admin, FieldRm, KycStaff, TeleStaff};
use ApplicationStatus::*;

/// Current status plus, while parked, the stage the application was parked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedStatus {
    current: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parked_from: Option<ApplicationStatus>,
}

impl TrackedStatus {
    pub(super) const fn initial() -> Self {
        Self {
            current: New,
            parked_from: None,
        }
    }

    pub const fn current(&self) -> ApplicationStatus {
        self.current
    }

    pub const fn parked_from(&self) -> Option<ApplicationStatus> {
        self.parked_from
    }
}

/// A validated move between two statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{role} may not move an application from '{current}' to '{target}'")]
pub struct IllegalTransition {
    pub current: ApplicationStatus,
    pub target: ApplicationStatus,
    pub role: ActorRole,
}

pub struct ApplicationStateMachine;

impl ApplicationStateMachine {
    /// Outgoing edges of a working stage. `OnHold` is resolved through its parked stage.
    pub const fn stage_edges(from: ApplicationStatus) -> &'static [(ApplicationStatus, ActorRole)] {
        match from {
            New => &[(InKyc, KycStaff)],
            InKyc => &[(TeleVerification, KycStaff)],
            TeleVerification => &[
                (UnderReview, TeleStaff),
                (Rejected, TeleStaff),
                (OnHold, TeleStaff),
                (InKyc, KycStaff),
            ],
            UnderReview => &[
                (FieldPending, KycStaff),
                (Rejected, KycStaff),
                (OnHold, KycStaff),
                (InKyc, KycStaff),
            ],
            FieldPending => &[
                (FieldVerificationInProgress, FieldRm),
                (FieldVerifiedUnderAdminReview, FieldRm),
                (UnderReview, FieldRm),
                (Rejected, FieldRm),
            ],
            FieldVerificationInProgress => &[
                (FieldVerifiedUnderAdminReview, FieldRm),
                (UnderReview, FieldRm),
                (Rejected, FieldRm),
            ],
            FieldVerifiedUnderAdminReview => &[
                (Approved, Admin),
                (Rejected, Admin),
                (OnHold, Admin),
            ],
            Approved | Rejected | OnHold => &[],
        }
    }

    /// Role allowed to move `status` to `target`, if the edge exists at all.
    pub fn required_role(
        status: &TrackedStatus,
        target: ApplicationStatus,
    ) -> Option<ActorRole> {
        match status.current {
            OnHold => {
                let parked = status.parked_from?;
                let edges = Self::stage_edges(parked);
                if target == parked {
                    // Resuming belongs to whoever parked it.
                    return edges
                        .iter()
                        .find(|(to, _)| *to == OnHold)
                        .map(|(_, role)| *role);
                }
                edges
                    .iter()
                    .find(|(to, _)| *to == target && *to != OnHold)
                    .map(|(_, role)| *role)
            }
            current => Self::stage_edges(current)
                .iter()
                .find(|(to, _)| *to == target)
                .map(|(_, role)| *role),
        }
    }

    pub fn permits(status: &TrackedStatus, target: ApplicationStatus, role: ActorRole) -> bool {
        Self::required_role(status, target) == Some(role)
    }

    /// Apply `target` to `status` if the actor's role owns that edge; otherwise leave it untouched.
    pub fn transition(
        status: &mut TrackedStatus,
        target: ApplicationStatus,
        actor: &Actor,
    ) -> Result<StatusChange, IllegalTransition> {
        if !Self::permits(status, target, actor.role) {
            return Err(IllegalTransition {
                current: status.current,
                target,
                role: actor.role,
            });
        }

        let from = status.current;
        status.parked_from = if target == OnHold { Some(from) } else { None };
        status.current = target;

        Ok(StatusChange { from, to: target })
    }

    /// Stage an `OnHold` application would return to on resume.
    pub fn resume_target(status: &TrackedStatus) -> Option<ApplicationStatus> {
        match status.current {
            OnHold => status.parked_from,
            _ => None,
        }
    }
}
