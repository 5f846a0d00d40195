//! Terminal admin decisions: approve, reject, or hold.
//!
//! The durable part of each decision (status, admin review, audit entry and, for approvals, the
//! provisioned user) is committed as one conditional write guarded by the status read at the
//! start of the call. Whoever loses a race for the same application observes the winner's status
//! and gets `AlreadyDecided`. Notifications go out only after the commit.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::checklist::non_blank;
use super::decisions::{CallStatus, FieldReportStatus};
use super::domain::{Actor, ApplicationNumber, ApplicationStatus, PartnerCase};
use super::notifications::{
    activation_email, clarification_email, rejection_email, NotificationDispatcher,
    NotificationKind, NotificationOutcome, Notifier, OutboundMessage,
};
use super::provisioning::{activation_link, issue_activation_token, PartnerUser, UserId};
use super::repository::{ApplicationRepository, CaseCommit, CaseFile, RepositoryError};
use super::service::{load_case, OnboardingError};
use super::state_machine::ApplicationStateMachine;
use crate::config::OnboardingConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("application already decided (status '{current}')")]
    AlreadyDecided { current: ApplicationStatus },
    #[error("application is approved and can no longer be changed")]
    AlreadyApproved,
    #[error("application is not ready for approval: {}", missing.join(", "))]
    NotReady { missing: Vec<&'static str> },
    #[error("{field} is required")]
    ReasonRequired { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalDecisionStatus {
    Approved,
    Rejected,
    OnHold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub status: FinalDecisionStatus,
    pub reason: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminReview {
    pub application_number: ApplicationNumber,
    pub assigned_admin: String,
    pub final_decision: FinalDecision,
    pub compliance_notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ApproveApplication,
    RejectApplication,
    HoldApplication,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ApproveApplication => "APPROVE_APPLICATION",
            Self::RejectApplication => "REJECT_APPLICATION",
            Self::HoldApplication => "HOLD_APPLICATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub admin_id: String,
    pub action: AuditAction,
    pub application_number: ApplicationNumber,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalReceipt {
    pub application_number: ApplicationNumber,
    pub user_id: UserId,
    pub activation_link: String,
    pub token_expires_at: DateTime<Utc>,
    pub notification: NotificationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionReceipt {
    pub application_number: ApplicationNumber,
    pub status: ApplicationStatus,
    pub notification: NotificationOutcome,
}

/// Readiness gaps blocking approval; empty when the case may be approved.
pub fn readiness_gaps(case: &CaseFile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let tele_verified = case
        .tele_log
        .as_ref()
        .is_some_and(|log| log.call_status == CallStatus::Verified);
    if !tele_verified {
        missing.push("tele verification");
    }
    let field_complete = case.field_report.as_ref().is_some_and(|report| {
        report.application_status == FieldReportStatus::FieldVerificationComplete
    });
    if !field_complete {
        missing.push("field verification");
    }
    missing
}

pub struct ApprovalTransactionEngine<R, N> {
    repository: Arc<R>,
    dispatcher: Arc<NotificationDispatcher<N>>,
    config: OnboardingConfig,
}

impl<R, N> ApprovalTransactionEngine<R, N>
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        dispatcher: Arc<NotificationDispatcher<N>>,
        config: OnboardingConfig,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            config,
        }
    }

    pub fn approve(
        &self,
        number: &ApplicationNumber,
        admin: &Actor,
        compliance_notes: Option<String>,
    ) -> Result<ApprovalReceipt, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        let current = case.status();
        if current.is_terminal() {
            return Err(ApprovalError::AlreadyDecided { current }.into());
        }

        let missing = readiness_gaps(&case);
        if !missing.is_empty() {
            return Err(ApprovalError::NotReady { missing }.into());
        }

        let mut application = case.application;
        let change = ApplicationStateMachine::transition(
            &mut application.core_mut().status,
            ApplicationStatus::Approved,
            admin,
        )?;

        let now = Utc::now();
        let token = issue_activation_token(now, self.config.token_ttl());
        let user = PartnerUser::provision(&application, &token, now);
        let review = AdminReview {
            application_number: number.clone(),
            assigned_admin: admin.id.clone(),
            final_decision: FinalDecision {
                status: FinalDecisionStatus::Approved,
                reason: None,
                details: None,
            },
            compliance_notes: non_blank(compliance_notes.as_deref()),
            follow_up_date: None,
            decided_at: now,
        };

        let commit = CaseCommit::guarded(number.clone(), change.from)
            .with_status(application.core().tracked_status())
            .with_user(user.clone())
            .with_admin_review(review)
            .with_audit(audit_entry(admin, AuditAction::ApproveApplication, number, now));
        self.commit_decision(commit)?;

        info!(
            application = %number,
            admin = %admin.id,
            user = %user.id,
            "application approved and partner account provisioned"
        );

        let link = activation_link(&self.config.activation_base_url, &user.id, &token.token);
        let notification = self.dispatcher.dispatch(OutboundMessage::new(
            number.clone(),
            NotificationKind::Activation,
            activation_email(
                &application.core().applicant,
                number,
                &link,
                token.expires_at,
            ),
        ));

        Ok(ApprovalReceipt {
            application_number: number.clone(),
            user_id: user.id,
            activation_link: link,
            token_expires_at: token.expires_at,
            notification,
        })
    }

    pub fn reject(
        &self,
        number: &ApplicationNumber,
        admin: &Actor,
        reason: &str,
        details: Option<String>,
    ) -> Result<DecisionReceipt, OnboardingError> {
        let reason =
            non_blank(Some(reason)).ok_or(ApprovalError::ReasonRequired { field: "reason" })?;

        let case = load_case(self.repository.as_ref(), number)?;
        ensure_open(case.status())?;

        let mut application = case.application;
        let change = ApplicationStateMachine::transition(
            &mut application.core_mut().status,
            ApplicationStatus::Rejected,
            admin,
        )?;

        let now = Utc::now();
        let review = AdminReview {
            application_number: number.clone(),
            assigned_admin: admin.id.clone(),
            final_decision: FinalDecision {
                status: FinalDecisionStatus::Rejected,
                reason: Some(reason.clone()),
                details: non_blank(details.as_deref()),
            },
            compliance_notes: None,
            follow_up_date: None,
            decided_at: now,
        };
        let commit = CaseCommit::guarded(number.clone(), change.from)
            .with_status(application.core().tracked_status())
            .with_admin_review(review)
            .with_audit(audit_entry(admin, AuditAction::RejectApplication, number, now));
        self.commit_decision(commit)?;

        info!(application = %number, admin = %admin.id, "application rejected");

        let notification = self.dispatcher.dispatch(OutboundMessage::new(
            number.clone(),
            NotificationKind::Rejection,
            rejection_email(&application.core().applicant, number, &reason),
        ));

        Ok(DecisionReceipt {
            application_number: number.clone(),
            status: change.to,
            notification,
        })
    }

    pub fn hold(
        &self,
        number: &ApplicationNumber,
        admin: &Actor,
        clarification: &str,
        follow_up_date: Option<NaiveDate>,
    ) -> Result<DecisionReceipt, OnboardingError> {
        let clarification = non_blank(Some(clarification))
            .ok_or(ApprovalError::ReasonRequired { field: "clarification" })?;

        let case = load_case(self.repository.as_ref(), number)?;
        ensure_open(case.status())?;

        let mut application = case.application;
        let change = ApplicationStateMachine::transition(
            &mut application.core_mut().status,
            ApplicationStatus::OnHold,
            admin,
        )?;

        let now = Utc::now();
        let review = AdminReview {
            application_number: number.clone(),
            assigned_admin: admin.id.clone(),
            final_decision: FinalDecision {
                status: FinalDecisionStatus::OnHold,
                reason: Some(clarification.clone()),
                details: None,
            },
            compliance_notes: None,
            follow_up_date,
            decided_at: now,
        };
        let commit = CaseCommit::guarded(number.clone(), change.from)
            .with_status(application.core().tracked_status())
            .with_admin_review(review)
            .with_audit(audit_entry(admin, AuditAction::HoldApplication, number, now));
        self.commit_decision(commit)?;

        info!(application = %number, admin = %admin.id, "application put on hold");

        let notification = self.dispatcher.dispatch(OutboundMessage::new(
            number.clone(),
            NotificationKind::ClarificationRequest,
            clarification_email(
                &application.core().applicant,
                number,
                &clarification,
                follow_up_date,
            ),
        ));

        Ok(DecisionReceipt {
            application_number: number.clone(),
            status: change.to,
            notification,
        })
    }

    /// A failed conditional write means another decision landed first.
    fn commit_decision(&self, commit: CaseCommit) -> Result<u64, OnboardingError> {
        match self.repository.commit(commit) {
            Ok(revision) => Ok(revision),
            Err(RepositoryError::StatusMismatch { found, .. }) if found.is_terminal() => {
                Err(ApprovalError::AlreadyDecided { current: found }.into())
            }
            Err(RepositoryError::StatusMismatch { found, .. }) => {
                Err(OnboardingError::ConcurrentUpdate { current: found })
            }
            Err(other) => Err(other.into()),
        }
    }
}

fn ensure_open(current: ApplicationStatus) -> Result<(), ApprovalError> {
    match current {
        ApplicationStatus::Approved => Err(ApprovalError::AlreadyApproved),
        ApplicationStatus::Rejected => Err(ApprovalError::AlreadyDecided { current }),
        _ => Ok(()),
    }
}

fn audit_entry(
    admin: &Actor,
    action: AuditAction,
    number: &ApplicationNumber,
    timestamp: DateTime<Utc>,
) -> AuditLogEntry {
    AuditLogEntry {
        admin_id: admin.id.clone(),
        action,
        application_number: number.clone(),
        timestamp,
    }
}
