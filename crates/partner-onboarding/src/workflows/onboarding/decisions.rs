use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::checklist::non_blank;
use super::domain::{
    Actor, ApplicationNumber, ApplicationStatus, CaseCore, FieldVisitStatus, PartnerCase,
};
use super::repository::{ApplicationRepository, CaseCommit};
use super::service::{commit_guarded, load_case, OnboardingError};
use super::state_machine::ApplicationStateMachine;

/// Outcome chosen by tele-verification or KYC staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDecision {
    Approve,
    Reject,
    OnHold,
}

impl StageDecision {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::OnHold => "on_hold",
        }
    }

    pub const fn requires_reason(self) -> bool {
        !matches!(self, Self::Approve)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    #[error("{stage}: a reason is required for decision '{decision}'")]
    ReasonRequired {
        stage: &'static str,
        decision: String,
    },
    #[error("field visit must include GPS latitude and longitude")]
    MissingGps,
    #[error("field verification result is required")]
    MissingResult,
    #[error("documents still awaiting verification: {}", outstanding.join(", "))]
    DocumentsIncomplete { outstanding: Vec<String> },
    #[error("field visit is assigned to '{assigned_to}'")]
    NotAssigned { assigned_to: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Verified,
    NotReachable,
    CallBackRequested,
    Declined,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleVerificationInput {
    pub call_status: Option<CallStatus>,
    #[serde(default)]
    pub decision_reason: Option<String>,
    #[serde(default)]
    pub call_notes: Option<String>,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleVerificationLog {
    pub application_number: ApplicationNumber,
    pub staff_id: String,
    pub decision: StageDecision,
    pub call_status: CallStatus,
    pub decision_reason: Option<String>,
    pub call_notes: Option<String>,
    pub preferred_language: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycApprovalInput {
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub field_assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycApproval {
    pub application_number: ApplicationNumber,
    pub staff_id: String,
    pub decision: StageDecision,
    pub remarks: Option<String>,
    pub field_assignee: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldVerificationResult {
    VerifiedOk,
    VerifiedIssues,
    NotVerified,
}

impl FieldVerificationResult {
    /// Blank input yields `None`; anything unrecognised counts as not verified.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            "verified_ok" => Some(Self::VerifiedOk),
            "verified_issues" => Some(Self::VerifiedIssues),
            _ => Some(Self::NotVerified),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldReportStatus {
    FieldVerificationComplete,
    FieldVerificationWithIssues,
    FieldVerificationFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldVisit {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub visit_date: NaiveDate,
    #[serde(default)]
    pub address_verified: bool,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInspection {
    pub registration_number: String,
    pub vehicle_type: String,
    pub condition: String,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCollection {
    pub amount_inr: u32,
    pub payment_mode: String,
    #[serde(default)]
    pub receipt_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldVerificationInput {
    #[serde(default)]
    pub verification_result: String,
    pub visit: FieldVisit,
    #[serde(default)]
    pub vehicles: Vec<VehicleInspection>,
    #[serde(default)]
    pub fee: Option<FeeCollection>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldVerificationReport {
    pub application_number: ApplicationNumber,
    pub staff_id: String,
    pub verification_result: FieldVerificationResult,
    pub application_status: FieldReportStatus,
    pub location: GeoPoint,
    pub visit_date: NaiveDate,
    pub address_verified: bool,
    pub remarks: Option<String>,
    pub vehicles: Vec<VehicleInspection>,
    pub fee: Option<FeeCollection>,
    pub photo_urls: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Status an application moves to after a tele-verification decision.
pub const fn tele_target(decision: StageDecision) -> ApplicationStatus {
    match decision {
        StageDecision::Approve => ApplicationStatus::UnderReview,
        StageDecision::Reject => ApplicationStatus::Rejected,
        StageDecision::OnHold => ApplicationStatus::OnHold,
    }
}

/// Status an application moves to after the KYC approval decision.
pub const fn kyc_target(decision: StageDecision) -> ApplicationStatus {
    match decision {
        StageDecision::Approve => ApplicationStatus::FieldPending,
        StageDecision::Reject => ApplicationStatus::Rejected,
        StageDecision::OnHold => ApplicationStatus::OnHold,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOutcome {
    pub status: ApplicationStatus,
    pub visit_status: FieldVisitStatus,
    pub report_status: FieldReportStatus,
}

pub const fn field_outcome(result: FieldVerificationResult) -> FieldOutcome {
    match result {
        FieldVerificationResult::VerifiedOk => FieldOutcome {
            status: ApplicationStatus::FieldVerifiedUnderAdminReview,
            visit_status: FieldVisitStatus::FieldVerified,
            report_status: FieldReportStatus::FieldVerificationComplete,
        },
        FieldVerificationResult::VerifiedIssues => FieldOutcome {
            status: ApplicationStatus::UnderReview,
            visit_status: FieldVisitStatus::FieldVerifiedWithIssues,
            report_status: FieldReportStatus::FieldVerificationWithIssues,
        },
        FieldVerificationResult::NotVerified => FieldOutcome {
            status: ApplicationStatus::Rejected,
            visit_status: FieldVisitStatus::FieldVerificationFailed,
            report_status: FieldReportStatus::FieldVerificationFailed,
        },
    }
}

/// Only the assigned RM may work a field visit once KYC has named one.
fn ensure_assigned(core: &CaseCore, rm: &Actor) -> Result<(), DecisionError> {
    match &core.field_assigned_to {
        Some(assigned_to) if assigned_to != &rm.id => Err(DecisionError::NotAssigned {
            assigned_to: assigned_to.clone(),
        }),
        _ => Ok(()),
    }
}

/// Persists stage decisions and moves the application along the resulting edge in one commit.
pub struct StageDecisionRecorder<R> {
    repository: Arc<R>,
}

impl<R> StageDecisionRecorder<R>
where
    R: ApplicationRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn record_tele_verification(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
        decision: StageDecision,
        input: TeleVerificationInput,
    ) -> Result<TeleVerificationLog, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;

        let decision_reason = non_blank(input.decision_reason.as_deref());
        if decision.requires_reason() && decision_reason.is_none() {
            return Err(DecisionError::ReasonRequired {
                stage: "tele verification",
                decision: decision.label().to_string(),
            }
            .into());
        }

        let mut application = case.application;
        let change = ApplicationStateMachine::transition(
            &mut application.core_mut().status,
            tele_target(decision),
            staff,
        )?;

        let call_status = input.call_status.unwrap_or(match decision {
            StageDecision::Approve => CallStatus::Verified,
            _ => CallStatus::CallBackRequested,
        });
        let log = TeleVerificationLog {
            application_number: number.clone(),
            staff_id: staff.id.clone(),
            decision,
            call_status,
            decision_reason,
            call_notes: non_blank(input.call_notes.as_deref()),
            preferred_language: non_blank(input.preferred_language.as_deref()),
            recorded_at: Utc::now(),
        };

        let commit = CaseCommit::guarded(number.clone(), change.from)
            .with_status(application.core().tracked_status())
            .with_tele_log(log.clone());
        commit_guarded(self.repository.as_ref(), commit)?;

        info!(
            application = %number,
            staff = %staff.id,
            decision = decision.label(),
            from = %change.from,
            to = %change.to,
            "tele verification recorded"
        );
        Ok(log)
    }

    pub fn record_kyc_approval(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
        decision: StageDecision,
        input: KycApprovalInput,
    ) -> Result<KycApproval, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;

        let remarks = non_blank(input.remarks.as_deref());
        if decision.requires_reason() && remarks.is_none() {
            return Err(DecisionError::ReasonRequired {
                stage: "kyc approval",
                decision: decision.label().to_string(),
            }
            .into());
        }

        let revision = case.application.core().revision;
        let mut application = case.application;
        if decision == StageDecision::Approve && !application.all_required_verified() {
            let outstanding = application
                .core()
                .document_checklist
                .outstanding(application.required_documents())
                .into_iter()
                .map(|document| document.key().to_string())
                .collect();
            return Err(DecisionError::DocumentsIncomplete { outstanding }.into());
        }

        let change = ApplicationStateMachine::transition(
            &mut application.core_mut().status,
            kyc_target(decision),
            staff,
        )?;

        let field_assignee = match decision {
            StageDecision::Approve => non_blank(input.field_assignee.as_deref()),
            _ => None,
        };
        let review = KycApproval {
            application_number: number.clone(),
            staff_id: staff.id.clone(),
            decision,
            remarks,
            field_assignee: field_assignee.clone(),
            recorded_at: Utc::now(),
        };

        let mut commit = CaseCommit::guarded(number.clone(), change.from)
            .with_status(application.core().tracked_status())
            .with_kyc_review(review.clone());
        if decision == StageDecision::Approve {
            commit = commit.with_revision_guard(revision);
        }
        if field_assignee.is_some() {
            commit = commit
                .with_field_assignee(field_assignee)
                .with_field_visit_status(FieldVisitStatus::Scheduled);
        }
        commit_guarded(self.repository.as_ref(), commit)?;

        info!(
            application = %number,
            staff = %staff.id,
            decision = decision.label(),
            to = %change.to,
            "kyc approval recorded"
        );
        Ok(review)
    }

    pub fn start_field_visit(
        &self,
        number: &ApplicationNumber,
        rm: &Actor,
    ) -> Result<ApplicationStatus, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        let mut application = case.application;
        ensure_assigned(application.core(), rm)?;

        let change = ApplicationStateMachine::transition(
            &mut application.core_mut().status,
            ApplicationStatus::FieldVerificationInProgress,
            rm,
        )?;

        let commit = CaseCommit::guarded(number.clone(), change.from)
            .with_status(application.core().tracked_status())
            .with_field_visit_status(FieldVisitStatus::InProgress);
        commit_guarded(self.repository.as_ref(), commit)?;

        info!(application = %number, rm = %rm.id, "field visit started");
        Ok(change.to)
    }

    pub fn record_field_verification(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
        input: FieldVerificationInput,
    ) -> Result<FieldVerificationReport, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        ensure_assigned(case.application.core(), staff)?;

        let FieldVerificationInput {
            verification_result,
            visit,
            vehicles,
            fee,
            photo_urls,
        } = input;

        let location = match (visit.latitude, visit.longitude) {
            (Some(latitude), Some(longitude)) if latitude.is_finite() && longitude.is_finite() => {
                GeoPoint {
                    latitude,
                    longitude,
                }
            }
            _ => return Err(DecisionError::MissingGps.into()),
        };
        let result = FieldVerificationResult::parse(&verification_result)
            .ok_or(DecisionError::MissingResult)?;
        let remarks = non_blank(visit.remarks.as_deref());
        if result != FieldVerificationResult::VerifiedOk && remarks.is_none() {
            return Err(DecisionError::ReasonRequired {
                stage: "field verification",
                decision: verification_result.trim().to_string(),
            }
            .into());
        }

        let outcome = field_outcome(result);
        let mut application = case.application;
        let change = ApplicationStateMachine::transition(
            &mut application.core_mut().status,
            outcome.status,
            staff,
        )?;

        let report = FieldVerificationReport {
            application_number: number.clone(),
            staff_id: staff.id.clone(),
            verification_result: result,
            application_status: outcome.report_status,
            location,
            visit_date: visit.visit_date,
            address_verified: visit.address_verified,
            remarks,
            vehicles,
            fee,
            photo_urls,
            recorded_at: Utc::now(),
        };

        let commit = CaseCommit::guarded(number.clone(), change.from)
            .with_status(application.core().tracked_status())
            .with_field_visit_status(outcome.visit_status)
            .with_field_report(report.clone());
        commit_guarded(self.repository.as_ref(), commit)?;

        info!(
            application = %number,
            staff = %staff.id,
            result = ?result,
            to = %change.to,
            "field verification recorded"
        );
        Ok(report)
    }
}
