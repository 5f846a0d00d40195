use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::info;

use super::approval::{ApprovalError, ApprovalReceipt, ApprovalTransactionEngine, DecisionReceipt};
use super::checklist::{non_blank, resolve_document_type, ChecklistError};
use super::decisions::{
    DecisionError, FieldVerificationInput, FieldVerificationReport, KycApproval, KycApprovalInput,
    StageDecision, StageDecisionRecorder, TeleVerificationInput, TeleVerificationLog,
};
use super::domain::{
    Actor, ActorRole, Application, ApplicationNumber, ApplicationStatus, ApplicationSubmission,
    DocumentRecord, DocumentStatus, DocumentType, PartnerCase,
};
use super::notifications::{
    NotificationDispatcher, NotificationWorker, Notifier, OutboundMessage, RetrySummary,
};
use super::repository::{
    ApplicationRepository, BlobStore, CaseCommit, CaseFile, RepositoryError, StorageError,
};
use super::snapshot::ApplicationSnapshot;
use super::state_machine::{ApplicationStateMachine, IllegalTransition};
use crate::config::OnboardingConfig;

const FIRST_SEQUENCE: u64 = 1001;

/// Error raised by the onboarding service and its stage components.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("application '{0}' not found")]
    ApplicationNotFound(ApplicationNumber),
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
    #[error(transparent)]
    Checklist(#[from] ChecklistError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("role '{role}' may not {action} (status '{current}')")]
    Forbidden {
        role: ActorRole,
        action: &'static str,
        current: ApplicationStatus,
    },
    #[error("application changed concurrently (now '{current}'); reload and retry")]
    ConcurrentUpdate { current: ApplicationStatus },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl OnboardingError {
    /// Canonical status carried by state-guard failures so callers can refresh.
    pub fn current_status(&self) -> Option<ApplicationStatus> {
        match self {
            Self::IllegalTransition(err) => Some(err.current),
            Self::Forbidden { current, .. } => Some(*current),
            Self::ConcurrentUpdate { current } => Some(*current),
            Self::Approval(ApprovalError::AlreadyDecided { current }) => Some(*current),
            Self::Approval(ApprovalError::AlreadyApproved) => Some(ApplicationStatus::Approved),
            _ => None,
        }
    }
}

pub(super) fn load_case<R>(
    repository: &R,
    number: &ApplicationNumber,
) -> Result<CaseFile, OnboardingError>
where
    R: ApplicationRepository + ?Sized,
{
    repository
        .fetch(number)?
        .ok_or_else(|| OnboardingError::ApplicationNotFound(number.clone()))
}

pub(super) fn commit_guarded<R>(repository: &R, commit: CaseCommit) -> Result<u64, OnboardingError>
where
    R: ApplicationRepository + ?Sized,
{
    match repository.commit(commit) {
        Ok(revision) => Ok(revision),
        Err(RepositoryError::StatusMismatch { found, .. }) => {
            Err(OnboardingError::ConcurrentUpdate { current: found })
        }
        Err(RepositoryError::RevisionMismatch { status, .. }) => {
            Err(OnboardingError::ConcurrentUpdate { current: status })
        }
        Err(other) => Err(other.into()),
    }
}

/// Document review belongs to KYC staff alone.
fn ensure_kyc_staff(
    actor: &Actor,
    action: &'static str,
    current: ApplicationStatus,
) -> Result<(), OnboardingError> {
    if actor.role == ActorRole::KycStaff {
        Ok(())
    } else {
        Err(OnboardingError::Forbidden {
            role: actor.role,
            action,
            current,
        })
    }
}

/// Service composing the checklist, stage recorder, state machine, and approval engine.
pub struct OnboardingService<R, B, N> {
    repository: Arc<R>,
    blobs: Arc<B>,
    dispatcher: Arc<NotificationDispatcher<N>>,
    recorder: StageDecisionRecorder<R>,
    engine: ApprovalTransactionEngine<R, N>,
    sequence: AtomicU64,
    notification_poll: Duration,
}

impl<R, B, N> OnboardingService<R, B, N>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        blobs: Arc<B>,
        notifier: Arc<N>,
        config: OnboardingConfig,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            notifier,
            config.notification_max_attempts,
        ));
        let notification_poll = config.notification_poll_interval();
        let recorder = StageDecisionRecorder::new(repository.clone());
        let engine = ApprovalTransactionEngine::new(repository.clone(), dispatcher.clone(), config);

        Self {
            repository,
            blobs,
            dispatcher,
            recorder,
            engine,
            sequence: AtomicU64::new(FIRST_SEQUENCE),
            notification_poll,
        }
    }

    /// Register a new case in status `New` with an empty document checklist.
    pub fn submit_application(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<Application, OnboardingError> {
        let applicant = &submission.applicant;
        if applicant.full_name.trim().is_empty() {
            return Err(OnboardingError::InvalidSubmission(
                "applicant name is required".to_string(),
            ));
        }
        if !applicant.email.contains('@') {
            return Err(OnboardingError::InvalidSubmission(
                "applicant email is invalid".to_string(),
            ));
        }

        let kind = submission.profile.kind();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let number = ApplicationNumber(format!("{}-{sequence}", kind.number_prefix()));
        let application = Application::from_submission(number, submission, Utc::now());

        let stored = self.repository.insert(application)?;
        info!(
            application = %stored.application_number(),
            partner = kind.label(),
            "application submitted"
        );
        Ok(stored)
    }

    /// Upload a document and mark it `uploaded`; a storage failure leaves the record untouched.
    pub fn attach_document(
        &self,
        number: &ApplicationNumber,
        document_key: &str,
        local_ref: &str,
    ) -> Result<DocumentRecord, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        let mut application = case.application;
        let document = resolve_document_type(application.kind(), document_key)?;

        let folder = format!("{}/{}", number, document.key());
        let url = self.blobs.put(local_ref, &folder)?;

        let record = application.core_mut().document_checklist.attach(document, url);
        let commit =
            CaseCommit::new(number.clone()).with_documents(vec![(document, record.clone())]);
        self.repository.commit(commit)?;

        info!(application = %number, document = document.key(), "document uploaded");
        Ok(record)
    }

    pub fn set_document_status(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
        document_key: &str,
        status: DocumentStatus,
        reason: Option<&str>,
    ) -> Result<DocumentRecord, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        ensure_kyc_staff(staff, "update document status", case.status())?;
        let mut application = case.application;
        let document = resolve_document_type(application.kind(), document_key)?;

        let record = application
            .core_mut()
            .document_checklist
            .set_status(document, status, reason)?;
        let commit =
            CaseCommit::new(number.clone()).with_documents(vec![(document, record.clone())]);
        self.repository.commit(commit)?;

        info!(
            application = %number,
            staff = %staff.id,
            document = document.key(),
            status = status.label(),
            "document status updated"
        );
        Ok(record)
    }

    /// Flag documents for correction and re-open the KYC stage in the same commit.
    pub fn request_document_correction(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
        document_keys: &[String],
        reason: &str,
    ) -> Result<Vec<(DocumentType, DocumentRecord)>, OnboardingError> {
        if non_blank(Some(reason)).is_none() {
            return Err(ChecklistError::ReasonRequired {
                status: DocumentStatus::RequiresAction.label(),
            }
            .into());
        }
        if document_keys.is_empty() {
            return Err(ChecklistError::EmptySelection.into());
        }

        let case = load_case(self.repository.as_ref(), number)?;
        ensure_kyc_staff(staff, "request document corrections", case.status())?;
        let mut application = case.application;
        let kind = application.kind();
        let documents = document_keys
            .iter()
            .map(|key| resolve_document_type(kind, key))
            .collect::<Result<Vec<_>, _>>()?;

        let updated = application
            .core_mut()
            .document_checklist
            .request_correction(&documents, reason)?;

        let current = application.status();
        let commit = if current == ApplicationStatus::InKyc {
            CaseCommit::guarded(number.clone(), current)
        } else {
            let change = ApplicationStateMachine::transition(
                &mut application.core_mut().status,
                ApplicationStatus::InKyc,
                staff,
            )?;
            CaseCommit::guarded(number.clone(), change.from)
                .with_status(application.core().tracked_status())
        };
        commit_guarded(self.repository.as_ref(), commit.with_documents(updated.clone()))?;

        info!(
            application = %number,
            staff = %staff.id,
            documents = updated.len(),
            "document correction requested"
        );
        Ok(updated)
    }

    pub fn all_required_verified(
        &self,
        number: &ApplicationNumber,
    ) -> Result<bool, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        Ok(case.application.all_required_verified())
    }

    /// New -> In KYC.
    pub fn begin_kyc(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
    ) -> Result<ApplicationStatus, OnboardingError> {
        self.move_to(number, staff, ApplicationStatus::InKyc)
    }

    /// In KYC -> Tele Verification, once every required document is verified. The commit is
    /// pinned to the revision the checklist was read at.
    pub fn complete_document_check(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
    ) -> Result<ApplicationStatus, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        let outstanding = case
            .application
            .core()
            .document_checklist
            .outstanding(case.application.required_documents());
        if !outstanding.is_empty() {
            return Err(DecisionError::DocumentsIncomplete {
                outstanding: outstanding
                    .into_iter()
                    .map(|document| document.key().to_string())
                    .collect(),
            }
            .into());
        }
        let revision = case.application.core().revision;
        self.commit_move(
            number,
            case,
            staff,
            ApplicationStatus::TeleVerification,
            Some(revision),
        )
    }

    pub fn record_tele_verification(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
        decision: StageDecision,
        input: TeleVerificationInput,
    ) -> Result<TeleVerificationLog, OnboardingError> {
        self.recorder
            .record_tele_verification(number, staff, decision, input)
    }

    pub fn record_kyc_approval(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
        decision: StageDecision,
        input: KycApprovalInput,
    ) -> Result<KycApproval, OnboardingError> {
        self.recorder.record_kyc_approval(number, staff, decision, input)
    }

    pub fn start_field_visit(
        &self,
        number: &ApplicationNumber,
        rm: &Actor,
    ) -> Result<ApplicationStatus, OnboardingError> {
        self.recorder.start_field_visit(number, rm)
    }

    pub fn record_field_verification(
        &self,
        number: &ApplicationNumber,
        staff: &Actor,
        input: FieldVerificationInput,
    ) -> Result<FieldVerificationReport, OnboardingError> {
        self.recorder.record_field_verification(number, staff, input)
    }

    /// Return an `On Hold` application to the stage it was parked from.
    pub fn resume(
        &self,
        number: &ApplicationNumber,
        actor: &Actor,
    ) -> Result<ApplicationStatus, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        let tracked = case.application.core().tracked_status();
        let target =
            ApplicationStateMachine::resume_target(&tracked).ok_or(IllegalTransition {
                current: tracked.current(),
                target: tracked.current(),
                role: actor.role,
            })?;
        self.move_to(number, actor, target)
    }

    pub fn approve(
        &self,
        number: &ApplicationNumber,
        admin: &Actor,
        compliance_notes: Option<String>,
    ) -> Result<ApprovalReceipt, OnboardingError> {
        self.engine.approve(number, admin, compliance_notes)
    }

    pub fn reject(
        &self,
        number: &ApplicationNumber,
        admin: &Actor,
        reason: &str,
        details: Option<String>,
    ) -> Result<DecisionReceipt, OnboardingError> {
        self.engine.reject(number, admin, reason, details)
    }

    pub fn hold(
        &self,
        number: &ApplicationNumber,
        admin: &Actor,
        clarification: &str,
        follow_up_date: Option<NaiveDate>,
    ) -> Result<DecisionReceipt, OnboardingError> {
        self.engine.hold(number, admin, clarification, follow_up_date)
    }

    /// Read-only projection of status and every decision record.
    pub fn get_application_snapshot(
        &self,
        number: &ApplicationNumber,
    ) -> Result<ApplicationSnapshot, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        Ok(ApplicationSnapshot::from_case(&case))
    }

    /// Start the background notification worker; requires a running tokio runtime.
    pub fn spawn_notification_worker(&self) -> NotificationWorker {
        self.dispatcher.spawn_worker(self.notification_poll)
    }

    pub fn retry_pending_notifications(&self) -> RetrySummary {
        self.dispatcher.retry_pending()
    }

    pub fn pending_notifications(&self) -> Vec<OutboundMessage> {
        self.dispatcher.pending()
    }

    fn move_to(
        &self,
        number: &ApplicationNumber,
        actor: &Actor,
        target: ApplicationStatus,
    ) -> Result<ApplicationStatus, OnboardingError> {
        let case = load_case(self.repository.as_ref(), number)?;
        self.commit_move(number, case, actor, target, None)
    }

    fn commit_move(
        &self,
        number: &ApplicationNumber,
        case: CaseFile,
        actor: &Actor,
        target: ApplicationStatus,
        pinned_revision: Option<u64>,
    ) -> Result<ApplicationStatus, OnboardingError> {
        let mut application = case.application;
        let change =
            ApplicationStateMachine::transition(&mut application.core_mut().status, target, actor)?;

        let mut commit = CaseCommit::guarded(number.clone(), change.from)
            .with_status(application.core().tracked_status());
        if let Some(revision) = pinned_revision {
            commit = commit.with_revision_guard(revision);
        }
        commit_guarded(self.repository.as_ref(), commit)?;

        info!(
            application = %number,
            actor = %actor.id,
            from = %change.from,
            to = %change.to,
            "application status changed"
        );
        Ok(change.to)
    }
}
