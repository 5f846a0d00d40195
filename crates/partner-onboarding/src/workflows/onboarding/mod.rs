//! Partner onboarding pipeline: document checklist, stage decisions, the role-gated status
//! machine, and the transactional approval engine.

pub mod approval;
pub mod checklist;
pub mod decisions;
pub mod domain;
pub mod memory;
pub mod notifications;
pub mod provisioning;
pub mod repository;
pub mod router;
pub mod service;
pub mod snapshot;
pub mod state_machine;

#[cfg(test)]
mod tests;

pub use approval::{
    readiness_gaps, AdminReview, ApprovalError, ApprovalReceipt, ApprovalTransactionEngine,
    AuditAction, AuditLogEntry, DecisionReceipt, FinalDecision, FinalDecisionStatus,
};
pub use checklist::{resolve_document_type, ChecklistError, DocumentChecklist};
pub use decisions::{
    CallStatus, DecisionError, FeeCollection, FieldReportStatus, FieldVerificationInput,
    FieldVerificationReport, FieldVerificationResult, FieldVisit, GeoPoint, KycApproval,
    KycApprovalInput, StageDecision, StageDecisionRecorder, TeleVerificationInput,
    TeleVerificationLog, VehicleInspection,
};
pub use domain::{
    Actor, ActorRole, ApplicantContact, Application, ApplicationNumber, ApplicationStatus,
    ApplicationSubmission, CaseCore, DocumentRecord, DocumentStatus, DocumentType,
    FieldVisitStatus, FleetOwnerCase, FranchiseCase, PartnerCase, PartnerKind, PartnerProfile,
};
pub use memory::{InMemoryApplicationRepository, InMemoryBlobStore, RecordingNotifier};
pub use notifications::{
    Notification, NotificationDispatcher, NotificationKind, NotificationOutcome,
    NotificationWorker, Notifier, NotifyError, OutboundMessage, RetrySummary,
};
pub use provisioning::{hash_token, ActivationToken, PartnerUser, UserId};
pub use repository::{
    ApplicationRepository, BlobStore, CaseCommit, CaseFile, RepositoryError, StorageError,
};
pub use router::onboarding_router;
pub use service::{OnboardingError, OnboardingService};
pub use snapshot::{ApplicationSnapshot, DocumentView};
pub use state_machine::{ApplicationStateMachine, IllegalTransition, StatusChange, TrackedStatus};
