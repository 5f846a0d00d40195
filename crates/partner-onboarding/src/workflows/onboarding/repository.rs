use serde::{Deserialize, Serialize};

use super::approval::{AdminReview, AuditLogEntry};
use super::decisions::{FieldVerificationReport, KycApproval, TeleVerificationLog};
use super::domain::{
    Application, ApplicationNumber, ApplicationStatus, DocumentRecord, DocumentType,
    FieldVisitStatus, PartnerCase,
};
use super::provisioning::PartnerUser;
use super::state_machine::TrackedStatus;

/// Everything the pipeline knows about one case: the application and its decision records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    pub application: Application,
    pub tele_log: Option<TeleVerificationLog>,
    pub kyc_review: Option<KycApproval>,
    pub field_report: Option<FieldVerificationReport>,
    pub admin_reviews: Vec<AdminReview>,
}

impl CaseFile {
    pub fn new(application: Application) -> Self {
        Self {
            application,
            tele_log: None,
            kyc_review: None,
            field_report: None,
            admin_reviews: Vec::new(),
        }
    }

    pub fn status(&self) -> ApplicationStatus {
        self.application.status()
    }

    /// Apply a commit's writes. Callers have already checked the commit's guard.
    pub fn apply(&mut self, commit: CaseCommit) {
        let core = self.application.core_mut();
        if let Some(status) = commit.status {
            core.status = status;
        }
        for (document, record) in commit.documents {
            core.document_checklist.apply(document, record);
        }
        if let Some(assignee) = commit.field_assigned_to {
            core.field_assigned_to = Some(assignee);
        }
        if let Some(visit_status) = commit.field_visit_status {
            core.field_visit_status = Some(visit_status);
        }
        if let Some(user) = &commit.user {
            core.user_id = Some(user.id.clone());
        }
        if let Some(review) = commit.kyc_review {
            core.kyc_approval = Some(review.decision);
            self.kyc_review = Some(review);
        }
        core.revision += 1;

        if let Some(log) = commit.tele_log {
            self.tele_log = Some(log);
        }
        if let Some(report) = commit.field_report {
            self.field_report = Some(report);
        }
        if let Some(review) = commit.admin_review {
            self.admin_reviews.push(review);
        }
    }
}

/// One all-or-nothing write against a single case.
///
/// When `expected_status` is set the store must refuse the commit unless the stored status still
/// matches it; `expected_revision` does the same for the case revision. Every part is applied
/// under the same critical section.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseCommit {
    pub application_number: ApplicationNumber,
    pub expected_status: Option<ApplicationStatus>,
    pub expected_revision: Option<u64>,
    pub status: Option<TrackedStatus>,
    pub documents: Vec<(DocumentType, DocumentRecord)>,
    pub field_assigned_to: Option<String>,
    pub field_visit_status: Option<FieldVisitStatus>,
    pub tele_log: Option<TeleVerificationLog>,
    pub kyc_review: Option<KycApproval>,
    pub field_report: Option<FieldVerificationReport>,
    pub admin_review: Option<AdminReview>,
    pub user: Option<PartnerUser>,
    pub audit: Option<AuditLogEntry>,
}

impl CaseCommit {
    /// Unguarded, last-writer-wins write (document fields only).
    pub fn new(application_number: ApplicationNumber) -> Self {
        Self {
            application_number,
            expected_status: None,
            expected_revision: None,
            status: None,
            documents: Vec::new(),
            field_assigned_to: None,
            field_visit_status: None,
            tele_log: None,
            kyc_review: None,
            field_report: None,
            admin_review: None,
            user: None,
            audit: None,
        }
    }

    /// Conditional write: only applies while the stored status equals `expected`.
    pub fn guarded(application_number: ApplicationNumber, expected: ApplicationStatus) -> Self {
        Self {
            expected_status: Some(expected),
            ..Self::new(application_number)
        }
    }

    /// Additionally refuse the commit if any other write landed since `revision` was read.
    pub fn with_revision_guard(mut self, revision: u64) -> Self {
        self.expected_revision = Some(revision);
        self
    }

    pub fn with_status(mut self, status: TrackedStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_documents(mut self, documents: Vec<(DocumentType, DocumentRecord)>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_field_assignee(mut self, assignee: Option<String>) -> Self {
        self.field_assigned_to = assignee;
        self
    }

    pub fn with_field_visit_status(mut self, visit_status: FieldVisitStatus) -> Self {
        self.field_visit_status = Some(visit_status);
        self
    }

    pub fn with_tele_log(mut self, log: TeleVerificationLog) -> Self {
        self.tele_log = Some(log);
        self
    }

    pub fn with_kyc_review(mut self, review: KycApproval) -> Self {
        self.kyc_review = Some(review);
        self
    }

    pub fn with_field_report(mut self, report: FieldVerificationReport) -> Self {
        self.field_report = Some(report);
        self
    }

    pub fn with_admin_review(mut self, review: AdminReview) -> Self {
        self.admin_review = Some(review);
        self
    }

    pub fn with_user(mut self, user: PartnerUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_audit(mut self, entry: AuditLogEntry) -> Self {
        self.audit = Some(entry);
        self
    }
}

/// Storage abstraction for cases, provisioned users, and the audit stream.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    fn fetch(&self, number: &ApplicationNumber) -> Result<Option<CaseFile>, RepositoryError>;
    /// Apply a commit atomically, returning the case's new revision.
    fn commit(&self, commit: CaseCommit) -> Result<u64, RepositoryError>;
    fn users_for(&self, number: &ApplicationNumber) -> Result<Vec<PartnerUser>, RepositoryError>;
    fn audit_trail(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("conditional write failed: expected status '{expected}', found '{found}'")]
    StatusMismatch {
        expected: ApplicationStatus,
        found: ApplicationStatus,
    },
    #[error("conditional write failed: case moved from revision {expected} to {found}")]
    RevisionMismatch {
        expected: u64,
        found: u64,
        status: ApplicationStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Key to URL file storage used for document uploads.
pub trait BlobStore: Send + Sync {
    fn put(&self, local_ref: &str, folder: &str) -> Result<String, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("upload of '{local_ref}' failed: {reason}")]
    Upload { local_ref: String, reason: String },
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}
