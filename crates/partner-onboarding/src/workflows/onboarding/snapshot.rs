use serde::Serialize;

use super::approval::AdminReview;
use super::decisions::{FieldVerificationReport, KycApproval, TeleVerificationLog};
use super::domain::{
    ApplicationNumber, ApplicationStatus, DocumentStatus, DocumentType, FieldVisitStatus,
    PartnerCase, PartnerKind,
};
use super::provisioning::UserId;
use super::repository::CaseFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Dashboard projection of one case: status plus every decision record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationSnapshot {
    pub application_number: ApplicationNumber,
    pub partner_type: PartnerKind,
    pub applicant_name: String,
    pub status: ApplicationStatus,
    pub status_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parked_from: Option<ApplicationStatus>,
    pub documents: Vec<DocumentView>,
    pub documents_verified: bool,
    pub field_assigned_to: Option<String>,
    pub field_visit_status: Option<FieldVisitStatus>,
    pub tele_verification: Option<TeleVerificationLog>,
    pub kyc_approval: Option<KycApproval>,
    pub field_verification: Option<FieldVerificationReport>,
    pub admin_reviews: Vec<AdminReview>,
    pub user_id: Option<UserId>,
    pub revision: u64,
}

impl ApplicationSnapshot {
    pub fn from_case(case: &CaseFile) -> Self {
        let application = &case.application;
        let core = application.core();
        let tracked = core.tracked_status();

        Self {
            application_number: core.application_number.clone(),
            partner_type: application.kind(),
            applicant_name: core.applicant.full_name.clone(),
            status: tracked.current(),
            status_label: tracked.current().label(),
            parked_from: tracked.parked_from(),
            documents: core
                .document_checklist
                .iter()
                .map(|(document, record)| DocumentView {
                    document_type: *document,
                    status: record.status,
                    reason: record.reason.clone(),
                    url: record.url.clone(),
                })
                .collect(),
            documents_verified: application.all_required_verified(),
            field_assigned_to: core.field_assigned_to.clone(),
            field_visit_status: core.field_visit_status,
            tele_verification: case.tele_log.clone(),
            kyc_approval: case.kyc_review.clone(),
            field_verification: case.field_report.clone(),
            admin_reviews: case.admin_reviews.clone(),
            user_id: core.user_id.clone(),
            revision: core.revision,
        }
    }
}
