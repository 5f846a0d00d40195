use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checklist::DocumentChecklist;
use super::decisions::StageDecision;
use super::provisioning::UserId;
use super::state_machine::TrackedStatus;

/// Globally unique, immutable case identifier (`FLO-1001`, `FRP-1002`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationNumber(pub String);

impl ApplicationNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two partner programmes handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerKind {
    FleetOwner,
    Franchise,
}

impl PartnerKind {
    pub const fn number_prefix(self) -> &'static str {
        match self {
            Self::FleetOwner => "FLO",
            Self::Franchise => "FRP",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::FleetOwner => "Fleet Owner",
            Self::Franchise => "Franchise Partner",
        }
    }

    pub const fn required_documents(self) -> &'static [DocumentType] {
        match self {
            Self::FleetOwner => &[
                DocumentType::AadhaarCard,
                DocumentType::PanCard,
                DocumentType::DrivingLicense,
                DocumentType::VehicleRc,
                DocumentType::BankProof,
            ],
            Self::Franchise => &[
                DocumentType::AadhaarCard,
                DocumentType::PanCard,
                DocumentType::GstCertificate,
                DocumentType::ShopAgreement,
                DocumentType::BankProof,
                DocumentType::ShopPhoto,
            ],
        }
    }
}

/// Canonical pipeline position of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    New,
    InKyc,
    TeleVerification,
    UnderReview,
    FieldPending,
    FieldVerificationInProgress,
    FieldVerifiedUnderAdminReview,
    Approved,
    Rejected,
    OnHold,
}

impl ApplicationStatus {
    pub const ALL: [Self; 10] = [
        Self::New,
        Self::InKyc,
        Self::TeleVerification,
        Self::UnderReview,
        Self::FieldPending,
        Self::FieldVerificationInProgress,
        Self::FieldVerifiedUnderAdminReview,
        Self::Approved,
        Self::Rejected,
        Self::OnHold,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InKyc => "In KYC",
            Self::TeleVerification => "Tele Verification",
            Self::UnderReview => "Under Review",
            Self::FieldPending => "Field Pending",
            Self::FieldVerificationInProgress => "Field Verification In Progress",
            Self::FieldVerifiedUnderAdminReview => "Field Verified — Under Admin Review",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::OnHold => "On Hold",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Roles vouched for by the identity oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    KycStaff,
    TeleStaff,
    FieldRm,
    Admin,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::KycStaff => "kyc_staff",
            Self::TeleStaff => "tele_staff",
            Self::FieldRm => "field_rm",
            Self::Admin => "admin",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kyc_staff" | "kyc" => Some(Self::KycStaff),
            "tele_staff" | "tele" => Some(Self::TeleStaff),
            "field_rm" | "rm" => Some(Self::FieldRm),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Caller identity as supplied by the session layer. Trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    AadhaarCard,
    PanCard,
    DrivingLicense,
    VehicleRc,
    GstCertificate,
    ShopAgreement,
    ShopPhoto,
    BankProof,
}

impl DocumentType {
    pub const fn key(self) -> &'static str {
        match self {
            Self::AadhaarCard => "aadhaar_card",
            Self::PanCard => "pan_card",
            Self::DrivingLicense => "driving_license",
            Self::VehicleRc => "vehicle_rc",
            Self::GstCertificate => "gst_certificate",
            Self::ShopAgreement => "shop_agreement",
            Self::ShopPhoto => "shop_photo",
            Self::BankProof => "bank_proof",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim() {
            "aadhaar_card" => Some(Self::AadhaarCard),
            "pan_card" => Some(Self::PanCard),
            "driving_license" => Some(Self::DrivingLicense),
            "vehicle_rc" => Some(Self::VehicleRc),
            "gst_certificate" => Some(Self::GstCertificate),
            "shop_agreement" => Some(Self::ShopAgreement),
            "shop_photo" => Some(Self::ShopPhoto),
            "bank_proof" => Some(Self::BankProof),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    NotUploaded,
    Uploaded,
    Verified,
    RequiresAction,
    Rejected,
}

impl DocumentStatus {
    pub const fn requires_reason(self) -> bool {
        matches!(self, Self::RequiresAction | Self::Rejected)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::NotUploaded => "not_uploaded",
            Self::Uploaded => "uploaded",
            Self::Verified => "verified",
            Self::RequiresAction => "requires_action",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Default for DocumentRecord {
    fn default() -> Self {
        Self {
            status: DocumentStatus::NotUploaded,
            reason: None,
            url: None,
        }
    }
}

/// Progress of the on-site visit, as shown to field teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldVisitStatus {
    Scheduled,
    InProgress,
    FieldVerified,
    FieldVerifiedWithIssues,
    FieldVerificationFailed,
}

impl FieldVisitStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::InProgress => "In Progress",
            Self::FieldVerified => "Field Verified",
            Self::FieldVerifiedWithIssues => "Field Verified With Issues",
            Self::FieldVerificationFailed => "Field Verification Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantContact {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
}

/// Variant specific answers captured by the intake form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "partner_type", rename_all = "snake_case")]
pub enum PartnerProfile {
    FleetOwner {
        fleet_size: u16,
        vehicle_types: Vec<String>,
    },
    Franchise {
        shop_area_sqft: u32,
        proposed_location: String,
    },
}

impl PartnerProfile {
    pub const fn kind(&self) -> PartnerKind {
        match self {
            Self::FleetOwner { .. } => PartnerKind::FleetOwner,
            Self::Franchise { .. } => PartnerKind::Franchise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    pub applicant: ApplicantContact,
    pub profile: PartnerProfile,
}

/// Fields shared by every partner case and used by the pipeline core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseCore {
    pub application_number: ApplicationNumber,
    pub applicant: ApplicantContact,
    pub(super) status: TrackedStatus,
    pub document_checklist: DocumentChecklist,
    pub field_assigned_to: Option<String>,
    pub kyc_approval: Option<StageDecision>,
    pub field_visit_status: Option<FieldVisitStatus>,
    pub user_id: Option<UserId>,
    pub submitted_at: DateTime<Utc>,
    pub revision: u64,
}

impl CaseCore {
    pub(super) fn open(
        application_number: ApplicationNumber,
        applicant: ApplicantContact,
        kind: PartnerKind,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            application_number,
            applicant,
            status: TrackedStatus::initial(),
            document_checklist: DocumentChecklist::for_documents(kind.required_documents()),
            field_assigned_to: None,
            kyc_approval: None,
            field_visit_status: None,
            user_id: None,
            submitted_at,
            revision: 0,
        }
    }

    pub fn status(&self) -> ApplicationStatus {
        self.status.current()
    }

    pub fn tracked_status(&self) -> TrackedStatus {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetOwnerCase {
    pub core: CaseCore,
    pub fleet_size: u16,
    pub vehicle_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FranchiseCase {
    pub core: CaseCore,
    pub shop_area_sqft: u32,
    pub proposed_location: String,
}

/// Capabilities the pipeline needs from either partner variant.
pub trait PartnerCase {
    fn core(&self) -> &CaseCore;
    fn core_mut(&mut self) -> &mut CaseCore;
    fn kind(&self) -> PartnerKind;

    fn required_documents(&self) -> &'static [DocumentType] {
        self.kind().required_documents()
    }

    fn application_number(&self) -> &ApplicationNumber {
        &self.core().application_number
    }

    fn status(&self) -> ApplicationStatus {
        self.core().status()
    }

    fn all_required_verified(&self) -> bool {
        self.core()
            .document_checklist
            .all_required_verified(self.required_documents())
    }
}

impl PartnerCase for FleetOwnerCase {
    fn core(&self) -> &CaseCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CaseCore {
        &mut self.core
    }

    fn kind(&self) -> PartnerKind {
        PartnerKind::FleetOwner
    }
}

impl PartnerCase for FranchiseCase {
    fn core(&self) -> &CaseCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CaseCore {
        &mut self.core
    }

    fn kind(&self) -> PartnerKind {
        PartnerKind::Franchise
    }
}

/// One logical onboarding case, persisted in a collection per partner type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "partner_type", rename_all = "snake_case")]
pub enum Application {
    FleetOwner(FleetOwnerCase),
    Franchise(FranchiseCase),
}

impl Application {
    pub(super) fn from_submission(
        application_number: ApplicationNumber,
        submission: ApplicationSubmission,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let ApplicationSubmission { applicant, profile } = submission;
        let core = CaseCore::open(application_number, applicant, profile.kind(), submitted_at);
        match profile {
            PartnerProfile::FleetOwner {
                fleet_size,
                vehicle_types,
            } => Self::FleetOwner(FleetOwnerCase {
                core,
                fleet_size,
                vehicle_types,
            }),
            PartnerProfile::Franchise {
                shop_area_sqft,
                proposed_location,
            } => Self::Franchise(FranchiseCase {
                core,
                shop_area_sqft,
                proposed_location,
            }),
        }
    }

    fn as_case(&self) -> &dyn PartnerCase {
        match self {
            Self::FleetOwner(case) => case,
            Self::Franchise(case) => case,
        }
    }

    fn as_case_mut(&mut self) -> &mut dyn PartnerCase {
        match self {
            Self::FleetOwner(case) => case,
            Self::Franchise(case) => case,
        }
    }
}

impl PartnerCase for Application {
    fn core(&self) -> &CaseCore {
        self.as_case().core()
    }

    fn core_mut(&mut self) -> &mut CaseCore {
        self.as_case_mut().core_mut()
    }

    fn kind(&self) -> PartnerKind {
        self.as_case().kind()
    }
}
