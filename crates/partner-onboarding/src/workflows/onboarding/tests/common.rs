use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::OnboardingConfig;
use crate::workflows::onboarding::approval::AuditLogEntry;
use crate::workflows::onboarding::decisions::{
    CallStatus, FieldVerificationInput, FieldVisit, KycApprovalInput, StageDecision,
    TeleVerificationInput,
};
use crate::workflows::onboarding::domain::{
    Actor, ActorRole, ApplicantContact, Application, ApplicationNumber, ApplicationSubmission,
    DocumentStatus, PartnerCase, PartnerProfile,
};
use crate::workflows::onboarding::memory::{
    InMemoryApplicationRepository, InMemoryBlobStore, RecordingNotifier,
};
use crate::workflows::onboarding::notifications::{Notification, Notifier, NotifyError};
use crate::workflows::onboarding::provisioning::PartnerUser;
use crate::workflows::onboarding::repository::{
    ApplicationRepository, BlobStore, CaseCommit, CaseFile, RepositoryError, StorageError,
};
use crate::workflows::onboarding::service::OnboardingService;

pub(super) type MemoryService =
    OnboardingService<InMemoryApplicationRepository, InMemoryBlobStore, RecordingNotifier>;

pub(super) const FIELD_RM_ID: &str = "rm-7";

pub(super) fn kyc() -> Actor {
    Actor::new("kyc-1", ActorRole::KycStaff)
}

pub(super) fn tele() -> Actor {
    Actor::new("tele-1", ActorRole::TeleStaff)
}

pub(super) fn field_rm() -> Actor {
    Actor::new(FIELD_RM_ID, ActorRole::FieldRm)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-1", ActorRole::Admin)
}

pub(super) fn config() -> OnboardingConfig {
    OnboardingConfig {
        activation_base_url: "https://partners.example.in/set-password".to_string(),
        token_ttl_hours: 24,
        notification_max_attempts: 2,
        notification_poll_secs: 1,
    }
}

pub(super) fn franchise_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        applicant: ApplicantContact {
            full_name: "Meera Iyer".to_string(),
            email: "meera.iyer@example.in".to_string(),
            phone: "+91 98450 11223".to_string(),
            city: "Bengaluru".to_string(),
        },
        profile: PartnerProfile::Franchise {
            shop_area_sqft: 420,
            proposed_location: "Indiranagar 100ft Road".to_string(),
        },
    }
}

pub(super) fn fleet_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        applicant: ApplicantContact {
            full_name: "Arjun Rao".to_string(),
            email: "arjun.rao@example.in".to_string(),
            phone: "+91 99001 44556".to_string(),
            city: "Hyderabad".to_string(),
        },
        profile: PartnerProfile::FleetOwner {
            fleet_size: 12,
            vehicle_types: vec!["e-rickshaw".to_string(), "cargo-3w".to_string()],
        },
    }
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryApplicationRepository>,
    Arc<RecordingNotifier>,
) {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = OnboardingService::new(
        repository.clone(),
        Arc::new(InMemoryBlobStore::default()),
        notifier.clone(),
        config(),
    );
    (service, repository, notifier)
}

pub(super) fn tele_verified() -> TeleVerificationInput {
    TeleVerificationInput {
        call_status: Some(CallStatus::Verified),
        decision_reason: None,
        call_notes: Some("Confirmed identity and shop address".to_string()),
        preferred_language: Some("Kannada".to_string()),
    }
}

pub(super) fn kyc_approved() -> KycApprovalInput {
    KycApprovalInput {
        remarks: None,
        field_assignee: Some(FIELD_RM_ID.to_string()),
    }
}

pub(super) fn field_input(result: &str, remarks: Option<&str>) -> FieldVerificationInput {
    FieldVerificationInput {
        verification_result: result.to_string(),
        visit: FieldVisit {
            latitude: Some(12.9784),
            longitude: Some(77.6408),
            visit_date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date"),
            address_verified: true,
            remarks: remarks.map(str::to_string),
        },
        vehicles: Vec::new(),
        fee: None,
        photo_urls: vec!["memory://visits/storefront.jpg".to_string()],
    }
}

pub(super) fn submit<R, B, N>(
    service: &OnboardingService<R, B, N>,
    submission: ApplicationSubmission,
) -> Application
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    service
        .submit_application(submission)
        .expect("submission accepted")
}

/// New -> In KYC with every required document uploaded and verified.
pub(super) fn advance_to_verified_kyc<R, B, N>(
    service: &OnboardingService<R, B, N>,
    submission: ApplicationSubmission,
) -> ApplicationNumber
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let application = submit(service, submission);
    let number = application.application_number().clone();
    service.begin_kyc(&number, &kyc()).expect("kyc starts");
    for document in application.required_documents() {
        service
            .attach_document(&number, document.key(), &format!("/tmp/{}.pdf", document.key()))
            .expect("document uploads");
        service
            .set_document_status(&number, &kyc(), document.key(), DocumentStatus::Verified, None)
            .expect("document verifies");
    }
    number
}

pub(super) fn advance_to_tele<R, B, N>(
    service: &OnboardingService<R, B, N>,
    submission: ApplicationSubmission,
) -> ApplicationNumber
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let number = advance_to_verified_kyc(service, submission);
    service
        .complete_document_check(&number, &kyc())
        .expect("document check completes");
    number
}

pub(super) fn advance_to_under_review<R, B, N>(
    service: &OnboardingService<R, B, N>,
    submission: ApplicationSubmission,
) -> ApplicationNumber
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let number = advance_to_tele(service, submission);
    service
        .record_tele_verification(&number, &tele(), StageDecision::Approve, tele_verified())
        .expect("tele verification recorded");
    number
}

pub(super) fn advance_to_field_pending<R, B, N>(
    service: &OnboardingService<R, B, N>,
    submission: ApplicationSubmission,
) -> ApplicationNumber
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let number = advance_to_under_review(service, submission);
    service
        .record_kyc_approval(&number, &kyc(), StageDecision::Approve, kyc_approved())
        .expect("kyc approval recorded");
    number
}

/// Drive a fresh case all the way to `Field Verified — Under Admin Review`.
pub(super) fn advance_to_admin_review<R, B, N>(
    service: &OnboardingService<R, B, N>,
    submission: ApplicationSubmission,
) -> ApplicationNumber
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
    N: Notifier + 'static,
{
    let number = advance_to_field_pending(service, submission);
    service
        .start_field_visit(&number, &field_rm())
        .expect("field visit starts");
    service
        .record_field_verification(&number, &field_rm(), field_input("verified_ok", None))
        .expect("field verification recorded");
    number
}

pub(super) fn stored_case(
    repository: &InMemoryApplicationRepository,
    number: &ApplicationNumber,
) -> CaseFile {
    repository
        .fetch(number)
        .expect("fetch succeeds")
        .expect("case present")
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _application: Application) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _number: &ApplicationNumber) -> Result<Option<CaseFile>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit(&self, _commit: CaseCommit) -> Result<u64, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn users_for(&self, _number: &ApplicationNumber) -> Result<Vec<PartnerUser>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn audit_trail(
        &self,
        _number: &ApplicationNumber,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Serves reads from a frozen copy so two deciders can act on the same stale status.
#[derive(Default)]
pub(super) struct StaleReadRepository {
    pub(super) inner: InMemoryApplicationRepository,
    frozen: Mutex<HashMap<ApplicationNumber, CaseFile>>,
}

impl StaleReadRepository {
    pub(super) fn freeze(&self, number: &ApplicationNumber) {
        let case = stored_case(&self.inner, number);
        self.frozen
            .lock()
            .expect("frozen mutex poisoned")
            .insert(number.clone(), case);
    }
}

impl ApplicationRepository for StaleReadRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        self.inner.insert(application)
    }

    fn fetch(&self, number: &ApplicationNumber) -> Result<Option<CaseFile>, RepositoryError> {
        let frozen = self.frozen.lock().expect("frozen mutex poisoned");
        match frozen.get(number) {
            Some(case) => Ok(Some(case.clone())),
            None => self.inner.fetch(number),
        }
    }

    fn commit(&self, commit: CaseCommit) -> Result<u64, RepositoryError> {
        self.inner.commit(commit)
    }

    fn users_for(&self, number: &ApplicationNumber) -> Result<Vec<PartnerUser>, RepositoryError> {
        self.inner.users_for(number)
    }

    fn audit_trail(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        self.inner.audit_trail(number)
    }
}

pub(super) struct FailingBlobStore;

impl BlobStore for FailingBlobStore {
    fn put(&self, _local_ref: &str, _folder: &str) -> Result<String, StorageError> {
        Err(StorageError::Unavailable("bucket unreachable".to_string()))
    }
}

/// Notifier whose transport can be switched off and back on.
#[derive(Default)]
pub(super) struct SwitchableNotifier {
    offline: AtomicBool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<Notification>>,
}

impl SwitchableNotifier {
    pub(super) fn offline() -> Self {
        let notifier = Self::default();
        notifier.offline.store(true, Ordering::SeqCst);
        notifier
    }

    pub(super) fn reconnect(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    pub(super) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }
}

impl Notifier for SwitchableNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("smtp relay refused connection".to_string()));
        }
        self.sent
            .lock()
            .expect("sent mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
