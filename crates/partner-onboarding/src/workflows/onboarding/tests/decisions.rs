use super::common::*;
use crate::workflows::onboarding::decisions::{
    CallStatus, DecisionError, FieldReportStatus, FieldVerificationResult, KycApprovalInput,
    StageDecision, TeleVerificationInput,
};
use crate::workflows::onboarding::domain::{
    Actor, ActorRole, ApplicationStatus, DocumentStatus, FieldVisitStatus, PartnerCase,
};
use crate::workflows::onboarding::memory::{InMemoryBlobStore, RecordingNotifier};
use crate::workflows::onboarding::service::{OnboardingError, OnboardingService};
use crate::workflows::onboarding::state_machine::IllegalTransition;
use std::sync::Arc;

#[test]
fn tele_approval_moves_to_under_review_and_logs_call() {
    let (service, repository, _) = build_service();
    let number = advance_to_tele(&service, franchise_submission());

    let log = service
        .record_tele_verification(&number, &tele(), StageDecision::Approve, tele_verified())
        .expect("tele verification recorded");

    assert_eq!(log.call_status, CallStatus::Verified);
    assert_eq!(log.staff_id, "tele-1");
    let stored = stored_case(&repository, &number);
    assert_eq!(stored.status(), ApplicationStatus::UnderReview);
    assert_eq!(stored.tele_log, Some(log));
}

#[test]
fn tele_rejection_needs_a_reason() {
    let (service, repository, _) = build_service();
    let number = advance_to_tele(&service, franchise_submission());

    let error = service
        .record_tele_verification(
            &number,
            &tele(),
            StageDecision::Reject,
            TeleVerificationInput::default(),
        )
        .expect_err("reason required");

    assert!(matches!(
        error,
        OnboardingError::Decision(DecisionError::ReasonRequired { .. })
    ));
    let stored = stored_case(&repository, &number);
    assert_eq!(stored.status(), ApplicationStatus::TeleVerification);
    assert!(stored.tele_log.is_none());
}

#[test]
fn tele_hold_parks_case_until_tele_staff_resumes() {
    let (service, repository, _) = build_service();
    let number = advance_to_tele(&service, franchise_submission());

    service
        .record_tele_verification(
            &number,
            &tele(),
            StageDecision::OnHold,
            TeleVerificationInput {
                call_status: Some(CallStatus::CallBackRequested),
                decision_reason: Some("Applicant travelling, call back Monday".to_string()),
                ..TeleVerificationInput::default()
            },
        )
        .expect("hold recorded");

    let parked = stored_case(&repository, &number).application.core().tracked_status();
    assert_eq!(parked.current(), ApplicationStatus::OnHold);
    assert_eq!(parked.parked_from(), Some(ApplicationStatus::TeleVerification));

    let error = service
        .resume(&number, &kyc())
        .expect_err("kyc staff did not park it");
    assert!(matches!(error, OnboardingError::IllegalTransition(_)));

    let resumed = service.resume(&number, &tele()).expect("tele staff resumes");
    assert_eq!(resumed, ApplicationStatus::TeleVerification);
    let restored = stored_case(&repository, &number).application.core().tracked_status();
    assert_eq!(restored.parked_from(), None);
}

#[test]
fn tele_decision_from_wrong_role_is_refused() {
    let (service, repository, _) = build_service();
    let number = advance_to_tele(&service, franchise_submission());

    let error = service
        .record_tele_verification(&number, &kyc(), StageDecision::Approve, tele_verified())
        .expect_err("kyc staff cannot record tele decisions");

    assert!(matches!(
        error,
        OnboardingError::IllegalTransition(IllegalTransition {
            role: ActorRole::KycStaff,
            ..
        })
    ));
    assert_eq!(
        stored_case(&repository, &number).status(),
        ApplicationStatus::TeleVerification
    );
}

#[test]
fn kyc_approval_requires_every_document_verified() {
    let (service, repository, _) = build_service();
    let number = advance_to_under_review(&service, fleet_submission());
    service
        .set_document_status(
            &number,
            &kyc(),
            "vehicle_rc",
            DocumentStatus::RequiresAction,
            Some("RC expired last month"),
        )
        .expect("document flagged");

    match service.record_kyc_approval(&number, &kyc(), StageDecision::Approve, kyc_approved()) {
        Err(OnboardingError::Decision(DecisionError::DocumentsIncomplete { outstanding })) => {
            assert_eq!(outstanding, vec!["vehicle_rc".to_string()]);
        }
        other => panic!("expected incomplete documents, got {other:?}"),
    }
    let stored = stored_case(&repository, &number);
    assert_eq!(stored.status(), ApplicationStatus::UnderReview);
    assert!(stored.kyc_review.is_none());
}

#[test]
fn kyc_approval_assigns_field_visit() {
    let (service, repository, _) = build_service();
    let number = advance_to_under_review(&service, fleet_submission());

    let review = service
        .record_kyc_approval(&number, &kyc(), StageDecision::Approve, kyc_approved())
        .expect("kyc approval recorded");

    assert_eq!(review.field_assignee.as_deref(), Some(FIELD_RM_ID));
    let stored = stored_case(&repository, &number);
    let core = stored.application.core();
    assert_eq!(stored.status(), ApplicationStatus::FieldPending);
    assert_eq!(core.kyc_approval, Some(StageDecision::Approve));
    assert_eq!(core.field_assigned_to.as_deref(), Some(FIELD_RM_ID));
    assert_eq!(core.field_visit_status, Some(FieldVisitStatus::Scheduled));
}

#[test]
fn kyc_rejection_with_remarks_is_terminal() {
    let (service, repository, _) = build_service();
    let number = advance_to_under_review(&service, fleet_submission());

    service
        .record_kyc_approval(
            &number,
            &kyc(),
            StageDecision::Reject,
            KycApprovalInput {
                remarks: Some("Bank proof belongs to a third party".to_string()),
                field_assignee: Some(FIELD_RM_ID.to_string()),
            },
        )
        .expect("rejection recorded");

    let stored = stored_case(&repository, &number);
    assert_eq!(stored.status(), ApplicationStatus::Rejected);
    assert!(stored.application.core().field_assigned_to.is_none());
}

#[test]
fn only_assigned_rm_may_start_the_visit() {
    let (service, repository, _) = build_service();
    let number = advance_to_field_pending(&service, franchise_submission());

    let other_rm = Actor::new("rm-9", ActorRole::FieldRm);
    match service.start_field_visit(&number, &other_rm) {
        Err(OnboardingError::Decision(DecisionError::NotAssigned { assigned_to })) => {
            assert_eq!(assigned_to, FIELD_RM_ID);
        }
        other => panic!("expected not assigned, got {other:?}"),
    }

    let status = service
        .start_field_visit(&number, &field_rm())
        .expect("assigned rm starts");
    assert_eq!(status, ApplicationStatus::FieldVerificationInProgress);
    assert_eq!(
        stored_case(&repository, &number)
            .application
            .core()
            .field_visit_status,
        Some(FieldVisitStatus::InProgress)
    );
}

#[test]
fn field_report_without_gps_is_refused() {
    let (service, repository, _) = build_service();
    let number = advance_to_field_pending(&service, franchise_submission());
    let mut input = field_input("verified_ok", None);
    input.visit.longitude = None;

    let error = service
        .record_field_verification(&number, &field_rm(), input)
        .expect_err("gps required");

    assert!(matches!(
        error,
        OnboardingError::Decision(DecisionError::MissingGps)
    ));
    assert!(stored_case(&repository, &number).field_report.is_none());
}

#[test]
fn field_report_without_result_is_refused() {
    let (service, _, _) = build_service();
    let number = advance_to_field_pending(&service, franchise_submission());

    let error = service
        .record_field_verification(&number, &field_rm(), field_input("   ", None))
        .expect_err("result required");

    assert!(matches!(
        error,
        OnboardingError::Decision(DecisionError::MissingResult)
    ));
}

#[test]
fn failed_field_visit_needs_remarks_and_rejects() {
    let (service, repository, _) = build_service();
    let number = advance_to_field_pending(&service, franchise_submission());

    let error = service
        .record_field_verification(&number, &field_rm(), field_input("not_verified", None))
        .expect_err("remarks required");
    assert!(matches!(
        error,
        OnboardingError::Decision(DecisionError::ReasonRequired { .. })
    ));

    let report = service
        .record_field_verification(
            &number,
            &field_rm(),
            field_input("not_verified", Some("Shop premises locked, landlord denies lease")),
        )
        .expect("report recorded");

    assert_eq!(report.verification_result, FieldVerificationResult::NotVerified);
    assert_eq!(report.application_status, FieldReportStatus::FieldVerificationFailed);
    let stored = stored_case(&repository, &number);
    assert_eq!(stored.status(), ApplicationStatus::Rejected);
    assert_eq!(
        stored.application.core().field_visit_status,
        Some(FieldVisitStatus::FieldVerificationFailed)
    );
}

#[test]
fn field_issues_send_case_back_to_review() {
    let (service, repository, _) = build_service();
    let number = advance_to_field_pending(&service, franchise_submission());
    service
        .start_field_visit(&number, &field_rm())
        .expect("visit starts");

    service
        .record_field_verification(
            &number,
            &field_rm(),
            field_input("verified_issues", Some("Signage missing")),
        )
        .expect("report recorded");

    let stored = stored_case(&repository, &number);
    assert_eq!(stored.status(), ApplicationStatus::UnderReview);
    assert_eq!(
        stored.application.core().field_visit_status,
        Some(FieldVisitStatus::FieldVerifiedWithIssues)
    );
}

#[test]
fn clean_field_visit_reaches_admin_review() {
    let (service, repository, _) = build_service();
    let number = advance_to_admin_review(&service, franchise_submission());

    let stored = stored_case(&repository, &number);
    assert_eq!(
        stored.status(),
        ApplicationStatus::FieldVerifiedUnderAdminReview
    );
    let report = stored.field_report.expect("report stored");
    assert_eq!(
        report.application_status,
        FieldReportStatus::FieldVerificationComplete
    );
    assert_eq!(report.location.latitude, 12.9784);
    assert_eq!(
        stored.application.core().field_visit_status,
        Some(FieldVisitStatus::FieldVerified)
    );
}

#[test]
fn unassigned_rm_cannot_file_the_field_report() {
    let (service, repository, _) = build_service();
    let number = advance_to_field_pending(&service, franchise_submission());
    let intruder = Actor::new("rm-intruder", ActorRole::FieldRm);

    match service.record_field_verification(&number, &intruder, field_input("verified_ok", None)) {
        Err(OnboardingError::Decision(DecisionError::NotAssigned { assigned_to })) => {
            assert_eq!(assigned_to, FIELD_RM_ID);
        }
        other => panic!("expected not assigned, got {other:?}"),
    }
    let stored = stored_case(&repository, &number);
    assert_eq!(stored.status(), ApplicationStatus::FieldPending);
    assert!(stored.field_report.is_none());

    service
        .start_field_visit(&number, &field_rm())
        .expect("assigned rm starts");
    let error = service
        .record_field_verification(&number, &intruder, field_input("verified_ok", None))
        .expect_err("visit in progress is still assigned");
    assert!(matches!(
        error,
        OnboardingError::Decision(DecisionError::NotAssigned { .. })
    ));
    assert_eq!(
        stored_case(&repository, &number).status(),
        ApplicationStatus::FieldVerificationInProgress
    );
}

#[test]
fn kyc_approval_refuses_a_checklist_changed_after_its_read() {
    let repository = Arc::new(StaleReadRepository::default());
    let service = OnboardingService::new(
        repository.clone(),
        Arc::new(InMemoryBlobStore::default()),
        Arc::new(RecordingNotifier::default()),
        config(),
    );
    let number = advance_to_under_review(&service, fleet_submission());
    repository.freeze(&number);

    service
        .set_document_status(
            &number,
            &kyc(),
            "pan_card",
            DocumentStatus::Rejected,
            Some("Expired card"),
        )
        .expect("rejection lands");

    let error = service
        .record_kyc_approval(&number, &kyc(), StageDecision::Approve, kyc_approved())
        .expect_err("approval built on a stale checklist");
    assert!(matches!(
        error,
        OnboardingError::ConcurrentUpdate {
            current: ApplicationStatus::UnderReview
        }
    ));
    let stored = stored_case(&repository.inner, &number);
    assert_eq!(stored.status(), ApplicationStatus::UnderReview);
    assert!(stored.kyc_review.is_none());
}
