use crate::infra::parse_date;
use chrono::{Local, NaiveDate};
use clap::{Args, ValueEnum};
use partner_onboarding::config::OnboardingConfig;
use partner_onboarding::error::AppError;
use partner_onboarding::workflows::onboarding::{
    Actor, ActorRole, ApplicantContact, ApplicationNumber, ApplicationStateMachine,
    ApplicationStatus, ApplicationSubmission, CallStatus, DocumentStatus, FieldVerificationInput,
    FieldVisit, InMemoryApplicationRepository, InMemoryBlobStore, KycApprovalInput,
    OnboardingService, PartnerCase, PartnerProfile, RecordingNotifier, StageDecision,
    TeleVerificationInput,
};
use std::sync::Arc;

type DemoService =
    OnboardingService<InMemoryApplicationRepository, InMemoryBlobStore, RecordingNotifier>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum PartnerArg {
    Fleet,
    #[default]
    Franchise,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Partner type to onboard.
    #[arg(long, value_enum, default_value_t = PartnerArg::Franchise)]
    pub(crate) partner: PartnerArg,
    /// Put the case on hold for clarification before the final approval.
    #[arg(long)]
    pub(crate) hold_first: bool,
    /// Field visit date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) visit_date: Option<NaiveDate>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let notifier = Arc::new(RecordingNotifier::default());
    let service: DemoService = OnboardingService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(InMemoryBlobStore::default()),
        notifier.clone(),
        OnboardingConfig::default(),
    );

    let kyc = Actor::new("kyc-demo", ActorRole::KycStaff);
    let tele = Actor::new("tele-demo", ActorRole::TeleStaff);
    let rm = Actor::new("rm-demo", ActorRole::FieldRm);
    let admin = Actor::new("admin-demo", ActorRole::Admin);

    println!("Partner onboarding demo");
    let application = service.submit_application(demo_submission(args.partner))?;
    let number = application.application_number().clone();
    println!(
        "Submitted {} for {} ({} documents required)",
        number,
        application.core().applicant.full_name,
        application.required_documents().len()
    );

    step(&number, "KYC started", service.begin_kyc(&number, &kyc)?);
    for document in application.required_documents() {
        let record = service.attach_document(
            &number,
            document.key(),
            &format!("/uploads/{number}/{}.pdf", document.key()),
        )?;
        service.set_document_status(
            &number,
            &kyc,
            document.key(),
            DocumentStatus::Verified,
            None,
        )?;
        println!(
            "  {:<16} verified ({})",
            document.key(),
            record.url.unwrap_or_default()
        );
    }
    step(
        &number,
        "document check complete",
        service.complete_document_check(&number, &kyc)?,
    );

    service.record_tele_verification(
        &number,
        &tele,
        StageDecision::Approve,
        TeleVerificationInput {
            call_status: Some(CallStatus::Verified),
            call_notes: Some("Identity and address confirmed on call".to_string()),
            ..TeleVerificationInput::default()
        },
    )?;
    print_status(&service, &number, "tele verification recorded")?;

    service.record_kyc_approval(
        &number,
        &kyc,
        StageDecision::Approve,
        KycApprovalInput {
            remarks: None,
            field_assignee: Some(rm.id.clone()),
        },
    )?;
    print_status(&service, &number, "KYC approved, field visit scheduled")?;

    step(
        &number,
        "field visit started",
        service.start_field_visit(&number, &rm)?,
    );
    let visit_date = args
        .visit_date
        .unwrap_or_else(|| Local::now().date_naive());
    service.record_field_verification(
        &number,
        &rm,
        FieldVerificationInput {
            verification_result: "verified_ok".to_string(),
            visit: FieldVisit {
                latitude: Some(12.9716),
                longitude: Some(77.5946),
                visit_date,
                address_verified: true,
                remarks: None,
            },
            vehicles: Vec::new(),
            fee: None,
            photo_urls: Vec::new(),
        },
    )?;
    print_status(&service, &number, "field verification recorded")?;

    if args.hold_first {
        let receipt = service.hold(
            &number,
            &admin,
            "Please share the latest bank statement",
            Some(visit_date + chrono::Duration::days(7)),
        )?;
        step(&number, "admin requested clarification", receipt.status);
    }

    let receipt = service.approve(&number, &admin, Some("Demo approval".to_string()))?;
    print_status(&service, &number, "approved")?;
    println!("  Partner user: {}", receipt.user_id);
    println!("  Activation link: {}", receipt.activation_link);
    println!(
        "  Link expires: {}",
        receipt.token_expires_at.format("%Y-%m-%d %H:%M UTC")
    );

    let summary = service.retry_pending_notifications();
    let sent = notifier.sent();
    println!(
        "\nNotifications ({} delivered from the outbox, {} still pending)",
        summary.delivered, summary.still_pending
    );
    for notification in sent {
        println!("- {} -> {}", notification.subject, notification.to);
    }
    Ok(())
}

pub(crate) fn print_transitions() {
    println!("{:<36} {:<36} role", "from", "to");
    for from in ApplicationStatus::ALL {
        for (to, role) in ApplicationStateMachine::stage_edges(from) {
            println!("{:<36} {:<36} {}", from.label(), to.label(), role);
        }
    }
    println!(
        "\n'On Hold' returns to its parked stage (resumed by the role that parked it) \
         or takes any other edge of that stage."
    );
}

fn step(number: &ApplicationNumber, label: &str, status: ApplicationStatus) {
    println!("[{number}] {label}: {status}");
}

fn print_status(
    service: &DemoService,
    number: &ApplicationNumber,
    label: &str,
) -> Result<(), AppError> {
    let snapshot = service.get_application_snapshot(number)?;
    step(number, label, snapshot.status);
    Ok(())
}

fn demo_submission(partner: PartnerArg) -> ApplicationSubmission {
    match partner {
        PartnerArg::Fleet => ApplicationSubmission {
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
        },
        PartnerArg::Franchise => ApplicationSubmission {
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
        },
    }
}
