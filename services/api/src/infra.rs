use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use partner_onboarding::workflows::onboarding::{Notification, Notifier, NotifyError};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notifier for local runs: every message is written to the log instead of an SMTP relay.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if !notification.to.contains('@') {
            return Err(NotifyError::Recipient(notification.to.clone()));
        }
        info!(
            to = %notification.to,
            subject = %notification.subject,
            "notification sent"
        );
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
