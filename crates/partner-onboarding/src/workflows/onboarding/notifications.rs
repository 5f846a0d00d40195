//! Outbound partner notifications, queued only after a decision has been committed.
//!
//! Decisions never talk to the transport themselves: [`NotificationDispatcher::dispatch`] appends
//! the message to an in-process outbox and wakes the background worker started with
//! [`NotificationDispatcher::spawn_worker`]. The worker drains the outbox on every wake-up and on
//! a fixed poll interval, trying each message up to `max_attempts` times per pass. Messages that
//! still fail stay queued for the next pass or for an explicit
//! [`NotificationDispatcher::retry_pending`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::domain::{ApplicantContact, ApplicationNumber};

const WAKE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// E-mail (or other channel) adapter. Treated as best-effort.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("recipient rejected: {0}")]
    Recipient(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Activation,
    Rejection,
    ClarificationRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub application_number: ApplicationNumber,
    pub kind: NotificationKind,
    pub notification: Notification,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboundMessage {
    pub fn new(
        application_number: ApplicationNumber,
        kind: NotificationKind,
        notification: Notification,
    ) -> Self {
        Self {
            application_number,
            kind,
            notification,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Where a message stands: queued by a decision, or the result of one delivery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Queued { outbox_depth: usize },
    Delivered { attempts: u32 },
    Deferred { attempts: u32, error: String },
}

impl NotificationOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    pub delivered: usize,
    pub still_pending: usize,
}

pub struct NotificationDispatcher<N> {
    notifier: Arc<N>,
    outbox: Mutex<VecDeque<OutboundMessage>>,
    max_attempts: u32,
    wake: Mutex<Option<mpsc::Sender<()>>>,
}

impl<N> NotificationDispatcher<N>
where
    N: Notifier + 'static,
{
    pub fn new(notifier: Arc<N>, max_attempts: u32) -> Self {
        Self {
            notifier,
            outbox: Mutex::new(VecDeque::new()),
            max_attempts: max_attempts.max(1),
            wake: Mutex::new(None),
        }
    }

    /// Queue `message` for the worker. Never calls the notifier.
    pub fn dispatch(&self, message: OutboundMessage) -> NotificationOutcome {
        let application = message.application_number.clone();
        let kind = message.kind;
        match self.park(message) {
            Some(outbox_depth) => {
                debug!(%application, ?kind, outbox_depth, "notification queued");
                self.wake_worker();
                NotificationOutcome::Queued { outbox_depth }
            }
            None => NotificationOutcome::Deferred {
                attempts: 0,
                error: "notification outbox unavailable".to_string(),
            },
        }
    }

    /// Drain the outbox once, trying each message up to `max_attempts` times.
    /// Undelivered messages go back to the outbox.
    pub fn retry_pending(&self) -> RetrySummary {
        let queued: Vec<OutboundMessage> = match self.outbox.lock() {
            Ok(mut outbox) => outbox.drain(..).collect(),
            Err(_) => {
                warn!("notification outbox lock poisoned; skipping retry");
                return RetrySummary::default();
            }
        };

        let mut summary = RetrySummary::default();
        for mut message in queued {
            match self.deliver(&mut message) {
                NotificationOutcome::Delivered { .. } => summary.delivered += 1,
                NotificationOutcome::Deferred { attempts, error } => {
                    warn!(
                        application = %message.application_number,
                        kind = ?message.kind,
                        attempts,
                        %error,
                        "notification deferred; kept in outbox"
                    );
                    summary.still_pending += 1;
                    self.park(message);
                }
                NotificationOutcome::Queued { .. } => {}
            }
        }
        summary
    }

    pub fn pending(&self) -> Vec<OutboundMessage> {
        self.outbox
            .lock()
            .map(|outbox| outbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Start the outbox worker on the current tokio runtime.
    ///
    /// The worker drains whenever a message is queued and at least once per `poll_interval`.
    /// Sends run on the blocking pool so a slow transport never stalls request handling.
    pub fn spawn_worker(self: &Arc<Self>, poll_interval: Duration) -> NotificationWorker {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(WAKE_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        match self.wake.lock() {
            Ok(mut wake) => *wake = Some(wake_tx),
            Err(_) => warn!("notification wake handle poisoned; worker will only poll"),
        }

        let dispatcher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!(
                poll_interval_ms = poll_interval.as_millis() as u64,
                "notification worker started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    Some(()) = wake_rx.recv() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }

                let drain = Arc::clone(&dispatcher);
                match tokio::task::spawn_blocking(move || drain.retry_pending()).await {
                    Ok(summary) if summary.delivered > 0 || summary.still_pending > 0 => {
                        debug!(
                            delivered = summary.delivered,
                            still_pending = summary.still_pending,
                            "notification outbox drained"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%err, "notification drain task failed"),
                }
            }
            info!("notification worker stopped");
        });

        NotificationWorker {
            shutdown: shutdown_tx,
            handle,
        }
    }

    fn wake_worker(&self) {
        if let Ok(wake) = self.wake.lock() {
            if let Some(sender) = wake.as_ref() {
                // A full channel already holds a pending wake-up.
                let _ = sender.try_send(());
            }
        }
    }

    fn deliver(&self, message: &mut OutboundMessage) -> NotificationOutcome {
        let mut last_error = String::new();
        for _ in 0..self.max_attempts {
            message.attempts += 1;
            match self.notifier.send(&message.notification) {
                Ok(()) => {
                    info!(
                        application = %message.application_number,
                        kind = ?message.kind,
                        attempts = message.attempts,
                        "notification delivered"
                    );
                    message.last_error = None;
                    return NotificationOutcome::Delivered {
                        attempts: message.attempts,
                    };
                }
                Err(err) => last_error = err.to_string(),
            }
        }

        message.last_error = Some(last_error.clone());
        NotificationOutcome::Deferred {
            attempts: message.attempts,
            error: last_error,
        }
    }

    fn park(&self, message: OutboundMessage) -> Option<usize> {
        match self.outbox.lock() {
            Ok(mut outbox) => {
                outbox.push_back(message);
                Some(outbox.len())
            }
            Err(_) => {
                warn!(
                    application = %message.application_number,
                    "notification outbox lock poisoned; message dropped"
                );
                None
            }
        }
    }
}

/// Handle to a running outbox worker. Dropping it also stops the worker.
pub struct NotificationWorker {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl NotificationWorker {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        if let Err(err) = self.handle.await {
            warn!(%err, "notification worker ended abnormally");
        }
    }
}

pub fn activation_email(
    applicant: &ApplicantContact,
    application_number: &ApplicationNumber,
    activation_link: &str,
    expires_at: DateTime<Utc>,
) -> Notification {
    Notification {
        to: applicant.email.clone(),
        subject: format!("Application {application_number} approved: set your password"),
        html: format!(
            "<p>Hello {},</p><p>Your partner application <strong>{}</strong> has been approved.</p>\
             <p><a href=\"{}\">Set your password</a> before {} UTC. The link can be used once.</p>",
            applicant.full_name,
            application_number,
            activation_link,
            expires_at.format("%Y-%m-%d %H:%M")
        ),
    }
}

pub fn rejection_email(
    applicant: &ApplicantContact,
    application_number: &ApplicationNumber,
    reason: &str,
) -> Notification {
    Notification {
        to: applicant.email.clone(),
        subject: format!("Update on application {application_number}"),
        html: format!(
            "<p>Hello {},</p><p>We are unable to approve application <strong>{}</strong>.</p>\
             <p>Reason: {}</p>",
            applicant.full_name, application_number, reason
        ),
    }
}

pub fn clarification_email(
    applicant: &ApplicantContact,
    application_number: &ApplicationNumber,
    clarification: &str,
    follow_up_date: Option<NaiveDate>,
) -> Notification {
    let follow_up = follow_up_date
        .map(|date| format!("<p>Please respond by {date}.</p>"))
        .unwrap_or_default();
    Notification {
        to: applicant.email.clone(),
        subject: format!("Clarification needed for application {application_number}"),
        html: format!(
            "<p>Hello {},</p><p>Application <strong>{}</strong> is on hold.</p><p>{}</p>{}",
            applicant.full_name, application_number, clarification, follow_up
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` sends, then succeeds.
    struct FlakyNotifier {
        failures: AtomicU32,
        sent: Mutex<Vec<Notification>>,
    }

    impl FlakyNotifier {
        fn new(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> usize {
            self.sent.lock().expect("sent mutex poisoned").len()
        }
    }

    impl Notifier for FlakyNotifier {
        fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(NotifyError::Transport("smtp timeout".to_string()));
            }
            self.sent
                .lock()
                .expect("sent mutex poisoned")
                .push(notification.clone());
            Ok(())
        }
    }

    fn message() -> OutboundMessage {
        let applicant = ApplicantContact {
            full_name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            phone: "+91-9000000000".to_string(),
            city: "Pune".to_string(),
        };
        let number = ApplicationNumber("FRP-1001".to_string());
        let notification = rejection_email(&applicant, &number, "incomplete documents");
        OutboundMessage::new(number, NotificationKind::Rejection, notification)
    }

    #[test]
    fn dispatch_only_queues() {
        let notifier = Arc::new(FlakyNotifier::new(0));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 3);

        let outcome = dispatcher.dispatch(message());

        assert_eq!(outcome, NotificationOutcome::Queued { outbox_depth: 1 });
        assert_eq!(notifier.sent(), 0);
        assert_eq!(dispatcher.pending().len(), 1);
    }

    #[test]
    fn drain_retries_within_attempt_budget() {
        let notifier = Arc::new(FlakyNotifier::new(2));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 3);
        dispatcher.dispatch(message());

        let summary = dispatcher.retry_pending();

        assert_eq!(
            summary,
            RetrySummary {
                delivered: 1,
                still_pending: 0
            }
        );
        assert_eq!(notifier.sent(), 1);
        assert!(dispatcher.pending().is_empty());
    }

    #[test]
    fn exhausted_attempts_stay_queued_for_next_pass() {
        let notifier = Arc::new(FlakyNotifier::new(2));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 2);
        dispatcher.dispatch(message());

        let first = dispatcher.retry_pending();
        assert_eq!(
            first,
            RetrySummary {
                delivered: 0,
                still_pending: 1
            }
        );
        let pending = dispatcher.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);
        assert_eq!(
            pending[0].last_error.as_deref(),
            Some("notification transport unavailable: smtp timeout")
        );

        let second = dispatcher.retry_pending();
        assert_eq!(second.delivered, 1);
        assert_eq!(notifier.sent(), 1);
        assert!(dispatcher.pending().is_empty());
    }

    async fn wait_for_sent(notifier: &FlakyNotifier, expected: usize) -> bool {
        for _ in 0..200 {
            if notifier.sent() >= expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn worker_delivers_as_soon_as_message_is_queued() {
        let notifier = Arc::new(FlakyNotifier::new(0));
        let dispatcher = Arc::new(NotificationDispatcher::new(notifier.clone(), 1));
        let worker = dispatcher.spawn_worker(Duration::from_secs(3600));

        dispatcher.dispatch(message());

        assert!(wait_for_sent(&notifier, 1).await);
        assert!(dispatcher.pending().is_empty());
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn worker_retries_failed_messages_on_poll() {
        let notifier = Arc::new(FlakyNotifier::new(3));
        let dispatcher = Arc::new(NotificationDispatcher::new(notifier.clone(), 1));
        let worker = dispatcher.spawn_worker(Duration::from_millis(20));

        dispatcher.dispatch(message());

        assert!(wait_for_sent(&notifier, 1).await);
        assert!(dispatcher.pending().is_empty());
        worker.shutdown().await;
    }

    #[test]
    fn templates_address_the_applicant() {
        let notification = message().notification;
        assert_eq!(notification.to, "asha@example.com");
        assert!(notification.subject.contains("FRP-1001"));
        assert!(notification.html.contains("incomplete documents"));
    }
}
