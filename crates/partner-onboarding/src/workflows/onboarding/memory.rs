//! In-process adapters for the repository, blob store, and notifier ports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::approval::AuditLogEntry;
use super::domain::{Application, ApplicationNumber, PartnerCase};
use super::notifications::{Notification, Notifier, NotifyError};
use super::provisioning::PartnerUser;
use super::repository::{
    ApplicationRepository, BlobStore, CaseCommit, CaseFile, RepositoryError, StorageError,
};

#[derive(Debug, Default)]
struct MemoryState {
    cases: HashMap<ApplicationNumber, CaseFile>,
    users: Vec<PartnerUser>,
    audit: Vec<AuditLogEntry>,
}

/// Repository keeping every case behind one mutex, so each commit is atomic and isolated.
#[derive(Debug, Default, Clone)]
pub struct InMemoryApplicationRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryApplicationRepository {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.cases.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut state = self.lock()?;
        let number = application.application_number().clone();
        if state.cases.contains_key(&number) {
            return Err(RepositoryError::Conflict);
        }
        state.cases.insert(number, CaseFile::new(application.clone()));
        Ok(application)
    }

    fn fetch(&self, number: &ApplicationNumber) -> Result<Option<CaseFile>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.cases.get(number).cloned())
    }

    fn commit(&self, commit: CaseCommit) -> Result<u64, RepositoryError> {
        let mut state = self.lock()?;
        let state = &mut *state;

        let case = state
            .cases
            .get_mut(&commit.application_number)
            .ok_or(RepositoryError::NotFound)?;

        if let Some(expected) = commit.expected_status {
            let found = case.status();
            if found != expected {
                return Err(RepositoryError::StatusMismatch { expected, found });
            }
        }
        if let Some(expected) = commit.expected_revision {
            let found = case.application.core().revision;
            if found != expected {
                return Err(RepositoryError::RevisionMismatch {
                    expected,
                    found,
                    status: case.status(),
                });
            }
        }
        if commit.user.is_some()
            && state
                .users
                .iter()
                .any(|user| user.application_number == commit.application_number)
        {
            return Err(RepositoryError::Conflict);
        }

        let user = commit.user.clone();
        let audit = commit.audit.clone();
        case.apply(commit);
        let revision = case.application.core().revision;

        if let Some(user) = user {
            state.users.push(user);
        }
        if let Some(entry) = audit {
            state.audit.push(entry);
        }
        Ok(revision)
    }

    fn users_for(&self, number: &ApplicationNumber) -> Result<Vec<PartnerUser>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .users
            .iter()
            .filter(|user| &user.application_number == number)
            .cloned()
            .collect())
    }

    fn audit_trail(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .audit
            .iter()
            .filter(|entry| &entry.application_number == number)
            .cloned()
            .collect())
    }
}

/// Blob store that hands back deterministic `memory://` URLs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBlobStore {
    objects: Arc<Mutex<Vec<String>>>,
}

impl InMemoryBlobStore {
    pub fn objects(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.clone())
            .unwrap_or_default()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, local_ref: &str, folder: &str) -> Result<String, StorageError> {
        let file_name = local_ref
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| StorageError::Upload {
                local_ref: local_ref.to_string(),
                reason: "empty file reference".to_string(),
            })?;
        let url = format!("memory://{}/{}", folder.trim_matches('/'), file_name);
        self.objects
            .lock()
            .map_err(|_| StorageError::Unavailable("blob mutex poisoned".to_string()))?
            .push(url.clone());
        Ok(url)
    }
}

/// Notifier that records every message instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Transport("notifier mutex poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
