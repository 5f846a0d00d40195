use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{DocumentRecord, DocumentStatus, DocumentType, PartnerKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecklistError {
    #[error("document type '{key}' is not required for {partner}")]
    InvalidDocumentType { key: String, partner: &'static str },
    #[error("a reason is required when marking a document '{status}'")]
    ReasonRequired { status: &'static str },
    #[error("select at least one document")]
    EmptySelection,
}

/// Resolve a raw document key against the variant's required set.
pub fn resolve_document_type(kind: PartnerKind, key: &str) -> Result<DocumentType, ChecklistError> {
    DocumentType::from_key(key)
        .filter(|document| kind.required_documents().contains(document))
        .ok_or_else(|| ChecklistError::InvalidDocumentType {
            key: key.trim().to_string(),
            partner: kind.label(),
        })
}

pub(super) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Per-document verification state owned by one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChecklist {
    documents: BTreeMap<DocumentType, DocumentRecord>,
}

impl DocumentChecklist {
    pub fn for_documents(required: &[DocumentType]) -> Self {
        Self {
            documents: required
                .iter()
                .map(|document| (*document, DocumentRecord::default()))
                .collect(),
        }
    }

    pub fn get(&self, document: DocumentType) -> Option<&DocumentRecord> {
        self.documents.get(&document)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocumentType, &DocumentRecord)> {
        self.documents.iter()
    }

    /// Overwrite one document's status; the reason is kept only for statuses that demand it.
    pub fn set_status(
        &mut self,
        document: DocumentType,
        status: DocumentStatus,
        reason: Option<&str>,
    ) -> Result<DocumentRecord, ChecklistError> {
        let reason = non_blank(reason);
        if status.requires_reason() && reason.is_none() {
            return Err(ChecklistError::ReasonRequired {
                status: status.label(),
            });
        }

        let record = self.documents.entry(document).or_default();
        record.status = status;
        record.reason = if status.requires_reason() { reason } else { None };
        Ok(record.clone())
    }

    /// Flag every listed document as `requires_action` with one shared reason.
    pub fn request_correction(
        &mut self,
        documents: &[DocumentType],
        reason: &str,
    ) -> Result<Vec<(DocumentType, DocumentRecord)>, ChecklistError> {
        let reason = non_blank(Some(reason)).ok_or(ChecklistError::ReasonRequired {
            status: DocumentStatus::RequiresAction.label(),
        })?;
        if documents.is_empty() {
            return Err(ChecklistError::EmptySelection);
        }

        let mut updated = Vec::with_capacity(documents.len());
        for document in documents {
            let record = self.set_status(
                *document,
                DocumentStatus::RequiresAction,
                Some(reason.as_str()),
            )?;
            updated.push((*document, record));
        }
        Ok(updated)
    }

    /// Record a fresh upload; any earlier verdict no longer applies.
    pub fn attach(&mut self, document: DocumentType, url: String) -> DocumentRecord {
        let record = self.documents.entry(document).or_default();
        record.status = DocumentStatus::Uploaded;
        record.reason = None;
        record.url = Some(url);
        record.clone()
    }

    pub(super) fn apply(&mut self, document: DocumentType, record: DocumentRecord) {
        self.documents.insert(document, record);
    }

    pub fn all_required_verified(&self, required: &[DocumentType]) -> bool {
        self.outstanding(required).is_empty()
    }

    pub fn outstanding(&self, required: &[DocumentType]) -> Vec<DocumentType> {
        required
            .iter()
            .filter(|document| {
                self.documents
                    .get(*document)
                    .map_or(true, |record| record.status != DocumentStatus::Verified)
            })
            .copied()
            .collect()
    }
}
