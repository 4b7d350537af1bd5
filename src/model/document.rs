use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upload size limit shared by every document type (10MB)
pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

const IMAGES: &[&str] = &["image/jpeg", "image/png"];
const IMAGES_AND_PDF: &[&str] = &["image/jpeg", "image/png", "application/pdf"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    GovernmentId,
    Selfie,
    PropertyDocument,
    ProofOfOwnership,
    AgencyLicense,
}

/// Validation rule attached to each document type
#[derive(Debug, Clone, Copy)]
pub struct DocumentRule {
    pub accepted_mime_types: &'static [&'static str],
    pub max_bytes: u64,
    pub required: bool,
}

impl DocumentRule {
    pub fn accepts(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        self.accepted_mime_types.iter().any(|m| *m == mime_type)
    }
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::GovernmentId,
        DocumentType::Selfie,
        DocumentType::PropertyDocument,
        DocumentType::ProofOfOwnership,
        DocumentType::AgencyLicense,
    ];

    pub fn rule(&self) -> DocumentRule {
        match self {
            DocumentType::GovernmentId => DocumentRule {
                accepted_mime_types: IMAGES_AND_PDF,
                max_bytes: MAX_DOCUMENT_BYTES,
                required: true,
            },
            DocumentType::Selfie => DocumentRule {
                accepted_mime_types: IMAGES,
                max_bytes: MAX_DOCUMENT_BYTES,
                required: true,
            },
            DocumentType::PropertyDocument
            | DocumentType::ProofOfOwnership
            | DocumentType::AgencyLicense => DocumentRule {
                accepted_mime_types: IMAGES_AND_PDF,
                max_bytes: MAX_DOCUMENT_BYTES,
                required: false,
            },
        }
    }

    pub fn is_required(&self) -> bool {
        self.rule().required
    }

    pub fn required_types() -> impl Iterator<Item = DocumentType> {
        Self::ALL.into_iter().filter(|t| t.is_required())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::GovernmentId => "government_id",
            DocumentType::Selfie => "selfie",
            DocumentType::PropertyDocument => "property_document",
            DocumentType::ProofOfOwnership => "proof_of_ownership",
            DocumentType::AgencyLicense => "agency_license",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome decided later by human reviewers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
    NeedsReview,
}

/// The current upload for one document type in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub id: String,
    pub session_id: String,
    pub document_type: DocumentType,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,

    /// Path of the blob inside blob storage
    pub blob_path: String,

    /// Reference returned by blob storage
    pub storage_ref: String,

    pub verification_status: VerificationStatus,
    pub uploaded_at: DateTime<Utc>,
}

/// Current documents of one session, at most one per type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentSet {
    current: HashMap<DocumentType, SessionDocument>,
}

impl DocumentSet {
    /// Later entries of the same type win
    pub fn from_documents(documents: impl IntoIterator<Item = SessionDocument>) -> Self {
        let mut current = HashMap::new();
        for doc in documents {
            current.insert(doc.document_type, doc);
        }
        Self { current }
    }

    pub fn get(&self, document_type: DocumentType) -> Option<&SessionDocument> {
        self.current.get(&document_type)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &SessionDocument> {
        self.current.values()
    }

    /// Required types with no current entry, in declaration order
    pub fn missing_required(&self) -> Vec<DocumentType> {
        DocumentType::required_types()
            .filter(|t| !self.current.contains_key(t))
            .collect()
    }

    /// Presence alone counts; verification outcome is irrelevant here
    pub fn required_documents_satisfied(&self) -> bool {
        self.missing_required().is_empty()
    }
}
