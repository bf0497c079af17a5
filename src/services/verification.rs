//! Identity document uploads and their authenticity checks.
//!
//! Every upload gets an automatic verification. Clean uploads are approved on
//! the spot, the rest wait in the admin review queue.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::engine::notifier::{notify, template_data};
use crate::error::{AppError, FieldErrors};
use crate::models::notification::{Channel, NotificationPriority};
use crate::models::user::{DocumentStatus, DocumentType, UserDocument};
use crate::models::verification::{DocumentVerification, VerificationMethod, VerificationStatus};
use crate::state::AppState;

const ALLOWED_CONTENT_TYPES: [&str; 3] = ["application/pdf", "image/jpeg", "image/png"];
const MIN_SIZE_BYTES: usize = 1024;
const MAX_SIZE_BYTES: usize = 10 * 1024 * 1024;
const APPROVAL_VALIDATION_SCORE: u8 = 80;
const APPROVAL_FRAUD_SCORE: u8 = 90;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadDocumentRequest {
    pub document_type: DocumentType,
    pub file_name: String,
    pub content_type: String,
    /// File content, base64 encoded.
    pub content: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadOutcome {
    pub document: UserDocument,
    pub verification: DocumentVerification,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct ReviewSummary {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub awaiting_review: usize,
    pub average_validation_score: f64,
    pub average_fraud_score: f64,
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

struct Assessment {
    validation_score: u8,
    fraud_score: u8,
    notes: Vec<String>,
}

fn assess(
    file_name: &str,
    content_type: &str,
    size: usize,
    duplicated_elsewhere: bool,
) -> Assessment {
    let mut validation: i32 = 100;
    let mut fraud: i32 = 100;
    let mut notes = Vec::new();

    if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
        validation -= 40;
        notes.push(format!("unsupported content type {content_type}"));
    }
    if size < MIN_SIZE_BYTES {
        validation -= 30;
        notes.push(format!("file is only {size} bytes"));
    }
    if size > MAX_SIZE_BYTES {
        validation -= 30;
        notes.push("file exceeds 10 MiB".to_string());
    }
    let name = file_name.trim();
    if name.is_empty() || !name.contains('.') {
        validation -= 20;
        notes.push("file name has no extension".to_string());
    }
    if duplicated_elsewhere {
        fraud -= 60;
        notes.push("identical file uploaded by another account".to_string());
    }

    Assessment {
        validation_score: validation.clamp(0, 100) as u8,
        fraud_score: fraud.clamp(0, 100) as u8,
        notes,
    }
}

pub fn upload(
    state: &AppState,
    user_id: Uuid,
    req: UploadDocumentRequest,
    now: DateTime<Utc>,
) -> Result<UploadOutcome, AppError> {
    let bytes = STANDARD.decode(req.content.trim()).map_err(|_| {
        let mut errors = FieldErrors::new();
        errors.add("content", "content must be valid base64");
        AppError::Validation(errors)
    })?;
    if bytes.is_empty() {
        let mut errors = FieldErrors::new();
        errors.add("content", "content must not be empty");
        return Err(AppError::Validation(errors));
    }

    let fingerprint = fingerprint(&bytes);
    let duplicated = state
        .user_documents
        .iter()
        .any(|d| d.fingerprint == fingerprint && d.user_id != user_id);
    let assessment = assess(&req.file_name, &req.content_type, bytes.len(), duplicated);

    let approved = assessment.validation_score >= APPROVAL_VALIDATION_SCORE
        && assessment.fraud_score >= APPROVAL_FRAUD_SCORE;

    let document = UserDocument {
        id: Uuid::new_v4(),
        user_id,
        document_type: req.document_type,
        file_name: req.file_name.trim().to_string(),
        content_type: req.content_type,
        size_bytes: bytes.len(),
        fingerprint,
        status: if approved {
            DocumentStatus::Approved
        } else {
            DocumentStatus::Pending
        },
        verified_at: approved.then_some(now),
        verified_by: None,
        rejection_reason: None,
        uploaded_at: now,
    };

    let verification = DocumentVerification {
        id: Uuid::new_v4(),
        user_id,
        document_id: document.id,
        status: if approved {
            VerificationStatus::Approved
        } else {
            VerificationStatus::RequiresManualReview
        },
        method: VerificationMethod::Automatic,
        validation_score: assessment.validation_score,
        fraud_score: assessment.fraud_score,
        extracted_data: json!({
            "document_type": req.document_type,
            "file_name": document.file_name,
            "content_type": document.content_type,
            "size_bytes": document.size_bytes,
        }),
        notes: assessment.notes,
        reviewed_by: None,
        rejection_reason: None,
        created_at: now,
        reviewed_at: approved.then_some(now),
    };

    {
        let _guard = state.transaction();
        state.user_documents.insert(document.id, document.clone());
        state.verifications.insert(verification.id, verification.clone());
        if approved && document.document_type.proves_identity() {
            mark_identity_verified(state, user_id, now);
        }
    }

    info!(
        user_id = %user_id,
        document_id = %document.id,
        validation_score = verification.validation_score,
        fraud_score = verification.fraud_score,
        status = ?verification.status,
        "document uploaded"
    );
    Ok(UploadOutcome {
        document,
        verification,
    })
}

fn mark_identity_verified(state: &AppState, user_id: Uuid, now: DateTime<Utc>) {
    if let Some(mut user) = state.users.get_mut(&user_id) {
        user.is_document_verified = true;
        user.updated_at = now;
    }
}

pub fn review(
    state: &AppState,
    verification_id: Uuid,
    reviewer: Uuid,
    req: ReviewRequest,
    now: DateTime<Utc>,
) -> Result<DocumentVerification, AppError> {
    let reason = req.reason.filter(|r| !r.trim().is_empty());
    if req.decision == ReviewDecision::Rejected && reason.is_none() {
        let mut errors = FieldErrors::new();
        errors.add("reason", "a reason is required when rejecting");
        return Err(AppError::Validation(errors));
    }

    let (verification, document) = {
        let _guard = state.transaction();
        let mut verification = state
            .verifications
            .get(&verification_id)
            .map(|v| v.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("verification {verification_id} not found")))?;
        if !verification.awaiting_review() {
            return Err(AppError::Conflict(format!(
                "verification is already {:?}",
                verification.status
            )));
        }
        let mut document = state
            .user_documents
            .get(&verification.document_id)
            .map(|d| d.value().clone())
            .ok_or_else(|| AppError::NotFound("document not found".to_string()))?;

        let approved = req.decision == ReviewDecision::Approved;
        verification.status = if approved {
            VerificationStatus::Approved
        } else {
            VerificationStatus::Rejected
        };
        verification.method = VerificationMethod::Hybrid;
        verification.reviewed_by = Some(reviewer);
        verification.reviewed_at = Some(now);
        verification.rejection_reason = reason.clone();

        document.status = if approved {
            DocumentStatus::Approved
        } else {
            DocumentStatus::Rejected
        };
        document.verified_at = Some(now);
        document.verified_by = Some(reviewer);
        document.rejection_reason = reason;

        state.verifications.insert(verification.id, verification.clone());
        state.user_documents.insert(document.id, document.clone());
        if approved && document.document_type.proves_identity() {
            mark_identity_verified(state, document.user_id, now);
        }
        (verification, document)
    };

    let status = match verification.status {
        VerificationStatus::Approved => "approved",
        _ => "rejected",
    };
    let reason = verification
        .rejection_reason
        .as_deref()
        .map(|r| format!(" Reason: {r}"))
        .unwrap_or_default();
    notify(
        state,
        document.user_id,
        Channel::Email,
        "document_reviewed",
        template_data([
            ("document_type", format!("{:?}", document.document_type)),
            ("status", status.to_string()),
            ("reason", reason),
        ]),
        NotificationPriority::Normal,
    );

    info!(
        verification_id = %verification_id,
        reviewer = %reviewer,
        status,
        "document reviewed"
    );
    Ok(verification)
}

/// Verifications awaiting a decision, oldest first.
pub fn review_queue(state: &AppState) -> Vec<DocumentVerification> {
    let mut queue: Vec<DocumentVerification> = state
        .verifications
        .iter()
        .filter(|v| v.awaiting_review())
        .map(|v| v.value().clone())
        .collect();
    queue.sort_by_key(|v| v.created_at);
    queue
}

pub fn for_user(state: &AppState, user_id: Uuid) -> Vec<DocumentVerification> {
    let mut list: Vec<DocumentVerification> = state
        .verifications
        .iter()
        .filter(|v| v.user_id == user_id)
        .map(|v| v.value().clone())
        .collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    list
}

pub fn summary(state: &AppState) -> ReviewSummary {
    let all: Vec<DocumentVerification> =
        state.verifications.iter().map(|v| v.value().clone()).collect();
    if all.is_empty() {
        return ReviewSummary::default();
    }

    let total = all.len();
    let average = |f: fn(&DocumentVerification) -> u8| {
        let sum: u32 = all.iter().map(|v| f(v) as u32).sum();
        ((sum as f64 / total as f64) * 100.0).round() / 100.0
    };

    ReviewSummary {
        total,
        approved: all
            .iter()
            .filter(|v| v.status == VerificationStatus::Approved)
            .count(),
        rejected: all
            .iter()
            .filter(|v| v.status == VerificationStatus::Rejected)
            .count(),
        awaiting_review: all.iter().filter(|v| v.awaiting_review()).count(),
        average_validation_score: average(|v| v.validation_score),
        average_fraud_score: average(|v| v.fraud_score),
    }
}
