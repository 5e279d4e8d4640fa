//! The signature ledger: the append-only record of signing attempts and the
//! derived per-attachment "fully signed" status.
//!
//! `record_attempt` is the single mutual-exclusion boundary of the engine.
//! Re-validating eligibility, appending the record and recomputing the
//! cached `is_signed` flag all happen inside one write-lock section, so a
//! record can never exist without its matching flag update. The flag is only
//! ever recomputed from the full requirement set, never hand-toggled.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{LedgerError, Result},
    resolver,
    types::{
        Attachment, AttachmentId, DenialReason, Eligibility, Party, RecordStatus, RequirementId,
        SignatureRecord, SignatureRequirement,
    },
};

/// Outcome of a signing attempt, as reported to the ledger.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Completed {
        /// Storage id of the signed derivative.
        signed_location: String,
        /// SHA-256 of the signed artifact, hex.
        signature_hash: String,
        /// SHA-256 of the signer's certificate DER, hex.
        certificate_fingerprint: String,
    },
    Failed {
        /// The requirement the failed attempt was acting against.
        requirement_id: RequirementId,
    },
}

/// Result of [`SignatureLedger::record_attempt`].
#[derive(Debug, Clone)]
pub enum RecordAttempt {
    Recorded(SignatureRecord),
    /// Write-time eligibility check rejected the attempt; nothing was
    /// written. Closes the race between two concurrently submitted signs.
    Denied(DenialReason),
}

#[derive(Debug, Default)]
struct LedgerState {
    attachments: HashMap<AttachmentId, Attachment>,
    records: Vec<SignatureRecord>,
}

/// In-memory ledger. Persistence technology is out of scope; the write lock
/// here is the per-process serialization point the contract requires.
#[derive(Debug, Default)]
pub struct SignatureLedger {
    state: RwLock<LedgerState>,
}

impl SignatureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_attachment(&self, attachment: Attachment) {
        debug!(attachment = %attachment.id, "registering attachment");
        self.state
            .write()
            .await
            .attachments
            .insert(attachment.id, attachment);
    }

    pub async fn attachment(&self, id: AttachmentId) -> Option<Attachment> {
        self.state.read().await.attachments.get(&id).cloned()
    }

    /// All attachments not yet fully signed.
    pub async fn open_attachments(&self) -> Vec<Attachment> {
        self.state
            .read()
            .await
            .attachments
            .values()
            .filter(|a| !a.is_signed)
            .cloned()
            .collect()
    }

    pub async fn records_for(&self, attachment_id: AttachmentId) -> Vec<SignatureRecord> {
        self.state
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.attachment_id == attachment_id)
            .cloned()
            .collect()
    }

    /// Atomically: re-validate eligibility, append exactly one record, and
    /// recompute the attachment's derived `is_signed` flag.
    #[instrument(skip(self, requirements, party, outcome), fields(attachment = %attachment_id))]
    pub async fn record_attempt(
        &self,
        requirements: &[SignatureRequirement],
        attachment_id: AttachmentId,
        party: &Party,
        outcome: AttemptOutcome,
    ) -> Result<RecordAttempt> {
        let mut state = self.state.write().await;
        if !state.attachments.contains_key(&attachment_id) {
            return Err(LedgerError::UnknownAttachment(attachment_id).into());
        }

        let record = match outcome {
            AttemptOutcome::Completed {
                signed_location,
                signature_hash,
                certificate_fingerprint,
            } => {
                // Write-time validation: the read-time check may be stale by
                // the time a concurrent attempt lands here.
                let eligibility =
                    resolver::can_sign(party, attachment_id, requirements, &state.records)?;
                let requirement_id = match eligibility {
                    Eligibility::Eligible { requirement_id } => requirement_id,
                    Eligibility::Denied(reason) => {
                        debug!(?reason, "attempt rejected at write time");
                        return Ok(RecordAttempt::Denied(reason));
                    }
                };

                // At most one COMPLETED record per (requirement, signer,
                // attachment); signing is not repeatable.
                let duplicate = state.records.iter().any(|r| {
                    r.requirement_id == requirement_id
                        && r.attachment_id == attachment_id
                        && r.signer_id == party.user_id
                        && r.is_completed()
                });
                if duplicate {
                    return Err(LedgerError::DuplicateCompletion.into());
                }

                let record = SignatureRecord {
                    id: Uuid::new_v4(),
                    requirement_id,
                    attachment_id,
                    signer_id: party.user_id,
                    status: RecordStatus::Completed,
                    signed_at: Utc::now(),
                    signature_hash,
                    certificate_fingerprint,
                    artifact_location: signed_location.clone(),
                };
                if let Some(attachment) = state.attachments.get_mut(&attachment_id) {
                    attachment.signed_location = Some(signed_location);
                }
                info!(
                    requirement = %requirement_id,
                    signer = %party.user_id,
                    "signature recorded"
                );
                record
            }
            AttemptOutcome::Failed { requirement_id } => {
                if !requirements.iter().any(|r| r.id == requirement_id) {
                    return Err(LedgerError::UnknownRequirement(requirement_id).into());
                }
                warn!(
                    requirement = %requirement_id,
                    signer = %party.user_id,
                    "failed signing attempt recorded"
                );
                SignatureRecord {
                    id: Uuid::new_v4(),
                    requirement_id,
                    attachment_id,
                    signer_id: party.user_id,
                    status: RecordStatus::Failed,
                    signed_at: Utc::now(),
                    signature_hash: String::new(),
                    certificate_fingerprint: String::new(),
                    artifact_location: String::new(),
                }
            }
        };

        state.records.push(record.clone());

        // Same critical section as the append: the cached flag can never
        // drift from the records it projects.
        let fully_signed =
            resolver::is_fully_signed(attachment_id, requirements, &state.records);
        if let Some(attachment) = state.attachments.get_mut(&attachment_id) {
            attachment.is_signed = fully_signed;
        }

        Ok(RecordAttempt::Recorded(record))
    }
}
