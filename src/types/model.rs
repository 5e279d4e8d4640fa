//! Workflow model: requirement templates, attachments, ledger records and
//! the eligibility outcome vocabulary.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RequirementId = Uuid;
pub type AttachmentId = Uuid;
pub type StepDefinitionId = Uuid;
pub type UserId = Uuid;
pub type SectorId = Uuid;

/// Ordering discipline of a requirement group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningMode {
    Sequential,
    Parallel,
}

/// Who owes the signature: a concrete user or any member of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResponsibleParty {
    User(UserId),
    Sector(SectorId),
}

/// The acting party: a user plus the sectors they belong to.
///
/// Sector membership is resolved by the identity layer before the resolver
/// runs; the resolver only ever consults this snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub user_id: UserId,
    pub sectors: HashSet<SectorId>,
}

impl Party {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            sectors: HashSet::new(),
        }
    }

    pub fn with_sectors(user_id: UserId, sectors: impl IntoIterator<Item = SectorId>) -> Self {
        Self {
            user_id,
            sectors: sectors.into_iter().collect(),
        }
    }

    /// Does this party satisfy a requirement's responsible-party rule?
    pub fn satisfies(&self, responsible: &ResponsibleParty) -> bool {
        match responsible {
            ResponsibleParty::User(id) => *id == self.user_id,
            ResponsibleParty::Sector(id) => self.sectors.contains(id),
        }
    }
}

/// A signing rule authored at process-design time. Never mutated at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequirement {
    pub id: RequirementId,
    pub step_definition_id: StepDefinitionId,
    /// `None` is the deprecated step-wide wildcard; it fans out into one
    /// independent chain per attachment the step produces.
    pub target_attachment_id: Option<AttachmentId>,
    pub responsible: ResponsibleParty,
    /// Position within the attachment's chain; meaningful only when
    /// `mode` is [`SigningMode::Sequential`].
    pub order: i32,
    pub mode: SigningMode,
    /// Optional requirements (`false`) may be signed but never block the
    /// attachment's completion or a successor in a sequential chain.
    pub is_required: bool,
}

impl SignatureRequirement {
    /// Does this rule apply to the given attachment?
    pub fn applies_to(&self, attachment_id: AttachmentId) -> bool {
        match self.target_attachment_id {
            Some(target) => target == attachment_id,
            None => true,
        }
    }
}

/// A document produced by a step execution.
///
/// `is_signed` is a cached projection of the ledger: it must always equal
/// "every required applicable requirement has a COMPLETED record". The ledger
/// is the only writer of this flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub step_execution_id: Uuid,
    pub step_definition_id: StepDefinitionId,
    pub mime_type: String,
    /// Location of the content as uploaded. Immutable once created; signed
    /// derivatives are separate stored objects.
    pub storage_location: String,
    /// Location of the most recent signed derivative, if any.
    pub signed_location: Option<String>,
    pub is_signed: bool,
}

/// Terminal state of a signing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Completed,
    Failed,
}

/// Ledger entry: a timestamped fact that a party did (or failed to) sign an
/// attachment against a requirement. Terminal once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: Uuid,
    pub requirement_id: RequirementId,
    pub attachment_id: AttachmentId,
    pub signer_id: UserId,
    pub status: RecordStatus,
    pub signed_at: DateTime<Utc>,
    /// SHA-256 of the signed artifact, hex; empty for FAILED attempts.
    pub signature_hash: String,
    /// SHA-256 of the signer's certificate DER, hex; empty for FAILED attempts.
    pub certificate_fingerprint: String,
    /// Storage id of the signed derivative this attempt produced; empty for
    /// FAILED attempts.
    pub artifact_location: String,
}

impl SignatureRecord {
    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }
}

/// Why a party may not sign right now. Expected, frequent, informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    /// Every applicable requirement already has a COMPLETED record.
    AlreadySigned,
    /// No applicable requirement names this party.
    NotResponsible,
    /// This party already completed their signature on this attachment.
    AlreadySignedByYou,
    /// Sequential chain: this many lower-order required requirements are
    /// still open.
    WaitingOnPredecessors(usize),
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// The party may sign now, against the named requirement.
    Eligible { requirement_id: RequirementId },
    Denied(DenialReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }
}

/// Caller-supplied context rendered into the visible signature block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignerMetadata {
    pub display_name: String,
    pub reason: Option<String>,
    pub location: Option<String>,
}
