//! Signature workflow engine for business-process platforms.
//!
//! Process templates declare, per step, who must sign which generated
//! attachment, in what order and whether in parallel with others. This crate
//! is the core that enforces those rules and turns an approval into a
//! tamper-evident artifact: the eligibility resolver, the PKCS#12 certificate
//! codec, the PDF signer/verifier pair and the append-only signature ledger.
//! Company/user/sector administration, HTTP routing, persistence and
//! notification delivery are external collaborators.

// Configuration and shared types
pub mod config;
pub mod error;
pub mod types;

// Certificate decoding and validation
pub mod certificate;

// Document signing and verification
pub mod signer;
pub mod verifier;

// Eligibility rules and the ledger
pub mod ledger;
pub mod resolver;

// Collaborator boundary and facade
pub mod engine;
pub mod storage;

// Re-exports for crate consumers
pub use certificate::{decode, validate, SigningIdentity};
pub use config::SigningConfig;
pub use engine::{SignOutcome, SignatureEngine};
pub use error::{CertificateError, DocumentError, Error, LedgerError, Result, SigningError};
pub use ledger::{AttemptOutcome, RecordAttempt, SignatureLedger};
pub use signer::{DocumentSigner, EmbeddedSignature, SignedArtifact};
pub use storage::{DocumentStore, FileStore, MemoryStore};
pub use types::{
    Attachment, AttachmentId, CertificateDescriptor, DenialReason, Eligibility, Party,
    RecordStatus, RequirementId, ResponsibleParty, SectorId, SignatureRecord,
    SignatureRequirement, SignerMetadata, SigningMode, StepDefinitionId, UserId,
};
pub use verifier::{VerificationIssue, VerificationReport};
