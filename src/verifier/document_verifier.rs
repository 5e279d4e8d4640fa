//! Recomputes a signed document's digest and compares it against the
//! embedded record.
//!
//! This is a tamper-evidence check, not PKI-chain validation: a passing
//! verification means "unaltered since the last embedded signature", not
//! "issued by a trusted root". The embedded signature value sits outside the
//! digested region (it cannot sign itself), so only the digest comparison is
//! performed here; keep that limitation in mind when presenting results.

use lopdf::Document;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    error::{DocumentError, Result},
    signer::manifest::{self, EmbeddedSignature, DIGEST_HEX_LEN},
};

/// Why verification did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationIssue {
    NoSignaturePresent,
    DigestMismatch,
    MalformedManifest(String),
}

/// Outcome of a verification run.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// True only when the recomputed digest matches the most recently
    /// embedded one exactly.
    pub is_valid: bool,
    /// Every embedded record, oldest first. Audit view.
    pub embedded_records: Vec<EmbeddedSignature>,
    pub errors: Vec<VerificationIssue>,
}

impl VerificationReport {
    fn failed(records: Vec<EmbeddedSignature>, issue: VerificationIssue) -> Self {
        Self {
            is_valid: false,
            embedded_records: records,
            errors: vec![issue],
        }
    }
}

/// Verifies a signed document's integrity against its embedded manifest.
pub fn verify(bytes: &[u8]) -> Result<VerificationReport> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| DocumentError::Corrupt(format!("unparseable PDF: {e}")))?;

    let records = match manifest::read_manifest(&doc) {
        Ok(records) => records,
        Err(DocumentError::Corrupt(detail)) => {
            return Ok(VerificationReport::failed(
                Vec::new(),
                VerificationIssue::MalformedManifest(detail),
            ));
        }
        Err(other) => return Err(other.into()),
    };

    let Some(latest) = records.last() else {
        return Ok(VerificationReport::failed(
            records,
            VerificationIssue::NoSignaturePresent,
        ));
    };

    if latest.digest.len() != DIGEST_HEX_LEN {
        return Ok(VerificationReport::failed(
            records.clone(),
            VerificationIssue::MalformedManifest(format!(
                "embedded digest has width {}, expected {}",
                latest.digest.len(),
                DIGEST_HEX_LEN
            )),
        ));
    }

    // Mask the newest record's two hex fields back to the zeros they held
    // when the signer computed the digest, then recompute.
    let mut masked = bytes.to_vec();
    let digest_zeros = "0".repeat(DIGEST_HEX_LEN);
    let signature_zeros = "0".repeat(latest.signature.len());
    if !manifest::splice_hex(&mut masked, "digest", &latest.digest, &digest_zeros)
        || !manifest::splice_hex(&mut masked, "signature", &latest.signature, &signature_zeros)
    {
        return Ok(VerificationReport::failed(
            records,
            VerificationIssue::MalformedManifest(
                "embedded record not found in raw byte stream".into(),
            ),
        ));
    }

    let recomputed = hex::encode(Sha256::digest(&masked));
    let is_valid = recomputed == latest.digest;
    debug!(is_valid, records = records.len(), "verification finished");

    Ok(VerificationReport {
        is_valid,
        errors: if is_valid {
            Vec::new()
        } else {
            vec![VerificationIssue::DigestMismatch]
        },
        embedded_records: records,
    })
}
