//! The signature workflow facade.
//!
//! Wires the certificate codec, document signer, store and ledger into the
//! three entry points collaborators use: `can_sign`, `sign` and `verify`.
//! Signing is CPU-bound and runs on the blocking pool under a semaphore and
//! a deadline; the private key exists only inside that blocking closure.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::{
    sync::{Mutex, RwLock, Semaphore},
    task,
    time::timeout,
};
use tracing::{debug, instrument};

use crate::{
    certificate,
    config::SigningConfig,
    error::{Error, Result, SigningError},
    ledger::{AttemptOutcome, RecordAttempt, SignatureLedger},
    resolver,
    signer::{DocumentSigner, SignedArtifact},
    storage::DocumentStore,
    types::{
        Attachment, AttachmentId, DenialReason, Eligibility, Party, SignatureRecord,
        SignatureRequirement, SignerMetadata, StepDefinitionId,
    },
    verifier::{self, VerificationReport},
};

/// Outcome of the `sign` entry point. A denial is a normal, expected result
/// communicated to the UI layer, not an error.
#[derive(Debug, Clone)]
pub enum SignOutcome {
    Signed(SignatureRecord),
    Denied(DenialReason),
}

pub struct SignatureEngine {
    config: Arc<SigningConfig>,
    store: Arc<dyn DocumentStore>,
    ledger: Arc<SignatureLedger>,
    requirements: RwLock<HashMap<StepDefinitionId, Vec<SignatureRequirement>>>,
    /// One signing at a time per attachment: each derivative must chain off
    /// the previous one, so read → sign → store → record is a unit.
    sign_locks: Mutex<HashMap<AttachmentId, Arc<Mutex<()>>>>,
    limiter: Arc<Semaphore>,
}

impl SignatureEngine {
    pub fn new(config: SigningConfig, store: Arc<dyn DocumentStore>) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config: Arc::new(config),
            store,
            ledger: Arc::new(SignatureLedger::new()),
            requirements: RwLock::new(HashMap::new()),
            sign_locks: Mutex::new(HashMap::new()),
            limiter,
        }
    }

    pub fn ledger(&self) -> Arc<SignatureLedger> {
        Arc::clone(&self.ledger)
    }

    /// Registers the requirement templates of a step definition, replacing
    /// any previous set. Templates are rules, not state: they are authored by
    /// the process engine and never mutated at run time.
    pub async fn register_requirements(
        &self,
        step_definition_id: StepDefinitionId,
        requirements: Vec<SignatureRequirement>,
    ) {
        self.requirements
            .write()
            .await
            .insert(step_definition_id, requirements);
    }

    pub async fn register_attachment(&self, attachment: Attachment) {
        self.ledger.register_attachment(attachment).await;
    }

    /// Read-only eligibility check, used to render task lists and gate the
    /// sign action.
    #[instrument(skip(self, party))]
    pub async fn can_sign(
        &self,
        party: &Party,
        attachment_id: AttachmentId,
    ) -> Result<Eligibility> {
        let attachment = self.attachment(attachment_id).await?;
        let requirements = self.requirements_for(attachment.step_definition_id).await;
        let records = self.ledger.records_for(attachment_id).await;
        resolver::can_sign(party, attachment_id, &requirements, &records)
    }

    /// Every open attachment the party can act on right now.
    pub async fn pending_work(&self, party: &Party) -> Result<Vec<Attachment>> {
        let open = self.ledger.open_attachments().await;
        let requirements = self.requirements.read().await.clone();
        let mut records = HashMap::new();
        for attachment in &open {
            records.insert(attachment.id, self.ledger.records_for(attachment.id).await);
        }
        let actionable = resolver::list_pending_work(party, &open, &requirements, &records)?;
        Ok(actionable.into_iter().cloned().collect())
    }

    /// The only mutating entry point: decode the certificate, validate it,
    /// produce the signed derivative, store it and record the attempt.
    #[instrument(skip_all, fields(attachment = %attachment_id, signer = %party.user_id))]
    pub async fn sign(
        &self,
        attachment_id: AttachmentId,
        pfx_bytes: Vec<u8>,
        password: String,
        party: Party,
        metadata: SignerMetadata,
    ) -> Result<SignOutcome> {
        // The attachment lock comes first: a task waiting its turn on the
        // same attachment must not sit on a semaphore permit.
        let serial = self.sign_lock(attachment_id).await;
        let _serial_guard = serial.lock().await;
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| SigningError::CryptoFailure("signing pool closed".into()))?;

        let attachment = self.attachment(attachment_id).await?;
        let requirements = self.requirements_for(attachment.step_definition_id).await;
        let records = self.ledger.records_for(attachment_id).await;

        // Read-time gate; record_attempt re-validates under the write lock.
        let eligibility = resolver::can_sign(&party, attachment_id, &requirements, &records)?;
        let requirement_id = match eligibility {
            Eligibility::Eligible { requirement_id } => requirement_id,
            Eligibility::Denied(reason) => {
                debug!(?reason, "sign request denied");
                return Ok(SignOutcome::Denied(reason));
            }
        };

        // Later signatures stack above earlier ones on the page.
        let position = records.iter().filter(|r| r.is_completed()).count();
        let source = self
            .store
            .read(attachment.signed_location.as_ref().unwrap_or(&attachment.storage_location))
            .await?;

        let artifact = match self
            .sign_blocking(source, pfx_bytes, password, metadata, position)
            .await
        {
            Ok(artifact) => artifact,
            Err(err) => {
                // Certificate and crypto failures are audit-worthy attempts;
                // a timeout writes nothing, per the atomicity contract.
                if matches!(err, Error::Certificate(_) | Error::Signing(SigningError::CryptoFailure(_))) {
                    let _ = self
                        .ledger
                        .record_attempt(
                            &requirements,
                            attachment_id,
                            &party,
                            AttemptOutcome::Failed { requirement_id },
                        )
                        .await;
                }
                return Err(err);
            }
        };

        // Written before the record is accepted; a write-time denial leaves
        // this object unreferenced, and the content-addressed stores hand the
        // same id back on any identical later write.
        let signed_location = self.store.write(artifact.bytes).await?;

        let outcome = AttemptOutcome::Completed {
            signed_location,
            signature_hash: artifact.digest,
            certificate_fingerprint: artifact.certificate_fingerprint,
        };
        match self
            .ledger
            .record_attempt(&requirements, attachment_id, &party, outcome)
            .await?
        {
            RecordAttempt::Recorded(record) => Ok(SignOutcome::Signed(record)),
            RecordAttempt::Denied(reason) => Ok(SignOutcome::Denied(reason)),
        }
    }

    /// Read-only integrity check of the attachment's signed derivative.
    #[instrument(skip(self))]
    pub async fn verify(&self, attachment_id: AttachmentId) -> Result<VerificationReport> {
        let attachment = self.attachment(attachment_id).await?;
        let location = attachment
            .signed_location
            .as_ref()
            .unwrap_or(&attachment.storage_location);
        let bytes = self.store.read(location).await?;
        verifier::verify(&bytes)
    }

    /// Decode + temporal validation + sign, on the blocking pool, under the
    /// configured deadline. The PKCS#12 material never leaves this scope.
    async fn sign_blocking(
        &self,
        source: Vec<u8>,
        pfx_bytes: Vec<u8>,
        password: String,
        metadata: SignerMetadata,
        position: usize,
    ) -> Result<SignedArtifact> {
        let config = (*self.config).clone();
        let deadline = config.sign_timeout;
        let handle = task::spawn_blocking(move || -> Result<SignedArtifact> {
            let identity = certificate::decode(&pfx_bytes, &password)?;
            certificate::validate(&identity.descriptor, Utc::now())?;
            let signer = DocumentSigner::new(config);
            signer.add_sequential_signature(&source, &identity, &metadata, position)
        });

        match timeout(deadline, handle).await {
            Err(_) => Err(SigningError::Timeout(deadline).into()),
            Ok(Err(join_error)) => {
                Err(SigningError::CryptoFailure(format!("signing task failed: {join_error}")).into())
            }
            Ok(Ok(result)) => result,
        }
    }

    async fn sign_lock(&self, attachment_id: AttachmentId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.sign_locks
                .lock()
                .await
                .entry(attachment_id)
                .or_default(),
        )
    }

    async fn attachment(&self, attachment_id: AttachmentId) -> Result<Attachment> {
        self.ledger
            .attachment(attachment_id)
            .await
            .ok_or_else(|| crate::error::LedgerError::UnknownAttachment(attachment_id).into())
    }

    async fn requirements_for(
        &self,
        step_definition_id: StepDefinitionId,
    ) -> Vec<SignatureRequirement> {
        self.requirements
            .read()
            .await
            .get(&step_definition_id)
            .cloned()
            .unwrap_or_default()
    }
}
