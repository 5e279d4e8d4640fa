//! End-to-end signing: certificate decode, artifact production, integrity
//! verification and the engine facade.

mod common;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use common::{
    attachment, company_pfx, metadata, minimal_pdf, person_pfx, requirement, FIXTURE_PASSWORD,
};
use signaflow::{
    certificate, verifier, CertificateError, DenialReason, DocumentSigner, DocumentStore, Error,
    MemoryStore, Party, ResponsibleParty, SignOutcome, SignatureEngine, SigningConfig,
    SigningError, SigningMode, VerificationIssue,
};
use uuid::Uuid;

#[test]
fn person_bundle_decodes_with_cpf() {
    let identity = certificate::decode(&person_pfx(), FIXTURE_PASSWORD).unwrap();
    let descriptor = &identity.descriptor;

    assert_eq!(descriptor.cpf.as_deref(), Some("12345678901"));
    assert!(descriptor.subject.contains("MARIA OLIVEIRA SANTOS"));
    assert!(descriptor.issuer.contains("ICP-Brasil"));
    assert_eq!(descriptor.fingerprint.len(), 64);
    assert!(certificate::validate(descriptor, Utc::now()).is_ok());
}

#[test]
fn company_bundle_decodes_with_cnpj() {
    let identity = certificate::decode(&company_pfx(), FIXTURE_PASSWORD).unwrap();
    assert_eq!(
        identity.descriptor.cnpj.as_deref(),
        Some("11222333000181")
    );
    assert_eq!(identity.descriptor.tax_id(), Some("11222333000181"));
}

#[test]
fn wrong_password_is_rejected() {
    assert!(matches!(
        certificate::decode(&person_pfx(), "wrong"),
        Err(CertificateError::BadPassword)
    ));
}

#[test]
fn signed_document_verifies_and_tampering_is_detected() {
    let identity = certificate::decode(&person_pfx(), FIXTURE_PASSWORD).unwrap();
    let signer = DocumentSigner::new(SigningConfig::default());

    let artifact = signer
        .sign(&minimal_pdf(), &identity, &metadata("Maria Oliveira Santos"))
        .unwrap();
    assert_eq!(artifact.digest.len(), 64);
    assert_eq!(artifact.record.tax_id.as_deref(), Some("12345678901"));

    // Untouched artifact: valid, one embedded record.
    let report = verifier::verify(&artifact.bytes).unwrap();
    assert!(report.is_valid);
    assert!(report.errors.is_empty());
    assert_eq!(report.embedded_records, vec![artifact.record.clone()]);

    // Flip one byte of the original content stream.
    let mut tampered = artifact.bytes.clone();
    let pos = tampered
        .windows(8)
        .position(|w| w == b"Processo")
        .expect("source text survives signing");
    tampered[pos] = b'X';
    let report = verifier::verify(&tampered).unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.errors, vec![VerificationIssue::DigestMismatch]);
}

#[test]
fn unsigned_document_reports_no_signature() {
    let report = verifier::verify(&minimal_pdf()).unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.errors, vec![VerificationIssue::NoSignaturePresent]);
    assert!(report.embedded_records.is_empty());
}

#[test]
fn stacked_signatures_preserve_earlier_records() {
    let person = certificate::decode(&person_pfx(), FIXTURE_PASSWORD).unwrap();
    let company = certificate::decode(&company_pfx(), FIXTURE_PASSWORD).unwrap();
    let signer = DocumentSigner::new(SigningConfig::default());

    let first = signer
        .sign(&minimal_pdf(), &person, &metadata("Maria Oliveira Santos"))
        .unwrap();
    let second = signer
        .add_sequential_signature(&first.bytes, &company, &metadata("Acme Servicos"), 1)
        .unwrap();

    let report = verifier::verify(&second.bytes).unwrap();
    assert!(report.is_valid);
    assert_eq!(report.embedded_records.len(), 2);
    // The first record is embedded verbatim, not renumbered or rewritten.
    assert_eq!(report.embedded_records[0], first.record);
    assert_eq!(report.embedded_records[1], second.record);
}

#[tokio::test]
async fn engine_runs_a_two_party_sequential_chain() {
    common::init_tracing();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let engine = SignatureEngine::new(SigningConfig::default(), Arc::clone(&store));

    let step = Uuid::new_v4();
    let mut attachment = attachment(step);
    attachment.storage_location = store.write(minimal_pdf()).await.unwrap();

    let (user1, user2) = (Uuid::new_v4(), Uuid::new_v4());
    engine
        .register_requirements(
            step,
            vec![
                requirement(
                    step,
                    Some(attachment.id),
                    ResponsibleParty::User(user1),
                    1,
                    SigningMode::Sequential,
                ),
                requirement(
                    step,
                    Some(attachment.id),
                    ResponsibleParty::User(user2),
                    2,
                    SigningMode::Sequential,
                ),
            ],
        )
        .await;
    engine.register_attachment(attachment.clone()).await;

    // Out of order: denied, nothing recorded.
    let outcome = engine
        .sign(
            attachment.id,
            company_pfx(),
            FIXTURE_PASSWORD.into(),
            Party::user(user2),
            metadata("Acme Servicos"),
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SignOutcome::Denied(DenialReason::WaitingOnPredecessors(1))
    ));
    assert!(engine.ledger().records_for(attachment.id).await.is_empty());

    // First signer completes; the attachment is not yet fully signed.
    let outcome = engine
        .sign(
            attachment.id,
            person_pfx(),
            FIXTURE_PASSWORD.into(),
            Party::user(user1),
            metadata("Maria Oliveira Santos"),
        )
        .await
        .unwrap();
    let record1 = match outcome {
        SignOutcome::Signed(record) => record,
        other => panic!("expected a signature, got {other:?}"),
    };
    assert_eq!(record1.signer_id, user1);
    assert!(!engine
        .ledger()
        .attachment(attachment.id)
        .await
        .unwrap()
        .is_signed);

    // Signing twice is denied, never duplicated.
    let outcome = engine
        .sign(
            attachment.id,
            person_pfx(),
            FIXTURE_PASSWORD.into(),
            Party::user(user1),
            metadata("Maria Oliveira Santos"),
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SignOutcome::Denied(DenialReason::AlreadySignedByYou)
    ));
    assert_eq!(engine.ledger().records_for(attachment.id).await.len(), 1);

    // Second signer completes the chain.
    let outcome = engine
        .sign(
            attachment.id,
            company_pfx(),
            FIXTURE_PASSWORD.into(),
            Party::user(user2),
            metadata("Acme Servicos"),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SignOutcome::Signed(_)));

    let after = engine.ledger().attachment(attachment.id).await.unwrap();
    assert!(after.is_signed);
    assert!(after.signed_location.is_some());

    // The stored derivative carries both records and verifies clean.
    let report = engine.verify(attachment.id).await.unwrap();
    assert!(report.is_valid);
    assert_eq!(report.embedded_records.len(), 2);

    // Fully signed: everyone is denied now.
    let outcome = engine
        .sign(
            attachment.id,
            person_pfx(),
            FIXTURE_PASSWORD.into(),
            Party::user(user1),
            metadata("Maria Oliveira Santos"),
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SignOutcome::Denied(DenialReason::AlreadySigned)
    ));
}

#[tokio::test]
async fn bad_password_surfaces_and_records_a_failed_attempt() {
    common::init_tracing();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let engine = SignatureEngine::new(SigningConfig::default(), Arc::clone(&store));

    let step = Uuid::new_v4();
    let mut attachment = attachment(step);
    attachment.storage_location = store.write(minimal_pdf()).await.unwrap();

    let user = Uuid::new_v4();
    engine
        .register_requirements(
            step,
            vec![requirement(
                step,
                Some(attachment.id),
                ResponsibleParty::User(user),
                1,
                SigningMode::Sequential,
            )],
        )
        .await;
    engine.register_attachment(attachment.clone()).await;

    let result = engine
        .sign(
            attachment.id,
            person_pfx(),
            "wrong".into(),
            Party::user(user),
            metadata("Maria Oliveira Santos"),
        )
        .await;
    assert!(matches!(
        result,
        Err(Error::Certificate(CertificateError::BadPassword))
    ));

    // The attempt is on the ledger as FAILED and does not close the chain.
    let records = engine.ledger().records_for(attachment.id).await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_completed());
    assert!(!engine
        .ledger()
        .attachment(attachment.id)
        .await
        .unwrap()
        .is_signed);

    // A correct retry still goes through.
    let outcome = engine
        .sign(
            attachment.id,
            person_pfx(),
            FIXTURE_PASSWORD.into(),
            Party::user(user),
            metadata("Maria Oliveira Santos"),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SignOutcome::Signed(_)));
    assert!(engine
        .ledger()
        .attachment(attachment.id)
        .await
        .unwrap()
        .is_signed);
}

// Decoding loads the OpenSSL providers; a signer created after earlier
// decodes have gone out of scope must still be able to fetch SHA-256 and RSA.
#[test]
fn crypto_stays_available_after_prior_decodes_are_dropped() {
    {
        let _warmup = certificate::decode(&person_pfx(), FIXTURE_PASSWORD).unwrap();
    }
    let identity = certificate::decode(&company_pfx(), FIXTURE_PASSWORD).unwrap();
    let signer = DocumentSigner::new(SigningConfig::default());
    let artifact = signer
        .sign(&minimal_pdf(), &identity, &metadata("Acme Servicos"))
        .unwrap();
    assert!(verifier::verify(&artifact.bytes).unwrap().is_valid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_parallel_signers_both_reach_the_final_derivative() {
    common::init_tracing();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let config = SigningConfig {
        max_concurrent: 2,
        ..SigningConfig::default()
    };
    let engine = Arc::new(SignatureEngine::new(config, Arc::clone(&store)));

    let step = Uuid::new_v4();
    let mut attachment = attachment(step);
    attachment.storage_location = store.write(minimal_pdf()).await.unwrap();

    let (user1, user2) = (Uuid::new_v4(), Uuid::new_v4());
    engine
        .register_requirements(
            step,
            vec![
                requirement(
                    step,
                    Some(attachment.id),
                    ResponsibleParty::User(user1),
                    1,
                    SigningMode::Parallel,
                ),
                requirement(
                    step,
                    Some(attachment.id),
                    ResponsibleParty::User(user2),
                    2,
                    SigningMode::Parallel,
                ),
            ],
        )
        .await;
    engine.register_attachment(attachment.clone()).await;

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        let attachment_id = attachment.id;
        async move {
            engine
                .sign(
                    attachment_id,
                    person_pfx(),
                    FIXTURE_PASSWORD.into(),
                    Party::user(user1),
                    metadata("Maria Oliveira Santos"),
                )
                .await
        }
    });
    let second = tokio::spawn({
        let engine = Arc::clone(&engine);
        let attachment_id = attachment.id;
        async move {
            engine
                .sign(
                    attachment_id,
                    company_pfx(),
                    FIXTURE_PASSWORD.into(),
                    Party::user(user2),
                    metadata("Acme Servicos"),
                )
                .await
        }
    });
    assert!(matches!(
        first.await.unwrap().unwrap(),
        SignOutcome::Signed(_)
    ));
    assert!(matches!(
        second.await.unwrap().unwrap(),
        SignOutcome::Signed(_)
    ));

    // Neither signature was lost: the final derivative carries both embedded
    // records and verifies clean.
    let after = engine.ledger().attachment(attachment.id).await.unwrap();
    assert!(after.is_signed);
    let report = engine.verify(attachment.id).await.unwrap();
    assert!(report.is_valid);
    assert_eq!(report.embedded_records.len(), 2);

    // Each record points at its own stored artifact; the attachment points at
    // the one produced last.
    let records = engine.ledger().records_for(attachment.id).await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.artifact_location.is_empty()));
    assert!(records
        .iter()
        .any(|r| Some(r.artifact_location.as_str()) == after.signed_location.as_deref()));
}

#[tokio::test]
async fn timed_out_signing_leaves_no_ledger_entry() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let config = SigningConfig {
        sign_timeout: Duration::ZERO,
        ..SigningConfig::default()
    };
    let engine = SignatureEngine::new(config, Arc::clone(&store));

    let step = Uuid::new_v4();
    let mut attachment = attachment(step);
    attachment.storage_location = store.write(minimal_pdf()).await.unwrap();

    let user = Uuid::new_v4();
    engine
        .register_requirements(
            step,
            vec![requirement(
                step,
                Some(attachment.id),
                ResponsibleParty::User(user),
                1,
                SigningMode::Sequential,
            )],
        )
        .await;
    engine.register_attachment(attachment.clone()).await;

    let result = engine
        .sign(
            attachment.id,
            person_pfx(),
            FIXTURE_PASSWORD.into(),
            Party::user(user),
            metadata("Maria Oliveira Santos"),
        )
        .await;
    assert!(matches!(
        result,
        Err(Error::Signing(SigningError::Timeout(_)))
    ));

    // No artifact was stored, so nothing may reference one.
    assert!(engine.ledger().records_for(attachment.id).await.is_empty());
    let stored = engine.ledger().attachment(attachment.id).await.unwrap();
    assert!(!stored.is_signed);
    assert!(stored.signed_location.is_none());
}

#[tokio::test]
async fn pending_work_reflects_chain_progress() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let engine = SignatureEngine::new(SigningConfig::default(), Arc::clone(&store));

    let step = Uuid::new_v4();
    let mut attachment = attachment(step);
    attachment.storage_location = store.write(minimal_pdf()).await.unwrap();

    let (user1, user2) = (Uuid::new_v4(), Uuid::new_v4());
    engine
        .register_requirements(
            step,
            vec![
                requirement(
                    step,
                    Some(attachment.id),
                    ResponsibleParty::User(user1),
                    1,
                    SigningMode::Sequential,
                ),
                requirement(
                    step,
                    Some(attachment.id),
                    ResponsibleParty::User(user2),
                    2,
                    SigningMode::Sequential,
                ),
            ],
        )
        .await;
    engine.register_attachment(attachment.clone()).await;

    assert_eq!(engine.pending_work(&Party::user(user1)).await.unwrap().len(), 1);
    assert!(engine.pending_work(&Party::user(user2)).await.unwrap().is_empty());

    engine
        .sign(
            attachment.id,
            person_pfx(),
            FIXTURE_PASSWORD.into(),
            Party::user(user1),
            metadata("Maria Oliveira Santos"),
        )
        .await
        .unwrap();

    assert!(engine.pending_work(&Party::user(user1)).await.unwrap().is_empty());
    assert_eq!(engine.pending_work(&Party::user(user2)).await.unwrap().len(), 1);
}
