//! Shared builders for the integration tests.

#![allow(dead_code)]

use chrono::Utc;
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream, StringFormat,
};
use signaflow::{
    Attachment, AttachmentId, Party, RecordStatus, RequirementId, ResponsibleParty,
    SignatureRecord, SignatureRequirement, SignerMetadata, SigningMode, StepDefinitionId, UserId,
};
use uuid::Uuid;

pub const FIXTURE_PASSWORD: &str = "correct-horse";

/// Capture traces emitted during a test; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn person_pfx() -> Vec<u8> {
    std::fs::read(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/person.p12"
    ))
    .expect("person fixture")
}

pub fn company_pfx() -> Vec<u8> {
    std::fs::read(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/company.p12"
    ))
    .expect("company fixture")
}

/// One-page PDF with a single text content stream, built with lopdf so the
/// signer is guaranteed to be able to parse it back.
pub fn minimal_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference(font_id) },
    });

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(
                    b"Processo 2026-0001".to_vec(),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("content encoding"),
    ));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "Contents" => Object::Reference(content_id),
        "Resources" => Object::Reference(resources_id),
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf serialization");
    bytes
}

pub fn requirement(
    step: StepDefinitionId,
    target: Option<AttachmentId>,
    responsible: ResponsibleParty,
    order: i32,
    mode: SigningMode,
) -> SignatureRequirement {
    SignatureRequirement {
        id: Uuid::new_v4(),
        step_definition_id: step,
        target_attachment_id: target,
        responsible,
        order,
        mode,
        is_required: true,
    }
}

pub fn optional(mut requirement: SignatureRequirement) -> SignatureRequirement {
    requirement.is_required = false;
    requirement
}

pub fn attachment(step: StepDefinitionId) -> Attachment {
    Attachment {
        id: Uuid::new_v4(),
        step_execution_id: Uuid::new_v4(),
        step_definition_id: step,
        mime_type: "application/pdf".into(),
        storage_location: Uuid::new_v4().to_string(),
        signed_location: None,
        is_signed: false,
    }
}

pub fn completed(
    requirement_id: RequirementId,
    attachment_id: AttachmentId,
    signer_id: UserId,
) -> SignatureRecord {
    SignatureRecord {
        id: Uuid::new_v4(),
        requirement_id,
        attachment_id,
        signer_id,
        status: RecordStatus::Completed,
        signed_at: Utc::now(),
        signature_hash: "ab".repeat(32),
        certificate_fingerprint: "cd".repeat(32),
        artifact_location: "ef".repeat(32),
    }
}

pub fn solo_party() -> Party {
    Party::user(Uuid::new_v4())
}

pub fn metadata(name: &str) -> SignerMetadata {
    SignerMetadata {
        display_name: name.into(),
        reason: Some("Aprovacao do documento".into()),
        location: None,
    }
}
