//! Produces signed PDF derivatives.
//!
//! Each call appends one visible signature block to the last page, records
//! the signature in the embedded manifest and returns a brand-new byte
//! buffer. The source bytes are never modified; prior signature blocks and
//! manifest records are preserved verbatim.

use chrono::{SecondsFormat, Utc};
use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat,
};
use openssl::{hash::MessageDigest, sign::Signer};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    certificate::SigningIdentity,
    config::SigningConfig,
    error::{DocumentError, Result, SigningError},
    signer::manifest::{self, EmbeddedSignature, DIGEST_HEX_LEN, SIGNATURE_ALGORITHM},
    types::SignerMetadata,
};

/// Resource name of the font the visible blocks are set in.
const FONT_RES_NAME: &str = "SigHelv";

/// Output of one signing call.
pub struct SignedArtifact {
    /// The signed derivative. Exactly one new stored object per call.
    pub bytes: Vec<u8>,
    /// SHA-256 over the masked byte stream, hex. Audit value.
    pub digest: String,
    pub algorithm: String,
    /// SHA-256 over the signer's certificate DER, hex.
    pub certificate_fingerprint: String,
    /// The manifest record as embedded, with final field values.
    pub record: EmbeddedSignature,
}

pub struct DocumentSigner {
    config: SigningConfig,
}

impl DocumentSigner {
    pub fn new(config: SigningConfig) -> Self {
        Self { config }
    }

    /// Signs a document. The visible block lands at the position after any
    /// previously embedded signatures.
    pub fn sign(
        &self,
        source: &[u8],
        identity: &SigningIdentity,
        metadata: &SignerMetadata,
    ) -> Result<SignedArtifact> {
        self.sign_at(source, identity, metadata, None)
    }

    /// Signs a document that already carries prior parties' signatures.
    /// Identical cryptographic contract; only the visual placement follows
    /// `position_index`.
    pub fn add_sequential_signature(
        &self,
        source: &[u8],
        identity: &SigningIdentity,
        metadata: &SignerMetadata,
        position_index: usize,
    ) -> Result<SignedArtifact> {
        self.sign_at(source, identity, metadata, Some(position_index))
    }

    fn sign_at(
        &self,
        source: &[u8],
        identity: &SigningIdentity,
        metadata: &SignerMetadata,
        position: Option<usize>,
    ) -> Result<SignedArtifact> {
        let mut doc = Document::load_mem(source)
            .map_err(|e| DocumentError::Corrupt(format!("unparseable PDF: {e}")))?;

        let mut records = manifest::read_manifest(&doc)?;
        let position = position.unwrap_or(records.len());
        let signed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        self.append_visible_block(&mut doc, identity, metadata, &signed_at, position)?;

        // The new record goes in with fixed-width zero placeholders so the
        // digest can cover the final byte layout (node-signpdf discipline).
        let sig_hex_len = identity.private_key.size() * 2;
        let descriptor = &identity.descriptor;
        let mut record = EmbeddedSignature {
            algorithm: SIGNATURE_ALGORITHM.into(),
            subject: descriptor.subject.clone(),
            issuer: descriptor.issuer.clone(),
            serial_number: descriptor.serial_number.clone(),
            tax_id: descriptor.tax_id().map(str::to_owned),
            signed_at,
            digest: "0".repeat(DIGEST_HEX_LEN),
            signature: "0".repeat(sig_hex_len),
        };
        records.push(record.clone());
        manifest::write_manifest(&mut doc, &records)?;

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| DocumentError::Corrupt(format!("serialization failed: {e}")))?;

        let digest_hex = hex::encode(Sha256::digest(&bytes));
        let signature_hex = rsa_sign_hex(&bytes, identity, sig_hex_len)?;

        let digest_zeros = "0".repeat(DIGEST_HEX_LEN);
        let signature_zeros = "0".repeat(sig_hex_len);
        if !manifest::splice_hex(&mut bytes, "digest", &digest_zeros, &digest_hex)
            || !manifest::splice_hex(&mut bytes, "signature", &signature_zeros, &signature_hex)
        {
            return Err(SigningError::CryptoFailure(
                "signature placeholder not found in serialized document".into(),
            )
            .into());
        }

        record.digest = digest_hex.clone();
        record.signature = signature_hex;

        debug!(
            position,
            digest = %digest_hex,
            subject = %descriptor.subject,
            "produced signed derivative"
        );

        Ok(SignedArtifact {
            bytes,
            digest: digest_hex,
            algorithm: SIGNATURE_ALGORITHM.into(),
            certificate_fingerprint: descriptor.fingerprint.clone(),
            record,
        })
    }

    /// Appends the visible signature block to the last page. A usability
    /// affordance only; it is not part of the cryptographic proof.
    fn append_visible_block(
        &self,
        doc: &mut Document,
        identity: &SigningIdentity,
        metadata: &SignerMetadata,
        signed_at: &str,
        position: usize,
    ) -> Result<()> {
        let page_id = *doc
            .get_pages()
            .values()
            .next_back()
            .ok_or_else(|| DocumentError::Corrupt("document has no pages".into()))?;

        ensure_signature_font(doc, page_id)
            .map_err(|e| DocumentError::Corrupt(format!("font resource: {e}")))?;

        let mut lines = vec![format!(
            "Assinado digitalmente por {}",
            metadata.display_name
        )];
        match identity.descriptor.tax_id() {
            Some(tax_id) => lines.push(format!("CPF/CNPJ {tax_id} - {signed_at}")),
            None => lines.push(signed_at.to_string()),
        }
        let reason = metadata
            .reason
            .clone()
            .or_else(|| self.config.default_reason.clone());
        match (reason, metadata.location.as_deref()) {
            (Some(reason), Some(location)) => lines.push(format!("{reason} - {location}")),
            (Some(reason), None) => lines.push(reason),
            (None, Some(location)) => lines.push(location.to_string()),
            (None, None) => {}
        }

        let x = self.config.block_x;
        let y = self.config.block_base_y + self.config.block_spacing * position as f32;
        let leading = self.config.font_size + 2.0;

        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(FONT_RES_NAME.into()),
                    self.config.font_size.into(),
                ],
            ),
            Operation::new("Td", vec![x.into(), y.into()]),
        ];
        for (index, line) in lines.iter().enumerate() {
            if index > 0 {
                operations.push(Operation::new("Td", vec![0.into(), (-leading).into()]));
            }
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(
                    line.clone().into_bytes(),
                    StringFormat::Literal,
                )],
            ));
        }
        operations.push(Operation::new("ET", vec![]));
        operations.push(Operation::new("Q", vec![]));

        let encoded = Content { operations }
            .encode()
            .map_err(|e| DocumentError::Corrupt(format!("content encoding: {e}")))?;
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| DocumentError::Corrupt(format!("bad page dictionary: {e}")))?;
        match page.get(b"Contents").map(Object::clone) {
            Ok(Object::Reference(prev)) => {
                page.set(
                    "Contents",
                    vec![Object::Reference(prev), Object::Reference(stream_id)],
                );
            }
            Ok(Object::Array(mut streams)) => {
                streams.push(Object::Reference(stream_id));
                page.set("Contents", streams);
            }
            _ => page.set("Contents", Object::Reference(stream_id)),
        }
        Ok(())
    }
}

/// RSA (SHA-256) over the masked byte stream, hex, padded to the fixed
/// placeholder width.
fn rsa_sign_hex(
    bytes: &[u8],
    identity: &SigningIdentity,
    sig_hex_len: usize,
) -> Result<String> {
    let crypto = |e: openssl::error::ErrorStack| SigningError::CryptoFailure(e.to_string());

    let mut signer =
        Signer::new(MessageDigest::sha256(), &identity.private_key).map_err(crypto)?;
    signer.update(bytes).map_err(crypto)?;
    let signature = signer.sign_to_vec().map_err(crypto)?;

    let mut signature_hex = hex::encode(signature);
    if signature_hex.len() > sig_hex_len {
        return Err(SigningError::CryptoFailure(format!(
            "signature wider than its placeholder: {} > {}",
            signature_hex.len(),
            sig_hex_len
        ))
        .into());
    }
    // Non-RSA keys can produce narrower signatures; keep the width fixed.
    signature_hex.push_str(&"0".repeat(sig_hex_len - signature_hex.len()));
    Ok(signature_hex)
}

/// Registers a Helvetica font under [`FONT_RES_NAME`] in the page's resource
/// dictionary, following one level of indirection for both `/Resources` and
/// `/Font`.
fn ensure_signature_font(
    doc: &mut Document,
    page_id: ObjectId,
) -> std::result::Result<(), lopdf::Error> {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    enum Slot {
        FontRef(ObjectId),
        ResourcesRef(ObjectId),
        Page,
    }

    let slot = {
        let page = doc.get_dictionary(page_id)?;
        match page.get(b"Resources") {
            Ok(Object::Reference(resources_id)) => {
                match doc.get_dictionary(*resources_id)?.get(b"Font") {
                    Ok(Object::Reference(font_dict_id)) => Slot::FontRef(*font_dict_id),
                    _ => Slot::ResourcesRef(*resources_id),
                }
            }
            Ok(Object::Dictionary(resources)) => match resources.get(b"Font") {
                Ok(Object::Reference(font_dict_id)) => Slot::FontRef(*font_dict_id),
                _ => Slot::Page,
            },
            _ => Slot::Page,
        }
    };

    match slot {
        Slot::FontRef(font_dict_id) => {
            doc.get_object_mut(font_dict_id)?
                .as_dict_mut()?
                .set(FONT_RES_NAME, Object::Reference(font_id));
        }
        Slot::ResourcesRef(resources_id) => {
            let resources = doc.get_object_mut(resources_id)?.as_dict_mut()?;
            set_font_entry(resources, font_id);
        }
        Slot::Page => {
            let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
            if !matches!(page.get(b"Resources"), Ok(Object::Dictionary(_))) {
                page.set("Resources", Dictionary::new());
            }
            let resources = page.get_mut(b"Resources")?.as_dict_mut()?;
            set_font_entry(resources, font_id);
        }
    }
    Ok(())
}

fn set_font_entry(resources: &mut Dictionary, font_id: ObjectId) {
    if !matches!(resources.get(b"Font"), Ok(Object::Dictionary(_))) {
        resources.set("Font", Dictionary::new());
    }
    if let Ok(fonts) = resources.get_mut(b"Font").and_then(Object::as_dict_mut) {
        fonts.set(FONT_RES_NAME, Object::Reference(font_id));
    }
}
