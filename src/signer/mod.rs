//! Document signing: visible signature blocks plus an embedded,
//! machine-recoverable signature manifest.

pub mod document_signer;
pub mod manifest;

pub use document_signer::{DocumentSigner, SignedArtifact};
pub use manifest::EmbeddedSignature;
