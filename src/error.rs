//! Error types for the signature workflow engine.
//!
//! Eligibility denials are deliberately NOT part of this taxonomy: a party
//! being ineligible to sign is normal control flow, carried by
//! [`crate::types::Eligibility`], never by an `Err`.

use std::{io, result::Result as StdResult};

use thiserror::Error;

/// Custom result type for signature workflow operations
pub type Result<T> = StdResult<T, Error>;

/// Core error type for the signature workflow engine
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// -------------------- Sub-Error Categories --------------------

/// Failures while decoding or temporally validating a PKCS#12 bundle
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CertificateError {
    #[error("PKCS#12 container could not be unwrapped with the given password")]
    BadPassword,

    #[error("PKCS#12 container holds no leaf certificate")]
    MissingCertificate,

    #[error("PKCS#12 container holds no private key")]
    MissingPrivateKey,

    #[error("Certificate expired at {0}")]
    Expired(chrono::DateTime<chrono::Utc>),

    #[error("Certificate is not valid before {0}")]
    NotYetValid(chrono::DateTime<chrono::Utc>),

    #[error("Malformed certificate: {0}")]
    Malformed(String),
}

/// Failures while reading or parsing a source document
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DocumentError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document is corrupt: {0}")]
    Corrupt(String),
}

/// Failures of the cryptographic signing step itself
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SigningError {
    #[error("Cryptographic primitive failed: {0}")]
    CryptoFailure(String),

    #[error("Signing did not complete within {0:?}")]
    Timeout(std::time::Duration),
}

/// Malformed input to the eligibility resolver
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ResolverError {
    #[error("Requirement group for attachment mixes SEQUENTIAL and PARALLEL modes")]
    MixedModes,

    #[error("Duplicate order {0} in a SEQUENTIAL requirement group")]
    DuplicateOrder(i32),
}

/// Ledger consistency violations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("Unknown attachment: {0}")]
    UnknownAttachment(uuid::Uuid),

    #[error("Unknown requirement: {0}")]
    UnknownRequirement(uuid::Uuid),

    #[error("A COMPLETED record already exists for this requirement, signer and attachment")]
    DuplicateCompletion,
}
