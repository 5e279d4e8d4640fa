//! Integrity verification of signed documents.

pub mod document_verifier;

pub use document_verifier::{verify, VerificationIssue, VerificationReport};
