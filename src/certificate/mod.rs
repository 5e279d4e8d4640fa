//! PKCS#12 decoding and certificate validation.

pub mod codec;

pub use codec::{decode, validate, SigningIdentity};
