//! Certificate value objects.
//!
//! [`CertificateDescriptor`] is the public, serializable face of a decoded
//! certificate. The private key never appears here; it lives in
//! [`crate::certificate::SigningIdentity`], which is scoped to a single
//! signing call and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured view of a decoded leaf certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDescriptor {
    /// Subject distinguished name, rendered as `K=V, K=V`.
    pub subject: String,
    /// Issuer distinguished name, rendered as `K=V, K=V`.
    pub issuer: String,
    /// Serial number, upper-case hex.
    pub serial_number: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Individual taxpayer id (ICP-Brasil OID 2.16.76.1.3.1), 11 digits.
    pub cpf: Option<String>,
    /// Corporate taxpayer id (ICP-Brasil OID 2.16.76.1.3.3), 14 digits.
    pub cnpj: Option<String>,
    /// Subject public key, PEM.
    pub public_key_pem: String,
    /// SHA-256 over the certificate DER, hex.
    pub fingerprint: String,
}

impl CertificateDescriptor {
    /// The holder's taxpayer id, preferring the individual one.
    pub fn tax_id(&self) -> Option<&str> {
        self.cpf.as_deref().or(self.cnpj.as_deref())
    }
}
