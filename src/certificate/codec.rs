//! PKCS#12 (PFX) decoding into a structured certificate descriptor.
//!
//! Holder identity comes from the ICP-Brasil otherName extensions:
//! `2.16.76.1.3.1` packs birth date + CPF (+ NIS + RG) for natural persons,
//! `2.16.76.1.3.3` carries the 14-digit CNPJ for companies. rust-openssl does
//! not expose otherName general names, so the scan runs over the raw
//! certificate DER; the subject DN `serialNumber` / `CN=Name:digits`
//! conventions are the fallback for certificates without the extensions.

use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use openssl::{
    asn1::{Asn1Time, Asn1TimeRef},
    pkcs12::Pkcs12,
    pkey::{PKey, Private},
    provider::Provider,
    x509::{X509, X509NameRef},
};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{error::CertificateError, types::CertificateDescriptor};

/// DER encoding of OID 2.16.76.1.3.1 (person: birth date + CPF + NIS + RG).
const OID_ICP_PERSON: [u8; 7] = [0x06, 0x05, 0x60, 0x4C, 0x01, 0x03, 0x01];
/// DER encoding of OID 2.16.76.1.3.3 (company: CNPJ).
const OID_ICP_COMPANY: [u8; 7] = [0x06, 0x05, 0x60, 0x4C, 0x01, 0x03, 0x03];

/// A decoded certificate together with its in-memory private key.
///
/// Scoped to a single signing call: the key is never cached, persisted or
/// shared across attempts. Dropping this drops the key material.
pub struct SigningIdentity {
    pub descriptor: CertificateDescriptor,
    pub certificate: X509,
    pub private_key: PKey<Private>,
}

/// Decodes a PKCS#12 container into a [`SigningIdentity`].
///
/// Decode does not imply intent to sign; temporal validity is checked
/// separately by [`validate`].
pub fn decode(pfx_bytes: &[u8], password: &str) -> Result<SigningIdentity, CertificateError> {
    load_providers();

    let pkcs12 = Pkcs12::from_der(pfx_bytes)
        .map_err(|e| CertificateError::Malformed(format!("not a PKCS#12 container: {e}")))?;

    // parse2 fails when the MAC does not verify, i.e. wrong password.
    let parsed = pkcs12
        .parse2(password)
        .map_err(|_| CertificateError::BadPassword)?;

    let certificate = parsed.cert.ok_or(CertificateError::MissingCertificate)?;
    let private_key = parsed.pkey.ok_or(CertificateError::MissingPrivateKey)?;

    let descriptor = describe(&certificate)?;
    debug!(
        subject = %descriptor.subject,
        fingerprint = %descriptor.fingerprint,
        "decoded PKCS#12 bundle"
    );

    Ok(SigningIdentity {
        descriptor,
        certificate,
        private_key,
    })
}

static PROVIDERS: OnceLock<(Option<Provider>, Option<Provider>)> = OnceLock::new();

/// Loads the OpenSSL `legacy` (RC2-era PBE algorithms in older
/// government-issued bundles) and `default` providers once, for the life of
/// the process. On OpenSSL 3.x an explicit provider load disables implicit
/// default activation, and dropping the guard unloads the provider again, so
/// the guards must never be scoped to a single call.
fn load_providers() {
    PROVIDERS.get_or_init(|| {
        (
            Provider::load(None, "legacy").ok(),
            Provider::load(None, "default").ok(),
        )
    });
}

/// Pure temporal check: `valid_from <= now <= valid_to`.
pub fn validate(
    descriptor: &CertificateDescriptor,
    now: DateTime<Utc>,
) -> Result<(), CertificateError> {
    if now < descriptor.valid_from {
        return Err(CertificateError::NotYetValid(descriptor.valid_from));
    }
    if now > descriptor.valid_to {
        return Err(CertificateError::Expired(descriptor.valid_to));
    }
    Ok(())
}

/// Builds the public descriptor from a leaf certificate.
fn describe(cert: &X509) -> Result<CertificateDescriptor, CertificateError> {
    let der = cert
        .to_der()
        .map_err(|e| CertificateError::Malformed(e.to_string()))?;

    let subject = format_name(cert.subject_name());
    let issuer = format_name(cert.issuer_name());

    let serial_number = cert
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
        .map_err(|e| CertificateError::Malformed(format!("bad serial: {e}")))?;

    let valid_from = asn1_to_datetime(cert.not_before())?;
    let valid_to = asn1_to_datetime(cert.not_after())?;

    let public_key_pem = cert
        .public_key()
        .and_then(|k| k.public_key_to_pem())
        .map_err(|e| CertificateError::Malformed(format!("bad public key: {e}")))
        .and_then(|pem| {
            String::from_utf8(pem).map_err(|e| CertificateError::Malformed(e.to_string()))
        })?;

    let fingerprint = hex::encode(Sha256::digest(&der));

    let cpf = scan_other_name(&der, &OID_ICP_PERSON)
        .and_then(|field| extract_tax_digits(&field, 8, 11))
        .or_else(|| subject_fallback(&subject, 11));
    let cnpj = scan_other_name(&der, &OID_ICP_COMPANY)
        .and_then(|field| extract_tax_digits(&field, 0, 14))
        .or_else(|| subject_fallback(&subject, 14));

    Ok(CertificateDescriptor {
        subject,
        issuer,
        serial_number,
        valid_from,
        valid_to,
        cpf,
        cnpj,
        public_key_pem,
        fingerprint,
    })
}

fn format_name(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("UNDEF");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(entry.data().as_slice()).into_owned());
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn asn1_to_datetime(time: &Asn1TimeRef) -> Result<DateTime<Utc>, CertificateError> {
    let epoch =
        Asn1Time::from_unix(0).map_err(|e| CertificateError::Malformed(e.to_string()))?;
    let diff = epoch
        .diff(time)
        .map_err(|e| CertificateError::Malformed(e.to_string()))?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CertificateError::Malformed("certificate validity out of range".into()))
}

/// Finds an otherName value by scanning the DER for the OID byte pattern,
/// then reading the EXPLICIT [0]-wrapped string that follows it.
fn scan_other_name(der: &[u8], oid: &[u8]) -> Option<String> {
    let pos = der.windows(oid.len()).position(|w| w == oid)?;
    let mut i = pos + oid.len();

    if *der.get(i)? != 0xA0 {
        return None;
    }
    i += 1;
    read_der_len(der, &mut i)?;

    // OCTET STRING, UTF8String, PrintableString or IA5String
    let tag = *der.get(i)?;
    if !matches!(tag, 0x04 | 0x0C | 0x13 | 0x16) {
        return None;
    }
    i += 1;
    let len = read_der_len(der, &mut i)?;
    let bytes = der.get(i..i + len)?;
    Some(bytes.iter().map(|b| char::from(*b)).collect())
}

/// Short and two-byte long form lengths; extension values never need more.
fn read_der_len(der: &[u8], i: &mut usize) -> Option<usize> {
    let first = *der.get(*i)?;
    *i += 1;
    match first {
        0x00..=0x7F => Some(first as usize),
        0x81 => {
            let len = *der.get(*i)? as usize;
            *i += 1;
            Some(len)
        }
        0x82 => {
            let hi = *der.get(*i)? as usize;
            let lo = *der.get(*i + 1)? as usize;
            *i += 2;
            Some((hi << 8) | lo)
        }
        _ => None,
    }
}

/// Pulls `count` digits starting at `offset` out of a packed numeric field.
/// An all-zero id means "not informed" on ICP-Brasil certificates.
fn extract_tax_digits(field: &str, offset: usize, count: usize) -> Option<String> {
    let digits: String = field.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < offset + count {
        return None;
    }
    let id = &digits[offset..offset + count];
    if id.bytes().all(|b| b == b'0') {
        None
    } else {
        Some(id.to_string())
    }
}

/// Fallback for certificates without the ICP extensions: a digit run of the
/// expected length in the subject's `serialNumber` attribute or after the
/// `CN=Name:digits` separator.
fn subject_fallback(subject: &str, len: usize) -> Option<String> {
    for part in subject.split(", ") {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let candidate = match key {
            "serialNumber" => value,
            "CN" => value.rsplit_once(':').map(|(_, id)| id).unwrap_or(""),
            _ => continue,
        };
        let trimmed = candidate.trim();
        if trimmed.len() == len && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Some(trimmed.to_string());
        }
    }
    None
}
