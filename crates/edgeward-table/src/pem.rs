//! PEM material checks.
//!
//! A route only carries certificate material the proxy can load: every
//! supplied block must decode to well-formed DER, and a serving key must
//! belong to its certificate.

use rustls::RootCertStore;
use rustls::crypto::ring::sign::any_supported_type;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;

use crate::error::RouteRejection;

/// Decode one or more certificates. Each must parse as X.509.
pub fn certificates(
    field: &'static str,
    pem: &str,
) -> Result<Vec<CertificateDer<'static>>, RouteRejection> {
    let invalid = |detail: String| RouteRejection::InvalidCertificate { field, detail };

    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(e.to_string()))?;
    if certs.is_empty() {
        return Err(invalid("no PEM certificate found".to_string()));
    }

    let mut store = RootCertStore::empty();
    for cert in &certs {
        store
            .add(cert.clone())
            .map_err(|e| invalid(e.to_string()))?;
    }
    Ok(certs)
}

pub fn private_key(pem: &str) -> Result<PrivateKeyDer<'static>, RouteRejection> {
    let invalid = |detail: String| RouteRejection::InvalidCertificate {
        field: "key",
        detail,
    };

    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| invalid(e.to_string()))?
        .ok_or_else(|| invalid("no PEM private key found".to_string()))
}

/// Check that `key` is the private half of the first certificate in
/// `certificate`.
pub fn key_pair(certificate: &str, key: &str) -> Result<(), RouteRejection> {
    let chain = certificates("certificate", certificate)?;
    let der = private_key(key)?;
    let signing_key = any_supported_type(&der).map_err(|e| RouteRejection::InvalidCertificate {
        field: "key",
        detail: e.to_string(),
    })?;

    match CertifiedKey::new(chain, signing_key).keys_match() {
        Ok(()) => Ok(()),
        Err(rustls::Error::InconsistentKeys(_)) => Err(RouteRejection::KeyMismatch),
        Err(e) => Err(RouteRejection::InvalidCertificate {
            field: "certificate",
            detail: e.to_string(),
        }),
    }
}
