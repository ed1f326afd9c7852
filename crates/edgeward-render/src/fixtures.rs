use rcgen::{CertificateParams, KeyPair};

/// Self-signed certificate and PKCS#8 key for `host`.
pub fn self_signed(host: &str) -> (String, String) {
    let key = KeyPair::generate().unwrap();
    let cert = CertificateParams::new(vec![host.to_string()])
        .unwrap()
        .self_signed(&key)
        .unwrap();
    (cert.pem(), key.serialize_pem())
}
