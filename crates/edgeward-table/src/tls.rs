//! TLS termination policy.
//!
//! Each route is in one of four modes, derived from its `tls` block on
//! every upsert. Validation runs on every transition; a route that fails
//! it is rejected and can never be the active route for its key. Any PEM
//! block a route supplies must decode, whether or not its mode uses it.

use std::path::PathBuf;

use edgeward_core::config::{MissingDestinationCa, TlsSettings};
use edgeward_core::key::normalize_path;
use edgeward_core::{InsecurePolicy, Route, Termination, TlsConfig};
use serde::Serialize;
use tracing::debug;

use crate::error::RouteRejection;
use crate::pem;

/// Termination state of a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    #[default]
    None,
    Edge,
    Reencrypt,
    Passthrough,
}

impl From<Option<Termination>> for TlsMode {
    fn from(value: Option<Termination>) -> Self {
        match value {
            None => TlsMode::None,
            Some(Termination::Edge) => TlsMode::Edge,
            Some(Termination::Reencrypt) => TlsMode::Reencrypt,
            Some(Termination::Passthrough) => TlsMode::Passthrough,
        }
    }
}

/// PEM material the proxy terminates with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMaterial {
    pub certificate: String,
    pub key: String,
    pub ca_certificate: Option<String>,
}

/// How a reencrypt route verifies its backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationVerification {
    /// Not a reencrypt route.
    NotApplicable,
    /// The route supplied its own CA.
    RouteCa(String),
    /// The router-wide CA bundle, verifying the service hostname.
    DefaultCa { path: PathBuf },
    /// No CA anywhere; the renderer decides.
    RendererDefault,
}

/// Validated TLS state of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    pub mode: TlsMode,
    pub insecure_policy: InsecurePolicy,
    pub certificate: Option<CertificateMaterial>,
    pub destination: DestinationVerification,
}

impl TlsPolicy {
    pub fn plain() -> Self {
        Self {
            mode: TlsMode::None,
            insecure_policy: InsecurePolicy::None,
            certificate: None,
            destination: DestinationVerification::NotApplicable,
        }
    }
}

/// Derives and validates [`TlsPolicy`] values.
#[derive(Debug, Clone, Default)]
pub struct TlsResolver {
    settings: TlsSettings,
}

impl TlsResolver {
    pub fn new(settings: TlsSettings) -> Self {
        Self { settings }
    }

    /// Resolve the policy for an update of a route previously in `previous`.
    pub fn transition(
        &self,
        previous: Option<TlsMode>,
        route: &Route,
    ) -> Result<TlsPolicy, RouteRejection> {
        let policy = self.resolve(route)?;
        if let Some(previous) = previous
            && previous != policy.mode
        {
            debug!(
                route = %route.id(),
                from = ?previous,
                to = ?policy.mode,
                "tls mode changed"
            );
        }
        Ok(policy)
    }

    pub fn resolve(&self, route: &Route) -> Result<TlsPolicy, RouteRejection> {
        let Some(tls) = &route.tls else {
            return Ok(TlsPolicy::plain());
        };
        decodable_material(tls)?;

        match tls.termination {
            Termination::Edge => Ok(TlsPolicy {
                mode: TlsMode::Edge,
                insecure_policy: tls.insecure_edge_termination_policy,
                certificate: Some(required_material(tls)?),
                destination: DestinationVerification::NotApplicable,
            }),
            Termination::Reencrypt => Ok(TlsPolicy {
                mode: TlsMode::Reencrypt,
                insecure_policy: tls.insecure_edge_termination_policy,
                certificate: Some(required_material(tls)?),
                destination: self.destination(tls)?,
            }),
            Termination::Passthrough => {
                if !normalize_path(&route.path).is_empty() {
                    return Err(RouteRejection::PassthroughWithPath {
                        path: route.path.clone(),
                    });
                }
                if tls.insecure_edge_termination_policy == InsecurePolicy::Allow {
                    return Err(RouteRejection::PassthroughInsecureAllow);
                }
                if !tls.certificate.is_empty() || !tls.key.is_empty() {
                    debug!(route = %route.id(), "ignoring certificate material on passthrough route");
                }
                Ok(TlsPolicy {
                    mode: TlsMode::Passthrough,
                    insecure_policy: tls.insecure_edge_termination_policy,
                    certificate: None,
                    destination: DestinationVerification::NotApplicable,
                })
            }
        }
    }

    fn destination(&self, tls: &TlsConfig) -> Result<DestinationVerification, RouteRejection> {
        if !tls.destination_ca_certificate.trim().is_empty() {
            return Ok(DestinationVerification::RouteCa(
                tls.destination_ca_certificate.clone(),
            ));
        }
        if let Some(path) = &self.settings.default_destination_ca_path {
            return Ok(DestinationVerification::DefaultCa { path: path.clone() });
        }
        match self.settings.missing_destination_ca {
            MissingDestinationCa::Defer => Ok(DestinationVerification::RendererDefault),
            MissingDestinationCa::Reject => Err(RouteRejection::MissingDestinationCa),
        }
    }
}

fn decodable_material(tls: &TlsConfig) -> Result<(), RouteRejection> {
    if !tls.certificate.trim().is_empty() {
        pem::certificates("certificate", &tls.certificate)?;
    }
    if !tls.key.trim().is_empty() {
        pem::private_key(&tls.key)?;
    }
    if !tls.ca_certificate.trim().is_empty() {
        pem::certificates("ca_certificate", &tls.ca_certificate)?;
    }
    if !tls.destination_ca_certificate.trim().is_empty() {
        pem::certificates("destination_ca_certificate", &tls.destination_ca_certificate)?;
    }
    Ok(())
}

fn required_material(tls: &TlsConfig) -> Result<CertificateMaterial, RouteRejection> {
    if tls.certificate.trim().is_empty() || tls.key.trim().is_empty() {
        return Err(RouteRejection::MissingCertificate {
            termination: tls.termination,
        });
    }
    pem::key_pair(&tls.certificate, &tls.key)?;
    Ok(CertificateMaterial {
        certificate: tls.certificate.clone(),
        key: tls.key.clone(),
        ca_certificate: (!tls.ca_certificate.trim().is_empty()).then(|| tls.ca_certificate.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pem::fixtures::self_signed;
    use edgeward_core::BackendRef;

    fn route_with(tls: Option<TlsConfig>, path: &str) -> Route {
        Route {
            namespace: "ns".to_string(),
            name: "secure".to_string(),
            host: "secure.example.com".to_string(),
            path: path.to_string(),
            to: BackendRef::new("svc"),
            alternate_backends: Vec::new(),
            port: None,
            tls,
            wildcard_policy: Default::default(),
            creation_timestamp: 0,
        }
    }

    fn with_material(termination: Termination) -> TlsConfig {
        let (certificate, key) = self_signed("secure.example.com");
        let mut tls = TlsConfig::new(termination);
        tls.certificate = certificate;
        tls.key = key;
        tls
    }

    fn ca() -> String {
        self_signed("ca.example.com").0
    }

    #[test]
    fn no_tls_block_is_plain() {
        let policy = TlsResolver::default().resolve(&route_with(None, "/x")).unwrap();
        assert_eq!(policy, TlsPolicy::plain());
    }

    #[test]
    fn edge_requires_certificate_and_key() {
        let resolver = TlsResolver::default();
        let err = resolver
            .resolve(&route_with(Some(TlsConfig::new(Termination::Edge)), ""))
            .unwrap_err();
        assert_eq!(
            err,
            RouteRejection::MissingCertificate {
                termination: Termination::Edge
            }
        );

        let mut tls = with_material(Termination::Edge);
        tls.insecure_edge_termination_policy = InsecurePolicy::Redirect;
        let policy = resolver.resolve(&route_with(Some(tls), "/app")).unwrap();
        assert_eq!(policy.mode, TlsMode::Edge);
        assert_eq!(policy.insecure_policy, InsecurePolicy::Redirect);
        assert!(policy.certificate.unwrap().ca_certificate.is_none());
    }

    #[test]
    fn reencrypt_uses_route_ca_first() {
        let resolver = TlsResolver::new(TlsSettings {
            missing_destination_ca: MissingDestinationCa::Reject,
            default_destination_ca_path: Some(PathBuf::from("/etc/ca.crt")),
        });
        let dest_ca = ca();
        let mut tls = with_material(Termination::Reencrypt);
        tls.destination_ca_certificate = dest_ca.clone();
        let policy = resolver.resolve(&route_with(Some(tls), "")).unwrap();
        assert_eq!(policy.destination, DestinationVerification::RouteCa(dest_ca));
    }

    #[test]
    fn reencrypt_falls_back_to_default_ca() {
        let resolver = TlsResolver::new(TlsSettings {
            missing_destination_ca: MissingDestinationCa::Reject,
            default_destination_ca_path: Some(PathBuf::from("/etc/ca.crt")),
        });
        let policy = resolver
            .resolve(&route_with(Some(with_material(Termination::Reencrypt)), ""))
            .unwrap();
        assert_eq!(
            policy.destination,
            DestinationVerification::DefaultCa {
                path: PathBuf::from("/etc/ca.crt")
            }
        );
    }

    #[test]
    fn reencrypt_without_ca_follows_policy() {
        let route = route_with(Some(with_material(Termination::Reencrypt)), "");

        let deferring = TlsResolver::default();
        assert_eq!(
            deferring.resolve(&route).unwrap().destination,
            DestinationVerification::RendererDefault
        );

        let strict = TlsResolver::new(TlsSettings {
            missing_destination_ca: MissingDestinationCa::Reject,
            default_destination_ca_path: None,
        });
        assert_eq!(
            strict.resolve(&route).unwrap_err(),
            RouteRejection::MissingDestinationCa
        );
    }

    #[test]
    fn passthrough_rejects_path() {
        let err = TlsResolver::default()
            .resolve(&route_with(Some(TlsConfig::new(Termination::Passthrough)), "/test"))
            .unwrap_err();
        assert!(matches!(err, RouteRejection::PassthroughWithPath { .. }));
    }

    #[test]
    fn passthrough_rejects_insecure_allow() {
        let mut tls = TlsConfig::new(Termination::Passthrough);
        tls.insecure_edge_termination_policy = InsecurePolicy::Allow;
        let err = TlsResolver::default()
            .resolve(&route_with(Some(tls), ""))
            .unwrap_err();
        assert_eq!(err, RouteRejection::PassthroughInsecureAllow);
    }

    #[test]
    fn passthrough_strips_material() {
        let policy = TlsResolver::default()
            .resolve(&route_with(Some(with_material(Termination::Passthrough)), ""))
            .unwrap();
        assert_eq!(policy.mode, TlsMode::Passthrough);
        assert!(policy.certificate.is_none());
    }

    #[test]
    fn transition_revalidates() {
        let resolver = TlsResolver::default();
        let edge = route_with(Some(with_material(Termination::Edge)), "/test");
        let policy = resolver.transition(None, &edge).unwrap();

        let mut passthrough = edge.clone();
        passthrough.tls = Some(TlsConfig::new(Termination::Passthrough));
        assert!(resolver.transition(Some(policy.mode), &passthrough).is_err());
    }

    #[test]
    fn pem_validation_cases() {
        let resolver = TlsResolver::default();
        let (cert, key) = self_signed("www.example.com");
        let (_, other_key) = self_signed("www.example.com");
        let good_ca = ca();

        let tls = |termination, certificate: &str, key: &str, ca: &str, dest: &str| {
            let mut tls = TlsConfig::new(termination);
            tls.certificate = certificate.to_string();
            tls.key = key.to_string();
            tls.ca_certificate = ca.to_string();
            tls.destination_ca_certificate = dest.to_string();
            tls
        };

        let cases = [
            ("reencrypt with certs", tls(Termination::Reencrypt, &cert, &key, &good_ca, &good_ca), true),
            ("reencrypt with bad config", tls(Termination::Reencrypt, "def", "ghi", "jkl", "abc"), false),
            ("reencrypt bad dest cert without certs", tls(Termination::Reencrypt, "", "", "", "abc"), false),
            ("edge with certs", tls(Termination::Edge, &cert, &key, &good_ca, ""), true),
            ("edge bad config", tls(Termination::Edge, "abc", "abc", "abc", ""), false),
            ("edge mismatched key and cert", tls(Termination::Edge, &cert, &other_key, &good_ca, ""), false),
            ("edge bad dest cert", tls(Termination::Edge, &cert, &key, "", "abc"), false),
            ("edge bad ca", tls(Termination::Edge, &cert, &key, "abc", ""), false),
            ("passthrough", tls(Termination::Passthrough, "", "", "", ""), true),
            ("passthrough bad cert", tls(Termination::Passthrough, "test", "", "", ""), false),
            ("passthrough bad key", tls(Termination::Passthrough, "", "test", "", ""), false),
            ("passthrough bad ca", tls(Termination::Passthrough, "", "", "test", ""), false),
            ("passthrough bad dest ca", tls(Termination::Passthrough, "", "", "", "test"), false),
            ("double escaped newlines", tls(Termination::Reencrypt, "d\\nef", "g\\nhi", "j\\nkl", "j\\nkl"), false),
        ];

        for (name, config, admitted) in cases {
            let result = resolver.resolve(&route_with(Some(config), ""));
            assert_eq!(result.is_ok(), admitted, "{name}: {result:?}");
        }
    }

    #[test]
    fn mismatched_key_is_reported() {
        let (cert, _) = self_signed("www.example.com");
        let (_, other_key) = self_signed("www.example.com");
        let mut tls = TlsConfig::new(Termination::Edge);
        tls.certificate = cert;
        tls.key = other_key;
        assert_eq!(
            TlsResolver::default().resolve(&route_with(Some(tls), "")).unwrap_err(),
            RouteRejection::KeyMismatch
        );
    }
}
