//! Syntax checks a route must pass before it can win a key.

use edgeward_core::{MAX_BACKEND_WEIGHT, Route};

use crate::error::RouteRejection;

/// Run every non-TLS check against a route.
pub fn admit(route: &Route) -> Result<(), RouteRejection> {
    validate_name("namespace", &route.namespace)?;
    validate_name("name", &route.name)?;
    validate_host(&route.host)?;
    validate_path(&route.path)?;
    for backend in route.backends() {
        if backend.name.trim().is_empty() {
            return Err(RouteRejection::MissingService);
        }
        validate_name("service", &backend.name)?;
        if backend.weight > MAX_BACKEND_WEIGHT {
            return Err(RouteRejection::InvalidWeight {
                weight: backend.weight,
            });
        }
    }
    Ok(())
}

/// DNS-1123 label: lowercase alphanumerics and hyphens, at most 63
/// characters, starting and ending with an alphanumeric. Identities end up
/// in file names and config keys, so nothing else is accepted.
pub fn validate_name(field: &'static str, value: &str) -> Result<(), RouteRejection> {
    let invalid = |detail: String| RouteRejection::InvalidName {
        field,
        value: value.to_string(),
        detail,
    };

    if value.is_empty() {
        return Err(invalid("cannot be empty".to_string()));
    }
    if value.len() > 63 {
        return Err(invalid("exceeds 63 characters".to_string()));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(invalid("cannot start or end with '-'".to_string()));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
    {
        return Err(invalid(format!("invalid character {c:?}")));
    }
    Ok(())
}

/// DNS-1123 subdomain: lowercase labels of alphanumerics and hyphens, at
/// most 253 characters. Wildcards are expressed through the route's
/// wildcard policy, never in the host itself.
pub fn validate_host(host: &str) -> Result<(), RouteRejection> {
    let invalid = |detail: String| RouteRejection::InvalidHost {
        host: host.to_string(),
        detail,
    };

    if host.is_empty() {
        return Err(invalid("host cannot be empty".to_string()));
    }
    if host.len() > 253 {
        return Err(invalid("host exceeds 253 characters".to_string()));
    }

    for label in host.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label".to_string()));
        }
        if label.len() > 63 {
            return Err(invalid(format!("label {label:?} exceeds 63 characters")));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid(format!("label {label:?} cannot start or end with '-'")));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
        {
            return Err(invalid(format!("invalid character {c:?}")));
        }
    }

    Ok(())
}

/// Empty, or an absolute path without whitespace.
pub fn validate_path(path: &str) -> Result<(), RouteRejection> {
    if path.is_empty() {
        return Ok(());
    }

    let invalid = |detail: &str| RouteRejection::InvalidPath {
        path: path.to_string(),
        detail: detail.to_string(),
    };

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("cannot contain whitespace"));
    }
    if path.contains(['?', '#']) {
        return Err(invalid("cannot contain a query or fragment"));
    }

    Ok(())
}
