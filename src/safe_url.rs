//! URL parsing and normalization ahead of DNS resolution.

use url::Url;

use crate::Error;

/// A parsed, normalized http(s) URL that has passed the syntactic checks.
///
/// Nothing here touches the network; [`validate`](crate::validate) adds DNS
/// resolution and address classification on top.
#[derive(Debug, Clone)]
pub struct SafeUrl {
    inner: Url,
    host: String,
}

impl SafeUrl {
    /// Parse and normalize a URL string.
    ///
    /// Only `http` and `https` are accepted (case-insensitively). Userinfo is
    /// refused, the host is lowercased and stripped of a trailing dot, and
    /// IPv4 spellings that `url` would silently normalize (octal, decimal,
    /// hexadecimal, short-form) are rejected on the raw input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] on any of the above.
    pub fn parse(input: &str) -> Result<Self, Error> {
        if let Some(raw_host) = raw_host(input) {
            if let Some(reason) = ambiguous_ipv4(raw_host) {
                return Err(Error::invalid_url(input, reason));
            }
        }

        let url = Url::parse(input).map_err(|e| Error::invalid_url(input, e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_url(
                input,
                format!("scheme '{}' not allowed, only http/https", url.scheme()),
            ));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::invalid_url(input, "userinfo (user:pass@) not allowed"));
        }

        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_url(input, "URL must have a host"))?;
        let host = normalize_host(host).map_err(|reason| Error::invalid_url(input, reason))?;

        Ok(Self { inner: url, host })
    }

    /// Normalized hostname; IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, or 80/443 by scheme.
    pub fn port(&self) -> u16 {
        self.inner.port_or_known_default().unwrap_or(80)
    }

    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    pub fn is_https(&self) -> bool {
        self.inner.scheme() == "https"
    }
}

fn normalize_host(host: &str) -> Result<String, &'static str> {
    let mut host = host.to_ascii_lowercase();
    if host.ends_with('.') {
        host.pop();
    }
    if host.is_empty() {
        return Err("empty hostname");
    }
    if let Some(inner) = host.strip_prefix('[') {
        let literal = inner.strip_suffix(']').ok_or("invalid bracketed hostname")?;
        if literal.parse::<std::net::Ipv6Addr>().is_err() {
            return Err("brackets only allowed for IPv6 addresses");
        }
    }
    Ok(host)
}

/// Pull the host out of an http(s) URL without normalizing it.
fn raw_host(input: &str) -> Option<&str> {
    let scheme_end = input.find("://")?;
    if !matches!(
        input[..scheme_end].to_ascii_lowercase().as_str(),
        "http" | "https"
    ) {
        return None;
    }
    let rest = &input[scheme_end + 3..];
    let authority = &rest[..rest.find(['/', '?', '#']).unwrap_or(rest.len())];
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);

    if host_port.starts_with('[') {
        return Some(host_port);
    }
    Some(host_port.rsplit_once(':').map_or(host_port, |(h, _)| h))
}

/// Detect IPv4 spellings that resolve differently from how they read.
fn ambiguous_ipv4(host: &str) -> Option<&'static str> {
    if host.starts_with('[') || host.is_empty() {
        return None;
    }
    let labels: Vec<&str> = host.split('.').collect();
    let numeric = |l: &&str| !l.is_empty() && l.bytes().all(|b| b.is_ascii_digit());

    if labels
        .iter()
        .any(|l| l.len() > 1 && l.as_bytes()[0] == b'0' && matches!(l.as_bytes()[1], b'x' | b'X'))
    {
        return Some("hexadecimal IP encoding not allowed");
    }

    match labels.len() {
        1 if numeric(&labels[0]) => Some("decimal IP encoding not allowed"),
        1 if looks_like_bare_hex(host) => Some("hexadecimal IP encoding not allowed"),
        2 | 3 if labels.iter().all(numeric) => Some("short-form IP encoding not allowed"),
        4 if labels.iter().all(numeric)
            && labels.iter().any(|l| l.len() > 1 && l.starts_with('0')) =>
        {
            Some("octal IP encoding not allowed")
        }
        _ => None,
    }
}

/// `7f000001` and friends: hex digits mixing numbers and letters.
fn looks_like_bare_hex(label: &str) -> bool {
    label.bytes().all(|b| b.is_ascii_hexdigit())
        && label.bytes().any(|b| b.is_ascii_digit())
        && label.bytes().any(|b| b.is_ascii_alphabetic())
}
