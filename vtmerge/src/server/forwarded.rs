//! Public address resolution behind reverse proxies.
//!
//! Only the first element of a `Forwarded` header (RFC 7239) is considered:
//! it describes the client-facing hop.

use axum::http::header::{FORWARDED, HOST};
use axum::http::HeaderMap;

/// Client-facing address of the gateway for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAddress {
    pub proto: String,
    /// Host name, without port.
    pub host: String,
    pub port: Option<String>,
}

impl PublicAddress {
    /// Resolves the address from `Forwarded`, falling back to `Host`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let forwarded = first_forwarded(headers);
        let find = |key: &str| {
            forwarded
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.clone())
        };

        let (host_header, host_port) = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(split_port)
            .unwrap_or((None, None));

        let (forwarded_host, forwarded_port) = find("host")
            .map(|h| split_port(&h))
            .unwrap_or((None, None));

        let host = forwarded_host.or(host_header)?;
        let port = find("port").or(forwarded_port).or(host_port);
        let proto = find("proto").unwrap_or_else(|| "http".to_string());

        Some(Self { proto, host, port })
    }

    /// Base URL, with `host_prefix` prepended to the host name.
    pub fn url(&self, host_prefix: &str) -> String {
        match &self.port {
            Some(port) => format!("{}://{}{}:{}", self.proto, host_prefix, self.host, port),
            None => format!("{}://{}{}", self.proto, host_prefix, self.host),
        }
    }
}

/// Host used to select datasets: the forwarded host if any, else `Host`.
pub fn public_host(headers: &HeaderMap) -> Option<String> {
    PublicAddress::from_headers(headers).map(|a| a.host)
}

fn first_forwarded(headers: &HeaderMap) -> Vec<(String, String)> {
    let Some(value) = headers.get(FORWARDED).and_then(|v| v.to_str().ok()) else {
        return Vec::new();
    };
    value
        .split(',')
        .next()
        .unwrap_or("")
        .split(';')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Splits `host[:port]`. Bracketed IPv6 literals keep their brackets.
fn split_port(value: &str) -> (Option<String>, Option<String>) {
    let value = value.trim();
    if value.is_empty() {
        return (None, None);
    }
    let (host, port) = match value.rfind(':') {
        Some(i) if !value[i..].contains(']') => (&value[..i], Some(value[i + 1..].to_string())),
        _ => (value, None),
    };
    (Some(host.to_string()), port.filter(|p| !p.is_empty()))
}
