//! Master URL Resolution
//!
//! Turns the configured master strings into `MasterAddress` candidates. Accepted
//! forms are `host:port`, `cluster://host:port` and `http://host:port`; a single
//! entry may list several masters separated by commas
//! (`cluster://m1:7077,m2:7077`). Order and duplicates are preserved.
//! IPv6 hosts are bracketed: `[::1]:7077`.

use super::types::MasterAddress;
use crate::error::{ClientError, Result};

use std::net::Ipv6Addr;

const SCHEMES: [&str; 2] = ["cluster://", "http://"];

pub fn resolve_masters(urls: &[String]) -> Result<Vec<MasterAddress>> {
    if urls.is_empty() {
        return Err(ClientError::NoMasters);
    }

    let mut masters = Vec::with_capacity(urls.len());
    for url in urls {
        let rest = strip_scheme(url.trim());
        for part in rest.split(',') {
            masters.push(parse_host_port(url, part.trim())?);
        }
    }

    Ok(masters)
}

fn strip_scheme(url: &str) -> &str {
    SCHEMES
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .unwrap_or(url)
}

fn parse_host_port(original: &str, part: &str) -> Result<MasterAddress> {
    let invalid = |reason: &str| ClientError::InvalidMasterUrl {
        url: original.to_string(),
        reason: reason.to_string(),
    };

    // later entries of a comma list may repeat the scheme
    let part = strip_scheme(part);

    if part.is_empty() {
        return Err(invalid("empty address"));
    }
    if part.contains('/') {
        return Err(invalid("unexpected path component"));
    }

    let (host, port) = match part.strip_prefix('[') {
        Some(bracketed) => {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unclosed '[' in host"))?;
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(invalid("bracketed host is not an IPv6 address"));
            }
            let port = tail.strip_prefix(':').ok_or_else(|| invalid("missing port"))?;
            (host, port)
        }
        None => {
            let (host, port) = part
                .rsplit_once(':')
                .ok_or_else(|| invalid("missing port"))?;
            if host.contains([':', '[', ']']) {
                return Err(invalid("IPv6 hosts must be written as [addr]:port"));
            }
            (host, port)
        }
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
    if port == 0 {
        return Err(invalid("port must be non-zero"));
    }

    Ok(MasterAddress::new(host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_preserves_order_and_duplicates() {
        let masters = resolve_masters(&urls(&[
            "cluster://b:7077",
            "a:7077",
            "cluster://b:7077",
        ]))
        .unwrap();

        assert_eq!(
            masters,
            vec![
                MasterAddress::new("b", 7077),
                MasterAddress::new("a", 7077),
                MasterAddress::new("b", 7077),
            ]
        );
    }

    #[test]
    fn test_resolve_comma_separated_entry() {
        let masters = resolve_masters(&urls(&["cluster://m1:7077,m2:7078"])).unwrap();

        assert_eq!(masters.len(), 2);
        assert_eq!(masters[1], MasterAddress::new("m2", 7078));
    }

    #[test]
    fn test_resolve_http_scheme() {
        let masters = resolve_masters(&urls(&["http://10.0.0.1:8080"])).unwrap();
        assert_eq!(masters[0].to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn test_resolve_bracketed_ipv6() {
        let masters = resolve_masters(&urls(&["cluster://[::1]:7077,[fe80::2]:7078"])).unwrap();

        assert_eq!(masters[0], MasterAddress::new("::1", 7077));
        assert_eq!(masters[0].to_string(), "[::1]:7077");
        assert_eq!(masters[1].to_string(), "[fe80::2]:7078");

        // the displayed form is what the transport puts into its urls
        let url = format!("http://{}/master/register_application", masters[0]);
        assert_eq!(url, "http://[::1]:7077/master/register_application");
    }

    #[test]
    fn test_resolve_rejects_unbracketed_or_broken_ipv6() {
        for bad in ["a:b:7077", "::1:7077", "[::1:7077", "[::1]7077", "[not-v6]:7077", "[]:7077"] {
            let result = resolve_masters(&urls(&[bad]));
            assert!(
                matches!(result, Err(ClientError::InvalidMasterUrl { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_resolve_rejects_empty_list() {
        assert!(matches!(resolve_masters(&[]), Err(ClientError::NoMasters)));
    }

    #[test]
    fn test_resolve_rejects_malformed_entries() {
        for bad in ["cluster://", "host", "host:abc", ":7077", "host:0", "cluster://h:1/path"] {
            let result = resolve_masters(&urls(&["a:1", bad]));
            assert!(
                matches!(result, Err(ClientError::InvalidMasterUrl { .. })),
                "{} should be rejected",
                bad
            );
        }
    }
}
