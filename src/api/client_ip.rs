/// Client IP resolution for webhook payloads
///
/// Candidates are tried in order: `cf-connecting-ip`, `x-client-ip`,
/// `true-client-ip`, each `x-forwarded-for` entry left to right, then the
/// socket peer. The first public, non-reserved address wins. When none
/// qualifies the socket peer is reported as-is.

use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

const SINGLE_VALUE_HEADERS: &[&str] = &["cf-connecting-ip", "x-client-ip", "true-client-ip"];

pub fn resolve_client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<String> {
    let mut candidates: Vec<&str> = Vec::new();

    for name in SINGLE_VALUE_HEADERS {
        if let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) {
            candidates.push(value.trim());
        }
    }
    for value in headers.get_all("x-forwarded-for") {
        if let Ok(list) = value.to_str() {
            candidates.extend(list.split(',').map(str::trim));
        }
    }

    let public = candidates
        .into_iter()
        .filter_map(|c| c.parse::<IpAddr>().ok())
        .chain(remote.map(|r| r.ip()))
        .find(is_public);

    public.or_else(|| remote.map(|r| r.ip())).map(|ip| ip.to_string())
}

pub fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(&v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (64..128).contains(&b);
    let reserved = a >= 240;
    let this_network = a == 0;
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_documentation()
        || shared
        || reserved
        || this_network)
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;
    let documentation = first == 0x2001 && ip.segments()[1] == 0x0db8;
    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local || documentation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn peer(ip: &str) -> Option<SocketAddr> {
        Some(SocketAddr::new(ip.parse().unwrap(), 443))
    }

    #[test]
    fn cdn_header_wins_over_forwarded_for() {
        let h = headers(&[("x-forwarded-for", "8.8.8.8"), ("cf-connecting-ip", "1.1.1.1")]);
        assert_eq!(resolve_client_ip(&h, peer("10.0.0.1")).as_deref(), Some("1.1.1.1"));
    }

    #[test]
    fn skips_private_forwarded_entries() {
        let h = headers(&[("x-forwarded-for", "10.1.2.3, 192.168.0.4, 203.0.114.9, 9.9.9.9")]);
        assert_eq!(resolve_client_ip(&h, peer("127.0.0.1")).as_deref(), Some("203.0.114.9"));
    }

    #[test]
    fn reserved_ranges_are_not_public() {
        for ip in ["100.64.1.1", "240.0.0.1", "192.0.2.7", "169.254.1.1", "::1", "fd00::1", "fe80::1", "::ffff:10.0.0.1"] {
            assert!(!is_public(&ip.parse().unwrap()), "{} should be reserved", ip);
        }
        for ip in ["8.8.8.8", "2606:4700:4700::1111", "::ffff:8.8.4.4"] {
            assert!(is_public(&ip.parse().unwrap()), "{} should be public", ip);
        }
    }

    #[test]
    fn falls_back_to_peer_address() {
        let h = headers(&[("x-client-ip", "not-an-ip"), ("x-forwarded-for", "10.0.0.9")]);
        assert_eq!(resolve_client_ip(&h, peer("172.16.0.5")).as_deref(), Some("172.16.0.5"));
        assert_eq!(resolve_client_ip(&h, None), None);
    }
}
