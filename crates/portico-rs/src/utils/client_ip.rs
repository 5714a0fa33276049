//! Trusted-proxy-aware client address resolution.
//!
//! When the gateway sits behind known proxies, the true client address lives
//! in `X-Forwarded-For`. Entries are appended left-to-right as the request
//! hops forward, so resolution walks the list from the right, discarding
//! trusted hops until the first address that is not one of ours. Without a
//! trusted-proxy list the direct peer address is authoritative and forwarded
//! headers are ignored.

use actix_web::HttpRequest;
use log::warn;
use std::net::{IpAddr, Ipv4Addr};

/// An allow-list of proxy addresses, as plain IPs or IPv4 CIDR blocks.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    ips: Vec<IpAddr>,
    cidrs: Vec<(Ipv4Addr, u8)>,
}

impl TrustedProxies {
    /// Parses a list of `"10.0.0.1"` / `"10.0.0.0/8"` entries. Unparseable
    /// entries are skipped with a warning rather than failing startup.
    pub fn new(entries: &[String]) -> Self {
        let mut ips = Vec::new();
        let mut cidrs = Vec::new();

        for entry in entries {
            if let Some((addr, prefix)) = entry.split_once('/') {
                match (addr.parse::<Ipv4Addr>(), prefix.parse::<u8>()) {
                    (Ok(addr), Ok(prefix)) if prefix <= 32 => cidrs.push((addr, prefix)),
                    _ => warn!("Ignoring unparseable trusted proxy entry: {}", entry),
                }
            } else {
                match entry.parse::<IpAddr>() {
                    Ok(addr) => ips.push(addr),
                    Err(_) => warn!("Ignoring unparseable trusted proxy entry: {}", entry),
                }
            }
        }

        Self { ips, cidrs }
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.cidrs.is_empty()
    }

    /// Whether the given address belongs to the allow-list.
    pub fn contains(&self, addr: &str) -> bool {
        let Ok(ip) = addr.parse::<IpAddr>() else {
            return false;
        };

        if self.ips.contains(&ip) {
            return true;
        }

        if let IpAddr::V4(v4) = ip {
            let bits = u32::from(v4);
            for (network, prefix) in &self.cidrs {
                let mask = if *prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - prefix)
                };
                if bits & mask == u32::from(*network) & mask {
                    return true;
                }
            }
        }

        false
    }
}

/// Strips the port from a socket address string, handling bracketed IPv6.
fn strip_port(addr: &str) -> &str {
    if let Some(stripped) = addr.strip_prefix('[') {
        return stripped.split(']').next().unwrap_or(addr);
    }
    match addr.rsplit_once(':') {
        // Unbracketed IPv6 has multiple colons and no port to strip.
        Some((host, _)) if !host.contains(':') => host,
        _ => addr,
    }
}

/// Resolves the client IP for the given request.
///
/// With a non-empty trusted-proxy list and a trusted peer, `X-Forwarded-For`
/// is walked from the right until a non-trusted address remains. Otherwise
/// the direct peer address is returned.
pub fn client_ip(req: &HttpRequest, trusted: &TrustedProxies) -> Option<String> {
    let peer = req
        .connection_info()
        .peer_addr()
        .map(strip_port)
        .map(str::to_string)?;

    if trusted.is_empty() || !trusted.contains(&peer) {
        return Some(peer);
    }

    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        for entry in forwarded.rsplit(',') {
            let candidate = entry.trim();
            if candidate.is_empty() {
                continue;
            }
            if !trusted.contains(candidate) {
                return Some(candidate.to_string());
            }
        }
    }

    // Every hop was one of ours; fall back to the peer.
    Some(peer)
}

/// Stable identifier used for hashing and rate-limit keys.
///
/// Falls back to `User-Agent + Accept` when no address is available, which
/// keeps hash-affine strategies deterministic for clients behind opaque
/// transports.
pub fn client_key(req: &HttpRequest, trusted: &TrustedProxies) -> String {
    if let Some(ip) = client_ip(req, trusted) {
        return ip;
    }

    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let accept = req
        .headers()
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    format!("{}{}", user_agent, accept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn parses_ips_and_cidrs() {
        let trusted = TrustedProxies::new(&[
            "10.0.0.1".to_string(),
            "192.168.0.0/16".to_string(),
            "not-an-ip".to_string(),
        ]);
        assert!(trusted.contains("10.0.0.1"));
        assert!(trusted.contains("192.168.4.20"));
        assert!(!trusted.contains("172.16.0.1"));
    }

    #[test]
    fn strips_ports() {
        assert_eq!(strip_port("10.0.0.1:443"), "10.0.0.1");
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("::1"), "::1");
    }

    #[test]
    fn direct_peer_without_trusted_proxies() {
        let req = TestRequest::default()
            .peer_addr("203.0.113.5:4711".parse().unwrap())
            .insert_header(("x-forwarded-for", "198.51.100.9"))
            .to_http_request();

        let trusted = TrustedProxies::default();
        assert_eq!(client_ip(&req, &trusted).as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn walks_forwarded_chain_from_the_right() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.2:4711".parse().unwrap())
            .insert_header(("x-forwarded-for", "198.51.100.9, 10.0.0.3, 10.0.0.4"))
            .to_http_request();

        let trusted = TrustedProxies::new(&["10.0.0.0/8".to_string()]);
        assert_eq!(client_ip(&req, &trusted).as_deref(), Some("198.51.100.9"));
    }

    #[test]
    fn falls_back_to_headers_without_peer() {
        let req = TestRequest::default()
            .insert_header(("user-agent", "curl/8.0"))
            .insert_header(("accept", "*/*"))
            .to_http_request();

        let key = client_key(&req, &TrustedProxies::default());
        assert_eq!(key, "curl/8.0*/*");
    }
}
