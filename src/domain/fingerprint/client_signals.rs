//! Request attributes used to identify an unauthenticated caller.

use std::net::IpAddr;

/// Returned when no header or peer address yields a usable IP.
pub const UNKNOWN_IP: &str = "unknown";

/// Raw network and client attributes lifted off an inbound request.
///
/// The HTTP adapter fills this in; the domain never sees a header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSignals {
    /// Transport-layer peer address.
    pub peer_ip: Option<IpAddr>,
    /// CDN-supplied client address (`CF-Connecting-IP`).
    pub cdn_ip: Option<String>,
    /// Reverse-proxy client address (`X-Real-IP`).
    pub real_ip: Option<String>,
    /// Standard forwarded-for chain (`X-Forwarded-For`).
    pub forwarded_for: Option<String>,
    /// Raw `User-Agent` header.
    pub user_agent: Option<String>,
}

impl ClientSignals {
    /// Signals with only a peer address.
    pub fn from_peer(peer_ip: IpAddr) -> Self {
        Self {
            peer_ip: Some(peer_ip),
            ..Self::default()
        }
    }

    pub fn with_cdn_ip(mut self, value: impl Into<String>) -> Self {
        self.cdn_ip = Some(value.into());
        self
    }

    pub fn with_real_ip(mut self, value: impl Into<String>) -> Self {
        self.real_ip = Some(value.into());
        self
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    pub fn with_user_agent(mut self, value: impl Into<String>) -> Self {
        self.user_agent = Some(value.into());
        self
    }

    /// Resolves the client IP with fixed trust precedence.
    ///
    /// CDN header, then real-IP header, then the leftmost forwarded-for
    /// token, then the peer address. Header values that do not parse as an
    /// IP address are skipped.
    pub fn resolve_ip(&self) -> Option<IpAddr> {
        parse_ip(self.cdn_ip.as_deref())
            .or_else(|| parse_ip(self.real_ip.as_deref()))
            .or_else(|| {
                self.forwarded_for
                    .as_deref()
                    .and_then(|chain| parse_ip(chain.split(',').next()))
            })
            .or(self.peer_ip)
    }

    /// Resolved IP rendered as a string, or [`UNKNOWN_IP`].
    pub fn resolve_ip_string(&self) -> String {
        self.resolve_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_IP.to_string())
    }

    /// Raw user agent, empty when absent.
    pub fn user_agent_str(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("")
    }
}

fn parse_ip(value: Option<&str>) -> Option<IpAddr> {
    value.and_then(|v| v.trim().parse::<IpAddr>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn peer() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    #[test]
    fn cdn_header_wins_over_everything() {
        let signals = ClientSignals::from_peer(peer())
            .with_cdn_ip("203.0.113.7")
            .with_real_ip("198.51.100.2")
            .with_forwarded_for("192.0.2.1");
        assert_eq!(signals.resolve_ip_string(), "203.0.113.7");
    }

    #[test]
    fn real_ip_wins_over_forwarded_for() {
        let signals = ClientSignals::from_peer(peer())
            .with_real_ip("198.51.100.2")
            .with_forwarded_for("192.0.2.1");
        assert_eq!(signals.resolve_ip_string(), "198.51.100.2");
    }

    #[test]
    fn forwarded_for_uses_leftmost_trimmed_token() {
        let signals = ClientSignals::from_peer(peer())
            .with_forwarded_for("  192.0.2.1 , 10.1.1.1, 10.2.2.2");
        assert_eq!(signals.resolve_ip_string(), "192.0.2.1");
    }

    #[test]
    fn invalid_headers_fall_through_to_peer() {
        let signals = ClientSignals::from_peer(peer())
            .with_cdn_ip("not-an-ip")
            .with_real_ip("")
            .with_forwarded_for("garbage, 192.0.2.1");
        assert_eq!(signals.resolve_ip(), Some(peer()));
    }

    #[test]
    fn ipv6_header_is_accepted() {
        let signals = ClientSignals::default().with_cdn_ip("2001:db8::1");
        assert_eq!(signals.resolve_ip_string(), "2001:db8::1");
    }

    #[test]
    fn nothing_resolvable_yields_unknown() {
        let signals = ClientSignals::default().with_forwarded_for("nope");
        assert_eq!(signals.resolve_ip(), None);
        assert_eq!(signals.resolve_ip_string(), UNKNOWN_IP);
    }

    #[test]
    fn missing_user_agent_reads_as_empty() {
        assert_eq!(ClientSignals::default().user_agent_str(), "");
    }
}
