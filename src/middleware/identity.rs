use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use std::fmt;
use std::net::SocketAddr;

const FALLBACK_IDENTITY: &str = "127.0.0.1";

/// Rate-limit bucket key for one client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// First `x-forwarded-for` entry, then `x-real-ip`, then the socket peer.
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> Self {
        if trust_forwarded {
            let forwarded = header_value(headers, "x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            let real_ip = header_value(headers, "x-real-ip").map(str::trim).filter(|v| !v.is_empty());

            if let Some(addr) = forwarded.or(real_ip) {
                return Self(addr.to_string());
            }
        }

        match peer {
            Some(addr) => Self(addr.ip().to_string()),
            None => Self(FALLBACK_IDENTITY.to_string()),
        }
    }

    pub fn from_request(request: &Request, trust_forwarded: bool) -> Self {
        let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
        Self::from_parts(request.headers(), peer, trust_forwarded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
