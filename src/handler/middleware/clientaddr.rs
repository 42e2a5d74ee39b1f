use axum::http::HeaderMap;
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

const FORWARDED_HEADERS: [&str; 4] = [
    "x-client-ip",
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
];

/// Best-effort address of the client behind any reverse proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr {
    pub addr: SocketAddr,
}

impl ClientAddr {
    pub fn new(addr: SocketAddr) -> Self {
        ClientAddr { addr }
    }

    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn from_headers(headers: &HeaderMap, connect_info: Option<SocketAddr>) -> Self {
        let mut addr = connect_info
            .unwrap_or_else(|| SocketAddr::from((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)));

        for header in FORWARDED_HEADERS {
            let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) else {
                continue;
            };
            // X-Forwarded-For may carry a chain, the first entry is the client
            let first = value.split(',').next().unwrap_or(value).trim();
            if let Ok(ip) = first.parse::<IpAddr>() {
                addr.set_ip(ip);
                break;
            }
        }
        ClientAddr { addr }
    }
}

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}
