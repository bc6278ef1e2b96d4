//! DNS blocklist primitives
//!
//! A listed address resolves `<reversed-ip>.<zone>` to `127.0.0.<code>`; an
//! unlisted one has no record.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::ReputationError;

/// Default blocklist zone
pub const DEFAULT_ZONE: &str = "dnsbl.dronebl.org";

/// DroneBL listing classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DnsblResponse {
    AllGood = 0,
    IrcDrone = 3,
    Bottler = 5,
    UnknownSpambotOrDrone = 6,
    DdosDrone = 7,
    SocksProxy = 8,
    HttpProxy = 9,
    ProxyChain = 10,
    OpenProxy = 11,
    OpenDnsResolver = 12,
    BruteForceAttackers = 13,
    OpenWingateProxy = 14,
    CompromisedRouter = 15,
    AutoRootingWorms = 16,
    AutoDetectedBotIp = 17,
    Unknown = 255,
}

impl DnsblResponse {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::AllGood,
            3 => Self::IrcDrone,
            5 => Self::Bottler,
            6 => Self::UnknownSpambotOrDrone,
            7 => Self::DdosDrone,
            8 => Self::SocksProxy,
            9 => Self::HttpProxy,
            10 => Self::ProxyChain,
            11 => Self::OpenProxy,
            12 => Self::OpenDnsResolver,
            13 => Self::BruteForceAttackers,
            14 => Self::OpenWingateProxy,
            15 => Self::CompromisedRouter,
            16 => Self::AutoRootingWorms,
            17 => Self::AutoDetectedBotIp,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_listed(self) -> bool {
        self != Self::AllGood
    }

    fn description(self) -> &'static str {
        match self {
            Self::AllGood => "not listed",
            Self::IrcDrone => "IRC drone",
            Self::Bottler => "bottler",
            Self::UnknownSpambotOrDrone => "unknown spambot or drone",
            Self::DdosDrone => "DDoS drone",
            Self::SocksProxy => "SOCKS proxy",
            Self::HttpProxy => "HTTP proxy",
            Self::ProxyChain => "proxy chain",
            Self::OpenProxy => "open proxy",
            Self::OpenDnsResolver => "open DNS resolver",
            Self::BruteForceAttackers => "brute force attacker",
            Self::OpenWingateProxy => "open Wingate proxy",
            Self::CompromisedRouter => "compromised router",
            Self::AutoRootingWorms => "auto-rooting worm",
            Self::AutoDetectedBotIp => "automatically detected botnet IP",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DnsblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// `<reversed-ip>.<zone>`: octets for IPv4, nibbles for IPv6
pub fn query_name(ip: IpAddr, zone: &str) -> String {
    let zone = zone.trim_matches('.');
    match ip {
        IpAddr::V4(v4) => format!("{}.{}", reverse_v4(v4), zone),
        IpAddr::V6(v6) => format!("{}.{}", reverse_v6(v6), zone),
    }
}

fn reverse_v4(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{}.{}.{}.{}", d, c, b, a)
}

fn reverse_v6(ip: Ipv6Addr) -> String {
    let mut labels = Vec::with_capacity(32);
    for byte in ip.octets().iter().rev() {
        labels.push(format!("{:x}", byte & 0x0f));
        labels.push(format!("{:x}", byte >> 4));
    }
    labels.join(".")
}

/// Classify a resolver answer
pub fn classify(addrs: &[IpAddr]) -> DnsblResponse {
    if addrs.is_empty() {
        return DnsblResponse::AllGood;
    }
    addrs
        .iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(DnsblResponse::from_code(v4.octets()[3])),
            IpAddr::V6(_) => None,
        })
        .unwrap_or(DnsblResponse::UnknownSpambotOrDrone)
}

// ============================================================================
// Resolver
// ============================================================================

/// Name resolution used for blocklist queries
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Addresses for `name`; an empty list when the name does not exist
    async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>, ReputationError>;
}

/// Resolver backed by the system's `getaddrinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>, ReputationError> {
        match tokio::net::lookup_host((name, 0)).await {
            Ok(addrs) => Ok(addrs.map(|sa| sa.ip()).collect()),
            Err(e) if is_name_not_found(&e) => Ok(Vec::new()),
            Err(e) => Err(ReputationError::Lookup {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// getaddrinfo reports NXDOMAIN only through its message
fn is_name_not_found(err: &io::Error) -> bool {
    const NOT_FOUND: &[&str] = &[
        "name or service not known",
        "no address associated with hostname",
        "nodename nor servname provided",
        "no such host is known",
    ];
    let message = err.to_string().to_ascii_lowercase();
    NOT_FOUND.iter().any(|m| message.contains(m))
}
