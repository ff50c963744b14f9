use base64::prelude::*;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs},
    str::FromStr,
};

use config::ParseError;

pub mod config;
pub mod device;
pub mod encode;
pub mod uapi;

pub const KEY_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeSliceError),

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("wrong key length: expected {KEY_LENGTH} bytes, got {0}")]
    Length(usize),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LENGTH]);

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; KEY_LENGTH]> for Key {
    fn from(bytes: [u8; KEY_LENGTH]) -> Self {
        Key(bytes)
    }
}

/// Parses the base64 form used by configuration files and the `wg` tool.
impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // one spare byte so that over-long input is reported as a length error
        let mut inner = [0u8; KEY_LENGTH + 1];
        let len = BASE64_STANDARD.decode_slice(s, &mut inner)?;
        if len != KEY_LENGTH {
            return Err(KeyError::Length(len));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&inner[..KEY_LENGTH]);
        Ok(Key(key))
    }
}

impl Key {
    pub fn random() -> Key {
        Key(rand::random())
    }

    /// Lowercase hex, the only key encoding the UAPI wire format accepts.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Key, KeyError> {
        if s.len() != KEY_LENGTH * 2 {
            return Err(KeyError::Length(s.len() / 2));
        }

        let mut inner = [0u8; KEY_LENGTH];
        hex::decode_to_slice(s, &mut inner)?;
        Ok(Key(inner))
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", BASE64_STANDARD.encode(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub ip: IpAddr,
    pub mask: u8,
}

impl Default for Cidr {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            mask: 0,
        }
    }
}

impl Cidr {
    pub fn new(ip: impl Into<IpAddr>, mask: u8) -> Self {
        Self {
            ip: ip.into(),
            mask,
        }
    }
}

impl FromStr for Cidr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, mask) = s.split_once('/').unwrap_or((s, ""));
        let ip: IpAddr = ip.trim().parse()?;
        let mask = mask.trim();

        let mask = if !mask.is_empty() {
            mask.parse()?
        } else if ip.is_ipv4() {
            32
        } else {
            128
        };

        Ok(Cidr { ip, mask })
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ip, self.mask)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Domain(String),
    Ip(SocketAddr),
}

impl Endpoint {
    /// Literal addresses pass through; `host:port` takes the first resolved address.
    pub fn resolve(&self) -> std::io::Result<SocketAddr> {
        match self {
            Endpoint::Ip(addr) => Ok(*addr),
            Endpoint::Domain(dom) => dom.to_socket_addrs()?.next().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for endpoint {dom}"),
                )
            }),
        }
    }
}

impl From<String> for Endpoint {
    fn from(v: String) -> Self {
        Self::Domain(v)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(v: SocketAddr) -> Self {
        Self::Ip(v)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Domain(dom) => write!(f, "{dom}"),
            Endpoint::Ip(addr) => write!(f, "{addr}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if let Ok(addr) = s.parse() {
            Self::Ip(addr)
        } else {
            Self::Domain(s.to_string())
        })
    }
}

pub trait WireguardApi {
    type Error;

    fn configure(&mut self, iface: &str, config: &device::DeviceConfig) -> Result<(), Self::Error>;

    fn set_listen_port(&mut self, iface: &str, port: u16) -> Result<(), Self::Error>;
    fn set_peer_endpoint(
        &mut self,
        iface: &str,
        peer: Key,
        endpoint: SocketAddr,
    ) -> Result<(), Self::Error>;
    fn set_peer_allowed_ips(
        &mut self,
        iface: &str,
        peer: Key,
        allowed_ips: Vec<Cidr>,
    ) -> Result<(), Self::Error>;
    fn remove_peer(&mut self, iface: &str, peer: Key) -> Result<(), Self::Error>;
}
