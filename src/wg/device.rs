use std::{net::SocketAddr, time::Duration};

use super::{Cidr, Key};

/// Device-level settings for a single `set` exchange.
///
/// `None` fields are left untouched on the device; they are never sent as a
/// zero value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    // private_key
    pub private_key: Option<Key>,

    // listen_port
    pub listen_port: Option<u16>,

    // fwmark
    pub fwmark: Option<u32>,

    // replace_peers
    pub replace_peers: bool,

    /// Applied by the device in this order.
    pub peers: Vec<PeerConfig>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    // public_key
    pub public_key: Key,

    // remove
    pub remove: bool,

    // preshared_key
    pub preshared_key: Option<Key>,

    // endpoint
    pub endpoint: Option<SocketAddr>,

    // persistent_keepalive_interval, sent as whole seconds
    pub persistent_keepalive_interval: Option<Duration>,

    // replace_allowed_ips
    pub replace_allowed_ips: bool,

    // allowed_ip
    pub allowed_ips: Vec<Cidr>,
}

impl PeerConfig {
    pub fn new(public_key: Key) -> Self {
        Self {
            public_key,
            ..Default::default()
        }
    }
}
