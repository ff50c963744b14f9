use std::{
    net::{AddrParseError, IpAddr},
    num::ParseIntError,
    result::Result,
    str::{FromStr, ParseBoolError},
    time::Duration,
};

use super::{
    Cidr, Endpoint, Key, KeyError,
    device::{DeviceConfig, PeerConfig},
};

/// A wg-quick style configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WgConfig {
    pub interface: WgConfigInterface,
    pub peers: Vec<WgConfigPeer>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WgConfigInterface {
    // PrivateKey
    pub private_key: Option<Key>,

    // Address
    pub address: Vec<Cidr>,

    // ListenPort
    pub listen_port: Option<u16>,

    // MTU
    pub mtu: Option<u16>,

    // DNS
    pub dns: Option<Vec<IpAddr>>,

    // Table
    pub table: Option<String>,

    // FwMark
    pub fwmark: Option<u32>,

    // AdvertiseRoutes
    pub advertise_routes: Option<Vec<Cidr>>,

    // PreUp
    pub pre_up: Option<String>,

    // PreDown
    pub pre_down: Option<String>,

    // PostUp
    pub post_up: Option<String>,

    // PostDown
    pub post_down: Option<String>,

    // SaveConfig
    pub save_config: Option<bool>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WgConfigPeer {
    // PublicKey
    pub public_key: Key,

    // PresharedKey
    pub preshared_key: Option<Key>,

    // Endpoint
    pub endpoint: Option<Endpoint>,

    // AllowedIPs
    pub allowed_ips: Option<Vec<Cidr>>,

    // PersistentKeepalive
    pub persistent_keepalive: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected token")]
    UnexpectedToken,

    #[error("key parse error: {0}")]
    KeyParseError(#[from] KeyError),

    #[error("addr parse error: {0}")]
    SocketAddrParseError(#[from] AddrParseError),

    #[error("int parse error: {0}")]
    ParseIntError(#[from] ParseIntError),

    #[error("bool parse error: {0}")]
    ParseBoolError(#[from] ParseBoolError),

    #[error("no interface section")]
    NoInterfaceSection,
}

impl WgConfigInterface {
    fn parse(input: &mut &str) -> Result<Self, ParseError> {
        if !input.starts_with("[Interface]") {
            return Err(ParseError::UnexpectedToken);
        }

        let _ = until::<Stub>('\n', input);

        let mut iface = WgConfigInterface::default();
        while !at_section(input) {
            if skip_comment(input) {
                continue;
            }

            let (kind, value) = property(input)?;
            match kind {
                WgPropKind::PrivateKey => iface.private_key = Some(value.parse()?),
                WgPropKind::Address => iface.address = value.parse::<List<Cidr>>()?.0,
                WgPropKind::ListenPort => iface.listen_port = Some(value.parse()?),
                WgPropKind::FwMark => iface.fwmark = value.parse::<FwMark>()?.0,
                WgPropKind::Mtu => iface.mtu = Some(value.parse()?),
                WgPropKind::Dns => iface.dns = Some(value.parse::<List<IpAddr>>()?.0),
                WgPropKind::Table => iface.table = Some(value.to_string()),
                WgPropKind::AdvertiseRoutes => {
                    iface.advertise_routes = Some(value.parse::<List<Cidr>>()?.0)
                }
                WgPropKind::PostUp => iface.post_up = Some(value.to_string()),
                WgPropKind::PostDown => iface.post_down = Some(value.to_string()),
                WgPropKind::PreUp => iface.pre_up = Some(value.to_string()),
                WgPropKind::PreDown => iface.pre_down = Some(value.to_string()),
                WgPropKind::SaveConfig => iface.save_config = Some(value.parse()?),
                _ => {}
            }
        }

        Ok(iface)
    }
}

impl WgConfigPeer {
    fn parse(input: &mut &str) -> Result<Self, ParseError> {
        if !input.starts_with("[Peer]") {
            return Err(ParseError::UnexpectedToken);
        }

        let _ = until::<Stub>('\n', input);

        let mut peer = WgConfigPeer::default();
        while !at_section(input) {
            if skip_comment(input) {
                continue;
            }

            let (kind, value) = property(input)?;
            match kind {
                WgPropKind::PublicKey => peer.public_key = value.parse()?,
                WgPropKind::PresharedKey => peer.preshared_key = Some(value.parse()?),
                WgPropKind::Endpoint => peer.endpoint = Some(value.parse()?),
                WgPropKind::AllowedIPs => {
                    peer.allowed_ips = Some(value.parse::<List<Cidr>>()?.0)
                }
                WgPropKind::PersistentKeepalive => {
                    peer.persistent_keepalive = Some(value.parse::<Keepalive>()?.0)
                }
                _ => {}
            }
        }

        Ok(peer)
    }

    fn to_peer_config(&self) -> std::io::Result<PeerConfig> {
        Ok(PeerConfig {
            public_key: self.public_key,
            remove: false,
            preshared_key: self.preshared_key,
            endpoint: self.endpoint.as_ref().map(Endpoint::resolve).transpose()?,
            persistent_keepalive_interval: self
                .persistent_keepalive
                .map(|secs| Duration::from_secs(secs.into())),
            replace_allowed_ips: true,
            allowed_ips: self.allowed_ips.clone().unwrap_or_default(),
        })
    }
}

/// Trims leading whitespace and reports whether the next section header
/// (or the end of input) has been reached.
fn at_section(input: &mut &str) -> bool {
    *input = input.trim_start();
    input.is_empty() || input.starts_with('[')
}

fn skip_comment(input: &mut &str) -> bool {
    if input.starts_with('#') || input.starts_with(';') {
        let _ = until::<Stub>('\n', input);
        return true;
    }

    false
}

/// Splits the current line into its key and trimmed value. A line without
/// `=` is an error; it never runs on into the next line.
fn property<'a>(input: &mut &'a str) -> Result<(WgPropKind, &'a str), ParseError> {
    let rest: &'a str = *input;
    let (line, tail) = rest.split_once('\n').unwrap_or((rest, ""));
    *input = tail;

    let (key, value) = line.split_once('=').ok_or(ParseError::UnexpectedToken)?;
    Ok((key.trim().parse()?, value.trim()))
}

struct Stub;
impl FromStr for Stub {
    type Err = ParseError;
    fn from_str(_: &str) -> Result<Self, Self::Err> {
        Ok(Stub)
    }
}

/// Decimal or `0x` prefixed hex; `off` is the same as unset.
struct FwMark(Option<u32>);
impl FromStr for FwMark {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(FwMark(match s.strip_prefix("0x") {
            Some(hex) => Some(u32::from_str_radix(hex, 16)?),
            None if s.eq_ignore_ascii_case("off") => None,
            None => Some(s.parse()?),
        }))
    }
}

/// Seconds; `off` disables the keep-alive.
struct Keepalive(u32);
impl FromStr for Keepalive {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("off") {
            return Ok(Keepalive(0));
        }

        Ok(Keepalive(s.parse()?))
    }
}

struct List<I>(Vec<I>);
impl<I: FromStr> FromStr for List<I> {
    type Err = I::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut items = Vec::new();

        for s in s.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            items.push(s.parse()?);
        }

        Ok(List(items))
    }
}

enum WgPropKind {
    PublicKey,
    PresharedKey,
    Endpoint,
    AdvertiseRoutes,
    AllowedIPs,
    PersistentKeepalive,
    Unknown,
    PrivateKey,
    Address,
    ListenPort,
    PostUp,
    PostDown,
    PreUp,
    PreDown,
    SaveConfig,
    FwMark,
    Table,
    Mtu,
    Dns,
}

impl FromStr for WgPropKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "publickey" => WgPropKind::PublicKey,
            "presharedkey" => WgPropKind::PresharedKey,
            "endpoint" => WgPropKind::Endpoint,
            "allowedips" => WgPropKind::AllowedIPs,
            "persistentkeepalive" => WgPropKind::PersistentKeepalive,
            "privatekey" => WgPropKind::PrivateKey,
            "listenport" => WgPropKind::ListenPort,
            "postup" => WgPropKind::PostUp,
            "postdown" => WgPropKind::PostDown,
            "preup" => WgPropKind::PreUp,
            "predown" => WgPropKind::PreDown,
            "saveconfig" => WgPropKind::SaveConfig,
            "fwmark" => WgPropKind::FwMark,
            "dns" => WgPropKind::Dns,
            "mtu" => WgPropKind::Mtu,
            "address" => WgPropKind::Address,
            "table" => WgPropKind::Table,
            "advertiseroutes" => WgPropKind::AdvertiseRoutes,
            _ => WgPropKind::Unknown,
        })
    }
}

fn until<M: FromStr>(p: char, input: &mut &str) -> Result<M, M::Err> {
    let cnt = input.find(p).unwrap_or(input.len());
    let res = input[0..cnt].trim().parse()?;
    *input = &input[cnt..];

    if !input.is_empty() {
        *input = &input[p.len_utf8()..];
    }

    Ok(res)
}

impl WgConfig {
    pub fn parse_config(input: &mut &str) -> Result<Self, ParseError> {
        let mut interface = None;
        let mut peers = Vec::new();

        while !input.is_empty() {
            *input = input.trim_start();

            if input.starts_with("[Interface]") {
                interface = Some(WgConfigInterface::parse(input)?);
            } else if input.starts_with("[Peer]") {
                peers.push(WgConfigPeer::parse(input)?);
            } else {
                let _ = until::<Stub>('\n', input);
            }
        }

        Ok(WgConfig {
            interface: interface.ok_or(ParseError::NoInterfaceSection)?,
            peers,
        })
    }

    /// Builds the device configuration `wg setconf` would apply for this file.
    ///
    /// Every peer replaces its allowed IPs. Interface settings without a UAPI
    /// counterpart (addresses, DNS, MTU, routing table, hooks) are dropped.
    pub fn to_device_config(&self, replace_peers: bool) -> std::io::Result<DeviceConfig> {
        let peers = self
            .peers
            .iter()
            .map(WgConfigPeer::to_peer_config)
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(DeviceConfig {
            private_key: self.interface.private_key,
            listen_port: self.interface.listen_port,
            fwmark: self.interface.fwmark,
            replace_peers,
            peers,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{Ipv4Addr, SocketAddr},
        time::Duration,
    };

    use crate::wg::{
        Cidr, Endpoint, Key,
        config::{ParseError, WgConfigInterface, WgConfigPeer},
        device::PeerConfig,
        encode::SetRequest,
    };

    use super::WgConfig;

    #[test]
    fn test_parse_config() {
        let priv_key = Key::random();
        let srv_key = Key::random();
        let tag_key = Key::random();
        let phone_key = Key::random();
        let kvm_key = Key::random();

        let cfg = format!(
            "[Interface]
PrivateKey = {}
Address = 100.64.0.2/24
ListenPort = 51822
PostUp = iptables -A FORWARD -i %i -j ACCEPT; iptables -t nat -A POSTROUTING -o tun0 -j MASQUERADE
PostDown = iptables -D FORWARD -i %i -j ACCEPT; iptables -t nat -D POSTROUTING -o tun0 -j MASQUERADE

[Peer] # Server
PublicKey = {}
Endpoint = example.com:51821
AllowedIPs = 100.64.0.1, 192.168.0.0/24, 192.168.1.1
PersistentKeepalive = 25

[Peer] # Laptop
PublicKey = {}
AllowedIPs = 100.64.0.3
PersistentKeepalive = 25

[Peer] # Phone
PublicKey = {}
AllowedIPs = 100.64.0.4
PersistentKeepalive = 25

[Peer] # NanoKVM
PublicKey = {}
AllowedIPs = 100.64.0.100
PersistentKeepalive = 25",
            priv_key, srv_key, tag_key, phone_key, kvm_key,
        );

        let mut input = cfg.as_str();

        let cfg = WgConfig::parse_config(&mut input).unwrap();

        let host = |d: u8| Cidr::new(Ipv4Addr::new(100, 64, 0, d), 32);

        assert_eq!(
            cfg,
            WgConfig {
                interface: WgConfigInterface {
                    private_key: Some(priv_key),
                    address: vec![Cidr::new(Ipv4Addr::new(100, 64, 0, 2), 24)],
                    listen_port: Some(51822),
                    mtu: None,
                    dns: None,
                    table: None,
                    fwmark: None,
                    pre_up: None,
                    pre_down: None,
                    post_up: Some("iptables -A FORWARD -i %i -j ACCEPT; iptables -t nat -A POSTROUTING -o tun0 -j MASQUERADE".to_string()),
                    post_down: Some("iptables -D FORWARD -i %i -j ACCEPT; iptables -t nat -D POSTROUTING -o tun0 -j MASQUERADE".to_string()),
                    save_config: None,
                    advertise_routes: None
                },
                peers: vec![
                    WgConfigPeer {
                        public_key: srv_key,
                        preshared_key: None,
                        endpoint: Some(Endpoint::Domain("example.com:51821".to_string())),
                        allowed_ips: Some(vec![
                            host(1),
                            Cidr::new(Ipv4Addr::new(192, 168, 0, 0), 24),
                            Cidr::new(Ipv4Addr::new(192, 168, 1, 1), 32),
                        ]),
                        persistent_keepalive: Some(25),
                    },
                    WgConfigPeer {
                        public_key: tag_key,
                        allowed_ips: Some(vec![host(3)]),
                        persistent_keepalive: Some(25),
                        ..Default::default()
                    },
                    WgConfigPeer {
                        public_key: phone_key,
                        allowed_ips: Some(vec![host(4)]),
                        persistent_keepalive: Some(25),
                        ..Default::default()
                    },
                    WgConfigPeer {
                        public_key: kvm_key,
                        allowed_ips: Some(vec![host(100)]),
                        persistent_keepalive: Some(25),
                        ..Default::default()
                    },
                ]
            }
        )
    }

    #[test]
    fn test_parse_interface_options() {
        let priv_key = Key::random();
        let cfg = format!(
            "# managed by hand
[Interface]
PrivateKey = {priv_key}
# comment between keys
FwMark = 0xca6c
MTU = 1420
DNS = 1.1.1.1, 9.9.9.9
Table = off
SaveConfig = true
"
        );

        let cfg = WgConfig::parse_config(&mut cfg.as_str()).unwrap();
        let iface = cfg.interface;

        assert_eq!(iface.private_key, Some(priv_key));
        assert_eq!(iface.fwmark, Some(51820));
        assert_eq!(iface.listen_port, None);
        assert_eq!(iface.mtu, Some(1420));
        assert_eq!(
            iface.dns,
            Some(vec![Ipv4Addr::new(1, 1, 1, 1).into(), Ipv4Addr::new(9, 9, 9, 9).into()])
        );
        assert_eq!(iface.table.as_deref(), Some("off"));
        assert_eq!(iface.save_config, Some(true));
        assert!(cfg.peers.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let res = WgConfig::parse_config(&mut "[Peer]\nPublicKey = abc\n");
        assert!(matches!(res, Err(ParseError::KeyParseError(_))));

        let peer_only = format!("[Peer]\nPublicKey = {}\n", Key::random());
        let res = WgConfig::parse_config(&mut peer_only.as_str());
        assert!(matches!(res, Err(ParseError::NoInterfaceSection)));

        let bad_port = format!("[Interface]\nPrivateKey = {}\nListenPort = 70000\n", Key::random());
        let res = WgConfig::parse_config(&mut bad_port.as_str());
        assert!(matches!(res, Err(ParseError::ParseIntError(_))));
    }

    #[test]
    fn test_line_without_value_is_rejected() {
        let key = Key::random();

        let iface = format!("[Interface]\nstray\nPrivateKey = {key}\n");
        let res = WgConfig::parse_config(&mut iface.as_str());
        assert!(matches!(res, Err(ParseError::UnexpectedToken)));

        let peer = format!(
            "[Interface]\nPrivateKey = {key}\n\n[Peer]\nPublicKey = {key}\nstray\nAllowedIPs = 10.0.0.1\n"
        );
        let res = WgConfig::parse_config(&mut peer.as_str());
        assert!(matches!(res, Err(ParseError::UnexpectedToken)));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let cfg = "[Interface]\nPostUp = sysctl -w net.ipv4.ip_forward=1\nListenPort = 51820\n";
        let cfg = WgConfig::parse_config(&mut &*cfg).unwrap();

        assert_eq!(
            cfg.interface.post_up.as_deref(),
            Some("sysctl -w net.ipv4.ip_forward=1")
        );
        assert_eq!(cfg.interface.listen_port, Some(51820));
    }

    #[test]
    fn test_missing_private_key_is_not_sent() {
        let cfg = WgConfig::parse_config(&mut "[Interface]\nListenPort = 51820\n").unwrap();
        assert_eq!(cfg.interface.private_key, None);

        let device = cfg.to_device_config(false).unwrap();
        assert_eq!(device.private_key, None);
        assert_eq!(
            SetRequest(&device).to_string(),
            "set=1\nlisten_port=51820\n\n"
        );
    }

    #[test]
    fn test_to_device_config() {
        let priv_key = Key::random();
        let peer_key = Key::random();
        let psk = Key::random();

        let cfg = format!(
            "[Interface]
PrivateKey = {priv_key}
Address = 10.0.0.2/24
ListenPort = 51820

[Peer]
PublicKey = {peer_key}
PresharedKey = {psk}
Endpoint = 203.0.113.7:51820
AllowedIPs = 10.0.0.0/24, fd00::/64
PersistentKeepalive = 25
"
        );

        let cfg = WgConfig::parse_config(&mut cfg.as_str()).unwrap();
        let device = cfg.to_device_config(true).unwrap();

        assert_eq!(device.private_key, Some(priv_key));
        assert_eq!(device.listen_port, Some(51820));
        assert_eq!(device.fwmark, None);
        assert!(device.replace_peers);
        assert_eq!(
            device.peers,
            vec![PeerConfig {
                public_key: peer_key,
                remove: false,
                preshared_key: Some(psk),
                endpoint: Some(SocketAddr::new(Ipv4Addr::new(203, 0, 113, 7).into(), 51820)),
                persistent_keepalive_interval: Some(Duration::from_secs(25)),
                replace_allowed_ips: true,
                allowed_ips: vec!["10.0.0.0/24".parse().unwrap(), "fd00::/64".parse().unwrap()],
            }]
        );
    }
}
