//! Client side of the userspace WireGuard control socket.
//!
//! One call is one exchange: connect, write a `set` request, read the
//! single `errno=<N>` reply line, close.

use std::{
    io::{self, Read, Write},
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
};

use super::{
    Cidr, Key, WireguardApi,
    device::{DeviceConfig, PeerConfig},
    encode::SetRequest,
};

/// Replies are a single short `errno=<N>` line.
const RESPONSE_BUFFER_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum UapiError {
    #[error("failed to connect to {path}: {source}")]
    Connection {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to send request: {0}")]
    Transmission(io::Error),

    #[error("failed to receive response: {0}")]
    Receive(io::Error),

    #[error("device returned errno={code}")]
    Protocol { code: i32 },

    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(String),
}

/// Opens the duplex byte channel to a control socket.
pub trait Dial {
    type Stream: Read + Write;

    fn dial(&self, path: &Path) -> io::Result<Self::Stream>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnixDialer;

impl Dial for UnixDialer {
    type Stream = UnixStream;

    fn dial(&self, path: &Path) -> io::Result<Self::Stream> {
        UnixStream::connect(path)
    }
}

/// Applies `config` to the device listening on the UNIX socket at `path`.
pub fn configure_device(path: impl AsRef<Path>, config: &DeviceConfig) -> Result<(), UapiError> {
    configure_device_with(&UnixDialer, path.as_ref(), config)
}

pub fn configure_device_with<D: Dial>(
    dialer: &D,
    path: &Path,
    config: &DeviceConfig,
) -> Result<(), UapiError> {
    log::debug!("connecting to {}", path.display());

    let mut stream = dialer.dial(path).map_err(|source| UapiError::Connection {
        path: path.to_path_buf(),
        source,
    })?;

    // the whole request goes out in one write so the device never sees a partial line
    let request = SetRequest(config).to_string();
    log::trace!("request:\n{request}");

    stream
        .write_all(request.as_bytes())
        .and_then(|_| stream.flush())
        .map_err(UapiError::Transmission)?;

    log::debug!(
        "sent {} bytes ({} peers), awaiting reply",
        request.len(),
        config.peers.len()
    );

    let response = read_response(&mut stream)?;
    log::trace!("response: {response:?}");

    parse_response(&response)
}

/// Reads until the first newline, EOF, or a full buffer.
fn read_response<R: Read>(reader: &mut R) -> Result<String, UapiError> {
    let mut buf = [0u8; RESPONSE_BUFFER_SIZE];
    let mut len = 0;

    while len < buf.len() {
        match reader.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => {
                len += n;
                if buf[..len].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(UapiError::Receive(err)),
        }
    }

    if len == 0 {
        return Err(UapiError::Receive(io::ErrorKind::UnexpectedEof.into()));
    }

    let text = String::from_utf8_lossy(&buf[..len]).into_owned();
    if len == buf.len() && !text.contains('\n') {
        return Err(UapiError::UnexpectedResponse(text));
    }

    Ok(text)
}

/// Maps an `errno=<N>` reply to a result. Only the exact text `errno=0` is
/// success; any other code is passed through as is.
pub fn parse_response(response: &str) -> Result<(), UapiError> {
    let line = response.trim();
    if line == "errno=0" {
        return Ok(());
    }

    let code = line
        .strip_prefix("errno=")
        .filter(|code| {
            let digits = code.strip_prefix('-').unwrap_or(code);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        })
        .and_then(|code| code.parse::<i32>().ok())
        .ok_or_else(|| UapiError::UnexpectedResponse(line.to_string()))?;

    Err(UapiError::Protocol { code })
}

/// [`WireguardApi`] over the control sockets found in one directory,
/// `<socket_dir>/<iface>.sock`.
#[derive(Debug, Clone)]
pub struct UapiBackend<D = UnixDialer> {
    socket_dir: PathBuf,
    dialer: D,
}

impl UapiBackend {
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self::with_dialer(socket_dir, UnixDialer)
    }
}

impl<D: Dial> UapiBackend<D> {
    pub fn with_dialer(socket_dir: impl Into<PathBuf>, dialer: D) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            dialer,
        }
    }

    pub fn socket_path(&self, iface: &str) -> PathBuf {
        self.socket_dir.join(format!("{iface}.sock"))
    }
}

impl<D: Dial> WireguardApi for UapiBackend<D> {
    type Error = UapiError;

    fn configure(&mut self, iface: &str, config: &DeviceConfig) -> Result<(), Self::Error> {
        configure_device_with(&self.dialer, &self.socket_path(iface), config)
    }

    fn set_listen_port(&mut self, iface: &str, port: u16) -> Result<(), Self::Error> {
        let config = DeviceConfig {
            listen_port: Some(port),
            ..Default::default()
        };

        self.configure(iface, &config)
    }

    fn set_peer_endpoint(
        &mut self,
        iface: &str,
        peer: Key,
        endpoint: std::net::SocketAddr,
    ) -> Result<(), Self::Error> {
        let config = DeviceConfig {
            peers: vec![PeerConfig {
                endpoint: Some(endpoint),
                ..PeerConfig::new(peer)
            }],
            ..Default::default()
        };

        self.configure(iface, &config)
    }

    fn set_peer_allowed_ips(
        &mut self,
        iface: &str,
        peer: Key,
        allowed_ips: Vec<Cidr>,
    ) -> Result<(), Self::Error> {
        let config = DeviceConfig {
            peers: vec![PeerConfig {
                replace_allowed_ips: true,
                allowed_ips,
                ..PeerConfig::new(peer)
            }],
            ..Default::default()
        };

        self.configure(iface, &config)
    }

    fn remove_peer(&mut self, iface: &str, peer: Key) -> Result<(), Self::Error> {
        let config = DeviceConfig {
            peers: vec![PeerConfig {
                remove: true,
                ..PeerConfig::new(peer)
            }],
            ..Default::default()
        };

        self.configure(iface, &config)
    }
}
