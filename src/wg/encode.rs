//! Text encoding of the UAPI `set` request.
//!
//! Every present field becomes one `key=value` line. Absent options and unset
//! flags produce no line at all. Values are written verbatim without escaping.

use std::fmt;

use super::device::{DeviceConfig, PeerConfig};

/// A complete `set` request: command marker, configuration lines and the
/// blank line that ends the request.
#[derive(Debug, Clone, Copy)]
pub struct SetRequest<'a>(pub &'a DeviceConfig);

impl fmt::Display for SetRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "set=1")?;
        write!(f, "{}", self.0)?;
        writeln!(f)
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(key) = &self.private_key {
            writeln!(f, "private_key={}", key.to_hex())?;
        }

        if let Some(port) = self.listen_port {
            writeln!(f, "listen_port={port}")?;
        }

        if let Some(mark) = self.fwmark {
            writeln!(f, "fwmark={mark}")?;
        }

        if self.replace_peers {
            writeln!(f, "replace_peers=true")?;
        }

        for peer in &self.peers {
            write!(f, "{peer}")?;
        }

        Ok(())
    }
}

impl fmt::Display for PeerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the device starts a new peer block at every public_key line
        writeln!(f, "public_key={}", self.public_key.to_hex())?;

        if self.remove {
            writeln!(f, "remove=true")?;
        }

        if let Some(key) = &self.preshared_key {
            writeln!(f, "preshared_key={}", key.to_hex())?;
        }

        if let Some(endpoint) = &self.endpoint {
            writeln!(f, "endpoint={endpoint}")?;
        }

        if let Some(interval) = self.persistent_keepalive_interval {
            writeln!(f, "persistent_keepalive_interval={}", interval.as_secs())?;
        }

        if self.replace_allowed_ips {
            writeln!(f, "replace_allowed_ips=true")?;
        }

        for ip in &self.allowed_ips {
            writeln!(f, "allowed_ip={ip}")?;
        }

        Ok(())
    }
}
