use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::Parser;
use wg_uapi::{
    error::Error,
    wg::{
        WireguardApi,
        config::WgConfig,
        uapi::{UapiBackend, configure_device},
    },
};

const DEFAULT_SOCKET_DIR: &str = "/var/run/wireguard";

/// Apply a wg-quick configuration file to a userspace WireGuard device.
#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Args {
    /// Interface name
    iface: String,

    /// Configuration file [default: /etc/wireguard/<IFACE>.conf]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control socket [default: $WG_SOCKET_DIR/<IFACE>.sock]
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Drop device peers that are not in the configuration file
    #[arg(long)]
    replace_peers: bool,
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(format!("/etc/wireguard/{}.conf", args.iface)));

    let config = load_wg_config(&config_path)?;
    let device = config.to_device_config(args.replace_peers)?;

    log::info!(
        "applying {} with {} peers to {}",
        config_path.display(),
        device.peers.len(),
        args.iface
    );

    match args.socket {
        Some(path) => configure_device(path, &device)?,
        None => {
            let socket_dir =
                std::env::var("WG_SOCKET_DIR").unwrap_or_else(|_| DEFAULT_SOCKET_DIR.into());
            UapiBackend::new(socket_dir).configure(&args.iface, &device)?
        }
    }

    log::info!("{} configured", args.iface);

    Ok(())
}

fn load_wg_config(path: &Path) -> Result<WgConfig, Error> {
    let data = fs::read_to_string(path)?;
    let mut reader = data.as_str();

    Ok(WgConfig::parse_config(&mut reader)?)
}
