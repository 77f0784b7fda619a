use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use rnsnow_bridge::BridgeConfig;
use rnsnow_transport::{PeerAddress, SerialDevice, UdpRadioConfig};

use crate::exit::{bridge_error, CliResult};
use crate::output::OutputFormat;

pub mod config;
pub mod run;
pub mod scan;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the serial to radio bridge.
    Run(RunArgs),
    /// Scan channels for peers and print per-channel responses.
    Scan(ScanArgs),
    /// Print the effective configuration.
    Config(ConfigArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(
    command: Command,
    config: BridgeConfig,
    config_path: Option<PathBuf>,
    format: OutputFormat,
) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, config, config_path),
        Command::Scan(args) => scan::run(args, config, format),
        Command::Config(args) => config::run(args, config, format),
        Command::Version(args) => version::run(args),
    }
}

/// Defaults, overlaid with the file when one is given.
pub fn load_config(path: Option<&Path>) -> CliResult<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path).map_err(|err| bridge_error("config", err)),
        None => Ok(BridgeConfig::default()),
    }
}

/// How this host joins the emulated radio medium.
#[derive(Args, Debug, Clone)]
pub struct RadioArgs {
    /// Local UDP address the radio listens on.
    #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:4242", env = "RNSNOW_BIND")]
    pub bind: SocketAddr,
    /// A station within range (repeatable).
    #[arg(long = "neighbor", value_name = "ADDR")]
    pub neighbors: Vec<SocketAddr>,
    /// This station's radio address. Default: derived from the process id.
    #[arg(long, value_name = "MAC")]
    pub address: Option<PeerAddress>,
    /// Override the configured channel.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=14))]
    pub channel: Option<u8>,
}

impl RadioArgs {
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
    }

    pub fn udp_config(&self, config: &BridgeConfig) -> UdpRadioConfig {
        UdpRadioConfig {
            bind: self.bind,
            neighbors: self.neighbors.clone(),
            address: self.address.unwrap_or_else(default_station_address),
            channel: config.channel,
            protocol: config.protocol,
        }
    }
}

/// A locally administered unicast address unique to this process.
pub fn default_station_address() -> PeerAddress {
    let [a, b, c, d] = std::process::id().to_be_bytes();
    PeerAddress::new([0x02, 0x52, a, b, c, d])
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Serial device path, or `-` for stdin/stdout.
    #[arg(long, value_name = "PATH", default_value = "-")]
    pub serial: String,
    #[command(flatten)]
    pub radio: RadioArgs,
    /// Send data to this peer instead of the configured one.
    #[arg(long, value_name = "MAC")]
    pub mac: Option<PeerAddress>,
    /// Skip the startup channel scan.
    #[arg(long)]
    pub no_scan: bool,
}

impl RunArgs {
    pub fn serial_device(&self) -> SerialDevice {
        if self.serial == "-" {
            SerialDevice::Stdio
        } else {
            SerialDevice::Path(PathBuf::from(&self.serial))
        }
    }
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub radio: RadioArgs,
    /// Probes per channel.
    #[arg(long)]
    pub attempts: Option<u32>,
    /// Listen window per probe (e.g. 500ms, 1s).
    #[arg(long, value_name = "DURATION")]
    pub listen: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
