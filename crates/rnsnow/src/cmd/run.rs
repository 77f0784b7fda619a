use std::path::PathBuf;
use std::sync::Arc;

use rnsnow_bridge::{
    control_channel, Bridge, BridgeConfig, BridgeHandle, LogFeedback, SoftWatchdog,
};
use rnsnow_transport::{StreamSerial, UdpRadio};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cmd::RunArgs;
use crate::exit::{
    bridge_error, io_error, transport_error, CliError, CliResult, SUCCESS, WATCHDOG_RESET,
};

pub fn run(args: RunArgs, mut config: BridgeConfig, config_path: Option<PathBuf>) -> CliResult<i32> {
    args.radio.apply(&mut config);
    if let Some(mac) = args.mac {
        config.mac = mac;
    }
    if args.no_scan {
        config.scan.enabled = false;
    }
    config.validate().map_err(|err| bridge_error("config", err))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime", err))?;
    runtime.block_on(serve(args, config, config_path))
}

async fn serve(args: RunArgs, config: BridgeConfig, config_path: Option<PathBuf>) -> CliResult<i32> {
    let radio = UdpRadio::bind(args.radio.udp_config(&config))
        .await
        .map_err(|err| transport_error("radio", err))?;
    let serial = StreamSerial::new(args.serial_device(), config.baudrate);

    let shutdown = CancellationToken::new();
    let reset = shutdown.clone();
    let watchdog = Arc::new(SoftWatchdog::start(config.watchdog_timeout(), move |timeout| {
        error!(?timeout, "pumps stalled, resetting");
        reset.cancel();
    }));
    debug!(timeout = ?watchdog.timeout(), "watchdog armed");

    let (handle, controls) = control_channel(config.ping_cooldown());
    let signals = tokio::spawn(watch_signals(
        handle,
        shutdown.clone(),
        config_path,
        config.channel,
    ));

    info!(
        description = %config.description,
        address = %radio.address(),
        serial = %args.serial,
        "starting bridge"
    );
    let bridge = Bridge::new(config, radio, serial)
        .map_err(|err| bridge_error("config", err))?
        .with_watchdog(watchdog.clone())
        .with_feedback(Arc::new(LogFeedback));

    let result = bridge.run(controls, shutdown).await;
    signals.abort();
    result.map_err(|err| bridge_error("bridge", err))?;
    if watchdog.expired() {
        return Err(CliError::new(
            WATCHDOG_RESET,
            format!("watchdog expired after {:?}", watchdog.timeout()),
        ));
    }
    Ok(SUCCESS)
}

/// Translate process signals into bridge requests until shutdown.
///
/// SIGUSR1 sends a presence ping, SIGUSR2 rescans, SIGHUP re-reads the
/// configuration file and retunes if the channel changed.
#[cfg(unix)]
async fn watch_signals(
    handle: BridgeHandle,
    shutdown: CancellationToken,
    config_path: Option<PathBuf>,
    mut channel: u8,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let streams = (
        signal(SignalKind::terminate()),
        signal(SignalKind::user_defined1()),
        signal(SignalKind::user_defined2()),
        signal(SignalKind::hangup()),
    );
    let (Ok(mut term), Ok(mut usr1), Ok(mut usr2), Ok(mut hup)) = streams else {
        warn!("signal handlers unavailable, only interrupt stops the bridge");
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
        return;
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = term.recv() => break,
            _ = usr1.recv() => {
                if !handle.ping() {
                    debug!("ping request ignored");
                }
            }
            _ = usr2.recv() => {
                info!("rescan requested");
                handle.rescan();
            }
            _ = hup.recv() => {
                if let Some(next) = reload_channel(config_path.as_ref(), channel) {
                    match handle.set_channel(next) {
                        Ok(_) => channel = next,
                        Err(err) => warn!(error = %err, "retune rejected"),
                    }
                }
            }
        }
    }

    info!("shutdown requested");
    shutdown.cancel();
}

#[cfg(not(unix))]
async fn watch_signals(
    _handle: BridgeHandle,
    shutdown: CancellationToken,
    _config_path: Option<PathBuf>,
    _channel: u8,
) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    shutdown.cancel();
}

/// The new channel after a reload, if it differs from `current`.
#[cfg_attr(not(unix), allow(dead_code))]
fn reload_channel(path: Option<&PathBuf>, current: u8) -> Option<u8> {
    let Some(path) = path else {
        debug!("no configuration file to reload");
        return None;
    };
    match BridgeConfig::load(path) {
        Ok(config) if config.channel != current => {
            info!(from = current, to = config.channel, "configured channel changed");
            Some(config.channel)
        }
        Ok(_) => {
            debug!("configuration reloaded, channel unchanged");
            None
        }
        Err(err) => {
            warn!(error = %err, "configuration reload failed");
            None
        }
    }
}
