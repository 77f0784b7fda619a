use std::time::Duration;

use rnsnow_bridge::{BridgeConfig, ChannelScanner};
use rnsnow_transport::{RadioTransport, UdpRadio, BROADCAST};

use crate::cmd::ScanArgs;
use crate::exit::{
    bridge_error, io_error, transport_error, CliError, CliResult, SUCCESS, USAGE,
};
use crate::output::{print_scan, OutputFormat};

pub fn run(args: ScanArgs, mut config: BridgeConfig, format: OutputFormat) -> CliResult<i32> {
    args.radio.apply(&mut config);
    if let Some(attempts) = args.attempts {
        config.scan.attempts = attempts;
    }
    if let Some(listen) = &args.listen {
        config.scan.listen_ms = parse_duration(listen)?.as_millis() as u64;
    }
    config.validate().map_err(|err| bridge_error("config", err))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime", err))?;

    runtime.block_on(async {
        let radio = UdpRadio::bind(args.radio.udp_config(&config))
            .await
            .map_err(|err| transport_error("radio", err))?;
        radio
            .add_peer(BROADCAST)
            .map_err(|err| transport_error("radio", err))?;

        let outcome = ChannelScanner::new(&radio, &config.scan)
            .scan(config.channel)
            .await
            .map_err(|err| bridge_error("scan", err))?;
        print_scan(&outcome, format);
        Ok(SUCCESS)
    })
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "s" => Duration::from_secs(value),
        _ => Duration::from_millis(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("300").unwrap(), Duration::from_millis(300));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
