use rnsnow_bridge::BridgeConfig;

use crate::cmd::ConfigArgs;
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{flatten, print_json, print_key_values, OutputFormat};

pub fn run(_args: ConfigArgs, config: BridgeConfig, format: OutputFormat) -> CliResult<i32> {
    match format {
        OutputFormat::Json => print_json(&config, true),
        _ => {
            let value = serde_json::to_value(&config)
                .map_err(|err| CliError::new(INTERNAL, format!("config: {err}")))?;
            print_key_values(&flatten(&value), format);
        }
    }
    Ok(SUCCESS)
}
