use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rnsnow_bridge::ScanOutcome;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    println!("{}", rendered.unwrap_or_else(|_| "{}".to_string()));
}

pub fn print_scan(outcome: &ScanOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(outcome, false),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "RESPONSES", ""]);
            for result in &outcome.results {
                let marker = if result.channel == outcome.best { "*" } else { "" };
                table.add_row(vec![
                    result.channel.to_string(),
                    result.responses.to_string(),
                    marker.to_string(),
                ]);
            }
            println!("{table}");
            println!("{}", scan_summary(outcome));
        }
        OutputFormat::Pretty => {
            for result in &outcome.results {
                println!("channel={} responses={}", result.channel, result.responses);
            }
            println!("{}", scan_summary(outcome));
        }
    }
}

fn scan_summary(outcome: &ScanOutcome) -> String {
    if outcome.found_peers() {
        format!(
            "best channel {} ({} responses)",
            outcome.best, outcome.responses
        )
    } else {
        format!("no peers found, default channel {}", outcome.best)
    }
}

/// Render a JSON object as `dotted.key = value` rows.
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    flatten_into(String::new(), value, &mut rows);
    rows
}

fn flatten_into(prefix: String, value: &Value, rows: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(path, child, rows);
            }
        }
        Value::String(text) => rows.push((prefix, text.clone())),
        other => rows.push((prefix, other.to_string())),
    }
}

pub fn print_key_values(rows: &[(String, String)], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KEY", "VALUE"]);
            for (key, value) in rows {
                table.add_row(vec![key.as_str(), value.as_str()]);
            }
            println!("{table}");
        }
        _ => {
            for (key, value) in rows {
                println!("{key} = {value}");
            }
        }
    }
}
