use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use platchan_codec::MethodError;
use platchan_transport::DispatchStats;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Serialize)]
struct InvokeOutput<'a> {
    channel: &'a str,
    method: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a MethodError>,
    timestamp: String,
}

/// Print the outcome of one method invocation.
pub fn print_invoke(
    channel: &str,
    method: &str,
    outcome: Result<&Value, &MethodError>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = InvokeOutput {
                channel,
                method,
                ok: outcome.is_ok(),
                result: outcome.ok(),
                error: outcome.err(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);
            match outcome {
                Ok(result) => {
                    table
                        .set_header(vec!["CHANNEL", "METHOD", "RESULT"])
                        .add_row(vec![channel.to_string(), method.to_string(), compact(result)]);
                }
                Err(err) => {
                    table
                        .set_header(vec!["CHANNEL", "METHOD", "CODE", "MESSAGE", "DETAILS"])
                        .add_row(vec![
                            channel.to_string(),
                            method.to_string(),
                            err.code.clone(),
                            err.message.clone(),
                            compact(&err.details),
                        ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => match outcome {
            Ok(result) => println!(
                "{channel} {method} -> {}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| compact(result))
            ),
            Err(err) => println!(
                "{channel} {method} failed: {err} details={}",
                compact(&err.details)
            ),
        },
        OutputFormat::Raw => match outcome {
            Ok(result) => print_raw(compact(result).as_bytes()),
            Err(err) => print_raw(format!("{err}").as_bytes()),
        },
    }
}

#[derive(Serialize)]
struct LinkSummary<'a> {
    link_id: &'a str,
    codec: &'a str,
    completed: u64,
    failed: u64,
    rejected: u64,
    timestamp: String,
}

/// Print dispatch counters for a link that has closed.
pub fn print_link_summary(link_id: &str, codec: &str, stats: &DispatchStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = LinkSummary {
                link_id,
                codec,
                completed: stats.completed,
                failed: stats.failed,
                rejected: stats.rejected,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["LINK", "CODEC", "COMPLETED", "FAILED", "REJECTED"])
                .add_row(vec![
                    link_id.to_string(),
                    codec.to_string(),
                    stats.completed.to_string(),
                    stats.failed.to_string(),
                    stats.rejected.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "link={link_id} codec={codec} completed={} failed={} rejected={}",
                stats.completed, stats.failed, stats.rejected
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
