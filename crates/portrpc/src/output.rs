use std::io::{IsTerminal, Write};
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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
struct ResponseOutput<'a> {
    schema_id: &'a str,
    elapsed_ms: u128,
    ok: bool,
    response: &'a Value,
}

pub fn print_response(response: &Value, elapsed: Duration, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                schema_id: "https://schemas.3leaps.dev/portrpc/cli/v1/rpc-response.schema.json",
                elapsed_ms: elapsed.as_millis(),
                ok: !has_error(response),
                response,
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
                .set_header(vec!["ID", "STATUS", "VALUE"]);
            for entry in entries(response) {
                table.add_row(vec![
                    compact(entry.get("id").unwrap_or(&Value::Null)),
                    status(entry).to_string(),
                    compact(entry.get("result").or_else(|| entry.get("error")).unwrap_or(&Value::Null)),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in entries(response) {
                println!(
                    "id={} status={} value={}",
                    compact(entry.get("id").unwrap_or(&Value::Null)),
                    status(entry),
                    serde_json::to_string_pretty(
                        entry.get("result").or_else(|| entry.get("error")).unwrap_or(&Value::Null)
                    )
                    .unwrap_or_default()
                );
            }
            println!("elapsed={}ms", elapsed.as_millis());
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            let _ = writeln!(out, "{}", compact(response));
            let _ = out.flush();
        }
    }
}

/// Returns true if the response, or any element of a batch response,
/// carries a JSON-RPC error.
pub fn has_error(response: &Value) -> bool {
    entries(response).any(|entry| entry.get("error").is_some())
}

fn entries(response: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match response {
        Value::Array(batch) => Box::new(batch.iter()),
        other => Box::new(std::iter::once(other)),
    }
}

fn status(entry: &Value) -> &'static str {
    if entry.get("error").is_some() {
        "error"
    } else {
        "ok"
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn has_error_checks_every_batch_element() {
        assert!(!has_error(&json!({"id": 1, "result": "0x0"})));
        assert!(has_error(&json!({"id": 1, "error": {"code": -1}})));
        assert!(has_error(&json!([
            {"id": 1, "result": "0x0"},
            {"id": 2, "error": {"code": -1}},
        ])));
    }

    #[test]
    fn compact_unquotes_strings() {
        assert_eq!(compact(&json!("0x1")), "0x1");
        assert_eq!(compact(&json!({"a": 1})), "{\"a\":1}");
    }
}
