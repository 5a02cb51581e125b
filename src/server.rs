//! MCP stdio server loop: line-delimited JSON-RPC 2.0 over stdin/stdout.
//!
//! Only the methods a host actually calls are implemented: `initialize`,
//! `notifications/initialized`, `ping`, `tools/list`, and `tools/call`.
//! Tool failures are reported in-band as structured payloads with
//! `isError`; JSON-RPC errors are reserved for protocol-level problems.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::tools::ToolRegistry;

/// Protocol revisions this server can speak, newest first.
const PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

const JSONRPC_METHOD_NOT_FOUND: i64 = -32601;
const JSONRPC_INVALID_PARAMS: i64 = -32602;

pub async fn run(registry: ToolRegistry) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    info!(tools = registry.len(), "MCP server listening on stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("discarding unparseable frame: {}", e);
                continue;
            }
        };

        let method = message["method"].as_str().unwrap_or_default().to_string();
        let Some(id) = message.get("id").filter(|id| !id.is_null()).cloned() else {
            // Notification; nothing to answer.
            debug!(method = %method, "notification received");
            continue;
        };

        let response = match method.as_str() {
            "initialize" => ok_response(&id, initialize_result(&message["params"])),
            "ping" => ok_response(&id, json!({})),
            "tools/list" => ok_response(&id, json!({ "tools": registry.schemas() })),
            "tools/call" => handle_tool_call(&registry, &id, &message["params"]).await,
            other => error_response(
                &id,
                JSONRPC_METHOD_NOT_FOUND,
                &format!("method '{}' not supported", other),
            ),
        };
        write_frame(&mut stdout, &response).await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

fn initialize_result(params: &Value) -> Value {
    // Echo the client's protocol version when we know it, otherwise answer
    // with our newest.
    let requested = params["protocolVersion"].as_str().unwrap_or_default();
    let version = if PROTOCOL_VERSIONS.contains(&requested) {
        requested
    } else {
        PROTOCOL_VERSIONS[0]
    };
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn handle_tool_call(registry: &ToolRegistry, id: &Value, params: &Value) -> Value {
    let Some(name) = params["name"].as_str() else {
        return error_response(id, JSONRPC_INVALID_PARAMS, "missing tool name");
    };
    let Some(tool) = registry.get(name) else {
        return error_response(
            id,
            JSONRPC_INVALID_PARAMS,
            &format!("unknown tool '{}'", name),
        );
    };

    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    debug!(tool = name, "tool call");

    let (payload, is_error) = match tool.call(arguments).await {
        Ok(payload) => {
            let failed = payload["success"] == json!(false);
            (payload, failed)
        }
        Err(e) => {
            warn!(tool = name, "tool failed: {}", e);
            (e.to_json(), true)
        }
    };

    ok_response(
        id,
        json!({
            "content": [ { "type": "text", "text": payload.to_string() } ],
            "structuredContent": payload,
            "isError": is_error,
        }),
    )
}

fn ok_response(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

async fn write_frame(
    stdout: &mut tokio::io::Stdout,
    response: &Value,
) -> anyhow::Result<()> {
    let mut frame = serde_json::to_vec(response)?;
    frame.push(b'\n');
    stdout.write_all(&frame).await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::{temp_store, MockDiscord};
    use crate::tools::Context;
    use std::sync::Arc;

    async fn test_registry() -> (ToolRegistry, tempfile::NamedTempFile) {
        let (store, db) = temp_store().await;
        let ctx = Context {
            store: Arc::new(store),
            discord: MockDiscord::new(),
            config: Arc::new(Config {
                discord_token: "token".to_string(),
                db_path: ":memory:".to_string(),
                guild_allowlist: Vec::new(),
                log_level: "INFO".to_string(),
                dry_run: false,
            }),
        };
        (ToolRegistry::new(ctx), db)
    }

    #[test]
    fn initialize_echoes_known_protocol_version() {
        let result = initialize_result(&json!({ "protocolVersion": "2024-11-05" }));
        assert_eq!(result["protocolVersion"], json!("2024-11-05"));

        let fallback = initialize_result(&json!({ "protocolVersion": "1999-01-01" }));
        assert_eq!(fallback["protocolVersion"], json!(PROTOCOL_VERSIONS[0]));
    }

    #[tokio::test]
    async fn tool_call_wraps_success_payload() {
        let (registry, _db) = test_registry().await;
        let response = handle_tool_call(
            &registry,
            &json!(1),
            &json!({ "name": "list_servers", "arguments": {} }),
        )
        .await;

        assert_eq!(response["result"]["isError"], json!(false));
        assert_eq!(
            response["result"]["structuredContent"]["success"],
            json!(true)
        );
    }

    #[tokio::test]
    async fn tool_call_surfaces_errors_in_band() {
        let (registry, _db) = test_registry().await;
        let response = handle_tool_call(
            &registry,
            &json!(2),
            &json!({ "name": "get_campaign", "arguments": { "campaign_id": 999 } }),
        )
        .await;

        assert_eq!(response["result"]["isError"], json!(true));
        assert_eq!(
            response["result"]["structuredContent"]["error"]["kind"],
            json!("not_found")
        );
        // In-band, not a JSON-RPC fault.
        assert!(response.get("error").is_none());
    }

    #[tokio::test]
    async fn unknown_tool_is_a_protocol_error() {
        let (registry, _db) = test_registry().await;
        let response =
            handle_tool_call(&registry, &json!(3), &json!({ "name": "no_such_tool" })).await;
        assert_eq!(response["error"]["code"], json!(JSONRPC_INVALID_PARAMS));
    }
}
