//! Builders for frames a Core sends.

use serde_json::{Value, json};

/// Method name of `request`, or `""` when absent.
#[must_use]
pub fn method_of(request: &Value) -> &str { request["method"].as_str().unwrap_or_default() }

/// Successful reply to `request`.
#[must_use]
pub fn result_for(request: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
}

/// Error reply to `request`.
#[must_use]
pub fn error_for(request: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "error": {"code": code, "message": message},
    })
}

/// Unsolicited `EngineStatus` notification.
#[must_use]
pub fn engine_status(state: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "EngineStatus",
        "params": {
            "State": state,
            "DesignName": "Test Design",
            "DesignCode": "abc123",
            "IsRedundant": false,
            "IsEmulator": true,
            "Platform": "Core 110f",
        },
    })
}

/// Unsolicited `ChangeGroup.Poll` for `group` listing `changes` in order.
#[must_use]
pub fn change_poll(group: &str, changes: &[(&str, Value)]) -> Value {
    let changes: Vec<Value> = changes
        .iter()
        .map(|(name, value)| json!({"Name": name, "Value": value, "String": value.to_string()}))
        .collect();
    json!({
        "jsonrpc": "2.0",
        "method": "ChangeGroup.Poll",
        "params": {"Id": group, "Changes": changes},
    })
}

/// Unsolicited `ChangeGroup.Poll` carrying its changes as a `result`, each
/// given as `(name, value, string)`.
#[must_use]
pub fn change_poll_result(group: &str, changes: &[(&str, Value, &str)]) -> Value {
    let changes: Vec<Value> = changes
        .iter()
        .map(|(name, value, string)| json!({"Name": name, "Value": value, "String": string}))
        .collect();
    json!({
        "jsonrpc": "2.0",
        "method": "ChangeGroup.Poll",
        "result": {"Id": group, "Changes": changes},
    })
}

/// Responder acknowledging every request with `true`.
#[must_use]
pub fn ack(request: &Value) -> Vec<Value> { vec![result_for(request, Value::Bool(true))] }

/// Responder that never replies.
#[must_use]
pub fn silent(_request: &Value) -> Vec<Value> { Vec::new() }
