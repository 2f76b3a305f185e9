//! Protocol-level tests for the gateway dispatch path.
//!
//! Drives `handle_line` with raw request lines the way the stdio loop
//! does, and checks the response envelopes against the error taxonomy.

use serde_json::{Value, json};

use sketchport::server::{GatewayConfig, handle_line};
use sketchport::tools::MethodRouter;

fn router() -> MethodRouter {
    MethodRouter::new(GatewayConfig::default())
}

fn router_with_root(root: &std::path::Path) -> MethodRouter {
    MethodRouter::new(GatewayConfig {
        sketch_root: root.to_path_buf(),
        ..GatewayConfig::default()
    })
}

fn to_value(resp: sketchport::server::Response) -> Value {
    serde_json::to_value(resp).expect("response serializes")
}

#[test]
fn malformed_line_yields_parse_error_with_null_id() {
    let router = router();

    let resp = handle_line(&router, "{not json").expect("response expected");
    let resp = to_value(resp);
    assert_eq!(resp["error"]["code"], -32700);
    assert_eq!(resp["id"], Value::Null);

    // The stream is not desynchronized: the next valid line still answers.
    let next = handle_line(&router, r#"{"id": 7, "method": "no_such_method"}"#)
        .expect("response expected");
    let next = to_value(next);
    assert_eq!(next["id"], 7);
}

#[test]
fn non_object_json_is_invalid_request() {
    let router = router();
    let resp = to_value(handle_line(&router, "[1, 2, 3]").expect("response expected"));
    assert_eq!(resp["error"]["code"], -32600);
    assert_eq!(resp["id"], Value::Null);
}

#[test]
fn unknown_method_echoes_id() {
    let router = router();
    let resp = to_value(
        handle_line(&router, r#"{"id": "abc", "method": "reboot"}"#).expect("response expected"),
    );
    assert_eq!(resp["error"]["code"], -32601);
    assert_eq!(resp["id"], "abc");
    // The diagnostic names the registered methods.
    assert!(
        resp["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("list_ports"))
    );
}

#[test]
fn missing_method_is_method_not_found() {
    let router = router();
    let resp = to_value(
        handle_line(&router, r#"{"id": 1, "params": {}}"#).expect("response expected"),
    );
    assert_eq!(resp["error"]["code"], -32601);
    assert_eq!(resp["id"], 1);
}

#[test]
fn notification_produces_no_response() {
    let router = router();
    assert!(handle_line(&router, r#"{"method": "list_ports"}"#).is_none());
    assert!(handle_line(&router, r#"{"id": null, "method": "list_ports"}"#).is_none());
}

#[test]
fn list_ports_returns_array_payload() {
    let router = router();
    let resp = to_value(
        handle_line(&router, r#"{"id": 1, "method": "list_ports", "params": {}}"#)
            .expect("response expected"),
    );
    assert_eq!(resp["result"]["version"], "1.0");
    assert!(resp["result"]["data"].is_array());
}

#[test]
fn missing_required_params_are_invalid_params() {
    let router = router();
    let resp = to_value(
        handle_line(
            &router,
            r#"{"id": 2, "method": "compile", "params": {"sketch": "blink"}}"#,
        )
        .expect("response expected"),
    );
    assert_eq!(resp["error"]["code"], -32602);
    assert_eq!(resp["id"], 2);
}

#[test]
fn compile_outside_root_is_invalid_params() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outside = tempfile::tempdir().expect("tempdir");
    std::fs::write(outside.path().join("x.ino"), "").expect("write");
    let router = router_with_root(dir.path());

    let req = json!({
        "id": 3,
        "method": "compile",
        "params": {
            "sketch": outside.path().join("x.ino").to_str().expect("utf-8"),
            "fqbn": "arduino:avr:uno",
        },
    });
    let resp = to_value(handle_line(&router, &req.to_string()).expect("response expected"));
    assert_eq!(resp["error"]["code"], -32602);
    assert!(
        resp["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("allowed root"))
    );
}

#[test]
fn malformed_fqbn_is_invalid_params() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("blink")).expect("mkdir");
    let router = router_with_root(dir.path());

    let req = json!({
        "id": 4,
        "method": "compile",
        "params": { "sketch": "blink", "fqbn": "arduino:avr" },
    });
    let resp = to_value(handle_line(&router, &req.to_string()).expect("response expected"));
    assert_eq!(resp["error"]["code"], -32602);
}

#[test]
fn absurd_timeout_is_invalid_params_not_a_crash() {
    let router = router();
    // Finite and non-negative, but far beyond any representable deadline.
    // Must come back as a response, never unwind the dispatch loop.
    let req = json!({
        "id": 10,
        "method": "serial_send",
        "params": { "port": "/dev/ttyUSB0", "message": "ping", "timeout": 1e300 },
    });
    let resp = to_value(handle_line(&router, &req.to_string()).expect("response expected"));
    assert_eq!(resp["error"]["code"], -32602);
    assert_eq!(resp["id"], 10);

    let req = json!({
        "id": 11,
        "method": "read_serial",
        "params": { "port": "/dev/ttyUSB0", "timeout": 1e300 },
    });
    let resp = to_value(handle_line(&router, &req.to_string()).expect("response expected"));
    assert_eq!(resp["error"]["code"], -32602);
    assert_eq!(resp["id"], 11);
}

#[test]
fn out_of_range_baud_is_invalid_params() {
    let router = router();
    let req = json!({
        "id": 5,
        "method": "serial_send",
        "params": {
            "port": "/dev/ttyUSB0",
            "baudrate": 299,
            "message": "ping",
        },
    });
    let resp = to_value(handle_line(&router, &req.to_string()).expect("response expected"));
    assert_eq!(resp["error"]["code"], -32602);
}

#[test]
fn invalid_port_shape_is_invalid_params() {
    let router = router();
    let req = json!({
        "id": 6,
        "method": "serial_send",
        "params": { "port": "/etc/passwd", "message": "ping" },
    });
    let resp = to_value(handle_line(&router, &req.to_string()).expect("response expected"));
    assert_eq!(resp["error"]["code"], -32602);
}

#[test]
fn unreachable_port_is_an_execution_outcome_not_a_protocol_error() {
    let router = router();
    // Valid shape, but (almost certainly) no such device is attached. The
    // request itself is well-formed, so the open failure is reported inside
    // the success envelope.
    let req = json!({
        "id": 7,
        "method": "serial_send",
        "params": { "port": "/dev/ttyUSB250", "message": "ping", "timeout": 0.2 },
    });
    let resp = to_value(handle_line(&router, &req.to_string()).expect("response expected"));
    assert_eq!(resp["id"], 7);
    assert!(resp["error"].is_null(), "expected a result envelope: {resp}");
    assert_eq!(resp["result"]["version"], "1.0");
    assert_eq!(resp["result"]["data"]["success"], false);
}

#[test]
fn extra_jsonrpc_field_is_tolerated() {
    let router = router();
    let resp = to_value(
        handle_line(
            &router,
            r#"{"jsonrpc": "2.0", "id": 8, "method": "list_ports"}"#,
        )
        .expect("response expected"),
    );
    assert_eq!(resp["id"], 8);
    assert!(resp["result"].is_object());
}

#[test]
fn registry_lists_all_five_methods() {
    let methods = MethodRouter::methods();
    assert_eq!(methods.len(), 5);
    for name in ["list_ports", "compile", "upload", "serial_send", "read_serial"] {
        assert!(methods.contains(&name), "missing {name}");
    }
}

#[test]
fn error_envelope_skips_result_and_vice_versa() {
    let router = router();

    let err = to_value(handle_line(&router, "{oops").expect("response expected"));
    assert!(err.get("result").is_none());

    let ok = to_value(
        handle_line(&router, r#"{"id": 9, "method": "list_ports"}"#).expect("response expected"),
    );
    assert!(ok.get("error").is_none());
}
