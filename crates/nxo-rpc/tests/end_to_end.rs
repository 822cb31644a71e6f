//! Two channels talking over in-memory links.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use nxo_rpc::{CallError, CallId, LoopbackPair, RpcConfig, RpcMessage};
use serde_json::{json, Value};

fn double(args: Vec<Value>) -> Result<Value, String> {
    let x = args.first().and_then(Value::as_i64).ok_or("expected a number")?;
    Ok(json!(x * 2))
}

#[test]
fn test_double_round_trip() {
    let mut link = LoopbackPair::new(RpcConfig::default());
    link.b.register_function("double", double).unwrap();

    let id = link.a.call_remote_function("double", vec![json!(21)]).unwrap();
    assert_eq!(id, CallId(0));
    assert_eq!(link.a.try_take_result(id), None);

    link.pump();
    assert_eq!(link.a.try_take_result(id), Some(Ok(json!(42))));
    assert_eq!(link.a.try_take_result(id), None);
}

#[test]
fn test_double_round_trip_reference_protocol() {
    let mut link = LoopbackPair::new(RpcConfig::REFERENCE);
    link.b.register_function("double", double).unwrap();

    let id = link.a.call_remote_function("double", vec![json!(21)]).unwrap();
    link.pump();
    assert_eq!(link.a.try_take_result(id), Some(Ok(json!(42))));
}

#[test]
fn test_concurrent_calls_get_their_own_results() {
    let mut link = LoopbackPair::new(RpcConfig::default());
    link.b.register_function("double", double).unwrap();
    link.b
        .register_function("greet", |args| {
            let name = args.first().and_then(Value::as_str).unwrap_or("world");
            Ok(json!(format!("hello {name}")))
        })
        .unwrap();

    let first = link.a.call_remote_function("greet", vec![json!("nxo")]).unwrap();
    let second = link.a.call_remote_function("double", vec![json!(5)]).unwrap();
    assert_ne!(first, second);

    link.pump();
    assert_eq!(link.a.try_take_result(second), Some(Ok(json!(10))));
    assert_eq!(link.a.try_take_result(first), Some(Ok(json!("hello nxo"))));
}

#[test]
fn test_both_directions_share_one_link() {
    let mut link = LoopbackPair::new(RpcConfig::default());
    link.a.register_function("gain", |_| Ok(json!(-10.0))).unwrap();
    link.b.register_function("double", double).unwrap();

    let from_a = link.a.call_remote_function("double", vec![json!(4)]).unwrap();
    let from_b = link.b.call_remote_function("gain", Vec::new()).unwrap();

    // Each side allocates ids independently.
    assert_eq!(from_a, CallId(0));
    assert_eq!(from_b, CallId(0));

    link.pump();
    assert_eq!(link.a.try_take_result(from_a), Some(Ok(json!(8))));
    assert_eq!(link.b.try_take_result(from_b), Some(Ok(json!(-10.0))));
}

#[test]
fn test_unknown_function_reports_not_found() {
    let mut link = LoopbackPair::new(RpcConfig::default());
    let id = link.a.call_remote_function("nope", Vec::new()).unwrap();
    link.pump();
    assert_eq!(link.a.try_take_result(id), Some(Err(CallError::NotFound)));
}

#[test]
fn test_failing_function_reports_failure() {
    let mut link = LoopbackPair::new(RpcConfig::default());
    link.b.register_function("double", double).unwrap();

    let id = link.a.call_remote_function("double", vec![json!("x")]).unwrap();
    link.pump();
    assert_eq!(
        link.a.try_take_result(id),
        Some(Err(CallError::Failed("expected a number".into())))
    );
}

#[test]
fn test_late_async_result_is_pushed() {
    let mut link = LoopbackPair::new(RpcConfig::default());
    let (tx, rx) = oneshot::channel::<Value>();
    let rx = Arc::new(Mutex::new(Some(rx)));
    link.b
        .register_async_function("compile", move |_| {
            let rx = rx.lock().unwrap().take();
            async move {
                match rx {
                    Some(rx) => rx.await.map_err(|e| e.to_string()),
                    None => Err("busy".to_string()),
                }
            }
        })
        .unwrap();

    let id = link.a.call_remote_function("compile", vec![json!("return 1")]).unwrap();
    link.pump();
    assert_eq!(link.a.try_take_result(id), None);
    assert_eq!(link.b.in_flight(), 1);

    tx.send(json!({ "ok": true })).unwrap();
    link.b.tick(Instant::now());
    link.pump();

    assert_eq!(link.a.try_take_result(id), Some(Ok(json!({ "ok": true }))));
}

#[test]
fn test_lost_poll_recovered_by_resend() {
    let config = RpcConfig::REFERENCE
        .with_poll_interval(Some(Duration::from_millis(10)))
        .with_max_poll_interval(Duration::from_millis(10));
    let mut link = LoopbackPair::new(config);
    let (tx, rx) = oneshot::channel::<Value>();
    let rx = Arc::new(Mutex::new(Some(rx)));
    link.b
        .register_async_function("slow", move |_| {
            let rx = rx.lock().unwrap().take();
            async move {
                match rx {
                    Some(rx) => rx.await.map_err(|e| e.to_string()),
                    None => Err("busy".to_string()),
                }
            }
        })
        .unwrap();

    let id = link.a.call_remote_function("slow", Vec::new()).unwrap();
    link.pump();
    assert_eq!(link.b.in_flight(), 1);

    tx.send(json!("done")).unwrap();
    link.b.tick(Instant::now());
    assert_eq!(link.b.pending_results(), 1);
    link.pump();
    assert_eq!(link.a.try_take_result(id), None);

    link.a.tick(Instant::now() + Duration::from_millis(10));
    assert_eq!(link.a_to_b.len(), 1);
    link.pump();
    assert_eq!(link.a.try_take_result(id), Some(Ok(json!("done"))));
}

#[test]
fn test_wire_json_round_trip_between_channels() {
    // Route messages as JSON text, the way the webview bridge does.
    let to_b: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&to_b);
    let mut a = nxo_rpc::RpcChannel::new(move |msg: RpcMessage| {
        sink.lock().unwrap().push(msg.to_json().unwrap());
    });

    let to_a: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&to_a);
    let mut b = nxo_rpc::RpcChannel::new(move |msg: RpcMessage| {
        sink.lock().unwrap().push(msg.to_json().unwrap());
    });
    b.register_function("double", double).unwrap();

    let id = a.call_remote_function("double", vec![json!(21)]).unwrap();
    for json in std::mem::take(&mut *to_b.lock().unwrap()) {
        b.handle_json(&json);
    }
    for json in std::mem::take(&mut *to_a.lock().unwrap()) {
        a.handle_json(&json);
    }
    assert_eq!(a.try_take_result(id), Some(Ok(json!(42))));
}
