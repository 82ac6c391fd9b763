//! End-to-end scenarios against the reference native operations
//!
//! Every call completes on a native worker thread, never on the caller's.

use handoff_native::builtin_ops;
use handoff_runtime::ffi::{ForeignLibrary, SymbolNames};
use handoff_runtime::{Bridge, ContextTable, ErrorKind, ProcessRequest};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn bridge() -> Bridge {
    Bridge::new(builtin_ops()).unwrap()
}

// ===== Scenarios =====

#[tokio::test]
async fn test_scenario_scalar() {
    let bridge = bridge();
    let result = bridge.run_task(256.0).await.unwrap();
    assert_eq!(format!("{:.6}", result), "16.000000");
}

#[tokio::test]
async fn test_scenario_string_list() {
    let bridge = bridge();
    let strings = bridge.process_string("Hello World").await.unwrap();
    assert_eq!(strings, vec!["Hello World", "Hello World"]);
}

#[tokio::test]
async fn test_scenario_message() {
    let bridge = bridge();
    let request = ProcessRequest::new(
        "Protobuf测试",
        3.14159,
        vec!["tag1".into(), "tag2".into(), "protobuf".into()],
    );

    let response = bridge.process_message(&request).await.unwrap();

    assert!(response.success);
    assert_eq!(
        response.result_strings,
        vec![
            "Protobuf测试_processed",
            "generated_string",
            "Protobuf测试_final"
        ]
    );
    assert!((response.calculated_value - 1.772453).abs() < 1e-6);
    assert!(response.error_message.is_empty());
    assert!(response.timestamp > 0);
}

#[rstest]
#[case::zero(0.0, 0.0)]
#[case::one(1.0, 1.0)]
#[case::large(1.0e12, 1.0e6)]
fn test_scalar_cases(#[case] input: f64, #[case] expected: f64) {
    let bridge = bridge();
    let result = handoff_runtime::block_on(bridge.run_task(input)).unwrap().unwrap();
    assert_eq!(result, expected);
}

#[test]
fn test_negative_input_yields_nan() {
    let bridge = bridge();
    let result = handoff_runtime::block_on(bridge.run_task(-1.0)).unwrap().unwrap();
    assert!(result.is_nan());
}

#[tokio::test]
async fn test_empty_string_round_trip() {
    let bridge = bridge();
    assert_eq!(bridge.process_string("").await.unwrap(), vec!["", ""]);
}

// ===== Concurrency =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_calls_in_flight() {
    let bridge = Arc::new(bridge());

    let scalars: Vec<_> = (0..100u32)
        .map(|i| {
            let bridge = bridge.clone();
            tokio::spawn(async move { (i, bridge.run_task(f64::from(i * i)).await) })
        })
        .collect();
    let strings: Vec<_> = (0..50u32)
        .map(|i| {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                let text = format!("call-{}", i);
                (text.clone(), bridge.process_string(&text).await)
            })
        })
        .collect();

    for task in scalars {
        let (i, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), f64::from(i));
    }
    for task in strings {
        let (text, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), vec![text.clone(), text]);
    }
    assert_eq!(bridge.table().pending(), 0);
}

// ===== Failures =====

#[tokio::test]
async fn test_malformed_request_gets_failure_response() {
    let bridge = bridge();
    let result = bridge
        .call(
            handoff_runtime::Operation::ProcessMessage,
            handoff_runtime::RequestPayload::Binary(vec![0xff, 0xff, 0xff]),
        )
        .await
        .unwrap();

    match result {
        handoff_runtime::ResultPayload::Message(response) => {
            assert!(!response.success);
            assert!(!response.error_message.is_empty());
        }
        other => panic!("expected a message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nul_in_text_never_reaches_native() {
    let bridge = bridge();
    let err = bridge.process_string("a\0b").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailure);
    assert_eq!(bridge.table().pending(), 0);
}

#[tokio::test]
async fn test_timeout_is_generous_enough_for_native_calls() {
    let bridge = bridge().with_timeout(Duration::from_secs(5));
    assert_eq!(bridge.run_task(81.0).await.unwrap(), 9.0);
}

// ===== Dynamic loading =====

/// Locate the cdylib built next to this test binary, if cargo produced one
fn built_library() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let deps = exe.parent()?;
    let file = if cfg!(target_os = "windows") {
        "handoff_native.dll"
    } else if cfg!(target_os = "macos") {
        "libhandoff_native.dylib"
    } else {
        "libhandoff_native.so"
    };
    [deps.join(file), deps.parent()?.join(file)]
        .into_iter()
        .find(|path| path.exists())
}

#[tokio::test]
async fn test_loaded_library_runs_scenarios() {
    let Some(path) = built_library() else {
        eprintln!("skipping: handoff_native cdylib not found next to the test binary");
        return;
    };

    let library = ForeignLibrary::open(path.to_str().unwrap(), &SymbolNames::default()).unwrap();
    let bridge = Bridge::with_library(ContextTable::new().unwrap(), library.clone());

    assert_eq!(bridge.run_task(256.0).await.unwrap(), 16.0);
    assert_eq!(
        bridge.process_string("Hello World").await.unwrap(),
        vec!["Hello World", "Hello World"]
    );
    drop(bridge);
    // Native workers may still be returning into library code
    std::mem::forget(library);
}

#[test]
fn test_missing_symbol_is_reported() {
    let Some(path) = built_library() else {
        return;
    };
    let symbols = SymbolNames {
        scalar: "no_such_export".into(),
        ..SymbolNames::default()
    };
    let err = ForeignLibrary::open(path.to_str().unwrap(), &symbols).unwrap_err();
    assert!(err.to_string().contains("no_such_export"));
}
