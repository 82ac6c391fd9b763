//! Demo command - the three end-to-end scenarios in sequence

use super::invoke::{print_response, print_strings, response_json};
use super::Output;
use anyhow::Result;
use handoff_runtime::{block_on, Bridge, ProcessRequest};
use serde_json::json;
use std::time::Instant;

const SCALAR_INPUT: f64 = 256.0;
const STRING_INPUT: &str = "Hello World";

fn message_request() -> ProcessRequest {
    ProcessRequest::new(
        "Protobuf测试",
        3.14159,
        vec!["tag1".into(), "tag2".into(), "protobuf".into()],
    )
}

pub fn run(bridge: &Bridge, output: Output) -> Result<()> {
    let request = message_request();

    block_on(async {
        let started = Instant::now();

        let scalar = bridge
            .run_task(SCALAR_INPUT)
            .await
            .map_err(|e| output.fail("scalar", e))?;
        let strings = bridge
            .process_string(STRING_INPUT)
            .await
            .map_err(|e| output.fail("strings", e))?;
        let response = bridge
            .process_message(&request)
            .await
            .map_err(|e| output.fail("message", e))?;

        tracing::debug!(elapsed = ?started.elapsed(), "demo finished");

        if output.json {
            output.emit_json(&json!({
                "scalar": { "input": SCALAR_INPUT, "result": scalar },
                "strings": { "input": STRING_INPUT, "strings": strings },
                "message": response_json(&response),
            }))
        } else {
            println!("== scalar ({}) ==", SCALAR_INPUT);
            println!("{:.6}", scalar);
            println!("== strings (\"{}\") ==", STRING_INPUT);
            print_strings(&strings);
            println!("== message (\"{}\") ==", request.input_text);
            print_response(&response);
            Ok(())
        }
    })?
}
