//! Single-call commands: scalar, strings, message

use super::Output;
use anyhow::Result;
use handoff_runtime::{block_on, Bridge, ProcessRequest, ProcessResponse};
use serde_json::json;

pub fn scalar(bridge: &Bridge, value: f64, output: Output) -> Result<()> {
    let result = block_on(bridge.run_task(value))?.map_err(|e| output.fail("scalar", e))?;

    if output.json {
        output.emit_json(&json!({ "input": value, "result": result }))
    } else {
        println!("{:.6}", result);
        Ok(())
    }
}

pub fn strings(bridge: &Bridge, text: &str, output: Output) -> Result<()> {
    let strings = block_on(bridge.process_string(text))?.map_err(|e| output.fail("strings", e))?;

    if output.json {
        output.emit_json(&json!({ "input": text, "strings": strings }))
    } else {
        print_strings(&strings);
        Ok(())
    }
}

pub fn message(
    bridge: &Bridge,
    text: String,
    number: f64,
    tags: Vec<String>,
    output: Output,
) -> Result<()> {
    let request = ProcessRequest::new(text, number, tags);
    let response =
        block_on(bridge.process_message(&request))?.map_err(|e| output.fail("message", e))?;

    if output.json {
        output.emit_json(&response_json(&response))
    } else {
        print_response(&response);
        Ok(())
    }
}

pub(crate) fn print_strings(strings: &[String]) {
    for (i, s) in strings.iter().enumerate() {
        println!("[{}] = \"{}\"", i, s);
    }
}

pub(crate) fn print_response(response: &ProcessResponse) {
    println!("success: {}", response.success);
    if !response.error_message.is_empty() {
        println!("error_message: {}", response.error_message);
    }
    println!("calculated_value: {:.6}", response.calculated_value);
    println!("timestamp: {}", response.timestamp);
    println!("result_strings:");
    for (i, s) in response.result_strings.iter().enumerate() {
        println!("  [{}] = \"{}\"", i, s);
    }
}

pub(crate) fn response_json(response: &ProcessResponse) -> serde_json::Value {
    json!({
        "success": response.success,
        "error_message": response.error_message,
        "calculated_value": response.calculated_value,
        "timestamp": response.timestamp,
        "result_strings": response.result_strings,
    })
}
