//! Sandboxed code must not reach host capabilities except through `api.*`

mod common;

use common::*;
use serde_json::json;

#[tokio::test]
async fn test_host_identifiers_are_not_defined() {
    for name in ["process", "require", "fetch", "Buffer"] {
        let result = run(&format!("return {}.toString();", name)).await;
        assert_eq!(error_name(&result), "ReferenceError", "{} was reachable", name);
        assert!(
            result.error().unwrap().message.contains("is not defined"),
            "{}: {}",
            name,
            result.error().unwrap().message
        );
    }
}

#[tokio::test]
async fn test_runtime_globals_are_removed() {
    let code = r#"
        return [
            typeof Deno,
            typeof setTimeout,
            typeof setInterval,
            typeof clearTimeout,
            typeof clearInterval,
        ];
    "#;
    let result = run(code).await;
    assert_eq!(
        result.result(),
        Some(&json!(["undefined", "undefined", "undefined", "undefined", "undefined"]))
    );
}

#[tokio::test]
async fn test_api_object_is_frozen() {
    let code = r#"
        api.getWeather = () => "hijacked";
        api.extra = 1;
        return [typeof api.getWeather, api.extra === undefined, Object.isFrozen(api)];
    "#;
    let result = run(code).await;
    assert_eq!(result.result(), Some(&json!(["function", true, true])));
}

#[tokio::test]
async fn test_api_cannot_be_replaced() {
    let result = run("'use strict'; globalThis.api = {}; return 1;").await;
    assert_eq!(error_name(&result), "TypeError");
}

#[tokio::test]
async fn test_console_cannot_be_redirected() {
    let result = run("console.log = () => {}; console.log('still captured'); return 1;").await;
    assert_eq!(result.stdout(), ["still captured"]);
}

#[tokio::test]
async fn test_internal_globals_are_not_enumerable() {
    let result = run("return Object.keys(globalThis).filter((k) => k.startsWith('__sandbox'));").await;
    assert_eq!(result.result(), Some(&json!([])));
}

#[tokio::test]
async fn test_direct_bridge_call_is_still_validated() {
    let weather = StubWeather::ok(WEATHER_BODY);
    let code = r#"
        try {
            await globalThis.__sandbox_getWeather('{"latitude":500,"longitude":0}');
            return "unreachable";
        } catch (error) {
            return error.name;
        }
    "#;
    let result = executor_with(weather.clone())
        .execute(
            runcode_sandbox::ExecutionInput::new(code),
            &runcode_sandbox::RequestHints::default(),
        )
        .await;
    assert_eq!(result.result(), Some(&json!("ValidationError")));
    assert!(weather.calls().is_empty());
}

#[tokio::test]
async fn test_capture_handle_cannot_be_tampered_with() {
    let code = r#"
        const handle = __sandboxCapture;
        handle.droppedStdout = "x";
        handle.stdout = null;
        handle.report = () => "{}";
        try { handle.outcome().status = "error"; } catch (_) {}
        console.log("after");
        return [Object.isFrozen(handle), Object.keys(handle).includes("stdout")];
    "#;
    let result = run(code).await;
    assert!(result.success(), "{:?}", result.error());
    assert_eq!(result.result(), Some(&json!([true, false])));
    assert_eq!(result.stdout(), ["after"]);
    assert_eq!(result.trailer().truncated_stdout, 0);
}

#[tokio::test]
async fn test_forged_failure_is_still_a_user_error() {
    let result = run("__sandboxCapture.fail({ name: 5, message: { toString() { return 'forged'; } } }); return 1;").await;
    assert_eq!(result.result(), Some(&json!(1)));

    let result = run("__sandboxCapture.fail({ name: 5, message: 'forged' }); throw 'real';").await;
    assert_eq!(error_name(&result), "Error");
    assert_eq!(result.error().unwrap().message, "real");
}

#[tokio::test]
async fn test_prototype_tampering_does_not_break_reporting() {
    let code = r#"
        JSON.stringify = () => "not json";
        Object.prototype.toJSON = function () { return "hijacked"; };
        Array.prototype.push = () => { throw new Error("no push"); };
        Array.prototype.toJSON = () => 0;
        console.log("line", 1);
        return 2;
    "#;
    let result = run(code).await;
    assert!(result.success(), "{:?}", result.error());
    assert_eq!(result.result(), Some(&json!(2)));
    assert_eq!(result.stdout(), ["line 1"]);
}
