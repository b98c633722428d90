//! Source generators for the scripts run inside the isolate
//!
//! Every invocation runs, in order: the environment script (right after the
//! bridges are installed), then bootstrap, api, execution and summary. An
//! interrupted run ends with the salvage script instead of the summary. Each
//! generator is a pure function of its inputs.

use crate::limits::ExecutionLimits;
use crate::types::LocationHints;
use serde_json::Value;

/// Name of the non-enumerable global holding the frozen capture handle.
pub const CAPTURE_GLOBAL: &str = "__sandboxCapture";

/// Globals that must not be reachable from sandboxed code.
const BLOCKED_GLOBALS: &[&str] = &[
    "Deno",
    "process",
    "require",
    "module",
    "Buffer",
    "fetch",
    "setTimeout",
    "setInterval",
    "setImmediate",
    "clearTimeout",
    "clearInterval",
    "clearImmediate",
    "__bootstrap",
];

const ENVIRONMENT_TEMPLATE: &str = r#"
((blocked) => {
    for (const name of blocked) {
        try {
            delete globalThis[name];
        } catch (_) {}
        if (name in globalThis) {
            try {
                Object.defineProperty(globalThis, name, {
                    value: undefined,
                    writable: false,
                    enumerable: false,
                    configurable: false,
                });
            } catch (_) {}
        }
    }
})(__BLOCKED__);
"#;

const BOOTSTRAP_TEMPLATE: &str = r#"
(() => {
    "use strict";
    const MAX_LOG_LINES = __MAX_LOG_LINES__;
    const stringify = JSON.stringify;
    const toText = String;
    const freeze = Object.freeze;
    const setPrototypeOf = Object.setPrototypeOf;

    // Null-prototype records: user-defined `toJSON` hooks never reach the report.
    const record = (fields) => setPrototypeOf(fields, null);
    const list = () => setPrototypeOf([], null);
    const copy = (lines) => {
        const out = list();
        for (let i = 0; i < lines.length; i++) {
            out[i] = lines[i];
        }
        return out;
    };

    const streams = record({
        stdout: record({ lines: list(), dropped: 0 }),
        stderr: record({ lines: list(), dropped: 0 }),
    });
    let last = freeze(record({ status: "ok", value: undefined, error: null }));

    const describeValue = (value) => {
        switch (typeof value) {
            case "string":
                return value;
            case "undefined":
                return "undefined";
            case "function":
                return `[function ${value.name || "anonymous"}]`;
            case "bigint":
                return `${value}n`;
            case "symbol":
                return value.toString();
        }
        if (value instanceof Error) {
            return value.stack || `${value.name}: ${value.message}`;
        }
        try {
            const json = stringify(value);
            return json === undefined ? toText(value) : json;
        } catch (_) {
            return toText(value);
        }
    };

    const describe = (value) => {
        try {
            return toText(describeValue(value));
        } catch (_) {
            return "[unprintable]";
        }
    };

    const describeError = (error) => {
        try {
            if (error !== null && typeof error === "object") {
                const { name, message, stack } = error;
                return freeze(record({
                    name: typeof name === "string" && name ? name : "Error",
                    message: message === undefined ? toText(error) : toText(message),
                    stack: typeof stack === "string" ? stack : null,
                }));
            }
            return freeze(record({ name: "Error", message: toText(error), stack: null }));
        } catch (_) {
            return freeze(record({
                name: "Error",
                message: "Thrown value could not be described",
                stack: null,
            }));
        }
    };

    const writer = (stream) => (...args) => {
        const target = streams[stream];
        if (target.lines.length >= MAX_LOG_LINES) {
            target.dropped += 1;
            return;
        }
        let line = "";
        for (let i = 0; i < args.length; i++) {
            line += (i === 0 ? "" : " ") + describe(args[i]);
        }
        target.lines[target.lines.length] = line;
    };

    const stdout = writer("stdout");
    const stderr = writer("stderr");

    const capture = freeze(record({
        settle: (value) => {
            last = freeze(record({ status: "ok", value, error: null }));
        },
        fail: (error) => {
            last = freeze(record({ status: "error", value: undefined, error: describeError(error) }));
        },
        outcome: () => last,
        report: (status, value, error) =>
            stringify(record({
                status: status === "error" ? "error" : "ok",
                value: value === undefined ? null : value,
                error: error === null || error === undefined ? null : describeError(error),
                stdout: copy(streams.stdout.lines),
                stderr: copy(streams.stderr.lines),
                truncatedStdout: streams.stdout.dropped,
                truncatedStderr: streams.stderr.dropped,
            })),
    }));

    Object.defineProperty(globalThis, "console", {
        value: freeze({ log: stdout, info: stdout, debug: stdout, warn: stdout, error: stderr }),
        writable: false,
        enumerable: false,
        configurable: false,
    });
    Object.defineProperty(globalThis, "__CAPTURE__", {
        value: capture,
        writable: false,
        enumerable: false,
        configurable: false,
    });
})();
"#;

const API_TEMPLATE: &str = r#"
(() => {
    "use strict";
    const bridge = globalThis.__WEATHER_BRIDGE__;
    const location = __LOCATION__;

    const inRange = (value, limit) =>
        typeof value === "number" && Number.isFinite(value) && Math.abs(value) <= limit;

    const getWeather = async (coordinates) => {
        if (coordinates === null || typeof coordinates !== "object") {
            throw new TypeError("getWeather expects an object with latitude and longitude");
        }
        const { latitude, longitude } = coordinates;
        if (!inRange(latitude, 90)) {
            throw new TypeError("latitude must be a finite number between -90 and 90");
        }
        if (!inRange(longitude, 180)) {
            throw new TypeError("longitude must be a finite number between -180 and 180");
        }
        if (typeof bridge !== "function") {
            throw new Error("Weather bridge is not available");
        }
        const raw = await bridge(JSON.stringify({ latitude, longitude }));
        return JSON.parse(raw);
    };

    const getEstimatedLocation = async () => (location === null ? null : { ...location });

    Object.defineProperty(globalThis, "api", {
        value: Object.freeze({ getWeather, getEstimatedLocation }),
        writable: false,
        enumerable: true,
        configurable: false,
    });
})();
"#;

const EXECUTION_TEMPLATE: &str = r#"
(async () => {
    const capture = __CAPTURE__;
    const source = __SOURCE__;
    const AsyncFunction = Object.getPrototypeOf(async function () {}).constructor;

    try {
        let run;
        try {
            run = new AsyncFunction(`return (\n${source}\n);`);
        } catch (error) {
            if (!(error instanceof SyntaxError)) {
                throw error;
            }
            run = new AsyncFunction(source);
        }
        capture.settle(await run.call(undefined));
    } catch (error) {
        capture.fail(error);
    }
})()
"#;

const SUMMARY_TEMPLATE: &str = r#"
(() => {
    "use strict";
    const MAX_DEPTH = __MAX_DEPTH__;
    const MAX_ITEMS = __MAX_ITEMS__;
    const capture = __CAPTURE__;
    const more = (count) => `[+${count} more]`;
    let path;

    const sanitizeList = (items, depth) => {
        const out = items.slice(0, MAX_ITEMS).map((item) => sanitize(item, depth + 1));
        if (items.length > MAX_ITEMS) {
            out.push(more(items.length - MAX_ITEMS));
        }
        return out;
    };

    const sanitize = (value, depth) => {
        switch (typeof value) {
            case "undefined":
            case "string":
            case "number":
            case "boolean":
                return value;
            case "bigint":
                return `${value}n`;
            case "symbol":
                return value.toString();
            case "function":
                return `[function ${value.name || "anonymous"}]`;
        }
        if (value === null) {
            return null;
        }
        if (value instanceof Date) {
            return Number.isNaN(value.getTime()) ? "Invalid Date" : value.toISOString();
        }
        if (path.has(value)) {
            return "[circular]";
        }
        if (depth >= MAX_DEPTH) {
            return Array.isArray(value) ? "[Array]" : "[Object]";
        }
        path.add(value);
        try {
            if (value instanceof Error) {
                return { name: String(value.name), message: String(value.message) };
            }
            if (value instanceof Map) {
                return sanitizeList(Array.from(value.entries()), depth);
            }
            if (value instanceof Set) {
                return sanitizeList(Array.from(value.values()), depth);
            }
            if (Array.isArray(value)) {
                return sanitizeList(value, depth);
            }
            const keys = Object.keys(value);
            const out = {};
            for (const key of keys.slice(0, MAX_ITEMS)) {
                let item;
                try {
                    item = value[key];
                } catch (_) {
                    item = "[unreadable]";
                }
                out[key] = sanitize(item, depth + 1);
            }
            if (keys.length > MAX_ITEMS) {
                out.__truncated__ = more(keys.length - MAX_ITEMS);
            }
            return out;
        } finally {
            path.delete(value);
        }
    };

    const last = capture.outcome();
    if (last.status === "error") {
        return capture.report("error", null, last.error);
    }
    try {
        path = new WeakSet();
        return capture.report("ok", sanitize(last.value, 0), null);
    } catch (failure) {
        let message;
        try {
            message = String(failure && failure.message);
        } catch (_) {
            message = "Result could not be serialized";
        }
        return capture.report("error", null, { name: "SerializationError", message, stack: null });
    }
})()
"#;

const SALVAGE_TEMPLATE: &str = r#"__CAPTURE__.report("ok", null, null)"#;

/// Removes host globals; runs once the bridges have captured what they need.
pub fn environment_script() -> String {
    let blocked = Value::from(BLOCKED_GLOBALS.to_vec()).to_string();
    ENVIRONMENT_TEMPLATE.replace("__BLOCKED__", &blocked)
}

/// Installs the capturing `console` and the frozen capture handle.
pub fn bootstrap_script(limits: &ExecutionLimits) -> String {
    BOOTSTRAP_TEMPLATE
        .replace("__MAX_LOG_LINES__", &limits.max_log_lines.to_string())
        .replace("__CAPTURE__", CAPTURE_GLOBAL)
}

/// Defines the frozen `api` object over the installed bridge functions.
pub fn api_script(weather_bridge: &str, location: Option<&LocationHints>) -> String {
    let location = location
        .and_then(|hints| serde_json::to_value(hints).ok())
        .unwrap_or(Value::Null)
        .to_string();
    API_TEMPLATE
        .replace("__WEATHER_BRIDGE__", weather_bridge)
        .replace("__LOCATION__", &location)
}

/// Wraps user code: expression first, statement block on `SyntaxError`.
///
/// Only compilation is retried, so code never runs twice.
pub fn execution_script(code: &str) -> String {
    let source = Value::String(code.to_string()).to_string();
    EXECUTION_TEMPLATE
        .replace("__CAPTURE__", CAPTURE_GLOBAL)
        .replace("__SOURCE__", &source)
}

/// Serializes the outcome and console capture into one JSON string.
pub fn summary_script(limits: &ExecutionLimits) -> String {
    SUMMARY_TEMPLATE
        .replace("__MAX_DEPTH__", &limits.max_serialization_depth.to_string())
        .replace("__MAX_ITEMS__", &limits.max_collection_items.to_string())
        .replace("__CAPTURE__", CAPTURE_GLOBAL)
}

/// Reports console output only; never touches the result value.
///
/// Runs after an interrupt, when user getters must not run again.
pub fn salvage_script() -> String {
    SALVAGE_TEMPLATE.replace("__CAPTURE__", CAPTURE_GLOBAL)
}
