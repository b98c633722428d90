//! Host functions reachable from the isolate
//!
//! A bridge function takes one JSON string and resolves to one JSON string.
//! The isolate never sees host objects: every reply is an envelope
//! (`{"ok":true,"value":...}` or `{"ok":false,"error":{name,message}}`) that
//! the installed wrapper unpacks into a value or a thrown error.

use crate::coerce::coordinates_from_value;
use crate::deadline::Deadline;
use crate::error::{Result, SandboxError};
use crate::weather::WeatherClient;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Global name of the weather bridge inside the isolate.
pub const WEATHER_BRIDGE: &str = "__sandbox_getWeather";

/// A host capability exposed to sandboxed code.
#[async_trait]
pub trait BridgeHandler: Send + Sync {
    /// Handle a raw JSON payload and return a JSON reply.
    async fn call(&self, payload: &str) -> Result<String>;
}

/// Named set of bridge functions for one invocation.
#[derive(Clone, Default)]
pub struct BridgeRegistry {
    handlers: Arc<HashMap<String, Arc<dyn BridgeHandler>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: Arc<dyn BridgeHandler>) -> Self {
        Arc::make_mut(&mut self.handlers).insert(name.into(), handler);
        self
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a bridge call and encode its outcome as an envelope.
    pub async fn dispatch(&self, name: &str, payload: &str) -> String {
        let outcome = match self.handlers.get(name) {
            Some(handler) => handler.call(payload).await,
            None => Err(SandboxError::Vm {
                name: "TypeError".to_string(),
                message: format!("Unknown bridge function '{}'", name),
                stack: None,
            }),
        };
        if let Err(err) = &outcome {
            tracing::debug!(bridge = name, error = %err, "Bridge call failed");
        }
        encode_envelope(outcome)
    }

    /// Script that defines one global async wrapper per bridge over the op.
    ///
    /// Must run before the host globals are removed.
    pub fn install_script(&self) -> String {
        let names = Value::from(self.names()).to_string();
        INSTALL_TEMPLATE.replace("__NAMES__", &names)
    }
}

const INSTALL_TEMPLATE: &str = r#"
((op, names) => {
    const native = { Error, TypeError, RangeError, SyntaxError };
    const toError = ({ name, message }) => {
        const Ctor = Object.hasOwn(native, name) ? native[name] : Error;
        const error = new Ctor(message);
        if (Ctor === Error && name !== "Error") {
            error.name = name;
        }
        return error;
    };
    for (const name of names) {
        const call = async (payload) => {
            const envelope = JSON.parse(await op(name, String(payload)));
            if (envelope.ok) {
                return envelope.value;
            }
            throw toError(envelope.error);
        };
        Object.defineProperty(globalThis, name, {
            value: call,
            writable: false,
            enumerable: false,
            configurable: false,
        });
    }
    const core = globalThis.Deno && globalThis.Deno.core;
    if (core && typeof core.setUnhandledPromiseRejectionHandler === "function") {
        core.setUnhandledPromiseRejectionHandler(() => true);
    }
})(Deno.core.ops.op_sandbox_bridge, __NAMES__);
"#;

#[derive(Serialize)]
struct Envelope {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Fault>,
}

#[derive(Serialize)]
struct Fault {
    name: String,
    message: String,
}

fn encode_envelope(outcome: Result<String>) -> String {
    let envelope = match outcome {
        Ok(value) => Envelope {
            ok: true,
            value: Some(value),
            error: None,
        },
        Err(err) => Envelope {
            ok: false,
            value: None,
            error: Some(Fault {
                name: err.name().to_string(),
                message: err.to_string(),
            }),
        },
    };
    serde_json::to_string(&envelope).unwrap_or_else(|_| {
        r#"{"ok":false,"error":{"name":"Error","message":"Bridge reply could not be encoded"}}"#
            .to_string()
    })
}

/// `api.getWeather` on the host side.
pub struct WeatherBridge {
    client: Arc<dyn WeatherClient>,
    deadline: Deadline,
}

impl WeatherBridge {
    pub fn new(client: Arc<dyn WeatherClient>, deadline: Deadline) -> Self {
        Self { client, deadline }
    }
}

#[async_trait]
impl BridgeHandler for WeatherBridge {
    async fn call(&self, payload: &str) -> Result<String> {
        let value: Value = serde_json::from_str(payload).map_err(|e| SandboxError::Vm {
            name: "SyntaxError".to_string(),
            message: format!("Invalid weather request payload: {}", e),
            stack: None,
        })?;
        let coordinates = coordinates_from_value(&value)?;

        let remaining = self.deadline.remaining();
        if remaining.is_zero() {
            return Err(SandboxError::Timeout {
                timeout_ms: self.deadline.budget_ms(),
            });
        }

        self.client.fetch_weather(coordinates, remaining).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinates;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    struct Recording {
        calls: Mutex<Vec<(Coordinates, Duration)>>,
    }

    #[async_trait]
    impl WeatherClient for Recording {
        async fn fetch_weather(&self, coordinates: Coordinates, timeout: Duration) -> Result<String> {
            self.calls.lock().unwrap().push((coordinates, timeout));
            Ok(r#"{"current":{"temperature_2m":21.5}}"#.to_string())
        }
    }

    fn recording() -> Arc<Recording> {
        Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn parse(envelope: &str) -> Value {
        serde_json::from_str(envelope).unwrap()
    }

    #[tokio::test]
    async fn test_weather_bridge_passes_remaining_budget() {
        let client = recording();
        let bridge = WeatherBridge::new(client.clone(), Deadline::after(Duration::from_secs(2)));
        let reply = bridge.call(r#"{"latitude":10,"longitude":20}"#).await.unwrap();
        assert!(reply.contains("temperature_2m"));

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.latitude, 10.0);
        assert!(calls[0].1 <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_weather_bridge_fails_fast_after_deadline() {
        let client = recording();
        let expired = Deadline::starting_at(Instant::now() - Duration::from_secs(1), Duration::from_millis(250));
        let bridge = WeatherBridge::new(client.clone(), expired);
        let err = bridge.call(r#"{"latitude":1,"longitude":2}"#).await.unwrap_err();
        assert_eq!(err, SandboxError::Timeout { timeout_ms: 250 });
        assert!(client.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_weather_bridge_rejects_bad_payloads() {
        let bridge = WeatherBridge::new(recording(), Deadline::after(Duration::from_secs(2)));
        let err = bridge.call("not json").await.unwrap_err();
        assert_eq!(err.name(), "SyntaxError");
        let err = bridge.call(r#"{"latitude":999,"longitude":0}"#).await.unwrap_err();
        assert_eq!(err.name(), "ValidationError");
    }

    #[tokio::test]
    async fn test_dispatch_envelopes() {
        let registry = BridgeRegistry::new().with_handler(
            WEATHER_BRIDGE,
            Arc::new(WeatherBridge::new(recording(), Deadline::after(Duration::from_secs(2)))),
        );

        let ok = parse(&registry.dispatch(WEATHER_BRIDGE, r#"{"latitude":0,"longitude":0}"#).await);
        assert_eq!(ok["ok"], true);
        assert!(ok["value"].as_str().unwrap().contains("21.5"));
        assert!(ok.get("error").is_none());

        let unknown = parse(&registry.dispatch("__sandbox_missing", "{}").await);
        assert_eq!(unknown["ok"], false);
        assert_eq!(unknown["error"]["name"], "TypeError");
    }

    #[test]
    fn test_install_script_lists_bridges() {
        let registry = BridgeRegistry::new().with_handler(
            WEATHER_BRIDGE,
            Arc::new(WeatherBridge::new(recording(), Deadline::after(Duration::from_secs(1)))),
        );
        assert_eq!(registry.names(), vec![WEATHER_BRIDGE.to_string()]);
        let script = registry.install_script();
        assert!(script.contains(r#"["__sandbox_getWeather"]"#));
        assert!(script.contains("Deno.core.ops.op_sandbox_bridge"));
    }
}
