//! The single op through which sandboxed code reaches the host

use crate::bridge::BridgeRegistry;
use deno_core::{op2, Extension, OpState};
use deno_error::JsErrorBox;
use std::cell::RefCell;
use std::rc::Rc;

/// Dispatch a bridge call by name.
///
/// Handler failures are encoded in the returned envelope; only a missing
/// registry rejects the op itself.
#[op2(async)]
#[string]
async fn op_sandbox_bridge(
    state: Rc<RefCell<OpState>>,
    #[string] name: String,
    #[string] payload: String,
) -> Result<String, JsErrorBox> {
    let registry = state
        .borrow()
        .try_borrow::<BridgeRegistry>()
        .cloned()
        .ok_or_else(|| JsErrorBox::generic("Bridge registry is not installed"))?;
    tracing::trace!(bridge = %name, payload_len = payload.len(), "Bridge call");
    Ok(registry.dispatch(&name, &payload).await)
}

/// Extension carrying the bridge op.
pub fn sandbox_extension() -> Extension {
    Extension {
        name: "runcode_sandbox",
        ops: std::borrow::Cow::Owned(vec![op_sandbox_bridge()]),
        ..Default::default()
    }
}
