//! Panic and timeout isolation for tool handler invocations.
//!
//! A handler may fail in three ways: it returns a [`ToolError`], it panics, or it
//! never finishes. All three are turned into an error [`ToolResult`] routed back
//! to the model, so a single bad handler never takes the session down.
//!
//! Panics are caught both while the handler future is created and while it is
//! polled. A panic inside a task the handler spawns itself is not caught.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;

use super::registry::Tool;
use super::types::{ToolContext, ToolResult};

/// Runs `tool` with panic catching and a time limit, always producing a result.
pub async fn invoke_isolated(
    tool: Arc<Tool>,
    arguments: Value,
    context: ToolContext,
    limit: Duration,
) -> ToolResult {
    let name = tool.name().to_string();
    let call_id = context.call_id.clone();

    let call = AssertUnwindSafe(async move { tool.invoke(arguments, context).await }).catch_unwind();

    match tokio::time::timeout(limit, call).await {
        Ok(Ok(Ok(result))) => result,
        Ok(Ok(Err(e))) => {
            tracing::warn!(tool = %name, call_id = %call_id, error = %e, "Tool handler failed");
            ToolResult::error(e.to_string())
        }
        Ok(Err(panic_info)) => {
            let msg = extract_panic_message(&panic_info);
            tracing::error!(tool = %name, call_id = %call_id, message = %msg, "Tool handler panicked");
            ToolResult::error(format!("Tool {name} failed unexpectedly"))
        }
        Err(_) => {
            tracing::warn!(tool = %name, call_id = %call_id, timeout = ?limit, "Tool handler timed out");
            ToolResult::error(format!("Tool {name} timed out after {}s", limit.as_secs_f32()))
        }
    }
}

/// Extract a human-readable message from a panic payload.
fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (non-string payload)".to_string()
    }
}
