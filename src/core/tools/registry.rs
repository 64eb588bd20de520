use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::types::{ToolContext, ToolError, ToolFuture, ToolHandler, ToolResult};

/// Function names accepted by the realtime service.
static TOOL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("static regex is valid"));

/// A registered tool: name, advertised schema and handler.
///
/// Immutable once registered.
#[derive(Clone)]
pub struct Tool {
    name: String,
    schema: Value,
    handler: ToolHandler,
}

impl Tool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Checks that `arguments` is an object carrying every required parameter.
    pub fn check_arguments(&self, arguments: &Value) -> Result<(), ToolError> {
        let Some(args) = arguments.as_object() else {
            return Err(ToolError::InvalidArguments(format!(
                "arguments for '{}' must be a JSON object",
                self.name
            )));
        };

        let required = self
            .schema
            .pointer("/parameters/required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();

        let missing: Vec<&str> = required
            .into_iter()
            .filter(|field| !args.contains_key(*field))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(format!(
                "missing required parameter(s) for '{}': {}",
                self.name,
                missing.join(", ")
            )))
        }
    }

    pub fn invoke(&self, arguments: Value, context: ToolContext) -> ToolFuture {
        (self.handler)(arguments, context)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Name and schema pair advertised to the realtime service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub schema: Value,
}

/// Tools available to sessions built from one configuration.
///
/// Populated before serving and shared behind an `Arc`, which makes it read-only
/// for every session that uses it.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async closure as a tool handler.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Result<(), ToolError>
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        self.register_handler(name, schema, handler)
    }

    /// Registers an already type-erased handler.
    ///
    /// The schema must be a JSON object. A missing `type` or `name` is filled in;
    /// a `name` that disagrees with the registered name is rejected.
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        schema: Value,
        handler: ToolHandler,
    ) -> Result<(), ToolError> {
        let name = name.into();

        if !TOOL_NAME_RE.is_match(&name) {
            return Err(ToolError::InvalidName(name));
        }
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }

        let Value::Object(mut fields) = schema else {
            return Err(ToolError::InvalidSchema {
                name,
                reason: "schema must be a JSON object".to_string(),
            });
        };

        match fields.get("name").cloned() {
            None => {
                fields.insert("name".to_string(), Value::String(name.clone()));
            }
            Some(Value::String(declared)) if declared == name => {}
            Some(declared) => {
                return Err(ToolError::InvalidSchema {
                    reason: format!("schema declares name {declared}"),
                    name,
                });
            }
        }
        fields
            .entry("type")
            .or_insert_with(|| Value::String("function".to_string()));

        self.index.insert(name.clone(), self.tools.len());
        self.tools.push(Arc::new(Tool {
            name,
            schema: Value::Object(fields),
            handler,
        }));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<Tool>, ToolError> {
        self.index
            .get(name)
            .map(|&position| Arc::clone(&self.tools[position]))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Schemas in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|tool| ToolSchema {
                name: tool.name.clone(),
                schema: tool.schema.clone(),
            })
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
