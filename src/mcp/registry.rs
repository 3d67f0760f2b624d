//! Capability registry: tools, resources and prompts.
//!
//! Capabilities are registered once at startup and are immutable afterwards.
//! Each kind has its own namespace; a duplicate name within a kind is a
//! programming error and fails registration. Dispatch validates arguments
//! against the declared schema before a handler ever runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::protocol::{CallToolResult, GetPromptResult, ReadResourceResult};
use super::schema;
use super::uri_template::UriTemplate;

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// The three capability namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// Callable action.
    Tool,
    /// Readable resource.
    Resource,
    /// Prompt template.
    Prompt,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        })
    }
}

/// Tool metadata as listed by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
}

/// How a resource is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A single fixed URI.
    Fixed(String),
    /// A URI template with `{placeholder}` segments.
    Template(String),
}

/// Resource metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDefinition {
    /// Unique resource name.
    pub name: String,
    /// Description shown to the client.
    pub description: String,
    /// Fixed URI or template.
    pub locator: Locator,
    /// MIME type of the returned text.
    pub mime_type: String,
}

/// One prompt argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Description shown to the client.
    pub description: String,
    /// Whether the argument must be supplied.
    pub required: bool,
}

/// Prompt metadata as listed by `prompts/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptDefinition {
    /// Unique prompt name.
    pub name: String,
    /// Description shown to the client.
    pub description: String,
    /// Declared arguments (all string-valued, per MCP).
    pub arguments: Vec<PromptArgument>,
}

impl PromptDefinition {
    /// JSON Schema equivalent of the declared arguments.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .arguments
            .iter()
            .map(|arg| {
                let mut property = json!({ "type": "string", "description": arg.description });
                if arg.required {
                    property["minLength"] = json!(1);
                }
                (arg.name.clone(), property)
            })
            .collect();
        let required: Vec<&str> = self
            .arguments
            .iter()
            .filter(|arg| arg.required)
            .map(|arg| arg.name.as_str())
            .collect();
        json!({ "type": "object", "properties": properties, "required": required })
    }
}

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// A callable tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description and input schema.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with schema-valid arguments.
    ///
    /// Failures are reported through [`CallToolResult::is_error`], not as
    /// a Rust error.
    async fn call(&self, arguments: &Map<String, Value>) -> CallToolResult;
}

/// A readable resource. Reads never suspend.
pub trait ResourceHandler: Send + Sync {
    /// Name, description, locator and MIME type.
    fn definition(&self) -> ResourceDefinition;

    /// Read the resource at `uri`, with the template variables extracted
    /// from it (empty for fixed locators).
    fn read(&self, uri: &str, variables: &HashMap<String, String>) -> ReadResourceResult;
}

/// A prompt template. Rendering never suspends.
pub trait PromptHandler: Send + Sync {
    /// Name, description and arguments.
    fn definition(&self) -> PromptDefinition;

    /// Render the prompt with schema-valid arguments.
    fn render(&self, arguments: &Map<String, Value>) -> GetPromptResult;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Registration and dispatch failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A capability with this name is already registered for this kind.
    #[error("duplicate {kind} name: {name}")]
    Duplicate {
        /// Capability kind.
        kind: CapabilityKind,
        /// Conflicting name.
        name: String,
    },

    /// A resource template could not be parsed.
    #[error("invalid resource locator for {name}: {reason}")]
    InvalidLocator {
        /// Resource name.
        name: String,
        /// Parse failure.
        reason: String,
    },

    /// No capability of this kind matches the request.
    #[error("unknown {kind}: {name}")]
    NotFound {
        /// Capability kind.
        kind: CapabilityKind,
        /// Requested name (or URI for resources).
        name: String,
    },

    /// Arguments failed schema validation; the handler was not called.
    #[error("invalid arguments for {kind} {name}: {reason}")]
    InvalidArguments {
        /// Capability kind.
        kind: CapabilityKind,
        /// Capability name.
        name: String,
        /// First violation found.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

struct RegisteredResource {
    definition: ResourceDefinition,
    template: UriTemplate,
    handler: Arc<dyn ResourceHandler>,
}

struct RegisteredPrompt {
    definition: PromptDefinition,
    schema: Value,
    handler: Arc<dyn PromptHandler>,
}

/// All capabilities exposed by the server, in registration order.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: Vec<RegisteredTool>,
    resources: Vec<RegisteredResource>,
    prompts: Vec<RegisteredPrompt>,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("tools", &self.tools.iter().map(|t| &t.definition.name).collect::<Vec<_>>())
            .field(
                "resources",
                &self.resources.iter().map(|r| &r.definition.name).collect::<Vec<_>>(),
            )
            .field("prompts", &self.prompts.iter().map(|p| &p.definition.name).collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a tool with the same name exists.
    pub fn register_tool(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), RegistryError> {
        let definition = handler.definition();
        if self.tools.iter().any(|t| t.definition.name == definition.name) {
            return Err(RegistryError::Duplicate {
                kind: CapabilityKind::Tool,
                name: definition.name,
            });
        }
        debug!(name = %definition.name, "registered tool");
        self.tools.push(RegisteredTool {
            definition,
            handler,
        });
        Ok(())
    }

    /// Register a resource.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] for a name clash and
    /// [`RegistryError::InvalidLocator`] for an unparseable template.
    pub fn register_resource(
        &mut self,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<(), RegistryError> {
        let definition = handler.definition();
        if self
            .resources
            .iter()
            .any(|r| r.definition.name == definition.name)
        {
            return Err(RegistryError::Duplicate {
                kind: CapabilityKind::Resource,
                name: definition.name,
            });
        }

        let raw = match &definition.locator {
            Locator::Fixed(uri) | Locator::Template(uri) => uri.as_str(),
        };
        let template = UriTemplate::parse(raw).map_err(|reason| RegistryError::InvalidLocator {
            name: definition.name.clone(),
            reason,
        })?;
        if matches!(definition.locator, Locator::Fixed(_)) && !template.variables().is_empty() {
            return Err(RegistryError::InvalidLocator {
                name: definition.name,
                reason: "fixed locator must not contain placeholders".to_owned(),
            });
        }

        debug!(name = %definition.name, locator = raw, "registered resource");
        self.resources.push(RegisteredResource {
            definition,
            template,
            handler,
        });
        Ok(())
    }

    /// Register a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a prompt with the same name exists.
    pub fn register_prompt(
        &mut self,
        handler: Arc<dyn PromptHandler>,
    ) -> Result<(), RegistryError> {
        let definition = handler.definition();
        if self
            .prompts
            .iter()
            .any(|p| p.definition.name == definition.name)
        {
            return Err(RegistryError::Duplicate {
                kind: CapabilityKind::Prompt,
                name: definition.name,
            });
        }
        debug!(name = %definition.name, "registered prompt");
        let schema = definition.input_schema();
        self.prompts.push(RegisteredPrompt {
            definition,
            schema,
            handler,
        });
        Ok(())
    }

    // ── Introspection ──

    /// Tool definitions, in registration order.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Fixed-URI resources, in registration order.
    pub fn list_resources(&self) -> Vec<ResourceDefinition> {
        self.resources
            .iter()
            .filter(|r| matches!(r.definition.locator, Locator::Fixed(_)))
            .map(|r| r.definition.clone())
            .collect()
    }

    /// Templated resources, in registration order.
    pub fn list_resource_templates(&self) -> Vec<ResourceDefinition> {
        self.resources
            .iter()
            .filter(|r| matches!(r.definition.locator, Locator::Template(_)))
            .map(|r| r.definition.clone())
            .collect()
    }

    /// Prompt definitions, in registration order.
    pub fn list_prompts(&self) -> Vec<PromptDefinition> {
        self.prompts.iter().map(|p| p.definition.clone()).collect()
    }

    /// Whether a capability of `kind` named `name` is registered.
    pub fn contains(&self, kind: CapabilityKind, name: &str) -> bool {
        match kind {
            CapabilityKind::Tool => self.tools.iter().any(|t| t.definition.name == name),
            CapabilityKind::Resource => self.resources.iter().any(|r| r.definition.name == name),
            CapabilityKind::Prompt => self.prompts.iter().any(|p| p.definition.name == name),
        }
    }

    // ── Dispatch ──

    /// Validate arguments and call a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown tool and
    /// [`RegistryError::InvalidArguments`] when validation fails. Handler
    /// failures are inside the returned [`CallToolResult`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult, RegistryError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.definition.name == name)
            .ok_or_else(|| RegistryError::NotFound {
                kind: CapabilityKind::Tool,
                name: name.to_owned(),
            })?;

        let arguments = checked_arguments(
            CapabilityKind::Tool,
            name,
            &tool.definition.input_schema,
            arguments,
        )?;

        debug!(tool = name, "calling tool");
        Ok(tool.handler.call(&arguments).await)
    }

    /// Read the first resource whose locator matches `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no locator matches.
    pub fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, RegistryError> {
        for resource in &self.resources {
            if let Some(variables) = resource.template.match_uri(uri) {
                debug!(resource = %resource.definition.name, uri, "reading resource");
                return Ok(resource.handler.read(uri, &variables));
            }
        }
        Err(RegistryError::NotFound {
            kind: CapabilityKind::Resource,
            name: uri.to_owned(),
        })
    }

    /// Validate arguments and render a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown prompt and
    /// [`RegistryError::InvalidArguments`] when validation fails.
    pub fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult, RegistryError> {
        let prompt = self
            .prompts
            .iter()
            .find(|p| p.definition.name == name)
            .ok_or_else(|| RegistryError::NotFound {
                kind: CapabilityKind::Prompt,
                name: name.to_owned(),
            })?;

        let arguments = checked_arguments(CapabilityKind::Prompt, name, &prompt.schema, arguments)?;

        debug!(prompt = name, "rendering prompt");
        Ok(prompt.handler.render(&arguments))
    }
}

fn checked_arguments(
    kind: CapabilityKind,
    name: &str,
    input_schema: &Value,
    arguments: Option<Value>,
) -> Result<Map<String, Value>, RegistryError> {
    let arguments = schema::arguments_object(arguments);
    let invalid = |reason: String| RegistryError::InvalidArguments {
        kind,
        name: name.to_owned(),
        reason,
    };
    schema::validate(input_schema, &arguments).map_err(invalid)?;
    match arguments {
        Value::Object(map) => Ok(map),
        _ => Err(invalid("expected an object of arguments".to_owned())),
    }
}
