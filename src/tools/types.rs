//! Tool-related types: parameter schemas, tiers, per-session tool config.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// JSON Schema-based parameter definition for a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentToolParameters {
    /// JSON Schema object describing the parameters.
    pub schema: serde_json::Value,
}

impl AgentToolParameters {
    /// Create from a raw JSON Schema value.
    pub fn from_schema(schema: serde_json::Value) -> Self {
        Self { schema }
    }

    /// Create an empty parameter schema (no parameters).
    pub fn empty() -> Self {
        Self {
            schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }

    /// Builder: create an object schema with properties.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for constructing tool parameter schemas.
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    fn property(mut self, name: String, schema: serde_json::Value, required: bool) -> Self {
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Add a string property.
    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = serde_json::json!({ "type": "string", "description": description.into() });
        self.property(name.into(), schema, required)
    }

    /// Add a number property.
    pub fn number(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = serde_json::json!({ "type": "number", "description": description.into() });
        self.property(name.into(), schema, required)
    }

    /// Add an enum (string) property.
    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        let schema = serde_json::json!({
            "type": "string",
            "description": description.into(),
            "enum": values,
        });
        self.property(name.into(), schema, required)
    }

    /// Build into AgentToolParameters.
    pub fn build(self) -> AgentToolParameters {
        AgentToolParameters {
            schema: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// Where a resolved tool comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolTier {
    /// Always-on tools that need no connection setup.
    Builtin,
    /// Locally defined functions enabled by name.
    Legacy,
    /// Tools hosted on an external tool server.
    Remote,
}

/// Per-session tool configuration. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Master switch; `false` yields an empty tool set.
    pub enabled: bool,
    /// Names of local-function tools to expose.
    pub legacy_tools: BTreeSet<String>,
    #[serde(alias = "mcp_tools_enabled")]
    pub mcp_enabled: bool,
    #[serde(alias = "strands_tools_enabled")]
    pub builtin_enabled: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            legacy_tools: BTreeSet::new(),
            mcp_enabled: false,
            builtin_enabled: true,
        }
    }
}

impl ToolConfig {
    /// A config with every tier switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_legacy_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legacy_tools = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mcp(mut self, enabled: bool) -> Self {
        self.mcp_enabled = enabled;
        self
    }

    pub fn with_builtins(mut self, enabled: bool) -> Self {
        self.builtin_enabled = enabled;
        self
    }

    /// Whether remote tool servers should be connected for this config.
    pub fn wants_remote(&self) -> bool {
        self.enabled && self.mcp_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_required_fields_in_order() {
        let params = AgentToolParameters::object()
            .string("city", "City name", true)
            .string_enum("unit", "Temperature unit", &["c", "f"], false)
            .number("days", "Forecast days", true)
            .build();

        assert_eq!(params.schema["required"], serde_json::json!(["city", "days"]));
        assert_eq!(params.schema["properties"]["unit"]["enum"][1], "f");
    }

    #[test]
    fn tool_config_accepts_legacy_field_names() {
        let config: ToolConfig = serde_json::from_value(serde_json::json!({
            "legacy_tools": ["get_weather"],
            "mcp_tools_enabled": true,
            "strands_tools_enabled": false,
        }))
        .expect("config should parse");

        assert!(config.enabled);
        assert!(config.mcp_enabled);
        assert!(!config.builtin_enabled);
        assert!(config.legacy_tools.contains("get_weather"));
    }
}
