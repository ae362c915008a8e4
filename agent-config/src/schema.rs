//! Serde shapes of the tool, capability and agent documents.
//!
//! These mirror the YAML files one to one. Conversion into validated
//! `agent-primitives` definitions happens in [`Definitions::from_documents`].

use std::fmt;
use std::marker::PhantomData;

use agent_primitives::{
    AgentDefinition, CapabilityDefinition, ModulePolicy, ParameterSpec, ToolDefinition,
};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};

/// String-keyed map preserving declaration order and rejecting repeated keys.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the keys in declaration order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Appends entries from `other`, failing on the first repeated key.
    pub(crate) fn extend_unique(&mut self, other: Self, kind: &'static str) -> ConfigResult<()> {
        for (key, value) in other.0 {
            if self.get(&key).is_some() {
                return Err(ConfigError::DuplicateEntry { kind, name: key });
            }
            self.0.push((key, value));
        }
        Ok(())
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, V> Deserialize<'de> for OrderedMap<V>
where
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V> Visitor<'de> for OrderedMapVisitor<V>
        where
            V: Deserialize<'de>,
        {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping with string keys")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(OrderedMap::default())
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, V)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if entries.iter().any(|(seen, _)| *seen == key) {
                        return Err(de::Error::custom(format_args!("duplicate key `{key}`")));
                    }
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// One parameter entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    /// Declared type tag.
    #[serde(rename = "type")]
    pub param_type: String,
    /// Whether callers must supply the value.
    #[serde(default)]
    pub required: bool,
    /// Value used when the caller omits the parameter.
    #[serde(default)]
    pub default: Option<Value>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// Import policy block of a code tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationEntry {
    /// Modules the code may import. Empty means unrestricted.
    #[serde(default)]
    pub allowed_modules: Vec<String>,
    /// Modules the code may never import.
    #[serde(default)]
    pub blocked_modules: Vec<String>,
}

/// One tool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEntry {
    /// Dotted `module.function` target reference.
    pub function: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Function type tag.
    pub function_type: String,
    /// Parameters in declaration order.
    #[serde(default)]
    pub parameters: OrderedMap<ParameterEntry>,
    /// Return type tag.
    #[serde(default = "default_returns")]
    pub returns: String,
    /// Libraries the target needs.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Import policy for code tools.
    #[serde(default)]
    pub validation: Option<ValidationEntry>,
}

fn default_returns() -> String {
    "string".into()
}

/// One capability entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    /// Optional repeat of the map key.
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Function type tags this capability authorizes.
    pub function_types: Vec<String>,
    /// Capability-level parameters describing call shape.
    #[serde(default)]
    pub parameters: OrderedMap<ParameterEntry>,
}

/// One agent entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEntry {
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Capability names in declaration order.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// `tools:` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsDocument {
    /// Tools keyed by name.
    #[serde(default)]
    pub tools: OrderedMap<ToolEntry>,
}

/// `capabilities:` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesDocument {
    /// Capabilities keyed by name.
    #[serde(default)]
    pub capabilities: OrderedMap<CapabilityEntry>,
}

/// `agents:` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentsDocument {
    /// Agents keyed by name.
    #[serde(default)]
    pub agents: OrderedMap<AgentEntry>,
}

/// Validated definitions ready for the runtime.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    /// Tool definitions in declaration order.
    pub tools: Vec<ToolDefinition>,
    /// Capability definitions in declaration order.
    pub capabilities: Vec<CapabilityDefinition>,
    /// Agent definitions in declaration order.
    pub agents: Vec<AgentDefinition>,
}

impl Definitions {
    /// Converts raw documents, performing every load-time check that does not
    /// need the target table or cross-references.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Definition`] naming the first invalid entry, or
    /// [`ConfigError::NameMismatch`].
    pub fn from_documents(
        tools: ToolsDocument,
        capabilities: CapabilitiesDocument,
        agents: AgentsDocument,
    ) -> ConfigResult<Self> {
        Ok(Self {
            tools: tools
                .tools
                .into_iter()
                .map(|(name, entry)| tool_definition(&name, entry))
                .collect::<ConfigResult<_>>()?,
            capabilities: capabilities
                .capabilities
                .into_iter()
                .map(|(name, entry)| capability_definition(&name, entry))
                .collect::<ConfigResult<_>>()?,
            agents: agents
                .agents
                .into_iter()
                .map(|(name, entry)| agent_definition(&name, entry))
                .collect::<ConfigResult<_>>()?,
        })
    }
}

fn parameter_spec(name: &str, entry: ParameterEntry) -> agent_primitives::Result<ParameterSpec> {
    let spec = ParameterSpec::new(name, entry.param_type.parse()?)?
        .required(entry.required)
        .with_description(entry.description);
    match entry.default {
        Some(default) => spec.with_default(default),
        None => Ok(spec),
    }
}

fn tool_definition(name: &str, entry: ToolEntry) -> ConfigResult<ToolDefinition> {
    let build = || -> agent_primitives::Result<ToolDefinition> {
        let mut builder = ToolDefinition::builder(name, &entry.function, entry.function_type.parse()?)?
            .description(entry.description.clone())
            .returns(entry.returns.clone())
            .requires(entry.requires.clone());
        for (parameter, spec) in entry.parameters.iter() {
            builder = builder.parameter(parameter_spec(parameter, spec.clone())?)?;
        }
        if let Some(validation) = &entry.validation {
            builder = builder.module_policy(ModulePolicy::new(
                validation.allowed_modules.iter().map(String::as_str),
                validation.blocked_modules.iter().map(String::as_str),
            ));
        }
        builder.build()
    };
    build().map_err(|source| ConfigError::Definition {
        kind: "tool",
        name: name.to_owned(),
        source,
    })
}

fn capability_definition(name: &str, entry: CapabilityEntry) -> ConfigResult<CapabilityDefinition> {
    if let Some(declared) = entry.name.as_deref().filter(|declared| *declared != name) {
        return Err(ConfigError::NameMismatch {
            key: name.to_owned(),
            declared: declared.to_owned(),
        });
    }

    let build = || -> agent_primitives::Result<CapabilityDefinition> {
        let mut builder = CapabilityDefinition::builder(name)?.description(entry.description.clone());
        for tag in &entry.function_types {
            builder = builder.function_type(tag.parse()?);
        }
        for (parameter, spec) in entry.parameters.iter() {
            builder = builder.parameter(parameter_spec(parameter, spec.clone())?)?;
        }
        builder.build()
    };
    build().map_err(|source| ConfigError::Definition {
        kind: "capability",
        name: name.to_owned(),
        source,
    })
}

fn agent_definition(name: &str, entry: AgentEntry) -> ConfigResult<AgentDefinition> {
    let build = || -> agent_primitives::Result<AgentDefinition> {
        let mut builder = AgentDefinition::builder(name)?.description(entry.description.clone());
        for capability in &entry.capabilities {
            builder = builder.capability(capability.as_str())?;
        }
        Ok(builder.build())
    };
    build().map_err(|source| ConfigError::Definition {
        kind: "agent",
        name: name.to_owned(),
        source,
    })
}
