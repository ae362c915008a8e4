//! Agent definitions: named bundles of capabilities.

use serde::Serialize;

use crate::error::Result;
use crate::validate_name;

/// One assistant persona and the capabilities it holds, by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentDefinition {
    name: String,
    description: String,
    capabilities: Vec<String>,
}

impl AgentDefinition {
    /// Starts building an [`AgentDefinition`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidName`] if the name is malformed.
    pub fn builder(name: impl Into<String>) -> Result<AgentBuilder> {
        let name = name.into();
        validate_name("agent", &name)?;
        Ok(AgentBuilder {
            name,
            description: String::new(),
            capabilities: Vec::new(),
        })
    }

    /// Returns the agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns capability names in declared order, without duplicates.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }
}

/// Builder for [`AgentDefinition`].
#[derive(Debug)]
pub struct AgentBuilder {
    name: String,
    description: String,
    capabilities: Vec<String>,
}

impl AgentBuilder {
    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a capability reference. Repeated names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidName`] when the reference is malformed.
    pub fn capability(mut self, capability: impl Into<String>) -> Result<Self> {
        let capability = capability.into();
        validate_name("capability", &capability)?;
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        Ok(self)
    }

    /// Consumes the builder and returns the definition.
    #[must_use]
    pub fn build(self) -> AgentDefinition {
        AgentDefinition {
            name: self.name,
            description: self.description,
            capabilities: self.capabilities,
        }
    }
}
