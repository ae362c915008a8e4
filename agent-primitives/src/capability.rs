//! Capability definitions: coarse authorization units over function types.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::schema::ParameterSpec;
use crate::tool::FunctionType;
use crate::validate_name;

/// Authorizes every tool whose function type it lists. Not itself callable.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapabilityDefinition {
    name: String,
    description: String,
    function_types: BTreeSet<FunctionType>,
    parameters: Vec<ParameterSpec>,
}

impl CapabilityDefinition {
    /// Starts building a capability definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if the name is malformed.
    pub fn builder(name: impl Into<String>) -> Result<CapabilityBuilder> {
        let name = name.into();
        validate_name("capability", &name)?;
        Ok(CapabilityBuilder {
            name,
            description: String::new(),
            function_types: BTreeSet::new(),
            parameters: Vec::new(),
        })
    }

    /// Returns the unique capability name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the function types this capability authorizes.
    #[must_use]
    pub fn function_types(&self) -> &BTreeSet<FunctionType> {
        &self.function_types
    }

    /// Returns `true` when tools of `function_type` are covered.
    #[must_use]
    pub fn authorizes(&self, function_type: FunctionType) -> bool {
        self.function_types.contains(&function_type)
    }

    /// Returns the capability-level parameter specs describing call shape.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }
}

/// Builder for [`CapabilityDefinition`].
#[derive(Debug)]
pub struct CapabilityBuilder {
    name: String,
    description: String,
    function_types: BTreeSet<FunctionType>,
    parameters: Vec<ParameterSpec>,
}

impl CapabilityBuilder {
    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds an authorized function type.
    #[must_use]
    pub fn function_type(mut self, function_type: FunctionType) -> Self {
        self.function_types.insert(function_type);
        self
    }

    /// Appends a capability-level parameter spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateParameter`] when the name is already declared.
    pub fn parameter(mut self, spec: ParameterSpec) -> Result<Self> {
        if self.parameters.iter().any(|existing| existing.name() == spec.name()) {
            return Err(Error::DuplicateParameter {
                owner: self.name,
                parameter: spec.name().to_owned(),
            });
        }
        self.parameters.push(spec);
        Ok(self)
    }

    /// Finalises the capability.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapability`] if no function type was added.
    pub fn build(self) -> Result<CapabilityDefinition> {
        if self.function_types.is_empty() {
            return Err(Error::InvalidCapability {
                name: self.name,
                reason: "at least one function type must be specified".into(),
            });
        }

        Ok(CapabilityDefinition {
            name: self.name,
            description: self.description,
            function_types: self.function_types,
            parameters: self.parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParamType;

    #[test]
    fn build_capability_success() {
        let capability = CapabilityDefinition::builder("information_retrieval")
            .map(|b| {
                b.description("Search and read the web")
                    .function_type(FunctionType::Search)
                    .function_type(FunctionType::Web)
            })
            .and_then(|b| b.parameter(ParameterSpec::new("query", ParamType::String)?))
            .and_then(CapabilityBuilder::build)
            .expect("build");

        assert_eq!(capability.name(), "information_retrieval");
        assert!(capability.authorizes(FunctionType::Web));
        assert!(!capability.authorizes(FunctionType::Code));
        assert_eq!(capability.parameters().len(), 1);
    }

    #[test]
    fn capability_requires_function_type() {
        let err = CapabilityDefinition::builder("empty")
            .and_then(CapabilityBuilder::build)
            .expect_err("should fail");

        assert!(matches!(err, Error::InvalidCapability { name, .. } if name == "empty"));
    }
}
