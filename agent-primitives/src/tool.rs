//! Tool definitions, function types, and import policies.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::schema::{ParamType, ParameterSpec};
use crate::validate_name;

/// Name of the parameter carrying source text for code tools.
pub const CODE_PARAMETER: &str = "code";

/// Category tag linking tools to the capabilities that authorize them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionType {
    /// Search engine lookups.
    Search,
    /// Web page retrieval.
    Web,
    /// Sandboxed code execution.
    Code,
    /// Local file access.
    File,
}

impl FunctionType {
    /// Returns the canonical tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Web => "web",
            Self::Code => "code",
            Self::File => "file",
        }
    }

    /// Returns `true` when tools of this type run inside the sandbox.
    #[must_use]
    pub const fn is_sandboxed(self) -> bool {
        matches!(self, Self::Code)
    }
}

impl Display for FunctionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "web" => Ok(Self::Web),
            "code" => Ok(Self::Code),
            "file" => Ok(Self::File),
            _ => Err(Error::UnknownFunctionType { tag: tag.to_owned() }),
        }
    }
}

/// Reference to a callable, written `module.path.function`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TargetRef {
    module: String,
    function: String,
}

impl TargetRef {
    /// Returns the module path (may be empty for bare function names).
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the function name.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Returns the full dotted path used as the registration key.
    #[must_use]
    pub fn path(&self) -> String {
        if self.module.is_empty() {
            self.function.clone()
        } else {
            format!("{}.{}", self.module, self.function)
        }
    }
}

impl Display for TargetRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for TargetRef {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidTarget {
            target: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference cannot be empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid("reference cannot contain whitespace"));
        }
        if trimmed.split('.').any(str::is_empty) {
            return Err(invalid("reference has an empty path segment"));
        }

        let (module, function) = trimmed.rsplit_once('.').unwrap_or(("", trimmed));
        Ok(Self {
            module: module.to_owned(),
            function: function.to_owned(),
        })
    }
}

/// Outcome of checking one module name against a [`ModulePolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleVerdict {
    /// Import may proceed.
    Permitted,
    /// Module (or a parent package) is on the deny list.
    Blocked,
    /// An allow list exists and the module is not covered by it.
    NotAllowed,
}

/// Import allow/deny lists for code-execution tools.
///
/// Entries match hierarchically: `os` covers `os.path`. The deny list is
/// consulted first, so a module listed on both sides is blocked. An empty
/// allow list places no restriction beyond the deny list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ModulePolicy {
    allowed: BTreeSet<String>,
    blocked: BTreeSet<String>,
}

impl ModulePolicy {
    /// Creates a policy from allow and deny lists.
    #[must_use]
    pub fn new<A, B, S, T>(allowed: A, blocked: B) -> Self
    where
        A: IntoIterator<Item = S>,
        B: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let clean = |name: String| {
            let name = name.trim().to_owned();
            (!name.is_empty()).then_some(name)
        };
        Self {
            allowed: allowed.into_iter().map(Into::into).filter_map(clean).collect(),
            blocked: blocked.into_iter().map(Into::into).filter_map(clean).collect(),
        }
    }

    /// Returns the allow list.
    #[must_use]
    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    /// Returns the deny list.
    #[must_use]
    pub fn blocked(&self) -> &BTreeSet<String> {
        &self.blocked
    }

    /// Returns modules listed on both sides. They resolve as blocked.
    #[must_use]
    pub fn overlap(&self) -> Vec<&str> {
        self.allowed
            .intersection(&self.blocked)
            .map(String::as_str)
            .collect()
    }

    /// Returns `true` when the module or one of its parent packages is blocked.
    #[must_use]
    pub fn is_blocked(&self, module: &str) -> bool {
        covers(&self.blocked, module)
    }

    /// Classifies an import of `module`.
    #[must_use]
    pub fn verdict(&self, module: &str) -> ModuleVerdict {
        if self.is_blocked(module) {
            ModuleVerdict::Blocked
        } else if !self.allowed.is_empty() && !covers(&self.allowed, module) {
            ModuleVerdict::NotAllowed
        } else {
            ModuleVerdict::Permitted
        }
    }
}

fn covers(set: &BTreeSet<String>, module: &str) -> bool {
    module
        .match_indices('.')
        .map(|(index, _)| &module[..index])
        .chain(std::iter::once(module))
        .any(|prefix| set.contains(prefix))
}

/// Declarative description of a callable tool.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    name: String,
    target: TargetRef,
    function_type: FunctionType,
    description: String,
    parameters: Vec<ParameterSpec>,
    returns: String,
    requires: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_policy: Option<ModulePolicy>,
}

impl ToolDefinition {
    /// Starts building a tool definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] or [`Error::InvalidTarget`] when the
    /// name or callable reference is malformed.
    pub fn builder(
        name: impl Into<String>,
        target: &str,
        function_type: FunctionType,
    ) -> Result<ToolDefinitionBuilder> {
        let name = name.into();
        validate_name("tool", &name)?;
        Ok(ToolDefinitionBuilder {
            name,
            target: target.parse()?,
            function_type,
            description: String::new(),
            parameters: Vec::new(),
            returns: "string".into(),
            requires: Vec::new(),
            module_policy: None,
        })
    }

    /// Returns the unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the callable reference.
    #[must_use]
    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    /// Returns the function type tag.
    #[must_use]
    pub fn function_type(&self) -> FunctionType {
        self.function_type
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns parameter specs in declared order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Looks up a parameter spec by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|spec| spec.name() == name)
    }

    /// Returns the declared return type tag.
    #[must_use]
    pub fn returns(&self) -> &str {
        &self.returns
    }

    /// Returns the external libraries the target needs. Informational only.
    #[must_use]
    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    /// Returns the import policy of a code tool.
    #[must_use]
    pub fn module_policy(&self) -> Option<&ModulePolicy> {
        self.module_policy.as_ref()
    }
}

/// Builder for [`ToolDefinition`].
#[derive(Debug)]
pub struct ToolDefinitionBuilder {
    name: String,
    target: TargetRef,
    function_type: FunctionType,
    description: String,
    parameters: Vec<ParameterSpec>,
    returns: String,
    requires: Vec<String>,
    module_policy: Option<ModulePolicy>,
}

impl ToolDefinitionBuilder {
    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a parameter spec.
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

    /// Sets the return type tag.
    #[must_use]
    pub fn returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = returns.into();
        self
    }

    /// Sets the informational list of external requirements.
    #[must_use]
    pub fn requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = requires.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the import policy.
    #[must_use]
    pub fn module_policy(mut self, policy: ModulePolicy) -> Self {
        self.module_policy = Some(policy);
        self
    }

    /// Finalises the definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCodeParameter`] when a code tool lacks a string
    /// `code` parameter.
    pub fn build(self) -> Result<ToolDefinition> {
        if self.function_type.is_sandboxed() {
            let has_code = self
                .parameters
                .iter()
                .any(|spec| spec.name() == CODE_PARAMETER && spec.param_type() == ParamType::String);
            if !has_code {
                return Err(Error::MissingCodeParameter { tool: self.name });
            }
        }

        Ok(ToolDefinition {
            name: self.name,
            target: self.target,
            function_type: self.function_type,
            description: self.description,
            parameters: self.parameters,
            returns: self.returns,
            requires: self.requires,
            module_policy: self.module_policy,
        })
    }
}
