//! Agent-to-tool authorization.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use agent_primitives::{AgentDefinition, CapabilityDefinition, FunctionType};
use tracing::{debug, warn};

use crate::error::{PolicyError, PolicyResult};

/// Authorizes `(agent, tool)` pairs through capabilities.
///
/// All tables are computed on construction. Lookups never mutate and are
/// safe to share across tasks without locking.
#[derive(Debug, Clone)]
pub struct CapabilityMatcher {
    capabilities: Vec<CapabilityDefinition>,
    agents: Vec<AgentDefinition>,
    tools: HashMap<String, FunctionType>,
    authorized: HashMap<String, BTreeSet<String>>,
}

impl CapabilityMatcher {
    /// Builds the matcher from definitions and the registered tools' function
    /// types.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::DuplicateCapability`],
    /// [`PolicyError::DuplicateAgent`] or [`PolicyError::UnknownCapability`]
    /// when the definitions are inconsistent.
    pub fn new<I, S>(
        capabilities: Vec<CapabilityDefinition>,
        agents: Vec<AgentDefinition>,
        tools: I,
    ) -> PolicyResult<Self>
    where
        I: IntoIterator<Item = (S, FunctionType)>,
        S: Into<String>,
    {
        let mut by_name: HashMap<&str, &CapabilityDefinition> = HashMap::new();
        for capability in &capabilities {
            if by_name.insert(capability.name(), capability).is_some() {
                return Err(PolicyError::DuplicateCapability {
                    name: capability.name().to_owned(),
                });
            }
        }

        let tools: HashMap<String, FunctionType> = tools
            .into_iter()
            .map(|(name, function_type)| (name.into(), function_type))
            .collect();

        let mut authorized = HashMap::with_capacity(agents.len());
        for agent in &agents {
            let mut function_types = BTreeSet::new();
            for capability in agent.capabilities() {
                let definition = by_name.get(capability.as_str()).ok_or_else(|| {
                    PolicyError::UnknownCapability {
                        agent: agent.name().to_owned(),
                        capability: capability.clone(),
                    }
                })?;
                function_types.extend(definition.function_types().iter().copied());
            }

            let allowed: BTreeSet<String> = tools
                .iter()
                .filter(|(_, function_type)| function_types.contains(*function_type))
                .map(|(name, _)| name.clone())
                .collect();
            debug!(agent = agent.name(), tools = allowed.len(), "agent authorization resolved");

            if authorized.insert(agent.name().to_owned(), allowed).is_some() {
                return Err(PolicyError::DuplicateAgent {
                    name: agent.name().to_owned(),
                });
            }
        }

        Ok(Self {
            capabilities,
            agents,
            tools,
            authorized,
        })
    }

    /// Returns the tools the agent may invoke.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownAgent`] when the agent is not defined.
    pub fn authorized_tools(&self, agent: &str) -> PolicyResult<&BTreeSet<String>> {
        self.authorized
            .get(agent)
            .ok_or_else(|| PolicyError::UnknownAgent {
                agent: agent.to_owned(),
            })
    }

    /// Checks that `agent` may invoke `tool`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownAgent`] or
    /// [`PolicyError::AuthorizationDenied`].
    pub fn check(&self, agent: &str, tool: &str) -> PolicyResult<()> {
        if self.authorized_tools(agent)?.contains(tool) {
            return Ok(());
        }
        warn!(agent, tool, "tool call denied by capabilities");
        Err(PolicyError::AuthorizationDenied {
            agent: agent.to_owned(),
            tool: tool.to_owned(),
        })
    }

    /// Returns the agent definition registered under `name`.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|agent| agent.name() == name)
    }

    /// Returns all agents in declaration order.
    #[must_use]
    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    /// Returns all capabilities in declaration order.
    #[must_use]
    pub fn capabilities(&self) -> &[CapabilityDefinition] {
        &self.capabilities
    }

    /// Returns the capabilities authorizing a function type, in declaration
    /// order.
    #[must_use]
    pub fn capabilities_for(&self, function_type: FunctionType) -> Vec<&CapabilityDefinition> {
        self.capabilities
            .iter()
            .filter(|capability| capability.authorizes(function_type))
            .collect()
    }

    /// Returns the agents authorized to invoke `tool`, in declaration order.
    #[must_use]
    pub fn agents_for_tool(&self, tool: &str) -> Vec<&AgentDefinition> {
        self.agents
            .iter()
            .filter(|agent| {
                self.authorized
                    .get(agent.name())
                    .is_some_and(|tools| tools.contains(tool))
            })
            .collect()
    }

    /// Picks the most specialized agent for `tool`: the authorized agent
    /// holding the fewest capabilities, ties broken by name.
    #[must_use]
    pub fn select_agent(&self, tool: &str) -> Option<&AgentDefinition> {
        self.agents_for_tool(tool)
            .into_iter()
            .min_by(|a, b| {
                a.capabilities()
                    .len()
                    .cmp(&b.capabilities().len())
                    .then_with(|| a.name().cmp(b.name()))
            })
    }

    /// Returns the function type of a known tool.
    #[must_use]
    pub fn function_type_of(&self, tool: &str) -> Option<FunctionType> {
        self.tools.get(tool).copied()
    }

    /// Renders the capability catalog for prompt building.
    #[must_use]
    pub fn describe_capabilities(&self) -> String {
        let mut out = String::new();
        for capability in &self.capabilities {
            let parameters: Vec<String> = capability
                .parameters()
                .iter()
                .map(|spec| format!("{} ({})", spec.name(), spec.param_type()))
                .collect();
            let parameters = if parameters.is_empty() {
                "none".to_owned()
            } else {
                parameters.join(", ")
            };
            let _ = writeln!(out, "{}:", capability.name());
            let _ = writeln!(out, "- Description: {}", capability.description());
            let _ = writeln!(out, "- Parameters: {parameters}");
        }
        out
    }
}
