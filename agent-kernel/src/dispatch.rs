//! The dispatch boundary: authorize, validate, execute.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use agent_policy::{CapabilityMatcher, RateLimiter, UNKNOWN_CALLER};
use agent_primitives::AgentDefinition;
use agent_tools::registry::ToolRegistry;
use serde_json::{Map, Value};

use crate::error::{DispatchError, DispatchResult, StructuredFailure};
use crate::observer::{DispatchObserver, DispatchRecord};

/// Routes `(agent, tool, args)` calls through authorization to the tool
/// registry.
///
/// Built once by [`crate::RuntimeBuilder`] and read-only afterwards, so one
/// instance serves any number of concurrent callers.
pub struct Dispatcher {
    tools: ToolRegistry,
    matcher: CapabilityMatcher,
    limiter: Option<RateLimiter>,
    observer: Arc<dyn DispatchObserver>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.tools)
            .field("agents", &self.matcher.agents().len())
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub(crate) fn new(
        tools: ToolRegistry,
        matcher: CapabilityMatcher,
        limiter: Option<RateLimiter>,
        observer: Arc<dyn DispatchObserver>,
    ) -> Self {
        Self {
            tools,
            matcher,
            limiter,
            observer,
        }
    }

    /// Dispatches a tool call on behalf of `agent`.
    ///
    /// Checks run in a fixed order: rate limit, tool existence, agent
    /// existence, authorization, argument validation, execution. An
    /// unauthorized call never reaches the tool.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`DispatchError`].
    pub async fn dispatch(
        &self,
        agent: &str,
        tool: &str,
        args: &Map<String, Value>,
    ) -> DispatchResult<String> {
        let started = Instant::now();
        let outcome = self.run(agent, tool, args).await;
        self.observer.on_dispatch(&DispatchRecord {
            agent,
            tool,
            elapsed: started.elapsed(),
            outcome: outcome.as_deref(),
        });
        outcome
    }

    /// Like [`Dispatcher::dispatch`], rendering failures as
    /// [`StructuredFailure`] values.
    ///
    /// # Errors
    ///
    /// Returns the structured form of any [`DispatchError`].
    pub async fn dispatch_structured(
        &self,
        agent: &str,
        tool: &str,
        args: &Map<String, Value>,
    ) -> Result<String, StructuredFailure> {
        self.dispatch(agent, tool, args)
            .await
            .map_err(|err| err.to_failure())
    }

    async fn run(&self, agent: &str, tool: &str, args: &Map<String, Value>) -> DispatchResult<String> {
        if let Some(limiter) = &self.limiter {
            let caller = if self.matcher.agent(agent).is_some() {
                agent
            } else {
                UNKNOWN_CALLER
            };
            limiter
                .check(caller)
                .map_err(|exceeded| DispatchError::RateLimitExceeded {
                    agent: agent.to_owned(),
                    retry_after: exceeded.retry_after,
                })?;
        }

        if !self.tools.contains(tool) {
            return Err(DispatchError::UnknownTool {
                tool: tool.to_owned(),
            });
        }

        self.matcher
            .check(agent, tool)
            .map_err(|err| DispatchError::from_policy(err, agent, tool))?;

        Ok(self.tools.invoke(tool, args).await?)
    }

    /// Returns the tools `agent` may call.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownAgent`].
    pub fn authorized_tools(&self, agent: &str) -> DispatchResult<&BTreeSet<String>> {
        self.matcher
            .authorized_tools(agent)
            .map_err(|err| DispatchError::from_policy(err, agent, ""))
    }

    /// Picks the most specialized agent authorized for `tool`.
    #[must_use]
    pub fn select_agent(&self, tool: &str) -> Option<&AgentDefinition> {
        self.matcher.select_agent(tool)
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Returns the capability matcher.
    #[must_use]
    pub fn matcher(&self) -> &CapabilityMatcher {
        &self.matcher
    }

    /// Returns the rate limiter, when enabled.
    #[must_use]
    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }
}

/// Cloneable handle to the current [`Dispatcher`] that supports atomic
/// replacement.
///
/// Calls in flight during [`SharedDispatcher::reload`] finish on the
/// dispatcher they started with.
#[derive(Debug, Clone)]
pub struct SharedDispatcher {
    current: Arc<RwLock<Arc<Dispatcher>>>,
}

impl SharedDispatcher {
    /// Wraps a dispatcher.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(dispatcher))),
        }
    }

    /// Returns the dispatcher new calls will use.
    #[must_use]
    pub fn current(&self) -> Arc<Dispatcher> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in a fully rebuilt dispatcher and returns the previous one.
    pub fn reload(&self, dispatcher: Dispatcher) -> Arc<Dispatcher> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(dispatcher))
    }

    /// Dispatches through the current dispatcher.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn dispatch(
        &self,
        agent: &str,
        tool: &str,
        args: &Map<String, Value>,
    ) -> DispatchResult<String> {
        let dispatcher = self.current();
        dispatcher.dispatch(agent, tool, args).await
    }
}

impl From<Dispatcher> for SharedDispatcher {
    fn from(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher)
    }
}
