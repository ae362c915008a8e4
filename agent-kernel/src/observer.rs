//! Dispatch outcome observers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::DispatchError;

/// One finished dispatch as seen by observers.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRecord<'a> {
    /// Requesting agent.
    pub agent: &'a str,
    /// Requested tool.
    pub tool: &'a str,
    /// Wall-clock time spent in the dispatch.
    pub elapsed: Duration,
    /// Tool output or failure.
    pub outcome: Result<&'a str, &'a DispatchError>,
}

/// Observer invoked after every dispatch, successful or not.
pub trait DispatchObserver: Send + Sync {
    /// Records the outcome of a dispatch.
    fn on_dispatch(&self, record: &DispatchRecord<'_>);
}

/// Observer that emits outcomes to the tracing system.
#[derive(Debug, Default)]
pub struct TracingDispatchObserver;

impl DispatchObserver for TracingDispatchObserver {
    fn on_dispatch(&self, record: &DispatchRecord<'_>) {
        let elapsed_ms = u64::try_from(record.elapsed.as_millis()).unwrap_or(u64::MAX);
        match record.outcome {
            Ok(output) => {
                debug!(
                    agent = record.agent,
                    tool = record.tool,
                    elapsed_ms,
                    output_bytes = output.len(),
                    "dispatch completed"
                );
            }
            Err(err) if err.is_policy_violation() => {
                warn!(
                    agent = record.agent,
                    tool = record.tool,
                    code = err.code(),
                    error = %err,
                    "dispatch rejected"
                );
            }
            Err(err) => {
                info!(
                    agent = record.agent,
                    tool = record.tool,
                    elapsed_ms,
                    code = err.code(),
                    error = %err,
                    "dispatch failed"
                );
            }
        }
    }
}

/// Composite observer that forwards outcomes to a collection of observers.
#[derive(Default)]
pub struct CompositeDispatchObserver {
    observers: Vec<Arc<dyn DispatchObserver>>,
}

impl CompositeDispatchObserver {
    /// Creates a new composite observer from the supplied list.
    #[must_use]
    pub fn new<I>(observers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn DispatchObserver>>,
    {
        Self {
            observers: observers.into_iter().collect(),
        }
    }

    /// Adds an observer to the composite set.
    pub fn push(&mut self, observer: Arc<dyn DispatchObserver>) {
        self.observers.push(observer);
    }
}

impl DispatchObserver for CompositeDispatchObserver {
    fn on_dispatch(&self, record: &DispatchRecord<'_>) {
        for observer in &self.observers {
            observer.on_dispatch(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl DispatchObserver for Recorder {
        fn on_dispatch(&self, record: &DispatchRecord<'_>) {
            let outcome = match record.outcome {
                Ok(output) => output.to_owned(),
                Err(err) => err.code().to_owned(),
            };
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}/{}:{outcome}", record.agent, record.tool));
        }
    }

    #[test]
    fn composite_forwards_to_every_observer() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let mut composite = CompositeDispatchObserver::new([
            first.clone() as Arc<dyn DispatchObserver>,
            Arc::new(TracingDispatchObserver),
        ]);
        composite.push(second.clone());

        let failure = DispatchError::UnknownTool {
            tool: "fake_tool".into(),
        };
        composite.on_dispatch(&DispatchRecord {
            agent: "SearchAgent",
            tool: "ddg_search",
            elapsed: Duration::from_millis(3),
            outcome: Ok("1. result"),
        });
        composite.on_dispatch(&DispatchRecord {
            agent: "GhostAgent",
            tool: "fake_tool",
            elapsed: Duration::ZERO,
            outcome: Err(&failure),
        });

        let expected = ["SearchAgent/ddg_search:1. result", "GhostAgent/fake_tool:unknown_tool"];
        assert_eq!(*first.seen.lock().unwrap(), expected);
        assert_eq!(*second.seen.lock().unwrap(), expected);
    }
}
