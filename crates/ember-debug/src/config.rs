//! Resolved adapter configuration.
//!
//! The embedding host (the Configuration Resolver collaborator) owns config
//! discovery and variable substitution; by the time a session starts, the
//! adapter descriptor and launch arguments arrive here as plain data.

use std::time::Duration;

use serde_json::Value;

/// How the session binds to a debuggee.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchKind {
    /// Ask the adapter to start the program described by the arguments.
    Launch(Value),
    /// Attach to an already-running process; the arguments carry whatever the
    /// adapter needs to find it (PID, host/port).
    Attach(Value),
}

impl LaunchKind {
    pub fn command(&self) -> &'static str {
        match self {
            LaunchKind::Launch(_) => "launch",
            LaunchKind::Attach(_) => "attach",
        }
    }

    pub fn arguments(&self) -> &Value {
        match self {
            LaunchKind::Launch(arguments) | LaunchKind::Attach(arguments) => arguments,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Adapter identifier passed in the `initialize` request (`adapterID`).
    pub adapter_id: String,
    pub launch: LaunchKind,
    /// Deadline for ordinary round trips (threads, stackTrace, variables).
    pub request_timeout: Duration,
    /// Deadline for the final `disconnect`; teardown proceeds either way.
    pub disconnect_timeout: Duration,
    pub terminate_debuggee: Option<bool>,
}

impl AdapterConfig {
    pub fn new(adapter_id: impl Into<String>, launch: LaunchKind) -> Self {
        AdapterConfig {
            adapter_id: adapter_id.into(),
            launch,
            request_timeout: Duration::from_secs(10),
            disconnect_timeout: Duration::from_secs(2),
            terminate_debuggee: None,
        }
    }
}
