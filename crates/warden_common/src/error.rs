//! Typed error taxonomy for agent operations.
//!
//! Every operation returns a typed result; the periodic loops log the
//! failure at the call site and retry on the next tick. Nothing in this
//! taxonomy is fatal to the agent.

use thiserror::Error;

/// Failure classes of the agent's external interactions.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Oracle or download call that timed out, errored, or returned a
    /// bad status/body. Retried on the next scheduled tick.
    #[error("network failure: {0}")]
    Network(String),

    /// Unreadable directory, failed delete, failed write. The affected
    /// step degrades to a no-op.
    #[error("filesystem failure: {0}")]
    Filesystem(#[from] std::io::Error),

    /// Kill or spawn failure. Best-effort only, no escalation.
    #[error("process control failure: {0}")]
    Process(String),
}

impl AgentError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        AgentError::Network(err.to_string())
    }

    pub fn process(err: impl std::fmt::Display) -> Self {
        AgentError::Process(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_to_filesystem() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AgentError = io.into();
        assert!(matches!(err, AgentError::Filesystem(_)));
        assert!(err.to_string().contains("filesystem failure"));
    }
}
