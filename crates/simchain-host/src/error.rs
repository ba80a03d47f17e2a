use simchain_chain::ChainError;
use thiserror::Error;

/// Errors a host call can raise. All of them are fatal to the run: a guest
/// that trips one has violated the host contract (or asked to stop).
/// Transaction-level failures never appear here; they travel inside traces.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0}")]
    GuestAssertion(String),

    #[error("guest called abort")]
    Aborted,

    #[error("guest exited with code {0}")]
    Exit(i32),

    #[error("memory access out of bounds: offset {offset}, len {len}")]
    MemoryBounds { offset: u64, len: u64 },

    #[error("missing required export `{0}`")]
    MissingExport(&'static str),

    #[error("unresolved import {module}:{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("allocator callback failed: {0}")]
    BadAllocator(String),

    #[error("malformed argument: {0}")]
    MalformedArgument(String),

    #[error("chain {0} does not exist or was destroyed")]
    ChainNotFound(u32),

    #[error("chain {0} was shut down")]
    ChainShutDown(u32),

    #[error("select_chain_for_db() must be called before table access")]
    NoChainSelected,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl HostError {
    /// Category prefix used when the error surfaces at process exit.
    pub fn category(&self) -> &'static str {
        match self {
            HostError::GuestAssertion(_) => "guest assertion",
            HostError::Aborted => "guest abort",
            HostError::Exit(_) => "guest exit",
            HostError::ChainNotFound(_)
            | HostError::ChainShutDown(_)
            | HostError::NoChainSelected => "chain error",
            _ => "host fault",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            HostError::GuestAssertion("x".into()).category(),
            "guest assertion"
        );
        assert_eq!(HostError::NoChainSelected.category(), "chain error");
        assert_eq!(
            HostError::MemoryBounds { offset: 0, len: 1 }.category(),
            "host fault"
        );
        assert_eq!(
            HostError::Chain(ChainError::StaleIterator(4)).category(),
            "host fault"
        );
    }
}
