use simchain_types::AccountName;
use thiserror::Error;

/// Errors raised by the chain controller and its read contexts.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Account {0} does not exist")]
    UnknownAccount(AccountName),

    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Codec(String),

    #[error("No pending block")]
    NoPendingBlock,

    #[error("Iterator {0} is not valid")]
    InvalidIterator(i32),

    #[error("Iterator {0} was invalidated by a state mutation")]
    StaleIterator(i32),

    #[error("Iterator {0} belongs to a different table index")]
    IteratorFamilyMismatch(i32),
}

impl PartialEq for ChainError {
    fn eq(&self, other: &Self) -> bool {
        use ChainError::*;
        match (self, other) {
            (Io(a), Io(b)) => a.kind() == b.kind(),
            (UnknownAccount(a), UnknownAccount(b)) => a == b,
            (Snapshot(a), Snapshot(b)) => a == b,
            (Codec(a), Codec(b)) => a == b,
            (NoPendingBlock, NoPendingBlock) => true,
            (InvalidIterator(a), InvalidIterator(b)) => a == b,
            (StaleIterator(a), StaleIterator(b)) => a == b,
            (IteratorFamilyMismatch(a), IteratorFamilyMismatch(b)) => a == b,
            _ => false,
        }
    }
}
