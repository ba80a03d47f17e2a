//! Host-call dispatch layer of the SIMCHAIN tester.
//!
//! This crate is the bridge between a guest test module's linear memory and
//! the native services behind it: chain sessions, table iterators, the
//! transaction pipeline, crypto primitives, and a minimal file/console
//! polyfill. Every host call validates its memory arguments before use and
//! surfaces contract violations as faults that unwind the whole run.

pub mod chain_calls;
pub mod crypto_calls;
pub mod db_calls;
pub mod error;
pub mod file_calls;
pub mod files;
pub mod memory;
pub mod process_calls;
pub mod registry;
pub mod runner;
pub mod session;

pub use error::HostError;
pub use files::FileTable;
pub use registry::HostRegistry;
pub use runner::{classify, run_module};
pub use session::{ChainManager, ChainSession};

/// Everything a host call can reach, stored as the wasmtime store data.
pub struct HostState {
    pub chains: ChainManager,
    pub files: FileTable,
    pub args: Vec<String>,
}

impl HostState {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            chains: ChainManager::new(),
            files: FileTable::new(),
            args,
        }
    }
}
