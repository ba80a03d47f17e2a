//! The chain controller collaborator of the SIMCHAIN tester.
//!
//! One `Controller` is one independent, disposable blockchain: a
//! deterministic single-producer block machine over an ordered in-memory
//! state database, with a block log on disk and a scheduled-transaction
//! queue. The harness owns one controller per chain session and drives it
//! exclusively from host-call handlers; nothing here is thread-safe and
//! nothing needs to be.

pub mod apply;
pub mod blocks;
pub mod controller;
pub mod error;
pub mod genesis;
pub mod read_context;
pub mod snapshot;
pub mod state;

pub use controller::{Controller, BILLED_CPU_TIME_US};
pub use error::ChainError;
pub use genesis::GenesisState;
pub use read_context::{IndexFamily, Partition, ReadContext};
pub use snapshot::{extract_chain_id, read_snapshot, write_snapshot, ChainSnapshot};
pub use state::{AccountMeta, RowRecord, ScheduledTransaction, StateDb};
