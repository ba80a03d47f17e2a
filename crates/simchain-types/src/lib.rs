//! Core types for the SIMCHAIN tester.
//!
//! Everything that crosses the guest/host boundary lives here: account
//! names, checksums, timestamps, transactions and their execution traces.
//! All wire encodings go through borsh, which writes multi-byte integers
//! little-endian.

pub mod checksum;
pub mod error;
pub mod name;
pub mod time;
pub mod trace;
pub mod transaction;

pub use checksum::{Checksum160, Checksum256, Checksum512};
pub use error::TypesError;
pub use name::{AccountName, PermissionLevel};
pub use time::{BlockTimestamp, TimePoint, BLOCK_INTERVAL_MS};
pub use trace::{
    AccountDelta, ActionReceipt, ActionTrace, BlockInfo, TransactionStatus, TransactionTrace,
};
pub use transaction::{
    Action, PackedTransactionRequest, PublicKeyBytes, SecretKeyBytes, Signature,
    SignedTransaction, Transaction,
};
