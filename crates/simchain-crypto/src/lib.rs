//! Cryptographic primitives for the SIMCHAIN tester.
//!
//! The guest-facing surface is small: four digests and ed25519 signing.
//! Determinism matters more than key hygiene here: every chain signs with
//! the same well-known producer key unless a test replaces it.

pub mod error;
pub mod hash;
pub mod keys;

pub use error::CryptoError;
pub use hash::{ripemd160, sha1, sha256, sha512};
pub use keys::{verify_digest, Keypair};
