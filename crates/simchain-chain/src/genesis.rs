use borsh::{BorshDeserialize, BorshSerialize};
use simchain_crypto::hash::sha256_multi;
use simchain_crypto::Keypair;
use simchain_types::{Checksum256, PublicKeyBytes, TimePoint};

/// Unix milliseconds of 2020-01-01T00:00:00Z, the fixed genesis time of
/// every fresh test chain.
const GENESIS_TIME_MS: i64 = 1_577_836_800_000;

/// Deterministic genesis parameters. Two chains built from equal genesis
/// states share a chain id and will replay identically.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct GenesisState {
    pub initial_timestamp: TimePoint,
    pub initial_producer_key: PublicKeyBytes,
}

impl Default for GenesisState {
    fn default() -> Self {
        Self {
            initial_timestamp: TimePoint::from_millis(GENESIS_TIME_MS),
            initial_producer_key: Keypair::producer().public_key(),
        }
    }
}

impl GenesisState {
    /// The chain identity: a domain-separated digest of the genesis state.
    pub fn chain_id(&self) -> Checksum256 {
        let encoded = borsh::to_vec(self).unwrap_or_default();
        sha256_multi(&[b"simchain.genesis", &encoded])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_genesis_is_deterministic() {
        assert_eq!(GenesisState::default().chain_id(), GenesisState::default().chain_id());
    }

    #[test]
    fn test_chain_id_depends_on_timestamp() {
        let mut other = GenesisState::default();
        other.initial_timestamp = other.initial_timestamp.plus_millis(500);
        assert_ne!(other.chain_id(), GenesisState::default().chain_id());
    }
}
