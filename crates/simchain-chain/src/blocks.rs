//! Block types and the on-disk block log.

use crate::error::ChainError;
use borsh::{BorshDeserialize, BorshSerialize};
use simchain_crypto::hash::sha256;
use simchain_types::{BlockTimestamp, Checksum256, Signature};
use std::fs;
use std::path::{Path, PathBuf};

/// Header of one produced block.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    pub block_num: u32,
    pub previous: Checksum256,
    pub timestamp: BlockTimestamp,
    pub transaction_count: u32,
}

impl BlockHeader {
    /// The header digest doubles as the block id and as the producer's
    /// signing digest.
    pub fn digest(&self) -> Result<Checksum256, ChainError> {
        let encoded = borsh::to_vec(self).map_err(|e| ChainError::Codec(e.to_string()))?;
        Ok(sha256(&encoded))
    }
}

/// A finalized block: header, the ids of its transactions, and the
/// producer's signature over the header digest.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub transaction_ids: Vec<Checksum256>,
    pub producer_signature: Signature,
}

/// Append-only per-block files under the session's data directory.
pub struct BlockLog {
    path: PathBuf,
}

impl BlockLog {
    pub fn new(path: &Path) -> Result<Self, ChainError> {
        fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Persist a committed block.
    pub fn append(&self, block: &SignedBlock) -> Result<(), ChainError> {
        let encoded = borsh::to_vec(block).map_err(|e| ChainError::Codec(e.to_string()))?;
        let file = self
            .path
            .join(format!("block_{:012}.bin", block.header.block_num));
        fs::write(&file, &encoded)?;
        fs::write(self.path.join("latest"), block.header.block_num.to_string())?;
        tracing::debug!("block #{} persisted", block.header.block_num);
        Ok(())
    }

    /// Read a committed block back.
    pub fn get(&self, block_num: u32) -> Result<Option<SignedBlock>, ChainError> {
        let file = self.path.join(format!("block_{:012}.bin", block_num));
        if !file.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&file)?;
        let block = borsh::from_slice(&bytes).map_err(|e| ChainError::Codec(e.to_string()))?;
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simchain_types::PublicKeyBytes;

    fn sample_block(num: u32) -> SignedBlock {
        let header = BlockHeader {
            block_num: num,
            previous: Checksum256::from_bytes([3u8; 32]),
            timestamp: BlockTimestamp::from_slot(100 + num),
            transaction_count: 0,
        };
        SignedBlock {
            header,
            transaction_ids: vec![],
            producer_signature: Signature {
                pubkey: PublicKeyBytes([0u8; 32]),
                bytes: [0u8; 64],
            },
        }
    }

    #[test]
    fn test_header_digest_changes_with_contents() {
        let a = sample_block(1).header;
        let mut b = a.clone();
        b.transaction_count = 2;
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn test_block_log_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = BlockLog::new(dir.path()).unwrap();

        let block = sample_block(7);
        log.append(&block).unwrap();

        assert_eq!(log.get(7).unwrap(), Some(block));
        assert_eq!(log.get(8).unwrap(), None);
    }
}
