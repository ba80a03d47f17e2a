//! Snapshot read/write.
//!
//! A snapshot is a magic/version header followed by the borsh encoding of
//! `ChainSnapshot`, whose first field is the chain id, so identity can be
//! extracted and validated without decoding the whole state.

use crate::error::ChainError;
use crate::state::StateDb;
use borsh::{BorshDeserialize, BorshSerialize};
use simchain_types::{Checksum256, PublicKeyBytes, TimePoint};
use std::fs;
use std::path::Path;

const SNAPSHOT_MAGIC: [u8; 8] = *b"SIMSNAP\0";
const SNAPSHOT_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;

/// Everything needed to rebuild a controller at a past moment.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct ChainSnapshot {
    pub chain_id: Checksum256,
    pub head_block_num: u32,
    pub head_block_id: Checksum256,
    pub head_timestamp: TimePoint,
    pub producer_key: PublicKeyBytes,
    pub state: StateDb,
}

fn validate_header(bytes: &[u8]) -> Result<(), ChainError> {
    if bytes.len() < HEADER_LEN {
        return Err(ChainError::Snapshot("file too short".to_string()));
    }
    if bytes[..8] != SNAPSHOT_MAGIC {
        return Err(ChainError::Snapshot("bad magic".to_string()));
    }
    let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if version != SNAPSHOT_VERSION {
        return Err(ChainError::Snapshot(format!(
            "unsupported version {version}"
        )));
    }
    Ok(())
}

/// Write a snapshot file.
pub fn write_snapshot(path: &Path, snapshot: &ChainSnapshot) -> Result<(), ChainError> {
    let mut bytes = Vec::with_capacity(HEADER_LEN);
    bytes.extend_from_slice(&SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    borsh::to_writer(&mut bytes, snapshot).map_err(|e| ChainError::Codec(e.to_string()))?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Validate the header and extract only the embedded chain identity.
pub fn extract_chain_id(path: &Path) -> Result<Checksum256, ChainError> {
    let bytes = fs::read(path)?;
    validate_header(&bytes)?;
    let body = &bytes[HEADER_LEN..];
    if body.len() < Checksum256::LEN {
        return Err(ChainError::Snapshot("truncated chain id".to_string()));
    }
    Checksum256::from_slice(&body[..Checksum256::LEN])
        .map_err(|e| ChainError::Snapshot(e.to_string()))
}

/// Read and decode a whole snapshot.
pub fn read_snapshot(path: &Path) -> Result<ChainSnapshot, ChainError> {
    let bytes = fs::read(path)?;
    validate_header(&bytes)?;
    borsh::from_slice(&bytes[HEADER_LEN..]).map_err(|e| ChainError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use simchain_types::AccountName;

    fn sample_snapshot() -> ChainSnapshot {
        let mut state = StateDb::new();
        state.create_account(
            AccountName::new(7),
            AccountName::new(8),
            PublicKeyBytes([9u8; 32]),
        );
        ChainSnapshot {
            chain_id: Checksum256::from_bytes([0xcd; 32]),
            head_block_num: 41,
            head_block_id: Checksum256::from_bytes([0xab; 32]),
            head_timestamp: TimePoint::from_millis(1_600_000_000_000),
            producer_key: PublicKeyBytes([1u8; 32]),
            state,
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chain.snapshot");
        let snap = sample_snapshot();

        write_snapshot(&path, &snap).unwrap();
        let back = read_snapshot(&path).unwrap();
        assert_eq!(back.chain_id, snap.chain_id);
        assert_eq!(back.head_block_num, 41);
        assert!(back.state.has_account(AccountName::new(7)));
    }

    #[test]
    fn test_extract_chain_id_without_full_decode() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chain.snapshot");
        write_snapshot(&path, &sample_snapshot()).unwrap();

        assert_eq!(
            extract_chain_id(&path).unwrap(),
            Checksum256::from_bytes([0xcd; 32])
        );
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bogus");
        fs::write(&path, b"NOTASNAPxxxxmore").unwrap();

        assert!(matches!(
            extract_chain_id(&path),
            Err(ChainError::Snapshot(_))
        ));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chain.snapshot");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&99u32.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        assert!(matches!(read_snapshot(&path), Err(ChainError::Snapshot(_))));
    }
}
