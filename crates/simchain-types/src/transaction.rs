use crate::error::TypesError;
use crate::name::{AccountName, PermissionLevel};
use crate::time::TimePoint;
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;

/// Raw ed25519 public key bytes.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != 32 {
            return Err(TypesError::InvalidPublicKeyLength {
                expected: 32,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({})", hex::encode(self.0))
    }
}

/// Raw ed25519 secret seed, as supplied by the guest for test signing.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SecretKeyBytes(pub [u8; 32]);

impl SecretKeyBytes {
    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != 32 {
            return Err(TypesError::InvalidPublicKeyLength {
                expected: 32,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }
}

impl fmt::Debug for SecretKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        write!(f, "SecretKeyBytes(..)")
    }
}

/// A transaction signature: the signer's public key followed by the ed25519
/// signature over the chain-scoped signing digest. Carrying the key in the
/// envelope is what makes signature "recovery" possible on a curve without
/// key recovery.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Signature {
    pub pubkey: PublicKeyBytes,
    pub bytes: [u8; 64],
}

impl Signature {
    pub const WIRE_LEN: usize = 96;
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Signature(pubkey={}, sig={})",
            hex::encode(self.pubkey.0),
            hex::encode(self.bytes)
        )
    }
}

/// A single action: a call to `name` on `account`, authorized by
/// `authorization`, with an opaque payload.
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Action {
    pub account: AccountName,
    pub name: AccountName,
    pub authorization: Vec<PermissionLevel>,
    pub data: Vec<u8>,
}

/// An unsigned transaction.
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transaction {
    /// Absolute expiration; a pending block past this time fails the
    /// transaction with `Expired` status.
    pub expiration: TimePoint,
    /// Non-zero delays execution: the transaction enters the scheduled
    /// queue, due at pending-block-time + delay.
    pub delay_ms: u32,
    pub context_free_actions: Vec<Action>,
    pub actions: Vec<Action>,
}

/// A transaction plus its signatures and context-free data.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signatures: Vec<Signature>,
    pub context_free_data: Vec<Vec<u8>>,
}

/// The wire bundle a guest hands to `push_transaction`: the borsh-encoded
/// transaction, context-free blobs, ready-made signatures, and raw keys the
/// harness should sign with on the guest's behalf.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct PackedTransactionRequest {
    pub transaction: Vec<u8>,
    pub context_free_data: Vec<Vec<u8>>,
    pub signatures: Vec<Signature>,
    pub keys: Vec<SecretKeyBytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> Transaction {
        Transaction {
            expiration: TimePoint::from_millis(1000),
            delay_ms: 0,
            context_free_actions: vec![],
            actions: vec![Action {
                account: AccountName::new(11),
                name: AccountName::new(22),
                authorization: vec![PermissionLevel::new(
                    AccountName::new(11),
                    AccountName::new(33),
                )],
                data: vec![1, 2, 3],
            }],
        }
    }

    #[test]
    fn test_transaction_roundtrip() {
        let tx = sample_transaction();
        let bytes = borsh::to_vec(&tx).unwrap();
        let back: Transaction = borsh::from_slice(&bytes).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn test_packed_request_roundtrip() {
        let req = PackedTransactionRequest {
            transaction: borsh::to_vec(&sample_transaction()).unwrap(),
            context_free_data: vec![vec![9, 9]],
            signatures: vec![Signature {
                pubkey: PublicKeyBytes([1u8; 32]),
                bytes: [2u8; 64],
            }],
            keys: vec![SecretKeyBytes([3u8; 32])],
        };
        let bytes = borsh::to_vec(&req).unwrap();
        let back: PackedTransactionRequest = borsh::from_slice(&bytes).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_signature_wire_len() {
        let sig = Signature {
            pubkey: PublicKeyBytes([0u8; 32]),
            bytes: [0u8; 64],
        };
        assert_eq!(borsh::to_vec(&sig).unwrap().len(), Signature::WIRE_LEN);
    }

    #[test]
    fn test_wire_integers_are_little_endian() {
        let action = Action {
            account: AccountName::new(0x0102030405060708),
            name: AccountName::new(0),
            authorization: vec![],
            data: vec![],
        };
        let bytes = borsh::to_vec(&action).unwrap();
        assert_eq!(&bytes[..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }
}
