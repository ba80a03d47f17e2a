use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;

/// 64-bit account name.
///
/// Names travel across the guest boundary as raw `u64` values; the harness
/// never interprets them beyond equality and ordering.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccountName(pub u64);

impl AccountName {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for AccountName {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountName({})", self.0)
    }
}

/// An (actor, permission) pair naming one authorization of an action.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshSerialize, BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermissionLevel {
    pub actor: AccountName,
    pub permission: AccountName,
}

impl PermissionLevel {
    pub const fn new(actor: AccountName, permission: AccountName) -> Self {
        Self { actor, permission }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        let name = AccountName::new(0xdeadbeef);
        let bytes = borsh::to_vec(&name).unwrap();
        assert_eq!(bytes, 0xdeadbeefu64.to_le_bytes());

        let back: AccountName = borsh::from_slice(&bytes).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn test_name_ordering() {
        assert!(AccountName::new(1) < AccountName::new(2));
    }
}
