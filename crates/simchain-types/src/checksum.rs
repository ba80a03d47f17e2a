use crate::error::TypesError;
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;
use std::str::FromStr;

macro_rules! checksum_type {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;
            pub const ZERO: Self = Self([0u8; $len]);

            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
                if slice.len() != $len {
                    return Err(TypesError::InvalidChecksumLength {
                        expected: $len,
                        actual: slice.len(),
                    });
                }
                let mut bytes = [0u8; $len];
                bytes.copy_from_slice(slice);
                Ok(Self(bytes))
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s)?;
                Self::from_slice(&bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

checksum_type!(Checksum160, 20, "160-bit digest (sha1, ripemd160).");
checksum_type!(Checksum256, 32, "256-bit digest (sha256).");
checksum_type!(Checksum512, 64, "512-bit digest (sha512).");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_roundtrip() {
        let sum = Checksum256::from_bytes([7u8; 32]);
        let bytes = borsh::to_vec(&sum).unwrap();
        assert_eq!(bytes.len(), 32);

        let back: Checksum256 = borsh::from_slice(&bytes).unwrap();
        assert_eq!(back, sum);
    }

    #[test]
    fn test_checksum_hex() {
        let sum = Checksum160::from_bytes([0xab; 20]);
        let parsed: Checksum160 = sum.to_hex().parse().unwrap();
        assert_eq!(parsed, sum);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_checksum_serde_is_hex_string() {
        let sum = Checksum256::from_bytes([0x1f; 32]);
        let json = serde_json::to_string(&sum).unwrap();
        assert_eq!(json, format!("\"{}\"", sum.to_hex()));

        let back: Checksum256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sum);
    }

    #[test]
    fn test_from_slice_rejects_bad_length() {
        let err = Checksum512::from_slice(&[0u8; 63]).unwrap_err();
        assert_eq!(
            err,
            TypesError::InvalidChecksumLength {
                expected: 64,
                actual: 63
            }
        );
    }
}
