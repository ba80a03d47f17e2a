use crate::error::CryptoError;
use ed25519_dalek::{Signer, Verifier};
use simchain_types::{Checksum256, PublicKeyBytes, SecretKeyBytes, Signature};
use std::fmt;

/// Seed of the well-known default block producer key. Every fresh chain
/// signs with this until a test replaces it.
const PRODUCER_SEED: [u8; 32] = *b"simchain.default.producer.seed.0";

/// Ed25519 keypair for block and transaction signing.
pub struct Keypair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// The deterministic default producer keypair.
    pub fn producer() -> Self {
        Self::from_seed(&PRODUCER_SEED)
    }

    pub fn from_secret(secret: &SecretKeyBytes) -> Self {
        Self::from_seed(&secret.0)
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a 32-byte digest, returning the wire signature (public key +
    /// ed25519 signature bytes).
    pub fn sign_digest(&self, digest: &Checksum256) -> Signature {
        let sig = self.signing_key.sign(digest.as_bytes());
        Signature {
            pubkey: self.public_key(),
            bytes: sig.to_bytes(),
        }
    }

    /// Export the seed bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", hex::encode(self.public_key().0))
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.to_bytes())
    }
}

/// Verify a wire signature against a 32-byte digest using the public key it
/// carries. This is the "recovery" step of the transaction pipeline: a
/// signature that verifies yields its embedded key as the recovered signer.
pub fn verify_digest(sig: &Signature, digest: &Checksum256) -> Result<PublicKeyBytes, CryptoError> {
    let pk = ed25519_dalek::VerifyingKey::from_bytes(sig.pubkey.as_bytes())
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig.bytes);
    pk.verify(digest.as_bytes(), &signature)
        .map_err(|_| CryptoError::VerificationFailed)?;
    Ok(sig.pubkey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    #[test]
    fn test_producer_key_is_deterministic() {
        assert_eq!(Keypair::producer().public_key(), Keypair::producer().public_key());
    }

    #[test]
    fn test_sign_and_verify_digest() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let digest = sha256(b"payload");

        let sig = kp.sign_digest(&digest);
        let recovered = verify_digest(&sig, &digest).unwrap();
        assert_eq!(recovered, kp.public_key());
    }

    #[test]
    fn test_verify_rejects_wrong_digest() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let sig = kp.sign_digest(&sha256(b"payload"));

        let err = verify_digest(&sig, &sha256(b"other")).unwrap_err();
        assert_eq!(err, CryptoError::VerificationFailed);
    }

    #[test]
    fn test_verify_rejects_forged_key() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let digest = sha256(b"payload");
        let mut sig = kp.sign_digest(&digest);
        sig.pubkey = Keypair::from_seed(&[8u8; 32]).public_key();

        assert!(verify_digest(&sig, &digest).is_err());
    }
}
