use thiserror::Error;

/// Errors that can occur in crypto operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CryptoError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid secret key length: expected 32, got {0}")]
    InvalidSecretKeyLength(usize),

    #[error("Signature verification failed")]
    VerificationFailed,
}

impl From<ed25519_dalek::SignatureError> for CryptoError {
    fn from(_: ed25519_dalek::SignatureError) -> Self {
        CryptoError::VerificationFailed
    }
}
