use sha1::Digest;
use simchain_types::{Checksum160, Checksum256, Checksum512};

/// Compute the sha1 digest of `data`.
pub fn sha1(data: &[u8]) -> Checksum160 {
    let digest = sha1::Sha1::digest(data);
    Checksum160::from_bytes(digest.into())
}

/// Compute the sha256 digest of `data`.
pub fn sha256(data: &[u8]) -> Checksum256 {
    let digest = sha2::Sha256::digest(data);
    Checksum256::from_bytes(digest.into())
}

/// Compute the sha512 digest of `data`.
pub fn sha512(data: &[u8]) -> Checksum512 {
    let digest = sha2::Sha512::digest(data);
    Checksum512::from_bytes(digest.into())
}

/// Compute the ripemd160 digest of `data`.
pub fn ripemd160(data: &[u8]) -> Checksum160 {
    let digest = ripemd::Ripemd160::digest(data);
    Checksum160::from_bytes(digest.into())
}

/// sha256 over multiple slices without intermediate concatenation.
pub fn sha256_multi(data: &[&[u8]]) -> Checksum256 {
    let mut hasher = sha2::Sha256::new();
    for chunk in data {
        hasher.update(chunk);
    }
    Checksum256::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // NIST vector for "abc"
        assert_eq!(
            sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha1_known_vector() {
        assert_eq!(
            sha1(b"abc").to_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_ripemd160_known_vector() {
        assert_eq!(
            ripemd160(b"abc").to_hex(),
            "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc"
        );
    }

    #[test]
    fn test_sha512_length_and_determinism() {
        let a = sha512(b"simchain");
        let b = sha512(b"simchain");
        assert_eq!(a, b);
        assert_ne!(a, sha512(b"simchain!"));
    }

    #[test]
    fn test_sha256_multi_matches_concat() {
        assert_eq!(sha256_multi(&[b"hello ", b"world"]), sha256(b"hello world"));
    }
}
