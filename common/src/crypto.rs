//! Common cryptography helper functions for Pharos

use crate::hash::Hash;
use blake2::{
    digest::consts::{U24, U32},
    Blake2b, Digest,
};
use sha2::Sha256;

/// Double SHA-256 of the input
pub fn sha256d(data: &[u8]) -> Hash<32> {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash::new(second.into())
}

/// Blake2b-256 of the input
pub fn blake2b_256(data: &[u8]) -> Hash<32> {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    Hash::new(hasher.finalize().into())
}

/// Blake2b-192 of the input, used for VBK block hashes
pub fn blake2b_192(data: &[u8]) -> Hash<24> {
    let mut hasher = Blake2b::<U24>::new();
    hasher.update(data);
    Hash::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_have_expected_widths_and_differ() {
        let data = b"pharos";
        assert_ne!(sha256d(data).to_vec(), blake2b_256(data).to_vec());
        assert_eq!(blake2b_192(data).to_vec().len(), 24);
    }

    #[test]
    fn sha256d_known_vector() {
        // sha256d of the empty string
        let hash = sha256d(b"");
        assert_eq!(
            hash.to_string(),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }
}
