mod errors;
pub mod rsa;

pub use errors::Error;

use errors::CryptoResult;
use openssl::hash::{Hasher, MessageDigest as Digest};
use std::fmt;

/// Hash algorithms usable for reference digests and RSA signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    /// SHA-1, mandated by legacy RSA-SHA1 validators
    Sha1,
    /// SHA-256
    Sha256,
}

impl HashAlg {
    /// Hash the given data with this hash algorithm
    pub fn hash(&self, data: impl AsRef<[u8]>) -> CryptoResult<Vec<u8>> {
        let mut hasher = Hasher::new(self.into())?;
        hasher.update(data.as_ref())?;
        Ok(hasher.finish()?.to_vec())
    }

    /// Get the output size in bytes
    pub fn output_size(self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
        }
    }
}

impl From<&HashAlg> for Digest {
    fn from(hash_alg: &HashAlg) -> Self {
        match hash_alg {
            HashAlg::Sha1 => Digest::sha1(),
            HashAlg::Sha256 => Digest::sha256(),
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlg::Sha1 => "SHA-1",
            HashAlg::Sha256 => "SHA-256",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_vectors() {
        // FIPS 180 test vectors for the message "abc"
        assert_eq!(
            hex::encode(HashAlg::Sha1.hash(b"abc").unwrap()),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hex::encode(HashAlg::Sha256.hash(b"abc").unwrap()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_output_size() {
        for alg in [HashAlg::Sha1, HashAlg::Sha256] {
            let digest = alg.hash(b"test_data").unwrap();
            assert_eq!(digest.len(), alg.output_size());
        }
    }

    #[test]
    fn test_identical_input_identical_digest() {
        let first = HashAlg::Sha1.hash("<a>1</a>").unwrap();
        let second = HashAlg::Sha1.hash("<a>1</a>").unwrap();
        let other = HashAlg::Sha1.hash("<a>2</a>").unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }
}
