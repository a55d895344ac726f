use crate::crypto::HashAlg;
use crate::crypto::errors::{CryptoResult, Error};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{Signer, Verifier};
use std::fmt;

/// RSA key sizes accepted for signing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaKeySize {
    /// 1024-bit RSA key, still found on legacy A1 certificates
    Rsa1024,
    /// 2048-bit RSA key
    Rsa2048,
    /// 3072-bit RSA key
    Rsa3072,
    /// 4096-bit RSA key
    Rsa4096,
}

impl RsaKeySize {
    /// Get the key size in bits
    pub fn bits(&self) -> u32 {
        match self {
            RsaKeySize::Rsa1024 => 1024,
            RsaKeySize::Rsa2048 => 2048,
            RsaKeySize::Rsa3072 => 3072,
            RsaKeySize::Rsa4096 => 4096,
        }
    }

    /// Get the key size in bytes, which is also the signature length
    pub fn bytes(&self) -> u32 {
        self.bits() / 8
    }
}

impl TryFrom<u32> for RsaKeySize {
    type Error = Error;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            1024 => Ok(Self::Rsa1024),
            2048 => Ok(Self::Rsa2048),
            3072 => Ok(Self::Rsa3072),
            4096 => Ok(Self::Rsa4096),
            _ => Err(Error::Invalid(format!("Unsupported RSA key size: {bits}"))),
        }
    }
}

/// An RSASSA-PKCS1-v1_5 signature
#[derive(Clone, PartialEq, Eq)]
pub struct RsaSignature {
    data: Vec<u8>,
}

impl RsaSignature {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Get the signature data as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Convert signature to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for RsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSignature")
            .field("size", &self.len())
            .field("hex", &self.to_hex())
            .finish()
    }
}

/// RSA private key handle. Key material never appears in `Debug` output.
#[derive(Clone)]
pub struct RsaPrivateKey {
    key: PKey<Private>,
    key_size: RsaKeySize,
}

impl RsaPrivateKey {
    /// Generate a new RSA private key
    pub fn generate(key_size: RsaKeySize) -> CryptoResult<Self> {
        let rsa = Rsa::generate(key_size.bits())?;
        let key = PKey::from_rsa(rsa)?;

        Ok(Self { key, key_size })
    }

    /// Load from PEM-encoded PKCS#1/PKCS#8.
    pub fn from_pem(pem_bytes: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let key = PKey::private_key_from_pem(pem_bytes.as_ref())?;
        Self::from_pkey(key)
    }

    /// Load from an encrypted PEM-encoded PKCS#8 or legacy encrypted PKCS#1 key.
    pub fn from_pem_with_passphrase(
        pem_bytes: impl AsRef<[u8]>,
        passphrase: &str,
    ) -> CryptoResult<Self> {
        let key = PKey::private_key_from_pem_passphrase(pem_bytes.as_ref(), passphrase.as_bytes())?;
        Self::from_pkey(key)
    }

    fn from_pkey(key: PKey<Private>) -> CryptoResult<Self> {
        let rsa = key
            .rsa()
            .map_err(|_| Error::Invalid("Private key is not an RSA key".into()))?;
        let bits = rsa.size() * 8;
        let key_size = RsaKeySize::try_from(bits)?;
        Ok(Self { key, key_size })
    }

    /// Serialize as PEM-encoded PKCS#8.
    pub fn to_pem(&self) -> CryptoResult<Vec<u8>> {
        Ok(self.key.private_key_to_pem_pkcs8()?)
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> CryptoResult<RsaPublicKey> {
        let pub_key = PKey::public_key_from_der(&self.key.public_key_to_der()?)?;

        Ok(RsaPublicKey {
            key: pub_key,
            key_size: self.key_size,
        })
    }

    /// Whether `public_key` is the public half of this key
    pub fn matches(&self, public_key: &RsaPublicKey) -> bool {
        self.key.public_eq(public_key.pkey())
    }

    /// Get the key size
    pub fn key_size(&self) -> RsaKeySize {
        self.key_size
    }

    /// Get the underlying OpenSSL private key
    pub(crate) fn pkey(&self) -> &PKey<Private> {
        &self.key
    }
}

impl fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("key_size", &self.key_size)
            .finish_non_exhaustive()
    }
}

/// RSA public key wrapper
#[derive(Debug, Clone)]
pub struct RsaPublicKey {
    key: PKey<Public>,
    key_size: RsaKeySize,
}

impl RsaPublicKey {
    pub(crate) fn from_pkey(key: PKey<Public>) -> CryptoResult<Self> {
        let rsa = key
            .rsa()
            .map_err(|_| Error::Invalid("Public key is not an RSA key".into()))?;
        let key_size = RsaKeySize::try_from(rsa.size() * 8)?;
        Ok(Self { key, key_size })
    }

    /// Get the key size
    pub fn key_size(&self) -> RsaKeySize {
        self.key_size
    }

    /// Get the underlying OpenSSL public key
    pub(crate) fn pkey(&self) -> &PKey<Public> {
        &self.key
    }
}

/// Sign data with RSASSA-PKCS1-v1_5 using the given hash
pub fn sign(
    private_key: &RsaPrivateKey,
    data: impl AsRef<[u8]>,
    hash_alg: HashAlg,
) -> CryptoResult<RsaSignature> {
    let mut signer = Signer::new(MessageDigest::from(&hash_alg), private_key.pkey())?;
    signer.set_rsa_padding(Padding::PKCS1)?;
    signer.update(data.as_ref())?;
    let signature_data = signer.sign_to_vec()?;

    Ok(RsaSignature::new(signature_data))
}

/// Verify an RSASSA-PKCS1-v1_5 signature
pub fn verify(
    public_key: &RsaPublicKey,
    data: impl AsRef<[u8]>,
    signature: &RsaSignature,
    hash_alg: HashAlg,
) -> CryptoResult<bool> {
    if signature.len() != public_key.key_size().bytes() as usize {
        return Ok(false);
    }

    let mut verifier = Verifier::new(MessageDigest::from(&hash_alg), public_key.pkey())?;
    verifier.set_rsa_padding(Padding::PKCS1)?;
    verifier.update(data.as_ref())?;
    Ok(verifier.verify(signature.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate() -> (RsaPrivateKey, RsaPublicKey) {
        let private_key = RsaPrivateKey::generate(RsaKeySize::Rsa2048).unwrap();
        let public_key = private_key.public_key().unwrap();
        (private_key, public_key)
    }

    #[test]
    fn test_rsa_sign_verify() {
        let (private_key, public_key) = generate();
        let data = b"test data";

        for hash_alg in [HashAlg::Sha1, HashAlg::Sha256] {
            let signature = sign(&private_key, data, hash_alg).unwrap();
            assert_eq!(signature.len(), 256);
            assert!(verify(&public_key, data, &signature, hash_alg).unwrap());

            // Wrong data must not verify
            assert!(!verify(&public_key, b"wrong data", &signature, hash_alg).unwrap());
        }
    }

    #[test]
    fn test_signature_is_deterministic() {
        // PKCS#1 v1.5 signatures carry no randomness
        let (private_key, _) = generate();
        let first = sign(&private_key, b"signed info", HashAlg::Sha1).unwrap();
        let second = sign(&private_key, b"signed info", HashAlg::Sha1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hash_mismatch_fails() {
        let (private_key, public_key) = generate();
        let signature = sign(&private_key, b"data", HashAlg::Sha1).unwrap();
        assert!(!verify(&public_key, b"data", &signature, HashAlg::Sha256).unwrap());
    }

    #[test]
    fn test_cross_key_verification_fails() {
        let (private_key1, public_key1) = generate();
        let (_, public_key2) = generate();

        let signature = sign(&private_key1, b"test data", HashAlg::Sha256).unwrap();
        assert!(!verify(&public_key2, b"test data", &signature, HashAlg::Sha256).unwrap());
        assert!(private_key1.matches(&public_key1));
        assert!(!private_key1.matches(&public_key2));
    }

    #[test]
    fn test_pem_roundtrip_and_passphrase() {
        let key = RsaPrivateKey::generate(RsaKeySize::Rsa2048).unwrap();
        let pem = key.to_pem().unwrap();
        let reloaded = RsaPrivateKey::from_pem(&pem).unwrap();
        assert!(reloaded.matches(&key.public_key().unwrap()));

        let encrypted = key
            .pkey()
            .private_key_to_pem_pkcs8_passphrase(
                openssl::symm::Cipher::aes_256_cbc(),
                b"sua_senha_aqui",
            )
            .unwrap();
        let decrypted = RsaPrivateKey::from_pem_with_passphrase(&encrypted, "sua_senha_aqui").unwrap();
        assert!(decrypted.matches(&key.public_key().unwrap()));
        assert!(RsaPrivateKey::from_pem_with_passphrase(&encrypted, "wrong").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = RsaPrivateKey::generate(RsaKeySize::Rsa2048).unwrap();
        let debug_str = format!("{key:?}");
        assert!(debug_str.contains("Rsa2048"));
        assert!(!debug_str.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_non_rsa_key_rejected() {
        let group = openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::X9_62_PRIME256V1).unwrap();
        let ec = openssl::ec::EcKey::generate(&group).unwrap();
        let pem = PKey::from_ec_key(ec).unwrap().private_key_to_pem_pkcs8().unwrap();
        assert!(matches!(RsaPrivateKey::from_pem(&pem), Err(Error::Invalid(_))));
    }
}
