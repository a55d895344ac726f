use super::certificate::contains_block;
use super::{Certificate, PkiError};
use crate::crypto::rsa::RsaPrivateKey;
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use tracing::debug;

/// Private key and certificate used to produce a signature.
#[derive(Debug, Clone)]
pub struct Credentials {
    private_key: RsaPrivateKey,
    certificate: Certificate,
}

impl Credentials {
    pub fn new(private_key: RsaPrivateKey, certificate: Certificate) -> Self {
        Self {
            private_key,
            certificate,
        }
    }

    /// Split a combined PEM holding both the private key and the certificate.
    pub fn from_pem_bundle(
        pem: impl AsRef<[u8]>,
        passphrase: Option<&SecretString>,
    ) -> Result<Self, PkiError> {
        let pem = pem.as_ref();
        let private_key = load_private_key(pem, passphrase)?;
        let certificate = Certificate::from_pem(pem)?;
        Ok(Self::new(private_key, certificate))
    }

    /// Load from files. Without a certificate path the key file must also carry the certificate.
    pub fn load(
        key_path: impl AsRef<Path>,
        certificate_path: Option<&Path>,
        passphrase: Option<&SecretString>,
    ) -> Result<Self, PkiError> {
        let key_pem = read_file(key_path.as_ref())?;
        let Some(certificate_path) = certificate_path else {
            debug!(path = %key_path.as_ref().display(), "Loading signing credentials from PEM bundle");
            return Self::from_pem_bundle(&key_pem, passphrase);
        };

        debug!(
            key = %key_path.as_ref().display(),
            certificate = %certificate_path.display(),
            "Loading signing credentials"
        );
        let private_key = load_private_key(&key_pem, passphrase)?;
        let certificate = Certificate::from_pem(read_file(certificate_path)?)?;
        Ok(Self::new(private_key, certificate))
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn into_parts(self) -> (RsaPrivateKey, Certificate) {
        (self.private_key, self.certificate)
    }
}

fn load_private_key(
    pem: &[u8],
    passphrase: Option<&SecretString>,
) -> Result<RsaPrivateKey, PkiError> {
    if !contains_block(pem, "PRIVATE KEY")
        && !contains_block(pem, "RSA PRIVATE KEY")
        && !contains_block(pem, "ENCRYPTED PRIVATE KEY")
    {
        return Err(PkiError::MissingPem("private key"));
    }
    let key = match passphrase {
        Some(passphrase) => RsaPrivateKey::from_pem_with_passphrase(pem, passphrase.expose_secret())?,
        None => RsaPrivateKey::from_pem(pem)?,
    };
    Ok(key)
}

/// Whether the certificate carries the public half of `private_key`.
///
/// Fails only when the certificate does not hold an RSA key.
pub(crate) fn certificate_matches(
    private_key: &RsaPrivateKey,
    certificate: &Certificate,
) -> Result<bool, PkiError> {
    Ok(private_key.matches(&certificate.public_key()?))
}

fn read_file(path: &Path) -> Result<Vec<u8>, PkiError> {
    std::fs::read(path).map_err(|source| PkiError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::cert_utils::{generate_ca_certificate, generate_leaf_certificate, pem_bundle};

    #[test]
    fn test_from_pem_bundle() {
        let (ca_cert, ca_key) = generate_ca_certificate().unwrap();
        let (cert_pem, key_pem) = generate_leaf_certificate(&ca_cert, &ca_key).unwrap();

        // Key first or certificate first are both accepted
        for bundle in [pem_bundle(&cert_pem, &key_pem), pem_bundle(&key_pem, &cert_pem)] {
            let credentials = Credentials::from_pem_bundle(&bundle, None).unwrap();
            assert!(certificate_matches(credentials.private_key(), credentials.certificate()).unwrap());
            assert_eq!(credentials.certificate().common_name().as_deref(), Some("localhost"));
        }
    }

    #[test]
    fn test_bundle_without_key_fails() {
        let (ca_cert, _) = generate_ca_certificate().unwrap();
        let err = Credentials::from_pem_bundle(ca_cert.to_pem().unwrap(), None).unwrap_err();
        assert!(matches!(err, PkiError::MissingPem("private key")));
    }

    #[test]
    fn test_encrypted_bundle() {
        let (ca_cert, ca_key) = generate_ca_certificate().unwrap();
        let encrypted_key = ca_key
            .private_key_to_pem_pkcs8_passphrase(openssl::symm::Cipher::aes_256_cbc(), b"segredo")
            .unwrap();
        let bundle = pem_bundle(&encrypted_key, &ca_cert.to_pem().unwrap());

        let passphrase = SecretString::from("segredo".to_string());
        let credentials = Credentials::from_pem_bundle(&bundle, Some(&passphrase)).unwrap();
        assert_eq!(credentials.certificate().common_name().as_deref(), Some("Test Root CA"));

        let wrong = SecretString::from("errado".to_string());
        assert!(matches!(
            Credentials::from_pem_bundle(&bundle, Some(&wrong)),
            Err(PkiError::Crypto(_))
        ));
    }

    #[test]
    fn test_mismatched_certificate_is_accepted() {
        let (ca_cert, _) = generate_ca_certificate().unwrap();
        let other_key = crate::crypto::rsa::RsaPrivateKey::generate(
            crate::crypto::rsa::RsaKeySize::Rsa2048,
        )
        .unwrap();
        let credentials = Credentials::new(other_key, Certificate::from(ca_cert));
        assert!(!certificate_matches(credentials.private_key(), credentials.certificate()).unwrap());
    }

    #[test]
    fn test_missing_file() {
        let err = Credentials::load("/nonexistent/key.pem", None, None).unwrap_err();
        assert!(matches!(err, PkiError::Io { .. }));
    }
}
