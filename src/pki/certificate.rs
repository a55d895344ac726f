use super::PkiError;
use crate::crypto::rsa::RsaPublicKey;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::nid::Nid;
use openssl::x509::X509;
use std::fmt;

/// An X.509 certificate as embedded in `ds:X509Certificate`.
#[derive(Clone)]
pub struct Certificate {
    inner: X509,
}

impl Certificate {
    /// Parse the first certificate found in PEM input.
    pub fn from_pem(pem: impl AsRef<[u8]>) -> Result<Self, PkiError> {
        let pem = pem.as_ref();
        if !contains_block(pem, "CERTIFICATE") {
            return Err(PkiError::MissingPem("certificate"));
        }
        Ok(Self {
            inner: X509::from_pem(pem)?,
        })
    }

    /// Parse every certificate found in PEM input, leaf first as written.
    pub fn chain_from_pem(pem: impl AsRef<[u8]>) -> Result<Vec<Self>, PkiError> {
        let chain: Vec<Self> = X509::stack_from_pem(pem.as_ref())?
            .into_iter()
            .map(Self::from)
            .collect();
        if chain.is_empty() {
            return Err(PkiError::MissingPem("certificate"));
        }
        Ok(chain)
    }

    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, PkiError> {
        Ok(Self {
            inner: X509::from_der(der.as_ref())?,
        })
    }

    /// Parse base64 DER, ignoring embedded whitespace.
    pub fn from_base64(encoded: &str) -> Result<Self, PkiError> {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        Self::from_der(STANDARD.decode(compact)?)
    }

    pub fn to_der(&self) -> Result<Vec<u8>, PkiError> {
        Ok(self.inner.to_der()?)
    }

    pub fn to_pem(&self) -> Result<Vec<u8>, PkiError> {
        Ok(self.inner.to_pem()?)
    }

    /// Base64 of the DER encoding, without PEM armour or line breaks.
    pub fn to_base64(&self) -> Result<String, PkiError> {
        Ok(STANDARD.encode(self.to_der()?))
    }

    /// The RSA public key carried by this certificate.
    pub fn public_key(&self) -> Result<RsaPublicKey, PkiError> {
        let pkey = self.inner.public_key()?;
        if pkey.rsa().is_err() {
            return Err(PkiError::NotRsa);
        }
        Ok(RsaPublicKey::from_pkey(pkey)?)
    }

    /// Subject common name, used for logging.
    pub fn common_name(&self) -> Option<String> {
        self.inner
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().to_string().ok())
    }
}

impl From<X509> for Certificate {
    fn from(inner: X509) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("common_name", &self.common_name())
            .finish()
    }
}

/// Whether PEM input contains a `-----BEGIN <label>-----` block.
pub(super) fn contains_block(pem: &[u8], label: &str) -> bool {
    let marker = format!("-----BEGIN {label}-----");
    pem.windows(marker.len()).any(|w| w == marker.as_bytes())
}
