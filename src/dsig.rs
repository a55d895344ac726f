//! Enveloped XML-DSig signatures over exclusively canonicalized references.

mod error;
mod signer;
mod verifier;

pub use error::Error;
pub use signer::{SignConfig, SignedDocument, sign, sign_document};
pub use verifier::{VerifiedSignature, verify, verify_document};

use crate::crypto::HashAlg;
use crate::xml::{Element, NamespaceScope};
use serde::Deserialize;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

// Algorithm URIs of the enveloped profile
pub mod algorithms {
    // Digest algorithms
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

    // Signature algorithms
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

    // Canonicalization algorithms
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

    // Transform algorithms
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
}

// Namespaces
pub mod ns {
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
    pub const DS_PREFIX: &str = "ds";
}

/// Signature method; the digest method follows from it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-1 digests, the legacy ABRASF profile
    #[default]
    #[serde(rename = "rsa-sha1")]
    RsaSha1,
    #[serde(rename = "rsa-sha256")]
    RsaSha256,
}

impl SignatureAlgorithm {
    /// `SignatureMethod` algorithm URI
    pub fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha1 => algorithms::RSA_SHA1,
            Self::RsaSha256 => algorithms::RSA_SHA256,
        }
    }

    /// `DigestMethod` algorithm URI
    pub fn digest_uri(&self) -> &'static str {
        match self {
            Self::RsaSha1 => algorithms::SHA1,
            Self::RsaSha256 => algorithms::SHA256,
        }
    }

    pub fn hash_alg(&self) -> HashAlg {
        match self {
            Self::RsaSha1 => HashAlg::Sha1,
            Self::RsaSha256 => HashAlg::Sha256,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithms::RSA_SHA1 => Some(Self::RsaSha1),
            algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            _ => None,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaSha1 => f.write_str("rsa-sha1"),
            Self::RsaSha256 => f.write_str("rsa-sha256"),
        }
    }
}

/// Hash algorithm named by a `DigestMethod` URI
pub(crate) fn digest_alg_from_uri(uri: &str) -> Option<HashAlg> {
    match uri {
        algorithms::SHA1 => Some(HashAlg::Sha1),
        algorithms::SHA256 => Some(HashAlg::Sha256),
        _ => None,
    }
}

/// Whether `element` is a `ds:Signature`, `scope` including its own declarations
pub(crate) fn is_signature(element: &Element, scope: &NamespaceScope) -> bool {
    element.local_name() == "Signature" && element.namespace_uri(scope) == Some(ns::DS)
}
