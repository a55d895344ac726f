use crate::{crypto, pki::PkiError, xml};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed XML input: {0}")]
    Xml(#[from] xml::Error),

    #[error("No element with Id '{0}'")]
    ReferenceNotFound(String),

    #[error("Id '{id}' is carried by {count} elements")]
    AmbiguousReference { id: String, count: usize },

    #[error("Signing failed: {0}")]
    Crypto(#[from] crypto::Error),

    #[error("Certificate error: {0}")]
    Certificate(#[from] PkiError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid signature structure: {0}")]
    Invalid(String),

    #[error("Digest mismatch for reference {uri}")]
    DigestMismatch { uri: String },

    #[error("Signature value does not verify against the embedded certificate")]
    SignatureMismatch,
}
