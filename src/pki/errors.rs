use crate::crypto;
use openssl::error::ErrorStack;
use thiserror::Error;

/// Errors raised while loading certificates and signing credentials.
#[derive(Error, Debug)]
pub enum PkiError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No {0} found in PEM input")]
    MissingPem(&'static str),

    #[error("Certificate does not carry an RSA public key")]
    NotRsa,

    #[error("Invalid base64 certificate: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Crypto(#[from] crypto::Error),

    #[error(transparent)]
    OpenSSL(#[from] ErrorStack),
}
