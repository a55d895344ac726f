use super::Transcript;
use crate::pki::PkiError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while delivering a signed document.
#[derive(Error, Debug)]
pub enum Error {
    /// Client credentials could not be turned into a TLS identity
    #[error("Client identity error: {0}")]
    Identity(String),

    #[error("Client credentials error: {0}")]
    Credentials(#[from] PkiError),

    #[error("Failed to build SOAP envelope: {0}")]
    Envelope(#[from] quick_xml::Error),

    /// Connection, TLS handshake or I/O failure. The transcript holds
    /// whatever was sent before the failure.
    #[error("Transport error: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
        transcript: Option<Transcript>,
    },

    /// The endpoint answered, but not with a usable SOAP response
    #[error("Protocol error ({status}): {reason}")]
    Protocol {
        status: StatusCode,
        reason: String,
        body: String,
        transcript: Option<Transcript>,
    },
}

impl Error {
    /// Raw response body carried by a protocol error
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::Protocol { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Transcript of the failed exchange, when recording was enabled
    pub fn transcript(&self) -> Option<&Transcript> {
        match self {
            Error::Transport { transcript, .. } | Error::Protocol { transcript, .. } => {
                transcript.as_ref()
            }
            _ => None,
        }
    }

    pub(crate) fn transport(source: reqwest::Error) -> Self {
        Error::Transport {
            source,
            transcript: None,
        }
    }
}
