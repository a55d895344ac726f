//! mTLS SOAP submission of signed documents.

mod error;
mod transcript;

pub use error::Error;
pub use transcript::Transcript;

use crate::config::ClientConfig;
use crate::crypto::rsa::RsaPrivateKey;
use crate::pki::Certificate;
use crate::soap::{Envelope, abrasf_header};
use crate::xml::Document;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Identity, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub type Result<T> = std::result::Result<T, Error>;

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";
const SOAP_ACTION: &str = "SOAPAction";

/// TLS client identity presented to the endpoint
pub struct ClientIdentity {
    identity: Identity,
}

impl ClientIdentity {
    /// Build from PEM holding the certificate chain and the private key.
    ///
    /// Encrypted keys are decrypted with `passphrase` and kept in memory only.
    pub fn from_pem(pem: impl AsRef<[u8]>, passphrase: Option<&SecretString>) -> Result<Self> {
        let pem = pem.as_ref();
        Self::from_parts(pem, pem, passphrase)
    }

    /// Build from a certificate chain and a private key held in separate PEM inputs.
    pub fn from_parts(
        certificate_pem: impl AsRef<[u8]>,
        key_pem: impl AsRef<[u8]>,
        passphrase: Option<&SecretString>,
    ) -> Result<Self> {
        let chain = Certificate::chain_from_pem(certificate_pem)?;
        let key = match passphrase {
            Some(passphrase) => {
                RsaPrivateKey::from_pem_with_passphrase(key_pem, passphrase.expose_secret())
            }
            None => RsaPrivateKey::from_pem(key_pem),
        }
        .map_err(|e| Error::Identity(e.to_string()))?;

        let mut combined = Vec::new();
        for certificate in &chain {
            combined.extend_from_slice(&certificate.to_pem()?);
        }
        combined.extend_from_slice(&key.to_pem().map_err(|e| Error::Identity(e.to_string()))?);

        let identity = Identity::from_pem(&combined).map_err(|e| Error::Identity(e.to_string()))?;
        debug!(
            subject = ?chain.first().and_then(Certificate::common_name),
            chain_len = chain.len(),
            "Loaded client identity"
        );
        Ok(Self { identity })
    }

    /// Load from files. Without a certificate path the key file must also carry the chain.
    pub fn load(
        key_path: impl AsRef<Path>,
        certificate_path: Option<&Path>,
        passphrase: Option<&SecretString>,
    ) -> Result<Self> {
        let key_pem = read_pem(key_path.as_ref())?;
        match certificate_path {
            Some(certificate_path) => {
                Self::from_parts(read_pem(certificate_path)?, key_pem, passphrase)
            }
            None => Self::from_pem(key_pem, passphrase),
        }
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| Error::Identity(format!("failed to read {}: {e}", path.display())))
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity").finish_non_exhaustive()
    }
}

/// Raw endpoint answer to a successful (2xx) submission
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Response body, verbatim; business-level faults are left to the caller
    pub body: String,
    pub transcript: Option<Transcript>,
}

/// Builder for [`SubmissionClient`]
#[derive(Debug)]
pub struct SubmissionClientBuilder {
    endpoint: String,
    soap_action: String,
    header: Option<String>,
    identity: Option<ClientIdentity>,
    root_certificates: Vec<Vec<u8>>,
    timeout: Option<Duration>,
    transcript: bool,
}

impl SubmissionClientBuilder {
    /// Present `identity` during the TLS handshake.
    pub fn with_identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Trust an additional root CA, PEM encoded.
    pub fn with_root_certificate(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_certificates.push(pem.into());
        self
    }

    /// Raw XML placed in the SOAP header.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Record a transcript of every exchange.
    pub fn with_transcript(mut self, enabled: bool) -> Self {
        self.transcript = enabled;
        self
    }

    pub fn build(self) -> Result<SubmissionClient> {
        let mut builder = Client::builder().https_only(true);

        for pem in &self.root_certificates {
            let certificate =
                reqwest::Certificate::from_pem(pem).map_err(|e| Error::Identity(e.to_string()))?;
            builder = builder.add_root_certificate(certificate);
        }
        match self.identity {
            Some(identity) => builder = builder.identity(identity.identity),
            None => warn!("No client identity configured, the endpoint may reject the connection"),
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder.build().map_err(Error::transport)?;
        Ok(SubmissionClient {
            http,
            endpoint: self.endpoint,
            soap_action: self.soap_action,
            header: self.header,
            transcript: self.transcript,
        })
    }
}

/// Posts signed documents to a SOAP endpoint over mutually authenticated TLS
#[derive(Debug, Clone)]
pub struct SubmissionClient {
    http: Client,
    endpoint: String,
    soap_action: String,
    header: Option<String>,
    transcript: bool,
}

impl SubmissionClient {
    pub fn builder(endpoint: impl Into<String>, soap_action: impl Into<String>) -> SubmissionClientBuilder {
        SubmissionClientBuilder {
            endpoint: endpoint.into(),
            soap_action: soap_action.into(),
            header: None,
            identity: None,
            root_certificates: Vec::new(),
            timeout: None,
            transcript: false,
        }
    }

    /// Create a client from configuration, reading the optional CA file it names.
    pub fn new(config: &ClientConfig, identity: ClientIdentity) -> Result<Self> {
        let mut builder = Self::builder(&config.endpoint, &config.soap_action)
            .with_identity(identity)
            .with_transcript(config.transcript);

        if let Some(header) = config.header.clone().or_else(|| config.data_version.as_deref().map(abrasf_header)) {
            builder = builder.with_header(header);
        }
        if let Some(ca_path) = &config.ca_path {
            builder = builder.with_root_certificate(read_pem(ca_path)?);
        }
        if let Some(secs) = config.timeout_secs {
            builder = builder.with_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Wrap `signed_xml` in a SOAP envelope and post it once.
    ///
    /// Any 2xx answer whose body is well-formed XML is returned verbatim.
    #[instrument(skip(self, signed_xml), fields(endpoint = %self.endpoint))]
    pub async fn submit(&self, signed_xml: &str) -> Result<RawResponse> {
        let mut envelope = Envelope::new(signed_xml);
        if let Some(header) = &self.header {
            envelope = envelope.with_header(header.clone());
        }
        let payload = envelope.to_xml()?;

        let request = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static(SOAP_CONTENT_TYPE))
            .header(SOAP_ACTION, format!("\"{}\"", self.soap_action))
            .body(payload.clone())
            .build()
            .map_err(Error::transport)?;

        let mut transcript = self
            .transcript
            .then(|| Transcript::request(request.method(), request.url(), request.headers(), &payload));

        info!(bytes = payload.len(), "Submitting signed document");
        let (status, headers, body) = match self.exchange(request).await {
            Ok(answer) => answer,
            Err(source) => {
                warn!(error = %source, "Submission failed in transport");
                if let Some(transcript) = transcript.as_mut() {
                    transcript.failure(&source);
                }
                return Err(Error::Transport { source, transcript });
            }
        };
        info!(%status, bytes = body.len(), "Received response");

        if let Some(transcript) = transcript.as_mut() {
            transcript.response(status, &headers, &body);
        }

        if !status.is_success() {
            return Err(Error::Protocol {
                status,
                reason: "non-success status".into(),
                body,
                transcript,
            });
        }
        if let Err(e) = Document::parse(&body) {
            return Err(Error::Protocol {
                status,
                reason: format!("response is not well-formed XML: {e}"),
                body,
                transcript,
            });
        }

        Ok(RawResponse {
            status,
            headers,
            body,
            transcript,
        })
    }

    async fn exchange(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<(StatusCode, HeaderMap, String), reqwest::Error> {
        let response = self.http.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok((status, headers, body))
    }
}
