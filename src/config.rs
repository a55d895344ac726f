use std::{collections::HashMap, path::PathBuf};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;

use crate::dsig::SignatureAlgorithm;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub signer: SignerConfig,
    #[serde(default)]
    pub client: Option<ClientConfig>,
    /// Unsigned document to sign
    pub payload_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    /// PEM private key; also holds the certificate when `certificate_path` is unset
    pub key_path: PathBuf,
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
    #[serde(default)]
    pub key_passphrase: Option<SecretString>,
    pub reference_id: String,
    #[serde(default)]
    pub algorithm: SignatureAlgorithm,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub endpoint: String,
    pub soap_action: String,
    /// Raw XML for the SOAP header
    #[serde(default)]
    pub header: Option<String>,
    /// ABRASF `versaoDados`, used to build a header when `header` is unset
    #[serde(default)]
    pub data_version: Option<String>,
    /// PEM client key; also holds the certificate chain when `certificate_path` is unset
    pub identity_path: PathBuf,
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
    #[serde(default)]
    pub identity_passphrase: Option<SecretString>,
    /// Extra trusted root CA, PEM
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub transcript: bool,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("signer.key_path", "certs/privatekey.pem")?
            .set_default("signer.reference_id", "Rps_5")?
            .set_default("signer.algorithm", "rsa-sha1")?
            .set_default("payload_path", "payload.xml")?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_SIGNER__REFERENCE_ID or APP_CLIENT__ENDPOINT
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::path::Path;

    #[test]
    fn test_default_config() {
        let config = Config::load_with_sources(Some(HashMap::new())).expect("Failed to load config");

        assert_eq!(config.signer.key_path, Path::new("certs/privatekey.pem"));
        assert_eq!(config.signer.reference_id, "Rps_5");
        assert_eq!(config.signer.algorithm, SignatureAlgorithm::RsaSha1);
        assert!(config.signer.certificate_path.is_none());
        assert!(config.signer.key_passphrase.is_none());
        assert_eq!(config.payload_path, Path::new("payload.xml"));
        assert!(config.client.is_none());
    }

    #[test]
    fn test_env_config() {
        let mut env_vars = HashMap::new();
        env_vars.insert("signer.algorithm".to_string(), "rsa-sha256".to_string());
        env_vars.insert("signer.key_passphrase".to_string(), "sua_senha_aqui".to_string());
        env_vars.insert(
            "client.endpoint".to_string(),
            "https://nfse.recife.pe.gov.br/WS/nfse_v03.asmx".to_string(),
        );
        env_vars.insert(
            "client.soap_action".to_string(),
            "http://nfse.recife.pe.gov.br/GerarNfse".to_string(),
        );
        env_vars.insert("client.identity_path".to_string(), "certs/privatekey.pem".to_string());
        env_vars.insert("client.timeout_secs".to_string(), "30".to_string());
        env_vars.insert("client.transcript".to_string(), "true".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.signer.algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(
            config.signer.key_passphrase.unwrap().expose_secret(),
            "sua_senha_aqui"
        );

        let client = config.client.expect("client section");
        assert_eq!(client.endpoint, "https://nfse.recife.pe.gov.br/WS/nfse_v03.asmx");
        assert_eq!(client.soap_action, "http://nfse.recife.pe.gov.br/GerarNfse");
        assert_eq!(client.timeout_secs, Some(30));
        assert!(client.transcript);
        assert!(client.header.is_none());
        assert!(client.ca_path.is_none());
        assert!(client.certificate_path.is_none());
    }

    #[test]
    fn test_client_certificate_path() {
        let mut env_vars = HashMap::new();
        env_vars.insert("client.endpoint".to_string(), "https://localhost/WS".to_string());
        env_vars.insert("client.soap_action".to_string(), "urn:GerarNfse".to_string());
        env_vars.insert("client.identity_path".to_string(), "certs/client.key".to_string());
        env_vars.insert("client.certificate_path".to_string(), "certs/client.crt".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        let client = config.client.expect("client section");
        assert_eq!(client.identity_path, Path::new("certs/client.key"));
        assert_eq!(client.certificate_path.as_deref(), Some(Path::new("certs/client.crt")));
        assert!(!client.transcript);
    }

    #[test]
    fn test_partial_env_override() {
        let mut env_vars = HashMap::new();
        // We just override the reference id
        env_vars.insert("signer.reference_id".to_string(), "Rps_42".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.signer.reference_id, "Rps_42");
        // The other values should use default
        assert_eq!(config.signer.algorithm, SignatureAlgorithm::RsaSha1);
        assert!(config.client.is_none());
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let mut env_vars = HashMap::new();
        env_vars.insert("signer.algorithm".to_string(), "ecdsa-sha256".to_string());

        assert!(Config::load_with_sources(Some(env_vars)).is_err());
    }
}
