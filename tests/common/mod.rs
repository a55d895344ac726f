use std::net::TcpListener;
use std::sync::Arc;

use axum::Router;
use axum_server::tls_openssl::{OpenSSLAcceptor, OpenSSLConfig};
use nfse_signer::pki::cert_utils::{generate_ca_certificate, generate_leaf_certificate, pem_bundle};
use nfse_signer::telemetry;
use nfse_signer::xml::Document;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslMethod, SslVerifyMode};
use openssl::x509::X509;

pub const GERAR_NFSE_ENVIO: &str = include_str!("../../test_data/gerar_nfse_envio.xml");
pub const SOAP_ACTION: &str = "http://nfse.recife.pe.gov.br/GerarNfse";

/// A throwaway CA issuing server and client certificates
pub struct TestPki {
    pub ca_cert: X509,
    pub ca_key: PKey<Private>,
}

impl TestPki {
    pub fn new() -> Self {
        let (ca_cert, ca_key) = generate_ca_certificate().unwrap();
        Self { ca_cert, ca_key }
    }

    pub fn ca_pem(&self) -> Vec<u8> {
        self.ca_cert.to_pem().unwrap()
    }

    /// A fresh leaf certificate and key as one PEM bundle
    pub fn issue_bundle(&self) -> Vec<u8> {
        let (cert, key) = self.issue();
        pem_bundle(&cert, &key)
    }

    /// A fresh leaf as (certificate PEM, PKCS#8 key PEM)
    pub fn issue(&self) -> (Vec<u8>, Vec<u8>) {
        generate_leaf_certificate(&self.ca_cert, &self.ca_key).unwrap()
    }
}

/// Serve `router` over TLS requiring a client certificate issued by `pki`.
/// Returns the endpoint URL.
pub async fn spawn_soap_server(pki: &TestPki, router: Router) -> String {
    telemetry::init_tracing();

    let (server_cert, server_key) = generate_leaf_certificate(&pki.ca_cert, &pki.ca_key).unwrap();

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server()).unwrap();
    builder
        .set_certificate(&X509::from_pem(&server_cert).unwrap())
        .unwrap();
    builder
        .set_private_key(&PKey::private_key_from_pem(&server_key).unwrap())
        .unwrap();
    builder.cert_store_mut().add_cert(pki.ca_cert.clone()).unwrap();
    builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
    let config = OpenSSLConfig::from_acceptor(Arc::new(builder.build()));

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum_server::from_tcp(listener)
            .acceptor(OpenSSLAcceptor::new(config))
            .serve(router.into_make_service())
            .await
    });

    format!("https://127.0.0.1:{port}/WS/nfse_v03.asmx")
}

/// The document carried in the body of a SOAP envelope, detached from it
pub fn body_payload(envelope: &str) -> Option<Document> {
    let envelope = Document::parse(envelope).ok()?;
    let body = envelope
        .root()
        .child_elements()
        .find(|element| element.local_name() == "Body")?;
    let payload = body.child_elements().next()?;
    Some(Document::new(payload.clone()))
}

/// Header element names of a SOAP envelope
pub fn header_children(envelope: &str) -> Vec<String> {
    let Ok(envelope) = Document::parse(envelope) else {
        return Vec::new();
    };
    envelope
        .root()
        .child_elements()
        .filter(|element| element.local_name() == "Header")
        .flat_map(|header| header.child_elements().map(|e| e.name().to_owned()))
        .collect()
}
