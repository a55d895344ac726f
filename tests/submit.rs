mod common;

use std::time::Duration;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use common::{GERAR_NFSE_ENVIO, SOAP_ACTION, TestPki, body_payload, header_children, spawn_soap_server};
use nfse_signer::client::{ClientIdentity, Error, SubmissionClient};
use nfse_signer::dsig::{self, SignConfig, SignatureAlgorithm};
use nfse_signer::pki::Credentials;
use nfse_signer::soap::abrasf_header;
use openssl::pkey::PKey;
use openssl::symm::Cipher;
use secrecy::SecretString;

const RESPOSTA: &str = "<GerarNfseResposta><ListaMensagemRetorno><MensagemRetorno>\
<Codigo>E160</Codigo><Mensagem>Prestador nao autorizado</Mensagem>\
</MensagemRetorno></ListaMensagemRetorno></GerarNfseResposta>";

fn signed_payload(pki: &TestPki) -> String {
    let credentials = Credentials::from_pem_bundle(pki.issue_bundle(), None).unwrap();
    let config = SignConfig::new(credentials, SignatureAlgorithm::RsaSha1);
    dsig::sign(GERAR_NFSE_ENVIO, "Rps_5", &config)
        .unwrap()
        .into_string()
}

fn client(pki: &TestPki, endpoint: &str, identity_bundle: &[u8]) -> SubmissionClient {
    client_with_identity(pki, endpoint, ClientIdentity::from_pem(identity_bundle, None).unwrap())
}

fn client_with_identity(pki: &TestPki, endpoint: &str, identity: ClientIdentity) -> SubmissionClient {
    SubmissionClient::builder(endpoint, SOAP_ACTION)
        .with_identity(identity)
        .with_root_certificate(pki.ca_pem())
        .with_header(abrasf_header("1.00"))
        .with_timeout(Duration::from_secs(10))
        .with_transcript(true)
        .build()
        .unwrap()
}

/// Accepts the request only when it looks like a signed GerarNfse call
async fn gerar_nfse(headers: HeaderMap, body: String) -> (StatusCode, String) {
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok());
    if content_type != Some("text/xml; charset=UTF-8") {
        return (StatusCode::BAD_REQUEST, format!("content type {content_type:?}"));
    }
    let soap_action = headers.get("soapaction").and_then(|v| v.to_str().ok());
    if soap_action != Some("\"http://nfse.recife.pe.gov.br/GerarNfse\"") {
        return (StatusCode::BAD_REQUEST, format!("soap action {soap_action:?}"));
    }
    if header_children(&body) != ["cabecalho"] {
        return (StatusCode::BAD_REQUEST, "missing cabecalho".into());
    }
    let Some(payload) = body_payload(&body) else {
        return (StatusCode::BAD_REQUEST, "empty body".into());
    };
    if let Err(e) = dsig::verify_document(&payload) {
        return (StatusCode::BAD_REQUEST, format!("signature: {e}"));
    }
    (StatusCode::OK, RESPOSTA.to_string())
}

#[tokio::test]
async fn test_submit_signed_document() {
    let pki = TestPki::new();
    let endpoint = spawn_soap_server(&pki, Router::new().route("/WS/nfse_v03.asmx", post(gerar_nfse))).await;

    let client = client(&pki, &endpoint, &pki.issue_bundle());
    let response = client.submit(&signed_payload(&pki)).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    // Business faults come back verbatim
    assert_eq!(response.body, RESPOSTA);

    let transcript = response.transcript.expect("transcript").to_string();
    assert!(transcript.contains("> POST https://127.0.0.1:"));
    assert!(transcript.contains("> soapaction: \"http://nfse.recife.pe.gov.br/GerarNfse\""));
    assert!(transcript.contains("<ds:SignatureValue>"));
    assert!(transcript.contains("< 200 OK"));
    assert!(!transcript.contains("PRIVATE KEY"));
}

#[tokio::test]
async fn test_submit_with_separate_encrypted_key() {
    let pki = TestPki::new();
    let endpoint = spawn_soap_server(&pki, Router::new().route("/WS/nfse_v03.asmx", post(gerar_nfse))).await;

    let (cert_pem, key_pem) = pki.issue();
    let encrypted_key = PKey::private_key_from_pem(&key_pem)
        .unwrap()
        .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), b"sua_senha_aqui")
        .unwrap();
    let passphrase = SecretString::from("sua_senha_aqui".to_string());
    let identity = ClientIdentity::from_parts(&cert_pem, &encrypted_key, Some(&passphrase)).unwrap();

    let response = client_with_identity(&pki, &endpoint, identity)
        .submit(&signed_payload(&pki))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, RESPOSTA);

    // The certificate alone is not an identity
    let err = ClientIdentity::from_parts(&cert_pem, &cert_pem, None).unwrap_err();
    assert!(matches!(err, Error::Identity(_)));
}

#[tokio::test]
async fn test_server_error_is_protocol_error() {
    let pki = TestPki::new();
    let fault = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
<soap:Body><soap:Fault><faultcode>soap:Server</faultcode></soap:Fault></soap:Body></soap:Envelope>";
    let router = Router::new().route(
        "/WS/nfse_v03.asmx",
        post(move || async move { (StatusCode::INTERNAL_SERVER_ERROR, fault) }),
    );
    let endpoint = spawn_soap_server(&pki, router).await;

    let err = client(&pki, &endpoint, &pki.issue_bundle())
        .submit(&signed_payload(&pki))
        .await
        .unwrap_err();

    let transcript = err.transcript().expect("transcript").to_string();
    assert!(transcript.contains("> POST https://127.0.0.1:"));
    assert!(transcript.contains("< 500 Internal Server Error"));
    assert!(transcript.contains("<faultcode>soap:Server</faultcode>"));

    match err {
        Error::Protocol { status, body, .. } => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, fault);
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_xml_success_is_protocol_error() {
    let pki = TestPki::new();
    let router = Router::new().route("/WS/nfse_v03.asmx", post(|| async { "service unavailable" }));
    let endpoint = spawn_soap_server(&pki, router).await;

    let err = client(&pki, &endpoint, &pki.issue_bundle())
        .submit(&signed_payload(&pki))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Protocol { status, .. } if status == StatusCode::OK));
    assert_eq!(err.body(), Some("service unavailable"));
}

#[tokio::test]
async fn test_untrusted_client_certificate_is_transport_error() {
    let pki = TestPki::new();
    let endpoint = spawn_soap_server(&pki, Router::new().route("/WS/nfse_v03.asmx", post(gerar_nfse))).await;

    // Client certificate issued by a CA the server does not trust
    let rogue = TestPki::new();
    let err = client(&pki, &endpoint, &rogue.issue_bundle())
        .submit(&signed_payload(&pki))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let pki = TestPki::new();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint = format!("https://127.0.0.1:{port}/WS/nfse_v03.asmx");

    let err = client(&pki, &endpoint, &pki.issue_bundle())
        .submit(&signed_payload(&pki))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport { .. }));

    // The request half survives a failed connection
    let transcript = err.transcript().expect("transcript").to_string();
    assert!(transcript.contains("> POST https://127.0.0.1:"));
    assert!(transcript.contains("<ds:SignatureValue>"));
    assert!(!transcript.contains("\n< "));
    assert!(transcript.lines().last().is_some_and(|line| line.starts_with("* ")));
}

#[test]
fn test_identity_requires_key() {
    let pki = TestPki::new();
    let err = ClientIdentity::from_pem(pki.ca_pem(), None).unwrap_err();
    assert!(matches!(err, Error::Identity(_)));
}
