//! Throwaway CA and leaf certificates for local signing and mTLS test setups.

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder};

/// PEM material for a CA and one server leaf issued by it.
#[derive(Debug, Clone)]
pub struct TestCertificates {
    pub server_cert: Vec<u8>,
    pub server_key: Vec<u8>,
    pub ca_cert: Vec<u8>,
}

/// Generate a fresh CA and a `localhost` leaf certificate signed by it.
pub fn generate_test_certificates() -> Result<TestCertificates, ErrorStack> {
    let (ca_cert, ca_key) = generate_ca_certificate()?;
    let (server_cert, server_key) = generate_leaf_certificate(&ca_cert, &ca_key)?;

    Ok(TestCertificates {
        server_cert,
        server_key,
        ca_cert: ca_cert.to_pem()?,
    })
}

/// Concatenate a certificate and its key into a single PEM bundle.
pub fn pem_bundle(cert_pem: &[u8], key_pem: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
    combined.extend_from_slice(cert_pem);
    combined.push(b'\n');
    combined.extend_from_slice(key_pem);
    combined
}

pub fn generate_ca_certificate() -> Result<(X509, PKey<Private>), ErrorStack> {
    let key_pair = PKey::from_rsa(Rsa::generate(2048)?)?;

    let mut cert_builder = X509Builder::new()?;
    cert_builder.set_version(2)?;
    let serial_number = generate_serial_number()?;
    cert_builder.set_serial_number(&serial_number)?;

    let subject_name = create_x509_name(&[
        ("C", "BR"),
        ("L", "Recife"),
        ("O", "Test Organization"),
        ("OU", "Test CA"),
        ("CN", "Test Root CA"),
    ])?;
    cert_builder.set_subject_name(&subject_name)?;
    cert_builder.set_issuer_name(&subject_name)?;
    cert_builder.set_pubkey(&key_pair)?;
    set_validity(&mut cert_builder)?;

    cert_builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    cert_builder.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build()?)?;

    cert_builder.sign(&key_pair, MessageDigest::sha256())?;

    Ok((cert_builder.build(), key_pair))
}

/// Issue a `localhost` leaf from `ca_cert`, returned as (certificate PEM, PKCS#8 key PEM).
pub fn generate_leaf_certificate(
    ca_cert: &X509,
    ca_key: &PKey<Private>,
) -> Result<(Vec<u8>, Vec<u8>), ErrorStack> {
    let key_pair = PKey::from_rsa(Rsa::generate(2048)?)?;

    let mut cert_builder = X509Builder::new()?;
    cert_builder.set_version(2)?;
    let serial_number = generate_serial_number()?;
    cert_builder.set_serial_number(&serial_number)?;

    let subject_name = create_x509_name(&[
        ("C", "BR"),
        ("L", "Recife"),
        ("O", "Test"),
        ("CN", "localhost"),
    ])?;
    cert_builder.set_subject_name(&subject_name)?;
    cert_builder.set_issuer_name(ca_cert.subject_name())?;
    cert_builder.set_pubkey(&key_pair)?;
    set_validity(&mut cert_builder)?;

    cert_builder.append_extension(BasicConstraints::new().build()?)?;
    cert_builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()?,
    )?;
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&cert_builder.x509v3_context(Some(ca_cert), None))?;
    cert_builder.append_extension(san)?;

    cert_builder.sign(ca_key, MessageDigest::sha256())?;

    Ok((
        cert_builder.build().to_pem()?,
        key_pair.private_key_to_pem_pkcs8()?,
    ))
}

// One year from now
fn set_validity(builder: &mut X509Builder) -> Result<(), ErrorStack> {
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(365)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)
}

fn generate_serial_number() -> Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn create_x509_name(entries: &[(&str, &str)]) -> Result<X509Name, ErrorStack> {
    let mut name_builder = X509NameBuilder::new()?;
    for (key, value) in entries {
        name_builder.append_entry_by_text(key, value)?;
    }
    Ok(name_builder.build())
}
