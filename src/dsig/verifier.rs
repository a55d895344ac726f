use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::{debug, instrument};

use super::signer::digest_reference;
use super::{Error, Result, SignatureAlgorithm, algorithms, digest_alg_from_uri, is_signature, ns};
use crate::crypto::rsa::{self, RsaSignature};
use crate::pki::Certificate;
use crate::xml::{self, C14nOptions, Document, Element, NamespaceScope};

/// The only transform sequence produced by the signer
const TRANSFORM_CHAIN: [&str; 2] = [algorithms::ENVELOPED_SIGNATURE, algorithms::EXCLUSIVE_C14N];

/// Outcome of a successful verification
#[derive(Debug, Clone)]
pub struct VerifiedSignature {
    pub reference_uri: String,
    pub algorithm: SignatureAlgorithm,
    pub certificate: Certificate,
}

/// Parse `xml` and verify its enveloped signature.
pub fn verify(xml: &str) -> Result<VerifiedSignature> {
    let document = Document::parse(xml)?;
    verify_document(&document)
}

/// Verify the single enveloped `ds:Signature` of `document` against the
/// certificate embedded in its `KeyInfo`.
#[instrument(skip(document))]
pub fn verify_document(document: &Document) -> Result<VerifiedSignature> {
    let mut signatures = document.find_all(is_signature);
    if signatures.len() != 1 {
        return Err(Error::Invalid(format!(
            "expected one ds:Signature, found {}",
            signatures.len()
        )));
    }
    let path = signatures.remove(0);
    let signature = document
        .element(&path)
        .ok_or_else(|| Error::Invalid("ds:Signature not reachable".into()))?;
    let inherited = document.scope_of(&path).unwrap_or_default();
    let scope = inherited.enter(signature);

    let (signed_info, signed_info_scope) = ds_child(signature, &scope, "SignedInfo")?;
    check_algorithm(signed_info, &signed_info_scope, "CanonicalizationMethod", algorithms::EXCLUSIVE_C14N)?;

    let (method, _) = ds_child(signed_info, &signed_info_scope, "SignatureMethod")?;
    let method_uri = algorithm_of(method)?;
    let algorithm = SignatureAlgorithm::from_uri(method_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(method_uri.to_owned()))?;

    let (reference, reference_scope) = ds_child(signed_info, &signed_info_scope, "Reference")?;
    let reference_uri = reference
        .attribute("URI")
        .ok_or_else(|| Error::Invalid("ds:Reference has no URI".into()))?;
    let reference_id = reference_uri
        .strip_prefix('#')
        .ok_or_else(|| Error::Invalid(format!("unsupported reference URI '{reference_uri}'")))?;

    let (transforms, _) = ds_child(reference, &reference_scope, "Transforms")?;
    let chain = transforms
        .child_elements()
        .map(algorithm_of)
        .collect::<Result<Vec<_>>>()?;
    if let Some(unknown) = chain.iter().find(|uri| !TRANSFORM_CHAIN.contains(uri)) {
        return Err(Error::UnsupportedAlgorithm((*unknown).to_owned()));
    }
    if chain != TRANSFORM_CHAIN {
        return Err(Error::Invalid(format!(
            "expected enveloped-signature then exc-c14n transforms, found {chain:?}"
        )));
    }

    let (digest_method, _) = ds_child(reference, &reference_scope, "DigestMethod")?;
    let digest_uri = algorithm_of(digest_method)?;
    let hash_alg = digest_alg_from_uri(digest_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(digest_uri.to_owned()))?;
    let (digest_value, _) = ds_child(reference, &reference_scope, "DigestValue")?;

    let expected = BASE64.decode(compact(&digest_value.text()))?;
    let actual = BASE64.decode(digest_reference(document, reference_id, hash_alg)?)?;
    if expected != actual {
        return Err(Error::DigestMismatch {
            uri: reference_uri.to_owned(),
        });
    }
    debug!(uri = reference_uri, "Reference digest matches");

    let (key_info, key_info_scope) = ds_child(signature, &scope, "KeyInfo")?;
    let (x509_data, x509_data_scope) = ds_child(key_info, &key_info_scope, "X509Data")?;
    let (x509_certificate, _) = ds_child(x509_data, &x509_data_scope, "X509Certificate")?;
    let certificate = Certificate::from_base64(&x509_certificate.text())?;
    let public_key = certificate.public_key()?;

    let (signature_value, _) = ds_child(signature, &scope, "SignatureValue")?;
    let signature_value = RsaSignature::new(BASE64.decode(compact(&signature_value.text()))?);

    let signed_info_c14n = xml::canonicalize(signed_info, &scope, &C14nOptions::default())?;
    if !rsa::verify(&public_key, signed_info_c14n.as_bytes(), &signature_value, algorithm.hash_alg())? {
        return Err(Error::SignatureMismatch);
    }
    debug!(%algorithm, "Signature value verified");

    Ok(VerifiedSignature {
        reference_uri: reference_uri.to_owned(),
        algorithm,
        certificate,
    })
}

/// First `ds:<local>` child of `parent`, with the scope including its own declarations
fn ds_child<'a>(
    parent: &'a Element,
    parent_scope: &NamespaceScope,
    local: &str,
) -> Result<(&'a Element, NamespaceScope)> {
    parent
        .child_elements()
        .map(|child| (child, parent_scope.enter(child)))
        .find(|(child, scope)| child.local_name() == local && child.namespace_uri(scope) == Some(ns::DS))
        .ok_or_else(|| Error::Invalid(format!("missing ds:{local} in {}", parent.name())))
}

fn algorithm_of(element: &Element) -> Result<&str> {
    element
        .attribute("Algorithm")
        .ok_or_else(|| Error::Invalid(format!("{} has no Algorithm", element.name())))
}

fn check_algorithm(parent: &Element, scope: &NamespaceScope, local: &str, expected: &str) -> Result<()> {
    let (element, _) = ds_child(parent, scope, local)?;
    let uri = algorithm_of(element)?;
    if uri != expected {
        return Err(Error::UnsupportedAlgorithm(uri.to_owned()));
    }
    Ok(())
}

fn compact(value: &str) -> String {
    value.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}
