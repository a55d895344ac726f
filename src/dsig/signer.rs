use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use std::fmt;
use tracing::{debug, info, instrument, warn};

use super::{Error, Result, SignatureAlgorithm, algorithms, is_signature, ns};
use crate::crypto::{HashAlg, rsa, rsa::RsaPrivateKey};
use crate::pki::{Certificate, Credentials, certificate_matches};
use crate::xml::{self, C14nOptions, Document, Element, NamespaceScope};

/// Key material and algorithm used to sign a document
#[derive(Debug, Clone)]
pub struct SignConfig {
    /// Private key for signing
    pub private_key: RsaPrivateKey,

    /// Certificate embedded in `ds:X509Certificate`
    pub certificate: Certificate,

    /// Signature method (default: RSA-SHA1)
    pub algorithm: SignatureAlgorithm,
}

impl SignConfig {
    pub fn new(credentials: Credentials, algorithm: SignatureAlgorithm) -> Self {
        let (private_key, certificate) = credentials.into_parts();
        Self {
            private_key,
            certificate,
            algorithm,
        }
    }
}

/// Serialized signed document along with the values placed in its signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDocument {
    xml: String,
    reference_uri: String,
    digest_value: String,
    signature_value: String,
}

impl SignedDocument {
    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn into_string(self) -> String {
        self.xml
    }

    /// `URI` of the single reference, `#` followed by the referenced Id
    pub fn reference_uri(&self) -> &str {
        &self.reference_uri
    }

    /// Base64 `DigestValue` of the referenced element
    pub fn digest_value(&self) -> &str {
        &self.digest_value
    }

    /// Base64 `SignatureValue`
    pub fn signature_value(&self) -> &str {
        &self.signature_value
    }
}

impl fmt::Display for SignedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.xml)
    }
}

/// Parse `xml` and sign the element carrying `Id="reference_id"`.
pub fn sign(xml: &str, reference_id: &str, config: &SignConfig) -> Result<SignedDocument> {
    let mut document = Document::parse(xml)?;
    sign_document(&mut document, reference_id, config)
}

/// Sign the element carrying `Id="reference_id"` with an enveloped signature.
///
/// The `ds:Signature` is appended as the last child of the root element and
/// `xmlns:ds` is declared on the root when missing. On error the document is
/// left untouched.
#[instrument(skip(document, config), fields(algorithm = %config.algorithm))]
pub fn sign_document(
    document: &mut Document,
    reference_id: &str,
    config: &SignConfig,
) -> Result<SignedDocument> {
    if !document.find_all(is_signature).is_empty() {
        return Err(xml::Error::Malformed("document already contains a ds:Signature".into()).into());
    }

    let declared_ds = document.root().namespace_declaration(ns::DS_PREFIX);
    if let Some(uri) = declared_ds.filter(|uri| *uri != ns::DS) {
        return Err(Error::Invalid(format!(
            "prefix '{}' is already bound to {uri} on the root element",
            ns::DS_PREFIX
        )));
    }
    let declare_ds = declared_ds.is_none();

    let reference_uri = format!("#{reference_id}");
    let digest_value = digest_reference(document, reference_id, config.algorithm.hash_alg())?;
    debug!(uri = %reference_uri, digest = %digest_value, "Computed reference digest");

    let signed_info = build_signed_info(&reference_uri, &digest_value, config.algorithm);
    let ds_scope = NamespaceScope::new().with(ns::DS_PREFIX, ns::DS);
    let signed_info_c14n = xml::canonicalize(&signed_info, &ds_scope, &C14nOptions::default())?;

    if !certificate_matches(&config.private_key, &config.certificate)? {
        warn!(
            subject = ?config.certificate.common_name(),
            "Certificate public key does not match the signing key"
        );
    }

    let signature = rsa::sign(
        &config.private_key,
        signed_info_c14n.as_bytes(),
        config.algorithm.hash_alg(),
    )?;
    let signature_value = BASE64.encode(signature.as_bytes());
    let certificate = config.certificate.to_base64()?;

    let signature_element = Element::new("ds:Signature")
        .with_child(signed_info)
        .with_child(Element::new("ds:SignatureValue").with_text(&signature_value))
        .with_child(
            Element::new("ds:KeyInfo").with_child(
                Element::new("ds:X509Data")
                    .with_child(Element::new("ds:X509Certificate").with_text(&certificate)),
            ),
        );

    let root = document.root_mut();
    if declare_ds {
        root.declare_namespace(ns::DS_PREFIX, ns::DS);
    }
    root.append_child(signature_element);
    info!(uri = %reference_uri, "Appended enveloped signature");

    Ok(SignedDocument {
        xml: document.to_xml_string(),
        reference_uri,
        digest_value,
        signature_value,
    })
}

/// Base64 digest of the referenced element after the enveloped-signature and
/// exclusive canonicalization transforms.
pub(super) fn digest_reference(
    document: &Document,
    reference_id: &str,
    hash_alg: HashAlg,
) -> Result<String> {
    let mut paths = document.elements_with_id(reference_id);
    let path = match paths.len() {
        0 => return Err(Error::ReferenceNotFound(reference_id.to_owned())),
        1 => paths.remove(0),
        count => {
            return Err(Error::AmbiguousReference {
                id: reference_id.to_owned(),
                count,
            });
        }
    };

    let inherited = document.scope_of(&path).unwrap_or_default();
    let referenced = document
        .element(&path)
        .ok_or_else(|| Error::ReferenceNotFound(reference_id.to_owned()))?;
    debug!(element = referenced.name(), depth = path.depth(), "Located referenced element");

    let transformed = referenced.without_descendants(&inherited, &is_signature);
    let canonical = xml::canonicalize(&transformed, &inherited, &C14nOptions::default())?;
    let digest = hash_alg.hash(canonical.as_bytes())?;

    Ok(BASE64.encode(digest))
}

fn build_signed_info(reference_uri: &str, digest_value: &str, algorithm: SignatureAlgorithm) -> Element {
    let transforms = Element::new("ds:Transforms")
        .with_child(
            Element::new("ds:Transform").with_attribute("Algorithm", algorithms::ENVELOPED_SIGNATURE),
        )
        .with_child(Element::new("ds:Transform").with_attribute("Algorithm", algorithms::EXCLUSIVE_C14N));

    let reference = Element::new("ds:Reference")
        .with_attribute("URI", reference_uri)
        .with_child(transforms)
        .with_child(Element::new("ds:DigestMethod").with_attribute("Algorithm", algorithm.digest_uri()))
        .with_child(Element::new("ds:DigestValue").with_text(digest_value));

    Element::new("ds:SignedInfo")
        .with_child(
            Element::new("ds:CanonicalizationMethod")
                .with_attribute("Algorithm", algorithms::EXCLUSIVE_C14N),
        )
        .with_child(Element::new("ds:SignatureMethod").with_attribute("Algorithm", algorithm.uri()))
        .with_child(reference)
}
