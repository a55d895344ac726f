//! XML object model and Exclusive XML Canonicalization
//!
//! Documents are parsed into an owned tree ([`Document`], [`Element`], [`Node`])
//! that can be mutated and serialized back to text. Canonicalization works on
//! element subtrees, either inside a document or detached with an explicit
//! namespace scope.

mod c14n;
mod dom;
mod error;

pub use c14n::{C14nOptions, CanonicalForm, canonicalize};
pub use dom::{Attribute, Declaration, Document, Element, ElementPath, NamespaceScope, Node};
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Namespace implicitly bound to the `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
