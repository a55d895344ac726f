//! Exclusive XML Canonicalization (`http://www.w3.org/2001/10/xml-exc-c14n#`)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::dom::{Document, Element, ElementPath, NamespaceScope, Node};
use super::{Error, Result};

/// Options of the exclusive canonicalization transform
#[derive(Debug, Clone, Default)]
pub struct C14nOptions {
    /// Keep comment nodes (the `#WithComments` variant)
    pub with_comments: bool,
    /// InclusiveNamespaces PrefixList; `#default` names the default namespace
    pub inclusive_prefixes: Vec<String>,
}

impl C14nOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comments(mut self, with_comments: bool) -> Self {
        self.with_comments = with_comments;
        self
    }

    pub fn inclusive_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inclusive_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }
}

/// Canonical serialization of an element subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalForm(String);

impl CanonicalForm {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalForm {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for CanonicalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize `element` as the apex of the node set.
///
/// `inherited` holds the namespace bindings in effect at the element's parent.
/// A detached element gets an empty scope, or the bindings it will see once attached.
pub fn canonicalize(
    element: &Element,
    inherited: &NamespaceScope,
    options: &C14nOptions,
) -> Result<CanonicalForm> {
    let mut out = String::new();
    write_element(&mut out, element, inherited, &BTreeMap::new(), options)?;
    Ok(CanonicalForm(out))
}

impl Document {
    /// Canonicalize the subtree rooted at `path` within this document
    pub fn canonicalize(&self, path: &ElementPath, options: &C14nOptions) -> Result<CanonicalForm> {
        let element = self
            .element(path)
            .ok_or_else(|| Error::Malformed(format!("no element at {path:?}")))?;
        let inherited = self.scope_of(path).unwrap_or_default();
        canonicalize(element, &inherited, options)
    }
}

fn write_element(
    out: &mut String,
    element: &Element,
    inherited: &NamespaceScope,
    rendered: &BTreeMap<String, String>,
    options: &C14nOptions,
) -> Result<()> {
    let scope = inherited.enter(element);

    // Visibly utilized prefixes; the empty prefix is the default namespace
    let mut utilized = BTreeSet::new();
    utilized.insert(element.prefix().unwrap_or(""));
    for attr in element.attributes() {
        if let Some(prefix) = attr.prefix() {
            utilized.insert(prefix);
        }
    }
    for prefix in &options.inclusive_prefixes {
        let prefix = if prefix == "#default" { "" } else { prefix.as_str() };
        if scope.resolve(prefix).is_some() {
            utilized.insert(prefix);
        }
    }

    let mut rendered_here = rendered.clone();
    let mut declarations = Vec::new();
    for prefix in utilized {
        if prefix == "xml" {
            continue;
        }
        match scope.resolve(prefix) {
            Some(uri) => {
                if rendered.get(prefix).map(String::as_str) != Some(uri) {
                    declarations.push((prefix, uri));
                    rendered_here.insert(prefix.to_owned(), uri.to_owned());
                }
            }
            None if prefix.is_empty() => {
                // Unqualified element below an output ancestor that set a default namespace
                if rendered.get("").is_some_and(|uri| !uri.is_empty()) {
                    declarations.push(("", ""));
                    rendered_here.insert(String::new(), String::new());
                }
            }
            None => return Err(Error::UnboundPrefix(prefix.to_owned())),
        }
    }

    let mut attributes = element
        .attributes()
        .iter()
        .map(|attr| {
            let uri = match attr.prefix() {
                Some(prefix) => scope
                    .resolve(prefix)
                    .ok_or_else(|| Error::UnboundPrefix(prefix.to_owned()))?,
                None => "",
            };
            Ok((uri, attr.local_name(), attr))
        })
        .collect::<Result<Vec<_>>>()?;
    attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    out.push('<');
    out.push_str(element.name());
    for (prefix, uri) in declarations {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        out.push_str(&escape_attr_value(uri));
        out.push('"');
    }
    for (_, _, attr) in attributes {
        out.push(' ');
        out.push_str(attr.name());
        out.push_str("=\"");
        out.push_str(&escape_attr_value(attr.value()));
        out.push('"');
    }
    out.push('>');

    for child in element.children() {
        match child {
            Node::Element(child) => write_element(out, child, &scope, &rendered_here, options)?,
            Node::Text(text) => out.push_str(&escape_text_value(text)),
            Node::Comment(comment) => {
                if options.with_comments {
                    out.push_str("<!--");
                    out.push_str(comment);
                    out.push_str("-->");
                }
            }
            Node::ProcessingInstruction(content) => write_processing_instruction(out, content),
        }
    }

    out.push_str("</");
    out.push_str(element.name());
    out.push('>');
    Ok(())
}

fn write_processing_instruction(out: &mut String, content: &str) {
    let (target, data) = match content.find(char::is_whitespace) {
        Some(pos) => (&content[..pos], content[pos..].trim_start()),
        None => (content, ""),
    };
    out.push_str("<?");
    out.push_str(target);
    if !data.is_empty() {
        out.push(' ');
        out.push_str(data);
    }
    out.push_str("?>");
}

/// Escape attribute value per C14N rules.
pub(crate) fn escape_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 4);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape text node value per C14N rules.
pub(crate) fn escape_text_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 4);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}
