use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::{self, FromStr};

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesDecl, BytesStart, Event};

use super::c14n::{escape_attr_value, escape_text_value};
use super::{Error, Result, XML_NAMESPACE};

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// A regular attribute. Namespace declarations are kept apart on the element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Qualified name as written in the document
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity-decoded value
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }
}

/// Prefix to namespace URI bindings in effect at some point of the tree.
///
/// The empty prefix stands for the default namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceScope {
    bindings: BTreeMap<String, String>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this scope with an additional binding
    pub fn with(mut self, prefix: &str, uri: &str) -> Self {
        self.bind(prefix, uri);
        self
    }

    fn bind(&mut self, prefix: &str, uri: &str) {
        if uri.is_empty() {
            self.bindings.remove(prefix);
        } else {
            self.bindings.insert(prefix.to_owned(), uri.to_owned());
        }
    }

    /// Namespace URI bound to `prefix`, if any
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.bindings.get(prefix).map(String::as_str)
    }

    /// Scope seen by the children of `element`
    pub fn enter(&self, element: &Element) -> NamespaceScope {
        let mut scope = self.clone();
        for (prefix, uri) in element.namespaces() {
            scope.bind(prefix, uri);
        }
        scope
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

/// A node in the element content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Entity-decoded character data
    Text(String),
    Comment(String),
    /// Raw `target data` content of a processing instruction
    ProcessingInstruction(String),
}

impl Node {
    fn write_to(&self, out: &mut String) {
        match self {
            Node::Element(element) => element.write_to(out),
            Node::Text(text) => out.push_str(&escape_text_value(text)),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::ProcessingInstruction(content) => {
                out.push_str("<?");
                out.push_str(content);
                out.push_str("?>");
            }
        }
    }
}

/// An XML element with its namespace declarations, attributes and content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    namespaces: Vec<(String, String)>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.declare_namespace(prefix, uri);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.push_text(text);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.append_child(child);
        self
    }

    /// Qualified name as written in the document
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Namespace of this element, `scope` being the scope that includes its own declarations
    pub fn namespace_uri<'s>(&self, scope: &'s NamespaceScope) -> Option<&'s str> {
        scope.resolve(self.prefix().unwrap_or(""))
    }

    /// Namespace declarations made on this element, in document order
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// URI declared for `prefix` on this very element
    pub fn namespace_declaration(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
    }

    /// Declares `prefix` on this element, replacing an existing declaration of the same prefix
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        match self.namespaces.iter_mut().find(|(p, _)| p == prefix) {
            Some(existing) => existing.1 = uri.to_owned(),
            None => self.namespaces.push((prefix.to_owned(), uri.to_owned())),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Value of the attribute with the given qualified name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(Attribute::value)
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Appends `child` as the last child node
    pub fn append_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Appends character data, merging with a trailing text node
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(Node::Text(last)) => last.push_str(text),
            _ => self.children.push(Node::Text(text.to_owned())),
        }
    }

    /// Concatenated text of the direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Copy of this subtree without the descendant elements matched by `exclude`.
    ///
    /// `inherited` is the scope in effect at this element's parent; the predicate
    /// receives each descendant along with the scope including its own declarations.
    pub fn without_descendants<F>(&self, inherited: &NamespaceScope, exclude: &F) -> Element
    where
        F: Fn(&Element, &NamespaceScope) -> bool,
    {
        let scope = inherited.enter(self);
        let children = self
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Element(child) => {
                    if exclude(child, &scope.enter(child)) {
                        None
                    } else {
                        Some(Node::Element(child.without_descendants(&scope, exclude)))
                    }
                }
                other => Some(other.clone()),
            })
            .collect();

        Element {
            name: self.name.clone(),
            namespaces: self.namespaces.clone(),
            attributes: self.attributes.clone(),
            children,
        }
    }

    fn from_start(start: &BytesStart) -> Result<Self> {
        let qname = start.name();
        let name = str::from_utf8(qname.as_ref())?;
        let mut element = Element::new(name);

        for attr in start.attributes() {
            let attr = attr?;
            let key = str::from_utf8(attr.key.as_ref())?;
            let raw = str::from_utf8(&attr.value)?;
            let value = unescape(&normalize_attribute_whitespace(raw))?.into_owned();

            if key == "xmlns" {
                element.namespaces.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                if value.is_empty() {
                    return Err(Error::Malformed(format!(
                        "namespace prefix '{prefix}' cannot be undeclared"
                    )));
                }
                element.namespaces.push((prefix.to_owned(), value));
            } else {
                element.attributes.push(Attribute::new(key, value));
            }
        }
        Ok(element)
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (prefix, uri) in &self.namespaces {
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
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            out.push_str(&escape_attr_value(&attr.value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Location of an element as child-node indexes starting at the root element
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ElementPath(Vec<usize>);

impl ElementPath {
    /// Path of the root element
    pub fn root() -> Self {
        Self::default()
    }

    /// Number of steps below the root element
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    fn child(&self, index: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(index);
        Self(steps)
    }
}

/// The `<?xml ...?>` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    version: String,
    encoding: Option<String>,
    standalone: Option<String>,
}

impl Declaration {
    fn from_event(decl: &BytesDecl) -> Result<Self> {
        let version = str::from_utf8(&decl.version()?)?.to_owned();
        let encoding = match decl.encoding().transpose()? {
            Some(encoding) => Some(str::from_utf8(&encoding)?.to_owned()),
            None => None,
        };
        let standalone = match decl.standalone().transpose()? {
            Some(standalone) => Some(str::from_utf8(&standalone)?.to_owned()),
            None => None,
        };
        Ok(Self {
            version,
            encoding,
            standalone,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<?xml version=\"{}\"", self.version)?;
        if let Some(encoding) = &self.encoding {
            write!(f, " encoding=\"{encoding}\"")?;
        }
        if let Some(standalone) = &self.standalone {
            write!(f, " standalone=\"{standalone}\"")?;
        }
        f.write_str("?>")
    }
}

/// A well-formed XML document owned by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    declaration: Option<Declaration>,
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self {
            declaration: None,
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parse a document, rejecting anything that is not well-formed or namespace-well-formed
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);
        reader.config_mut().expand_empty_elements = true;

        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Decl(decl) => {
                    if declaration.is_some() || root.is_some() || !stack.is_empty() {
                        return Err(Error::Malformed(
                            "XML declaration is only allowed at the start of the document".into(),
                        ));
                    }
                    declaration = Some(Declaration::from_event(&decl)?);
                }
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(Error::Malformed("more than one root element".into()));
                    }
                    stack.push(Element::from_start(&start)?);
                }
                Event::Empty(start) => {
                    if root.is_some() {
                        return Err(Error::Malformed("more than one root element".into()));
                    }
                    let element = Element::from_start(&start)?;
                    close_element(element, &mut stack, &mut root);
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::Malformed("unexpected closing tag".into()))?;
                    close_element(element, &mut stack, &mut root);
                }
                Event::Text(text) => {
                    let raw = str::from_utf8(&text)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(&unescape(&normalize_line_endings(raw))?),
                        None if raw.trim().is_empty() => {}
                        None => {
                            return Err(Error::Malformed(
                                "character data outside of the root element".into(),
                            ));
                        }
                    }
                }
                Event::CData(cdata) => {
                    let raw = str::from_utf8(&cdata)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(&normalize_line_endings(raw)),
                        None => {
                            return Err(Error::Malformed(
                                "CDATA section outside of the root element".into(),
                            ));
                        }
                    }
                }
                Event::Comment(comment) => {
                    let node = Node::Comment(str::from_utf8(&comment)?.to_owned());
                    push_misc(node, &mut stack, &root, &mut prolog, &mut epilog);
                }
                Event::PI(pi) => {
                    let node = Node::ProcessingInstruction(str::from_utf8(&pi)?.to_owned());
                    push_misc(node, &mut stack, &root, &mut prolog, &mut epilog);
                }
                Event::DocType(_) => {
                    if root.is_some() || !stack.is_empty() {
                        return Err(Error::Malformed(
                            "document type declaration after the root element".into(),
                        ));
                    }
                }
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::Malformed(format!(
                "element <{}> is not closed",
                open.name
            )));
        }
        let root = root.ok_or_else(|| Error::Malformed("document has no root element".into()))?;
        check_namespace_bindings(&root, &NamespaceScope::new())?;

        Ok(Self {
            declaration,
            prolog,
            root,
            epilog,
        })
    }

    pub fn declaration(&self) -> Option<&Declaration> {
        self.declaration.as_ref()
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Element at `path`, if the path is valid for this document
    pub fn element(&self, path: &ElementPath) -> Option<&Element> {
        let mut current = &self.root;
        for &index in &path.0 {
            match current.children.get(index)? {
                Node::Element(child) => current = child,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Namespace bindings inherited by the element at `path` from its ancestors
    pub fn scope_of(&self, path: &ElementPath) -> Option<NamespaceScope> {
        let mut scope = NamespaceScope::new();
        let mut current = &self.root;
        for &index in &path.0 {
            scope = scope.enter(current);
            match current.children.get(index)? {
                Node::Element(child) => current = child,
                _ => return None,
            }
        }
        Some(scope)
    }

    /// Paths of all elements matching `predicate`, in document order.
    ///
    /// The predicate receives each element along with the scope including its own declarations.
    pub fn find_all<F>(&self, predicate: F) -> Vec<ElementPath>
    where
        F: Fn(&Element, &NamespaceScope) -> bool,
    {
        let mut found = Vec::new();
        collect_matching(
            &self.root,
            ElementPath::root(),
            &NamespaceScope::new(),
            &predicate,
            &mut found,
        );
        found
    }

    /// Paths of the elements carrying an attribute with local name `Id` equal to `id`
    pub fn elements_with_id(&self, id: &str) -> Vec<ElementPath> {
        self.find_all(|element, _| {
            element
                .attributes()
                .iter()
                .any(|attr| attr.local_name() == "Id" && attr.value() == id)
        })
    }

    /// Serialize the document, keeping its declaration and top-level comments
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        if let Some(declaration) = &self.declaration {
            out.push_str(&declaration.to_string());
            out.push('\n');
        }
        for node in &self.prolog {
            node.write_to(&mut out);
            out.push('\n');
        }
        self.root.write_to(&mut out);
        for node in &self.epilog {
            out.push('\n');
            node.write_to(&mut out);
        }
        out
    }
}

impl FromStr for Document {
    type Err = Error;

    fn from_str(xml: &str) -> Result<Self> {
        Self::parse(xml)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

fn close_element(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_misc(
    node: Node,
    stack: &mut [Element],
    root: &Option<Element>,
    prolog: &mut Vec<Node>,
    epilog: &mut Vec<Node>,
) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => prolog.push(node),
        None => epilog.push(node),
    }
}

fn collect_matching<F>(
    element: &Element,
    path: ElementPath,
    inherited: &NamespaceScope,
    predicate: &F,
    found: &mut Vec<ElementPath>,
) where
    F: Fn(&Element, &NamespaceScope) -> bool,
{
    let scope = inherited.enter(element);
    if predicate(element, &scope) {
        found.push(path.clone());
    }
    for (index, node) in element.children.iter().enumerate() {
        if let Node::Element(child) = node {
            collect_matching(child, path.child(index), &scope, predicate, found);
        }
    }
}

fn check_namespace_bindings(element: &Element, inherited: &NamespaceScope) -> Result<()> {
    let scope = inherited.enter(element);
    let prefixes = element
        .prefix()
        .into_iter()
        .chain(element.attributes.iter().filter_map(Attribute::prefix));
    for prefix in prefixes {
        if scope.resolve(prefix).is_none() {
            return Err(Error::UnboundPrefix(prefix.to_owned()));
        }
    }
    for child in element.child_elements() {
        check_namespace_bindings(child, &scope)?;
    }
    Ok(())
}

/// Normalize CRLF and lone CR to LF, as an XML processor does before parsing
fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Attribute-value normalization: literal whitespace characters become spaces
fn normalize_attribute_whitespace(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['\t', '\n', '\r']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(normalize_line_endings(raw).replace(['\t', '\n'], " "))
}
